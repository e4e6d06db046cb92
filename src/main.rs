use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use traffic_flow::entity::GraphObject;
use traffic_flow::layout::{Dimensions, DispatchMode};
use traffic_flow::util::format_volume;
use traffic_flow::{EngineConfig, Scene, TrafficGraph, parse_snapshot};

/// Replays traffic snapshots through the engine and prints the resulting
/// layout of the selected view.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Snapshot JSON files, applied in order.
    #[arg(required = true)]
    snapshots: Vec<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// View path, e.g. `us-east` or `us-east/api`.
    #[arg(long, default_value = "")]
    view: String,

    #[arg(long, default_value_t = 1440.0)]
    width: f32,

    #[arg(long, default_value_t = 920.0)]
    height: f32,

    /// Lay out on the calling thread instead of a worker.
    #[arg(long)]
    inline: bool,

    #[arg(long)]
    search: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let watchdog = config.layout_watchdog();
    let mode = if args.inline {
        DispatchMode::Inline
    } else {
        DispatchMode::Worker
    };
    let mut scene = Scene::new(
        Arc::new(config),
        mode,
        Dimensions::new(args.width, args.height),
    );

    for path in &args.snapshots {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let snapshot = parse_snapshot(&raw)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
        let change = scene.update_data(snapshot);
        log::info!(
            "{}: +{} ~{} -{} nodes, {} errors",
            path.display(),
            change.nodes_added.len(),
            change.nodes_updated.len(),
            change.nodes_removed.len(),
            change.errors.len()
        );
    }

    let view = args
        .view
        .split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();
    if !scene.set_view(&view) {
        anyhow::bail!("unknown view {:?}", args.view);
    }
    if let Some(query) = &args.search {
        scene.current_graph_mut().set_search(query, Instant::now());
    }

    let started = Instant::now();
    loop {
        scene.tick(Instant::now(), 1.0 / 60.0);
        if scene.current_graph().layout_tracker().outstanding() == 0 {
            break;
        }
        if started.elapsed() > watchdog + Duration::from_secs(1) {
            log::warn!("giving up waiting for layout");
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    print_summary(scene.current_graph());
    let cache = scene.layout_cache();
    println!(
        "layout cache: {} entries, {} computations, {} hits",
        cache.len(),
        cache.computations(),
        cache.hits()
    );
    Ok(())
}

fn print_summary(graph: &TrafficGraph) {
    let counts = graph.node_counts();
    let volume = graph.volume();
    println!(
        "{} ({:?}): {} nodes ({} visible), {} connections, current {} of max {}",
        graph.name(),
        graph.kind(),
        counts.total,
        counts.visible,
        graph.connections().len(),
        format_volume(volume.current),
        format_volume(volume.max)
    );

    let mut nodes = graph.nodes().collect::<Vec<_>>();
    nodes.sort_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.name().cmp(b.name())));
    for node in nodes {
        let marker = if graph.is_entry_node(node.name()) { "*" } else { " " };
        let notices = node
            .highest_notice_level()
            .map(|level| format!(" notice:{level}"))
            .unwrap_or_default();
        println!(
            "{marker} {:<32} rank {:>2} at ({:>8.1}, {:>8.1})  in {:>12}  out {:>12}{notices}{}",
            node.name(),
            node.rank().map_or_else(|| "-".to_owned(), |rank| rank.to_string()),
            node.position.x,
            node.position.y,
            format_volume(graph.incoming_volume(node.name(), None).unwrap_or_default()),
            format_volume(graph.outgoing_volume(node.name(), None).unwrap_or_default()),
            if node.is_visible() { "" } else { " (hidden)" },
        );
    }
}
