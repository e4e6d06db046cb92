use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use traffic_flow::config::PhysicsConfig;
use traffic_flow::entity::GraphObject;
use traffic_flow::graph::{GraphContext, GraphEvent, GraphKind, TrafficGraph};
use traffic_flow::layout::{
    Dimensions, DispatchMode, LayoutCache, LayoutDispatcher, LayoutEdge, LayoutInput, LayoutNode,
    LayoutStrategy, RankedLayout,
};
use traffic_flow::snapshot::{SnapshotConnection, SnapshotNode};
use traffic_flow::{EngineConfig, Scene, Snapshot};

fn snapshot(name: &str, edges: &[(&str, &str, f64)]) -> Snapshot {
    let mut nodes = Vec::<SnapshotNode>::new();
    for (source, target, _) in edges {
        for endpoint in [source, target] {
            if !nodes.iter().any(|node| node.name == *endpoint) {
                nodes.push(SnapshotNode::named(*endpoint));
            }
        }
    }

    Snapshot {
        renderer: Some("region".to_owned()),
        name: name.to_owned(),
        entry_node: None,
        max_volume: Some(100.0),
        nodes,
        connections: edges
            .iter()
            .map(|(source, target, value)| {
                SnapshotConnection::new(*source, *target).with_metric("normal", *value)
            })
            .collect(),
    }
}

fn input(edges: &[(&str, &str)]) -> LayoutInput {
    let mut names = edges
        .iter()
        .flat_map(|(source, target)| [*source, *target])
        .collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();

    LayoutInput {
        nodes: names
            .iter()
            .map(|name| LayoutNode {
                name: (*name).to_owned(),
                size: 16.0,
                weight: 1.0,
                position_hint: None,
                rank_hint: None,
            })
            .collect(),
        edges: edges
            .iter()
            .map(|(source, target)| LayoutEdge {
                name: format!("{source}--{target}"),
                source: (*source).to_owned(),
                target: (*target).to_owned(),
            })
            .collect(),
        entry_nodes: vec!["edge".to_owned()],
        options: Default::default(),
    }
}

#[test]
fn test_ranks_strictly_increase_along_acyclic_edges() {
    let layout = RankedLayout::new(Arc::new(LayoutCache::default()));
    let edges = [
        ("edge", "web"),
        ("web", "api"),
        ("api", "db"),
        ("web", "db"),
        ("db", "api"),
        ("api", "api"),
        ("api", "edge"),
    ];
    let output = layout.run(&input(&edges), Dimensions::default());

    assert_eq!(output.ranks.get("edge"), Some(&0));
    let rank = |name: &str| output.ranks.get(name).copied().unwrap_or(usize::MAX);
    // api -> api, api -> edge and db -> api close cycles; the rest is a DAG.
    for (source, target) in [("edge", "web"), ("web", "api"), ("api", "db"), ("web", "db")] {
        assert!(rank(source) < rank(target), "{source} -> {target}");
    }
    assert_eq!(output.positions.len(), 4);
}

#[test]
fn test_subset_topology_reuses_cached_positions() {
    let cache = Arc::new(LayoutCache::default());
    let layout = RankedLayout::new(Arc::clone(&cache));
    let full = layout.run(
        &input(&[("edge", "web"), ("web", "api"), ("api", "db")]),
        Dimensions::default(),
    );
    let subset = layout.run(&input(&[("edge", "web"), ("web", "api")]), Dimensions::default());

    assert_eq!(cache.computations(), 1);
    assert_eq!(cache.hits(), 1);
    assert_eq!(subset.positions.get("web"), full.positions.get("web"));
    assert!(!subset.positions.contains_key("db"));
}

#[test]
fn test_background_region_applies_only_last_snapshot() {
    let mut scene = Scene::new(
        Arc::new(EngineConfig::default()),
        DispatchMode::Inline,
        Dimensions::default(),
    );
    scene.update_data(snapshot("us-east", &[("edge", "a", 1.0)]));
    scene.set_view(&["us-east".to_owned()]);
    scene.set_view(&[]);

    scene.update_data(snapshot("us-east", &[("edge", "b", 2.0)]));
    scene.update_data(snapshot("us-east", &[("edge", "c", 3.0)]));
    let region = scene.region("us-east");
    assert!(region.is_some_and(|graph| graph.node("a").is_some()));

    scene.set_view(&["us-east".to_owned()]);
    let region = scene.current_graph();
    assert!(region.node("a").is_none());
    assert!(region.node("b").is_none());
    assert_eq!(region.outgoing_volume("edge", None), Some(3.0));
}

#[test]
fn test_late_worker_result_is_still_applied() {
    let dispatcher = Arc::new(LayoutDispatcher::new(DispatchMode::Deferred));
    let context = GraphContext {
        config: Arc::new(EngineConfig::default()),
        dispatcher: Arc::clone(&dispatcher),
        layout_cache: Arc::new(LayoutCache::default()),
        dimensions: Dimensions::default(),
    };
    let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context);
    graph.set_current(true);
    graph.set_state(snapshot("r", &[("edge", "api", 5.0), ("api", "db", 2.0)]), false);
    assert_eq!(graph.layout_tracker().outstanding(), 1);

    let timeout = Instant::now() + Duration::from_secs(30);
    graph.tick(timeout, 0.016);
    assert_eq!(graph.layout_tracker().outstanding(), 0);
    assert!(!graph.has_position_data());

    assert_eq!(dispatcher.run_deferred(), 1);
    graph.tick(timeout, 0.016);
    assert!(graph.has_position_data());
    let events = graph.take_events();
    assert!(events.iter().any(|event| matches!(event, GraphEvent::LayoutApplied { .. })));
}

#[test]
fn test_worker_layout_arrives() {
    let context = GraphContext {
        config: Arc::new(EngineConfig::default()),
        dispatcher: Arc::new(LayoutDispatcher::new(DispatchMode::Worker)),
        layout_cache: Arc::new(LayoutCache::default()),
        dimensions: Dimensions::default(),
    };
    let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context);
    graph.set_current(true);
    graph.set_state(snapshot("r", &[("edge", "api", 5.0)]), false);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !graph.has_position_data() && Instant::now() < deadline {
        graph.tick(Instant::now(), 0.016);
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(graph.has_position_data());
}

#[test]
fn test_force_simulation_waits_for_discrete_layout() {
    let dispatcher = Arc::new(LayoutDispatcher::new(DispatchMode::Deferred));
    let context = GraphContext {
        config: Arc::new(EngineConfig {
            physics: PhysicsConfig {
                enabled: true,
                ..PhysicsConfig::default()
            },
            ..EngineConfig::default()
        }),
        dispatcher: Arc::clone(&dispatcher),
        layout_cache: Arc::new(LayoutCache::default()),
        dimensions: Dimensions::default(),
    };
    let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context);
    graph.set_current(true);
    graph.set_state(snapshot("r", &[("edge", "api", 5.0), ("api", "db", 2.0)]), false);
    assert!(!graph.simulation_active());

    dispatcher.run_deferred();
    graph.tick(Instant::now(), 0.016);
    assert!(graph.simulation_active());

    let before = graph
        .nodes()
        .map(|node| (node.name().to_owned(), node.position))
        .collect::<HashMap<_, _>>();
    for _ in 0..10 {
        graph.tick(Instant::now(), 0.016);
    }
    let moved = graph
        .nodes()
        .any(|node| before.get(node.name()) != Some(&node.position));
    assert!(moved);
}

#[test]
fn test_particles_follow_relative_volume() {
    let context = GraphContext {
        config: Arc::new(EngineConfig::default()),
        dispatcher: Arc::new(LayoutDispatcher::new(DispatchMode::Inline)),
        layout_cache: Arc::new(LayoutCache::default()),
        dimensions: Dimensions::default(),
    };
    let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context);
    graph.set_current(true);
    graph.set_state(snapshot("r", &[("edge", "api", 100.0), ("api", "db", 0.0)]), false);

    let busy = graph.particle_emitter("edge--api").map(|e| e.levels().release_delay_ms);
    assert_eq!(busy, Some(80.0));
    let idle = graph.particle_emitter("api--db").map(|e| e.levels().per_release);
    assert_eq!(idle, Some(0));

    let launched = graph.advance_particles(1000.0);
    assert!(launched > 0);
}
