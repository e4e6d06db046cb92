//! Left-to-right layered layout driven by longest-path ranking.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use eframe::egui::vec2;

use super::{Dimensions, LayoutCache, LayoutInput, LayoutOutput, LayoutStrategy, TopologyKey};

pub struct RankedLayout {
    cache: Arc<LayoutCache>,
}

impl RankedLayout {
    pub fn new(cache: Arc<LayoutCache>) -> Self {
        Self { cache }
    }
}

impl LayoutStrategy for RankedLayout {
    fn name(&self) -> &'static str {
        "ranked"
    }

    fn run(&self, input: &LayoutInput, dimensions: Dimensions) -> LayoutOutput {
        let key = TopologyKey::from_input(input);
        if let Some(cached) = self.cache.lookup(&key, dimensions) {
            log::debug!(
                "ranked layout cache hit for {} nodes / {} edges",
                key.nodes.len(),
                key.edges.len()
            );
            return cached;
        }

        let output = compute(input, dimensions);
        self.cache.insert(key, dimensions, output.clone());
        output
    }
}

struct RankGraph {
    names: Vec<String>,
    weights: Vec<f64>,
    edges: Vec<(usize, usize)>,
    entries: Vec<usize>,
}

impl RankGraph {
    fn from_input(input: &LayoutInput) -> Self {
        let mut order = (0..input.nodes.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| input.nodes[a].name.cmp(&input.nodes[b].name));

        let names = order
            .iter()
            .map(|&index| input.nodes[index].name.clone())
            .collect::<Vec<_>>();
        let weights = order
            .iter()
            .map(|&index| input.nodes[index].weight)
            .collect::<Vec<_>>();
        let index_by_name = names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_str(), index))
            .collect::<HashMap<_, _>>();

        let mut edges = input
            .edges
            .iter()
            .filter_map(|edge| {
                Some((
                    *index_by_name.get(edge.source.as_str())?,
                    *index_by_name.get(edge.target.as_str())?,
                ))
            })
            .collect::<Vec<_>>();
        edges.sort_unstable();
        edges.dedup();

        let mut entries = input
            .entry_nodes
            .iter()
            .filter_map(|name| index_by_name.get(name.as_str()).copied())
            .collect::<Vec<_>>();
        entries.sort_unstable();
        entries.dedup();

        Self {
            names,
            weights,
            edges,
            entries,
        }
    }
}

/// Splits `edges` into an acyclic set and the removed feedback edges.
/// Self-loops, edges into entry nodes and DFS back edges are removed. The
/// DFS starts from entry nodes, then sources, then everything else.
pub(crate) fn remove_feedback_edges(
    node_count: usize,
    edges: &[(usize, usize)],
    entries: &[usize],
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let entry_set = entries.iter().copied().collect::<HashSet<_>>();
    let mut outgoing = vec![Vec::new(); node_count];
    let mut in_degree = vec![0usize; node_count];
    for &(from, to) in edges {
        outgoing[from].push(to);
        in_degree[to] += 1;
    }

    let mut roots = entries.to_vec();
    roots.extend((0..node_count).filter(|index| in_degree[*index] == 0));
    roots.extend(0..node_count);

    // 0 = unvisited, 1 = on the DFS stack, 2 = finished
    let mut state = vec![0u8; node_count];
    let mut back_edges = HashSet::new();

    for root in roots {
        if state[root] != 0 {
            continue;
        }

        let mut stack = vec![(root, 0usize)];
        state[root] = 1;
        while let Some((node, next)) = stack.pop() {
            if next >= outgoing[node].len() {
                state[node] = 2;
                continue;
            }

            stack.push((node, next + 1));
            let target = outgoing[node][next];
            if target == node || entry_set.contains(&target) || state[target] == 1 {
                back_edges.insert((node, target));
            } else if state[target] == 0 {
                state[target] = 1;
                stack.push((target, 0));
            }
        }
    }

    edges
        .iter()
        .copied()
        .partition(|edge| !back_edges.contains(edge))
}

/// Longest-path ranks over an acyclic edge set: sinks start at 0, every
/// other node sits one before its closest successor, then ranks are shifted
/// so the smallest is 0 and entry nodes are pinned to 0.
pub(crate) fn longest_path_ranks(
    node_count: usize,
    acyclic: &[(usize, usize)],
    entries: &[usize],
) -> Vec<usize> {
    let mut outgoing = vec![Vec::new(); node_count];
    let mut in_degree = vec![0usize; node_count];
    for &(from, to) in acyclic {
        outgoing[from].push(to);
        in_degree[to] += 1;
    }

    let mut topo = Vec::with_capacity(node_count);
    let mut ready = (0..node_count)
        .filter(|index| in_degree[*index] == 0)
        .collect::<Vec<_>>();
    while let Some(node) = ready.pop() {
        topo.push(node);
        for &next in &outgoing[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(next);
            }
        }
    }

    let mut raw = vec![0i64; node_count];
    for &node in topo.iter().rev() {
        if let Some(closest) = outgoing[node].iter().map(|&next| raw[next]).min() {
            raw[node] = closest - 1;
        }
    }

    let minimum = raw.iter().copied().min().unwrap_or(0);
    let mut ranks = raw
        .iter()
        .map(|rank| (rank - minimum) as usize)
        .collect::<Vec<_>>();
    for &entry in entries {
        ranks[entry] = 0;
    }
    ranks
}

/// Pulls nodes fed directly by an entry node towards the front: rank 1 when
/// the entry is their only source, rank 2 otherwise. Nodes only ever move
/// left, and never past an acyclic predecessor.
fn rank_entry_adjacent(
    ranks: &mut [usize],
    edges: &[(usize, usize)],
    acyclic: &[(usize, usize)],
    entries: &[usize],
) {
    let entry_set = entries.iter().copied().collect::<HashSet<_>>();
    let mut sources = vec![HashSet::new(); ranks.len()];
    for &(from, to) in edges {
        if from != to {
            sources[to].insert(from);
        }
    }

    let mut adjacent = edges
        .iter()
        .filter(|(from, to)| entry_set.contains(from) && !entry_set.contains(to))
        .map(|&(_, to)| to)
        .collect::<Vec<_>>();
    adjacent.sort_unstable();
    adjacent.dedup();

    for node in adjacent {
        let wanted = if sources[node].len() == 1 { 1 } else { 2 };
        let floor = acyclic
            .iter()
            .filter(|(_, to)| *to == node)
            .map(|&(from, _)| ranks[from] + 1)
            .max()
            .unwrap_or(0);
        ranks[node] = ranks[node].min(wanted.max(floor));
    }
}

/// Column sizes an oversized rank bucket is split into. Buckets of at most
/// `max_per_rank` stay whole; larger ones are chunked by
/// `min(max(floor(n / 2) - 1, 1), max_per_rank)`.
pub fn split_bucket_sizes(count: usize, max_per_rank: usize) -> Vec<usize> {
    let max_per_rank = max_per_rank.max(1);
    if count <= max_per_rank {
        return vec![count];
    }

    let chunk = ((count / 2).saturating_sub(1)).max(1).min(max_per_rank);
    let mut sizes = vec![chunk; count / chunk];
    if count % chunk != 0 {
        sizes.push(count % chunk);
    }
    sizes
}

/// Heaviest in the middle, then alternating above and below.
fn center_heaviest(sorted_desc: &[usize]) -> Vec<usize> {
    let mut above = Vec::new();
    let mut below = Vec::new();
    for (position, &node) in sorted_desc.iter().enumerate() {
        if position % 2 == 0 {
            below.push(node);
        } else {
            above.push(node);
        }
    }
    above.reverse();
    above.extend(below);
    above
}

fn compute(input: &LayoutInput, dimensions: Dimensions) -> LayoutOutput {
    let graph = RankGraph::from_input(input);
    let node_count = graph.names.len();
    let mut output = LayoutOutput::default();
    if node_count == 0 {
        return output;
    }

    let (acyclic, removed) = remove_feedback_edges(node_count, &graph.edges, &graph.entries);
    if !removed.is_empty() {
        log::debug!("ranked layout removed {} feedback edges", removed.len());
    }

    let mut ranks = longest_path_ranks(node_count, &acyclic, &graph.entries);
    if input.options.entry_adjacent_ranking {
        rank_entry_adjacent(&mut ranks, &graph.edges, &acyclic, &graph.entries);
    }

    let mut buckets: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, rank) in ranks.iter().enumerate() {
        buckets.entry(*rank).or_default().push(node);
    }

    let mut columns = Vec::new();
    for (_, mut bucket) in buckets {
        bucket.sort_by(|&a, &b| {
            graph.weights[b]
                .total_cmp(&graph.weights[a])
                .then_with(|| graph.names[a].cmp(&graph.names[b]))
        });

        let mut offset = 0usize;
        for size in split_bucket_sizes(bucket.len(), input.options.max_per_rank) {
            columns.push(center_heaviest(&bucket[offset..offset + size]));
            offset += size;
        }
    }

    let column_width = dimensions.width / columns.len() as f32;
    for (column, members) in columns.iter().enumerate() {
        let spacing = dimensions.height / (members.len() + 1) as f32;
        let stagger = if column % 2 == 1 { spacing * 0.25 } else { 0.0 };
        let x = (column as f32 + 0.5) * column_width - dimensions.width * 0.5;

        for (slot, &node) in members.iter().enumerate() {
            let y = (slot + 1) as f32 * spacing - dimensions.height * 0.5 + stagger;
            let name = &graph.names[node];
            output.positions.insert(name.clone(), vec2(x, y));
            output.ranks.insert(name.clone(), ranks[node]);
            output.columns.insert(name.clone(), column);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::{LayoutEdge, LayoutNode};

    fn input(nodes: &[&str], edges: &[(&str, &str)], entries: &[&str]) -> LayoutInput {
        LayoutInput {
            nodes: nodes
                .iter()
                .map(|name| LayoutNode {
                    name: (*name).to_owned(),
                    size: 16.0,
                    weight: 0.0,
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
            entry_nodes: entries.iter().map(|name| (*name).to_owned()).collect(),
            options: LayoutConfig::default(),
        }
    }

    #[test]
    fn test_acyclic_edges_go_strictly_forward() {
        let graph = RankGraph::from_input(&input(
            &["entry", "a", "b", "c", "d"],
            &[
                ("entry", "a"),
                ("a", "b"),
                ("b", "c"),
                ("c", "a"),
                ("c", "c"),
                ("b", "d"),
                ("d", "entry"),
            ],
            &["entry"],
        ));
        let (acyclic, removed) =
            remove_feedback_edges(graph.names.len(), &graph.edges, &graph.entries);
        let ranks = longest_path_ranks(graph.names.len(), &acyclic, &graph.entries);

        assert_eq!(acyclic.len() + removed.len(), graph.edges.len());
        assert_eq!(removed.len(), 3);
        for (from, to) in acyclic {
            assert!(ranks[from] < ranks[to], "{from} -> {to}");
        }
        for entry in graph.entries {
            assert_eq!(ranks[entry], 0);
        }
    }

    #[test]
    fn test_chain_ranks_and_positions() {
        let output = compute(
            &input(&["a", "b", "c"], &[("a", "b"), ("b", "c")], &["a"]),
            Dimensions::new(300.0, 200.0),
        );

        assert_eq!(output.ranks["a"], 0);
        assert_eq!(output.ranks["b"], 1);
        assert_eq!(output.ranks["c"], 2);
        assert_eq!(output.positions["a"], vec2(-100.0, 0.0));
        assert_eq!(output.positions["b"], vec2(0.0, 25.0));
        assert_eq!(output.positions["c"], vec2(100.0, 0.0));
    }

    #[test]
    fn test_split_bucket_sizes_golden() {
        assert_eq!(split_bucket_sizes(3, 8), vec![3]);
        assert_eq!(split_bucket_sizes(8, 8), vec![8]);
        assert_eq!(split_bucket_sizes(10, 4), vec![4, 4, 2]);
        assert_eq!(split_bucket_sizes(5, 4), vec![1, 1, 1, 1, 1]);
        assert_eq!(split_bucket_sizes(20, 8), vec![8, 8, 4]);
        assert_eq!(split_bucket_sizes(12, 8), vec![5, 5, 2]);
    }

    #[test]
    fn test_center_heaviest() {
        assert_eq!(center_heaviest(&[0, 1, 2, 3, 4]), vec![3, 1, 0, 2, 4]);
        assert_eq!(center_heaviest(&[7]), vec![7]);
    }

    #[test]
    fn test_entry_adjacent_ranking_pulls_nodes_forward() {
        let mut layout_input = input(
            &["entry", "a", "b", "c", "sink"],
            &[
                ("entry", "a"),
                ("a", "b"),
                ("b", "c"),
                ("c", "sink"),
                ("entry", "c"),
            ],
            &["entry"],
        );
        let dims = Dimensions::new(500.0, 500.0);

        let plain = compute(&layout_input, dims);
        assert_eq!(plain.ranks["c"], 3);

        layout_input.options.entry_adjacent_ranking = true;
        let adjusted = compute(&layout_input, dims);
        assert_eq!(adjusted.ranks["a"], 1);
        assert_eq!(adjusted.ranks["c"], 3, "c has an acyclic predecessor at rank 2");
    }

    #[test]
    fn test_cache_reuses_superset_layout() {
        let cache = Arc::new(LayoutCache::default());
        let layout = RankedLayout::new(Arc::clone(&cache));
        let dims = Dimensions::new(400.0, 300.0);

        let full = layout.run(
            &input(&["a", "b", "c"], &[("a", "b"), ("b", "c")], &["a"]),
            dims,
        );
        let partial = layout.run(&input(&["a", "b"], &[("a", "b")], &["a"]), dims);

        assert_eq!(cache.computations(), 1);
        assert_eq!(partial.positions["a"], full.positions["a"]);
        assert_eq!(partial.positions["b"], full.positions["b"]);
        assert!(!partial.positions.contains_key("c"));
    }

    #[test]
    fn test_subset_with_other_entry_is_recomputed() {
        let cache = Arc::new(LayoutCache::default());
        let layout = RankedLayout::new(Arc::clone(&cache));
        let dims = Dimensions::new(400.0, 300.0);

        layout.run(
            &input(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c"), ("c", "d")], &["a"]),
            dims,
        );
        let focused = layout.run(&input(&["b", "c", "d"], &[("b", "c"), ("c", "d")], &["b"]), dims);

        assert_eq!(cache.computations(), 2);
        assert_eq!(cache.hits(), 0);
        assert_eq!(focused.ranks.get("b"), Some(&0));
    }

    #[test]
    fn test_oversized_rank_spills_into_extra_columns() {
        let leaves = ["l0", "l1", "l2", "l3", "l4", "l5", "l6", "l7", "l8", "l9"];
        let mut nodes = vec!["root"];
        nodes.extend(leaves);
        let edges = leaves.iter().map(|leaf| ("root", *leaf)).collect::<Vec<_>>();
        let mut layout_input = input(&nodes, &edges, &["root"]);
        layout_input.options.max_per_rank = 4;

        let output = compute(&layout_input, Dimensions::new(400.0, 400.0));
        let columns = leaves
            .iter()
            .map(|leaf| output.columns[*leaf])
            .collect::<HashSet<_>>();
        assert_eq!(columns, HashSet::from([1, 2, 3]));
        assert!(leaves.iter().all(|leaf| output.ranks[*leaf] == 1));
    }
}
