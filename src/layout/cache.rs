use std::collections::{BTreeSet, VecDeque};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Dimensions, LayoutInput, LayoutOutput};

const MAX_CACHED_LAYOUTS: usize = 128;

/// Canonical topology: sorted node and edge names, plus the entry nodes and
/// the options that change ranking.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopologyKey {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<String>,
    pub entries: BTreeSet<String>,
    pub entry_adjacent_ranking: bool,
    pub max_per_rank: usize,
}

impl TopologyKey {
    pub fn from_input(input: &LayoutInput) -> Self {
        Self {
            nodes: input.nodes.iter().map(|node| node.name.clone()).collect(),
            edges: input.edges.iter().map(|edge| edge.name.clone()).collect(),
            entries: input.entry_nodes.iter().cloned().collect(),
            entry_adjacent_ranking: input.options.entry_adjacent_ranking,
            max_per_rank: input.options.max_per_rank,
        }
    }

    /// Subset topology under the same entries and ranking options.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.entries == other.entries
            && self.entry_adjacent_ranking == other.entry_adjacent_ranking
            && self.max_per_rank == other.max_per_rank
            && self.nodes.is_subset(&other.nodes)
            && self.edges.is_subset(&other.edges)
    }
}

struct CacheEntry {
    key: TopologyKey,
    dimensions: Dimensions,
    output: LayoutOutput,
}

/// Memo of ranked layouts. Read-mostly; a lookup whose topology is a
/// non-empty subset of a cached one reuses that result for the same
/// viewport.
#[derive(Default)]
pub struct LayoutCache {
    entries: RwLock<VecDeque<CacheEntry>>,
    computations: AtomicUsize,
    hits: AtomicUsize,
}

impl LayoutCache {
    pub fn lookup(&self, key: &TopologyKey, dimensions: Dimensions) -> Option<LayoutOutput> {
        if key.nodes.is_empty() {
            return None;
        }

        let entries = self.entries.read().ok()?;
        let entry = entries
            .iter()
            .rev()
            .find(|entry| entry.dimensions == dimensions && key.is_subset_of(&entry.key))?;

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.output.restricted_to(key.nodes.iter().map(String::as_str)))
    }

    pub fn insert(&self, key: TopologyKey, dimensions: Dimensions, output: LayoutOutput) {
        self.computations.fetch_add(1, Ordering::Relaxed);
        let Ok(mut entries) = self.entries.write() else {
            log::warn!("layout cache lock poisoned; result not cached");
            return;
        };

        if entries.len() >= MAX_CACHED_LAYOUTS {
            entries.pop_front();
        }
        entries.push_back(CacheEntry {
            key,
            dimensions,
            output,
        });
    }

    /// Number of layouts actually computed (cache misses).
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
