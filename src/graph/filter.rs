use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::TrafficGraph;
use crate::entity::{Connection, ConnectionMap, GraphObject, Node};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Node,
    Connection,
}

/// What a filter predicate is asked about. Node predicates also see the
/// connection map so they can read volumes.
#[derive(Clone, Copy)]
pub enum FilterSubject<'a> {
    Node {
        node: &'a Node,
        connections: &'a ConnectionMap,
    },
    Connection(&'a Connection),
}

type Predicate = dyn Fn(FilterSubject<'_>, f64) -> bool + Send + Sync;

/// A named visibility predicate with an active and a default value.
#[derive(Clone)]
pub struct Filter {
    pub name: String,
    pub kind: FilterKind,
    pub value: f64,
    pub default_value: f64,
    passes: Arc<Predicate>,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("default_value", &self.default_value)
            .finish_non_exhaustive()
    }
}

impl Filter {
    pub fn new(
        name: impl Into<String>,
        kind: FilterKind,
        default_value: f64,
        passes: impl Fn(FilterSubject<'_>, f64) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            value: default_value,
            default_value,
            passes: Arc::new(passes),
        }
    }

    /// Hides connections whose total volume is below the value.
    pub fn min_connection_volume(name: impl Into<String>, default_value: f64) -> Self {
        Self::new(name, FilterKind::Connection, default_value, |subject, value| {
            match subject {
                FilterSubject::Connection(connection) => connection.volume_total() >= value,
                FilterSubject::Node { .. } => true,
            }
        })
    }

    /// Hides nodes whose notices all sit below the value. A value of zero
    /// lets every node through.
    pub fn min_notice_severity(name: impl Into<String>, default_value: f64) -> Self {
        Self::new(name, FilterKind::Node, default_value, |subject, value| {
            match subject {
                FilterSubject::Node { node, .. } => {
                    value <= 0.0
                        || node
                            .highest_notice_level()
                            .is_some_and(|level| f64::from(level) >= value)
                }
                FilterSubject::Connection(_) => true,
            }
        })
    }

    pub fn passes(&self, subject: FilterSubject<'_>, use_default: bool) -> bool {
        let value = if use_default {
            self.default_value
        } else {
            self.value
        };
        (self.passes)(subject, value)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Hidden {
    nodes: HashSet<String>,
    connections: HashSet<String>,
}

impl TrafficGraph {
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: Vec<Filter>) -> usize {
        self.filters = filters;
        self.refilter()
    }

    /// Changes one filter's active value. Returns how many objects flipped
    /// visibility, or `None` for an unknown filter.
    pub fn update_filter_value(&mut self, name: &str, value: f64) -> Option<usize> {
        let filter = self.filters.iter_mut().find(|filter| filter.name == name)?;
        filter.value = value;
        Some(self.refilter())
    }

    fn refilter(&mut self) -> usize {
        let flipped = self.apply_filters();
        if flipped > 0 {
            self.refresh_overlay(Instant::now());
            self.relayout();
        }
        flipped
    }

    /// Runs the visibility fixed point for both active and default filter
    /// values and writes the result onto the entities. Returns how many
    /// objects changed active visibility.
    pub(crate) fn apply_filters(&mut self) -> usize {
        let active = self.hidden_set(false);
        let defaults = self.hidden_set(true);

        let mut flipped = Vec::new();
        for (name, node) in &mut self.nodes {
            let filtered = active.nodes.contains(name);
            if node.filtered != filtered {
                node.filtered = filtered;
                flipped.push((node.object_ref(), !filtered));
            }
            node.default_filtered = defaults.nodes.contains(name);
        }
        for (name, connection) in &mut self.connections {
            let filtered = active.connections.contains(name);
            if connection.filtered != filtered {
                connection.filtered = filtered;
                flipped.push((connection.object_ref(), !filtered));
            }
            connection.default_filtered = defaults.connections.contains(name);
        }

        self.node_counts.total = self.nodes.len();
        self.node_counts.visible = self.nodes.len() - active.nodes.len();

        if !flipped.is_empty() {
            log::debug!("{}: {} objects changed visibility", self.name, flipped.len());
            self.layout_valid = false;
            if self.current {
                for (object, visible) in &flipped {
                    self.view.visibility_changed(object, *visible);
                }
            }
        }
        flipped.len()
    }

    /// Monotone worklist: start with everything visible, hide whatever
    /// fails a predicate, then keep hiding nodes without a visible
    /// connection and connections without a visible endpoint until nothing
    /// moves. Each object is hidden at most once, so the round cap is never
    /// reached on well-formed graphs.
    fn hidden_set(&self, use_default: bool) -> Hidden {
        let mut hidden = Hidden::default();

        for (name, node) in &self.nodes {
            let subject = FilterSubject::Node {
                node,
                connections: &self.connections,
            };
            let fails = self
                .filters
                .iter()
                .filter(|filter| filter.kind == FilterKind::Node)
                .any(|filter| !filter.passes(subject, use_default));
            if fails {
                hidden.nodes.insert(name.clone());
            }
        }
        for (name, connection) in &self.connections {
            let fails = self
                .filters
                .iter()
                .filter(|filter| filter.kind == FilterKind::Connection)
                .any(|filter| !filter.passes(FilterSubject::Connection(connection), use_default));
            if fails {
                hidden.connections.insert(name.clone());
            }
        }

        let cap = self.nodes.len() + self.connections.len() + 1;
        let mut rounds = 0;
        loop {
            if rounds == cap {
                log::warn!("{}: filter fixed point hit its round cap", self.name);
                break;
            }
            rounds += 1;
            let mut changed = false;

            for (name, node) in &self.nodes {
                if hidden.nodes.contains(name) {
                    continue;
                }
                let has_visible = node
                    .incoming
                    .iter()
                    .chain(node.outgoing.iter())
                    .any(|connection| !hidden.connections.contains(connection));
                if !has_visible {
                    hidden.nodes.insert(name.clone());
                    changed = true;
                }
            }

            for (name, connection) in &self.connections {
                if hidden.connections.contains(name) {
                    continue;
                }
                if hidden.nodes.contains(connection.source())
                    && hidden.nodes.contains(connection.target())
                {
                    hidden.connections.insert(name.clone());
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        hidden
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::{GraphContext, GraphKind};
    use crate::layout::{DispatchMode, Dimensions, LayoutCache, LayoutDispatcher};
    use crate::snapshot::{Snapshot, SnapshotConnection, SnapshotNode};

    fn graph() -> TrafficGraph {
        let context = GraphContext {
            config: Arc::new(EngineConfig::default()),
            dispatcher: Arc::new(LayoutDispatcher::new(DispatchMode::Inline)),
            layout_cache: Arc::new(LayoutCache::default()),
            dimensions: Dimensions::default(),
        };
        let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context);
        graph.set_current(true);
        graph.set_state(
            Snapshot {
                renderer: None,
                name: "r".to_owned(),
                entry_node: None,
                max_volume: Some(100.0),
                nodes: ["a", "b", "c", "d", "lonely"]
                    .into_iter()
                    .map(SnapshotNode::named)
                    .collect(),
                connections: vec![
                    SnapshotConnection::new("a", "b").with_metric("normal", 50.0),
                    SnapshotConnection::new("b", "c").with_metric("normal", 2.0),
                    SnapshotConnection::new("c", "d").with_metric("normal", 1.0),
                ],
            },
            false,
        );
        graph
    }

    fn visible(graph: &TrafficGraph, node: &str) -> bool {
        graph.node(node).is_some_and(|node| node.is_visible())
    }

    #[test]
    fn test_node_without_connections_is_hidden() {
        let graph = graph();
        assert!(!visible(&graph, "lonely"));
        assert!(visible(&graph, "a"));
        assert_eq!(graph.node_counts().visible, 4);
    }

    #[test]
    fn test_volume_filter_cascades_to_nodes() {
        let mut graph = graph();
        graph.set_filters(vec![Filter::min_connection_volume("rps", 0.0)]);
        assert!(visible(&graph, "d"));

        let flipped = graph.update_filter_value("rps", 5.0);
        assert!(flipped.is_some_and(|count| count > 0));
        assert!(visible(&graph, "b"));
        assert!(!visible(&graph, "c"));
        assert!(!visible(&graph, "d"));
        assert!(graph.connection("b--c").is_some_and(|c| !c.is_visible()));

        // Defaults still show everything.
        assert!(graph.node("d").is_some_and(|node| node.is_default_visible()));
        assert_eq!(graph.update_filter_value("missing", 1.0), None);
    }

    #[test]
    fn test_node_predicate_hides_node_and_stranded_connection() {
        let mut graph = graph();
        graph.set_filters(vec![Filter::new("no-d", FilterKind::Node, 0.0, |subject, _| {
            !matches!(subject, FilterSubject::Node { node, .. } if node.name() == "d")
        })]);

        assert!(!visible(&graph, "d"));
        // c still has b--c, and c--d keeps one visible endpoint.
        assert!(visible(&graph, "c"));
        assert!(graph.connection("c--d").is_some_and(|c| c.is_visible()));
    }

    #[test]
    fn test_reapplying_same_filters_flips_nothing() {
        let mut graph = graph();
        graph.set_filters(vec![Filter::min_connection_volume("rps", 5.0)]);
        assert_eq!(graph.apply_filters(), 0);
    }
}
