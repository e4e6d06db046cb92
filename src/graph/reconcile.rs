use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use super::{GraphEvent, TrafficGraph};
use crate::entity::{Connection, GraphObject, Node};
use crate::error::ReconcileError;
use crate::particles::ParticleEmitter;
use crate::snapshot::{Snapshot, focused_snapshot};
use crate::util::{approx_eq, connection_name};

/// What one `set_state` call did. Every set lists object names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateChange {
    /// The graph was in the background; the snapshot was cached for later.
    pub deferred: bool,
    pub nodes_added: BTreeSet<String>,
    pub nodes_updated: BTreeSet<String>,
    pub nodes_removed: BTreeSet<String>,
    pub connections_added: BTreeSet<String>,
    pub connections_updated: BTreeSet<String>,
    pub connections_removed: BTreeSet<String>,
    /// Nodes whose volume share or class breakdown moved.
    pub volumes_updated: BTreeSet<String>,
    /// Connections whose greatest-volume normalisation moved.
    pub greatest_updated: BTreeSet<String>,
    pub max_volume_changed: bool,
    pub current_volume_changed: bool,
    pub visibility_changed: usize,
    pub layout_invalidated: bool,
    pub errors: Vec<ReconcileError>,
}

impl StateChange {
    fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    /// True when nothing observable moved. Errors do not count.
    pub fn is_noop(&self) -> bool {
        self.nodes_added.is_empty()
            && self.nodes_updated.is_empty()
            && self.nodes_removed.is_empty()
            && self.connections_added.is_empty()
            && self.connections_updated.is_empty()
            && self.connections_removed.is_empty()
            && self.volumes_updated.is_empty()
            && self.greatest_updated.is_empty()
            && !self.max_volume_changed
            && !self.current_volume_changed
            && self.visibility_changed == 0
            && !self.layout_invalidated
    }
}

impl TrafficGraph {
    /// Merges `snapshot` into the live graph, preserving the identity of
    /// every node and connection that survives.
    ///
    /// A background graph only caches the snapshot (last write wins) unless
    /// `force` is set; the cache is replayed by [`Self::validate_state`].
    pub fn set_state(&mut self, snapshot: Snapshot, force: bool) -> StateChange {
        if !self.current && !force {
            if self.cached_snapshot.is_some() {
                log::debug!("{}: replacing cached background snapshot", self.name);
            }
            self.cached_snapshot = Some(snapshot);
            return StateChange::deferred();
        }

        self.cached_snapshot = None;
        let mut change = StateChange::default();
        let layout_was_valid = self.layout_valid;

        let incoming_names = snapshot
            .nodes
            .iter()
            .map(|node| node.name.as_str())
            .collect::<HashSet<_>>();

        // Nodes that left the snapshot go first, taking their connections.
        let stale_nodes = self
            .nodes
            .keys()
            .filter(|name| !incoming_names.contains(name.as_str()) && !self.held.contains(*name))
            .cloned()
            .collect::<Vec<_>>();
        for name in stale_nodes {
            change.connections_removed.extend(self.remove_node(&name));
            change.nodes_removed.insert(name);
        }

        let default_size = self.config.layout.default_node_size;
        let mut seen_nodes = HashSet::new();
        for data in &snapshot.nodes {
            if !seen_nodes.insert(data.name.as_str()) {
                change
                    .errors
                    .push(ReconcileError::DuplicateNode(data.name.clone()));
                continue;
            }

            match self.nodes.get_mut(&data.name) {
                Some(node) => {
                    if node.update(data) {
                        change.nodes_updated.insert(data.name.clone());
                    }
                }
                None => {
                    let node = Node::new(data, default_size);
                    self.nodes.insert(data.name.clone(), node);
                    change.nodes_added.insert(data.name.clone());
                    self.layout_valid = false;
                }
            }
        }

        for connection in self.connections.values_mut() {
            connection.valid = false;
        }

        for data in &snapshot.connections {
            let name = connection_name(&data.source, &data.target);
            let missing = [&data.source, &data.target]
                .into_iter()
                .find(|endpoint| !self.nodes.contains_key(endpoint.as_str()));
            if let Some(missing) = missing {
                change.errors.push(ReconcileError::DanglingConnection {
                    connection: name,
                    missing: missing.clone(),
                });
                continue;
            }

            match self.connections.get_mut(&name) {
                Some(connection) if connection.valid => {
                    log::debug!("{}: ignoring repeated connection {name}", self.name);
                }
                Some(connection) => {
                    connection.valid = true;
                    if connection.update(data) {
                        change.connections_updated.insert(name.clone());
                        if let Some(source) = self.nodes.get(&data.source) {
                            source.invalidate_outgoing_volume();
                        }
                        if let Some(target) = self.nodes.get(&data.target) {
                            target.invalidate_incoming_volume();
                        }
                    }
                }
                None => {
                    let mut connection = Connection::new(data);
                    connection.valid = true;
                    if let Some(source) = self.nodes.get_mut(&data.source) {
                        source.attach_outgoing(&name);
                    }
                    if let Some(target) = self.nodes.get_mut(&data.target) {
                        target.attach_incoming(&name);
                    }
                    self.connections.insert(name.clone(), connection);
                    change.connections_added.insert(name);
                    self.layout_valid = false;
                }
            }
        }

        match snapshot.max_volume {
            Some(max) if max.is_finite() && max >= 0.0 => {
                if !approx_eq(self.volume.max, max) {
                    self.volume.max = max;
                    change.max_volume_changed = true;
                }
            }
            Some(max) => change.errors.push(ReconcileError::InvalidMaxVolume(max)),
            None => change.errors.push(ReconcileError::MissingMaxVolume {
                graph: self.name.clone(),
            }),
        }

        // Drop connections the snapshot no longer mentions before summing
        // volume so their traffic is not counted.
        let stale_connections = self
            .connections
            .iter()
            .filter(|(_, connection)| !connection.valid)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        for name in stale_connections {
            if self.remove_connection(&name) {
                change.connections_removed.insert(name);
            }
        }

        let entry_moved = self.entry_node != snapshot.entry_node;
        if entry_moved {
            log::debug!(
                "{}: entry node {:?} -> {:?}",
                self.name,
                self.entry_node,
                snapshot.entry_node
            );
            self.entry_node = snapshot.entry_node.clone();
            self.layout_valid = false;
        }
        let current = self
            .nodes
            .values()
            .filter(|node| node.is_entry_node(self.entry_node.as_deref()))
            .map(|node| node.outgoing_volume(&self.connections, None))
            .sum::<f64>();
        if !approx_eq(self.volume.current, current) {
            self.volume.current = current;
            change.current_volume_changed = true;
        }

        let max = self.volume.max;
        let pool_size = self.config.particles.pool_size;
        for (name, connection) in &mut self.connections {
            let greatest_moved = connection.update_greatest_volume(max);
            if greatest_moved {
                change.greatest_updated.insert(name.clone());
            }
            if greatest_moved || change.connections_updated.contains(name) || !self.emitters.contains_key(name) {
                self.emitters
                    .entry(name.clone())
                    .or_insert_with(|| ParticleEmitter::new(pool_size))
                    .update_levels(connection, &self.config.particles, &mut self.rng);
            }
        }

        // Second pass: anything still absent from the snapshot and not held.
        let orphans = self
            .nodes
            .keys()
            .filter(|name| !incoming_names.contains(name.as_str()) && !self.held.contains(*name))
            .cloned()
            .collect::<Vec<_>>();
        for name in orphans {
            change.connections_removed.extend(self.remove_node(&name));
            change.nodes_removed.insert(name);
        }

        for (name, node) in &mut self.nodes {
            if node.update_volume(current, &self.connections) {
                change.volumes_updated.insert(name.clone());
            }
        }

        for error in &change.errors {
            log::warn!("{}: {error}", self.name);
        }

        self.populated = true;
        self.node_counts.total = self.nodes.len();
        change.visibility_changed = self.apply_filters();
        change.layout_invalidated = (layout_was_valid && !self.layout_valid)
            || entry_moved
            || !change.nodes_added.is_empty()
            || !change.nodes_removed.is_empty()
            || !change.connections_added.is_empty()
            || !change.connections_removed.is_empty();

        if self.current {
            self.notify_updates(&change);
        }
        if !change.is_noop() {
            self.refresh_overlay(Instant::now());
            self.events.push(GraphEvent::ViewUpdated {
                graph: self.name.clone(),
            });
        }

        log::debug!(
            "{}: applied snapshot ({} nodes, {} connections, {} errors)",
            self.name,
            self.nodes.len(),
            self.connections.len(),
            change.errors.len()
        );
        self.last_snapshot = Some(snapshot);

        if !self.layout_valid && self.current {
            self.relayout();
        }
        change
    }

    /// Builds this graph's drill-down snapshot out of its parent's and
    /// applies it. Returns `None` when the parent does not know this node.
    pub fn set_state_from_parent(&mut self, parent: &Snapshot, force: bool) -> Option<StateChange> {
        let Some(snapshot) = focused_snapshot(parent, &self.name) else {
            log::warn!("{}: parent snapshot {} has no such node", self.name, parent.name);
            return None;
        };
        Some(self.set_state(snapshot, force))
    }

    /// Replays the snapshot cached while this graph was in the background.
    pub fn validate_state(&mut self) -> Option<StateChange> {
        if !self.current {
            return None;
        }
        let snapshot = self.cached_snapshot.take()?;
        log::debug!("{}: replaying cached snapshot", self.name);
        Some(self.set_state(snapshot, false))
    }

    fn notify_updates(&mut self, change: &StateChange) {
        let updated_nodes = change
            .nodes_updated
            .iter()
            .chain(&change.volumes_updated)
            .collect::<BTreeSet<_>>();
        for name in updated_nodes {
            if let Some(node) = self.nodes.get(name) {
                self.view.object_updated(&node.object_ref());
            }
        }

        let updated_connections = change
            .connections_updated
            .iter()
            .chain(&change.greatest_updated)
            .collect::<BTreeSet<_>>();
        for name in updated_connections {
            if let Some(connection) = self.connections.get(name) {
                self.view.object_updated(&connection.object_ref());
            }
        }

        if !change.nodes_added.is_empty() || !change.connections_added.is_empty() {
            self.view.invalidate_interactive_children();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::entity::NO_METRICS_NOTICE;
    use crate::graph::{GraphContext, GraphKind, GraphPhase};
    use crate::layout::{DispatchMode, Dimensions, LayoutCache, LayoutDispatcher};
    use crate::snapshot::{SnapshotConnection, SnapshotNode};

    fn context() -> GraphContext {
        GraphContext {
            config: Arc::new(EngineConfig::default()),
            dispatcher: Arc::new(LayoutDispatcher::new(DispatchMode::Inline)),
            layout_cache: Arc::new(LayoutCache::default()),
            dimensions: Dimensions::default(),
        }
    }

    fn snapshot(nodes: &[&str], edges: &[(&str, &str, f64)]) -> Snapshot {
        Snapshot {
            renderer: Some("region".to_owned()),
            name: "us-east".to_owned(),
            entry_node: None,
            max_volume: Some(100.0),
            nodes: nodes.iter().map(|name| SnapshotNode::named(*name)).collect(),
            connections: edges
                .iter()
                .map(|(source, target, value)| {
                    SnapshotConnection::new(*source, *target).with_metric("normal", *value)
                })
                .collect(),
        }
    }

    fn current_graph() -> TrafficGraph {
        let mut graph = TrafficGraph::new(GraphKind::Region, vec!["us-east".to_owned()], &context());
        graph.set_current(true);
        graph
    }

    #[test]
    fn test_second_identical_snapshot_is_a_noop() {
        let mut graph = current_graph();
        let state = snapshot(&["a", "b", "c"], &[("a", "b", 10.0), ("b", "c", 4.0)]);

        let first = graph.set_state(state.clone(), false);
        assert!(!first.is_noop());
        let a_id = graph.node("a").map(|node| node.object_id());
        let ab_id = graph.connection("a--b").map(|c| c.object_id());

        let second = graph.set_state(state, false);
        assert!(second.is_noop(), "{second:?}");
        assert_eq!(graph.node("a").map(|node| node.object_id()), a_id);
        assert_eq!(graph.connection("a--b").map(|c| c.object_id()), ab_id);
    }

    #[test]
    fn test_background_keeps_only_last_snapshot() {
        let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context());
        assert!(graph.set_state(snapshot(&["a", "b"], &[("a", "b", 1.0)]), false).deferred);
        assert!(graph.set_state(snapshot(&["x", "y"], &[("x", "y", 2.0)]), false).deferred);
        assert!(graph.node("a").is_none());
        assert_eq!(graph.phase(), GraphPhase::Background);

        graph.set_current(true);
        assert!(graph.node("a").is_none());
        assert!(graph.node("x").is_some());
        assert_eq!(graph.outgoing_volume("x", None), Some(2.0));
        assert!(!graph.has_cached_snapshot());
    }

    #[test]
    fn test_force_applies_in_background() {
        let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context());
        let change = graph.set_state(snapshot(&["a", "b"], &[("a", "b", 1.0)]), true);
        assert!(!change.deferred);
        assert!(graph.node("a").is_some());
        assert!(!graph.layout_valid());
    }

    #[test]
    fn test_dangling_connection_is_dropped() {
        let mut graph = current_graph();
        let change = graph.set_state(snapshot(&["a"], &[("a", "ghost", 1.0)]), false);
        assert!(graph.connection("a--ghost").is_none());
        assert_eq!(
            change.errors,
            vec![ReconcileError::DanglingConnection {
                connection: "a--ghost".to_owned(),
                missing: "ghost".to_owned(),
            }]
        );
    }

    #[test]
    fn test_invalid_max_volume_keeps_previous() {
        let mut graph = current_graph();
        graph.set_state(snapshot(&["a", "b"], &[("a", "b", 1.0)]), false);

        let mut bad = snapshot(&["a", "b"], &[("a", "b", 1.0)]);
        bad.max_volume = Some(f64::INFINITY);
        let change = graph.set_state(bad, false);
        assert_eq!(graph.volume().max, 100.0);
        assert_eq!(change.errors, vec![ReconcileError::InvalidMaxVolume(f64::INFINITY)]);

        let mut negative = snapshot(&["a", "b"], &[("a", "b", 1.0)]);
        negative.max_volume = Some(-1.0);
        graph.set_state(negative, false);
        assert_eq!(graph.volume().max, 100.0);
    }

    #[test]
    fn test_removed_node_takes_its_connections() {
        let mut graph = current_graph();
        graph.set_state(
            snapshot(&["a", "b", "c"], &[("a", "b", 1.0), ("b", "c", 1.0)]),
            false,
        );

        let mut next = snapshot(&["a", "b"], &[("a", "b", 1.0)]);
        next.connections.push(SnapshotConnection::new("b", "c").with_metric("normal", 1.0));
        let change = graph.set_state(next, false);

        assert!(change.nodes_removed.contains("c"));
        assert!(change.connections_removed.contains("b--c"));
        assert!(graph.connection("b--c").is_none());
        let b = graph.node("b").map(|node| node.outgoing_connections().to_vec());
        assert_eq!(b, Some(Vec::new()));
    }

    #[test]
    fn test_held_node_survives_absence() {
        let mut graph = current_graph();
        graph.set_state(snapshot(&["a", "b"], &[("a", "b", 1.0)]), false);
        graph.hold_node("b");
        graph.set_state(snapshot(&["a"], &[]), false);
        assert!(graph.node("b").is_some());

        graph.release_node("b");
        graph.set_state(snapshot(&["a"], &[]), false);
        assert!(graph.node("b").is_none());
    }

    #[test]
    fn test_stale_connection_volume_not_counted() {
        let mut graph = current_graph();
        graph.set_state(
            snapshot(&["a", "b", "c"], &[("a", "b", 6.0), ("a", "c", 4.0)]),
            false,
        );
        assert_eq!(graph.volume().current, 10.0);

        graph.set_state(snapshot(&["a", "b", "c"], &[("a", "b", 6.0)]), false);
        assert_eq!(graph.volume().current, 6.0);
        assert_eq!(graph.outgoing_volume("a", None), Some(6.0));
    }

    #[test]
    fn test_entry_node_change_invalidates_layout() {
        let mut graph = current_graph();
        graph.set_state(snapshot(&["a", "b", "c"], &[("a", "b", 1.0), ("b", "c", 1.0)]), false);
        assert_eq!(graph.node("a").and_then(|node| node.rank()), Some(0));
        assert_eq!(graph.layout_tracker().generation(), 1);

        let mut moved = snapshot(&["a", "b", "c"], &[("a", "b", 1.0), ("b", "c", 1.0)]);
        moved.entry_node = Some("b".to_owned());
        let change = graph.set_state(moved.clone(), false);

        assert!(change.layout_invalidated);
        assert!(!change.is_noop());
        assert_eq!(graph.layout_tracker().generation(), 2);
        assert_eq!(graph.node("b").and_then(|node| node.rank()), Some(0));
        assert!(graph.set_state(moved, false).is_noop());
    }

    #[test]
    fn test_snapshot_positions_are_not_layout_data() {
        let mut graph = TrafficGraph::new(GraphKind::Region, vec!["r".to_owned()], &context());
        let mut state = snapshot(&["a", "b"], &[("a", "b", 1.0)]);
        state.nodes[0].position = Some(crate::snapshot::SnapshotPosition { x: 4.0, y: 2.0 });
        graph.set_state(state, true);

        assert_eq!(graph.node("a").map(|node| node.position.x), Some(4.0));
        assert!(!graph.has_position_data());
    }

    #[test]
    fn test_empty_metrics_notice() {
        let mut graph = current_graph();
        let mut state = snapshot(&["a", "b"], &[]);
        state.connections.push(SnapshotConnection {
            metrics: Some(Default::default()),
            ..SnapshotConnection::new("a", "b")
        });
        graph.set_state(state, false);

        let connection = graph.connection("a--b");
        assert_eq!(connection.map(|c| c.volume_total()), Some(0.0));
        let notice = connection.and_then(|c| c.notices().first());
        assert_eq!(notice.map(|n| n.title.as_str()), Some(NO_METRICS_NOTICE));
        assert_eq!(notice.map(|n| n.severity), Some(0));
    }

    #[test]
    fn test_focused_graph_from_parent() {
        let mut graph = TrafficGraph::new(
            GraphKind::Focused,
            vec!["us-east".to_owned(), "b".to_owned()],
            &context(),
        );
        graph.set_current(true);
        let parent = snapshot(&["a", "b", "c", "d"], &[("a", "b", 1.0), ("b", "c", 1.0), ("c", "d", 1.0)]);

        let change = graph.set_state_from_parent(&parent, false);
        assert!(change.is_some());
        assert!(graph.node("a").is_some());
        assert!(graph.node("c").is_some());
        assert!(graph.node("d").is_none());
        assert!(graph.set_state_from_parent(&snapshot(&["z"], &[]), false).is_none());
    }
}
