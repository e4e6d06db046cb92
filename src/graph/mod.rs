//! The reconciliation engine: one live object graph per view.

pub mod dimming;
mod events;
mod filter;
mod highlight;
mod kind;
mod reconcile;
mod relayout;
mod search;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::EngineConfig;
use crate::entity::{
    Connection, ConnectionMap, GraphObject, Node, NodeMap, ObjectRef,
};
use crate::layout::physics::ForceSimulation;
use crate::layout::{Dimensions, LayoutCache, LayoutDispatcher, LayoutStrategy};
use crate::particles::ParticleEmitter;
use crate::snapshot::Snapshot;
use crate::view::{ConnectionPath, DetachedView, ViewBridge, connection_path};

pub use dimming::{DimState, DimTargets};
pub use events::GraphEvent;
pub use filter::{Filter, FilterKind, FilterSubject};
pub use kind::GraphKind;
pub use reconcile::StateChange;
pub use relayout::LayoutTracker;

/// Shared, process-wide collaborators handed to every graph explicitly.
#[derive(Clone)]
pub struct GraphContext {
    pub config: Arc<EngineConfig>,
    pub dispatcher: Arc<LayoutDispatcher>,
    pub layout_cache: Arc<LayoutCache>,
    pub dimensions: Dimensions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GraphVolume {
    pub max: f64,
    pub current: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeCounts {
    pub total: usize,
    pub visible: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphPhase {
    Uninitialized,
    Current,
    Background,
}

pub struct TrafficGraph {
    pub(crate) name: String,
    path: Vec<String>,
    kind: GraphKind,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) nodes: NodeMap,
    pub(crate) connections: ConnectionMap,
    filters: Vec<Filter>,
    volume: GraphVolume,
    entry_node: Option<String>,
    layout_valid: bool,
    has_position_data: bool,
    node_counts: NodeCounts,
    current: bool,
    populated: bool,
    cached_snapshot: Option<Snapshot>,
    last_snapshot: Option<Snapshot>,
    held: HashSet<String>,
    highlighted: Option<ObjectRef>,
    search: Option<String>,
    search_matches: HashSet<String>,
    events: Vec<GraphEvent>,
    view: Box<dyn ViewBridge>,
    dispatcher: Arc<LayoutDispatcher>,
    strategy: Arc<dyn LayoutStrategy>,
    layout_cache: Arc<LayoutCache>,
    dimensions: Dimensions,
    layout: LayoutTracker,
    simulation: Option<ForceSimulation>,
    emitters: HashMap<String, ParticleEmitter>,
    rng: StdRng,
}

impl TrafficGraph {
    /// `path` is the view path of this graph: empty for the global graph,
    /// `[region]` for a region, `[region, service]` for a drill-down.
    pub fn new(kind: GraphKind, path: Vec<String>, context: &GraphContext) -> Self {
        let name = path.last().cloned().unwrap_or_else(|| "global".to_owned());
        let strategy = kind.default_layout().strategy(&context.layout_cache);
        let simulation = (kind.supports_physics() && context.config.physics.enabled)
            .then(|| ForceSimulation::new(context.config.physics));

        Self {
            name,
            path,
            kind,
            config: Arc::clone(&context.config),
            nodes: NodeMap::new(),
            connections: ConnectionMap::new(),
            filters: Vec::new(),
            volume: GraphVolume::default(),
            entry_node: None,
            layout_valid: false,
            has_position_data: false,
            node_counts: NodeCounts::default(),
            current: false,
            populated: false,
            cached_snapshot: None,
            last_snapshot: None,
            held: HashSet::new(),
            highlighted: None,
            search: None,
            search_matches: HashSet::new(),
            events: Vec::new(),
            view: Box::new(DetachedView),
            dispatcher: Arc::clone(&context.dispatcher),
            strategy,
            layout_cache: Arc::clone(&context.layout_cache),
            dimensions: context.dimensions,
            layout: LayoutTracker::default(),
            simulation,
            emitters: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    pub fn phase(&self) -> GraphPhase {
        if !self.populated && self.cached_snapshot.is_none() {
            GraphPhase::Uninitialized
        } else if self.current {
            GraphPhase::Current
        } else {
            GraphPhase::Background
        }
    }

    pub fn is_current(&self) -> bool {
        self.current
    }

    pub fn set_view_bridge(&mut self, view: Box<dyn ViewBridge>) {
        self.view = view;
    }

    pub fn set_layout_strategy(&mut self, strategy: Arc<dyn LayoutStrategy>) {
        self.strategy = strategy;
        self.invalidate_layout();
    }

    pub fn layout_cache(&self) -> &Arc<LayoutCache> {
        &self.layout_cache
    }

    /// Switches between displayed and background. Becoming current replays
    /// any snapshot cached while in the background and lays out if needed.
    pub fn set_current(&mut self, current: bool) {
        if self.current == current {
            return;
        }

        self.current = current;
        if current {
            log::info!("{} is now the current graph", self.name);
            self.validate_state();
            if !self.layout_valid && self.populated {
                self.relayout();
            }
        } else {
            log::debug!("{} moved to the background", self.name);
        }
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn connections(&self) -> &ConnectionMap {
        &self.connections
    }

    pub fn incoming_volume(&self, node: &str, key: Option<&str>) -> Option<f64> {
        self.nodes
            .get(node)
            .map(|node| node.incoming_volume(&self.connections, key))
    }

    pub fn outgoing_volume(&self, node: &str, key: Option<&str>) -> Option<f64> {
        self.nodes
            .get(node)
            .map(|node| node.outgoing_volume(&self.connections, key))
    }

    pub fn entry_node(&self) -> Option<&str> {
        self.entry_node.as_deref()
    }

    pub fn is_entry_node(&self, name: &str) -> bool {
        self.nodes
            .get(name)
            .is_some_and(|node| node.is_entry_node(self.entry_node.as_deref()))
    }

    pub fn entry_nodes(&self) -> Vec<String> {
        let mut entries = self
            .nodes
            .values()
            .filter(|node| node.is_entry_node(self.entry_node.as_deref()))
            .map(|node| node.name().to_owned())
            .collect::<Vec<_>>();
        entries.sort();
        entries
    }

    /// Whether `node` counts `other` as connected. Upstream-only; see
    /// [`Node::connected_to`].
    pub fn connected_to(&self, node: &str, other: &str) -> bool {
        self.nodes
            .get(node)
            .is_some_and(|node| node.connected_to(other, &self.connections))
    }

    pub fn has_notices(&self, object: &ObjectRef) -> bool {
        let threshold = self.config.notice_severity_threshold;
        match object {
            ObjectRef::Node(name) => self
                .nodes
                .get(name)
                .is_some_and(|node| node.has_notices(threshold)),
            ObjectRef::Connection(name) => self
                .connections
                .get(name)
                .is_some_and(|connection| connection.has_notices(threshold)),
        }
    }

    pub fn volume(&self) -> GraphVolume {
        self.volume
    }

    pub fn node_counts(&self) -> NodeCounts {
        self.node_counts
    }

    pub fn layout_valid(&self) -> bool {
        self.layout_valid
    }

    pub fn has_position_data(&self) -> bool {
        self.has_position_data
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// The newest snapshot this graph has seen, applied or not.
    pub fn latest_snapshot(&self) -> Option<&Snapshot> {
        self.cached_snapshot.as_ref().or(self.last_snapshot.as_ref())
    }

    pub fn has_cached_snapshot(&self) -> bool {
        self.cached_snapshot.is_some()
    }

    /// Keeps a node alive even when snapshots stop mentioning it.
    pub fn hold_node(&mut self, name: &str) {
        self.held.insert(name.to_owned());
    }

    pub fn release_node(&mut self, name: &str) {
        self.held.remove(name);
    }

    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// Asks the scene to drill into `object`: a region from the global
    /// graph, a service from a region.
    pub fn request_view(&mut self, object: &str) -> bool {
        if !self.nodes.contains_key(object) || self.kind == GraphKind::Focused {
            return false;
        }

        let mut path = self.path.clone();
        path.push(object.to_owned());
        self.events.push(GraphEvent::SetView { path });
        true
    }

    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        if self.dimensions == dimensions {
            return;
        }

        self.dimensions = dimensions;
        self.invalidate_layout();
    }

    pub(crate) fn invalidate_layout(&mut self) {
        self.layout_valid = false;
        if self.current {
            self.relayout();
        }
    }

    fn remove_connection(&mut self, name: &str) -> bool {
        let Some(connection) = self.connections.remove(name) else {
            return false;
        };

        for endpoint in [connection.source(), connection.target()] {
            if let Some(node) = self.nodes.get_mut(endpoint) {
                node.detach(name);
            }
        }

        self.emitters.remove(name);
        if self.highlighted.as_ref() == Some(&connection.object_ref()) {
            self.highlighted = None;
        }
        self.view.object_removed(&connection.object_ref());
        self.layout_valid = false;
        true
    }

    /// Removes a node and every connection touching it. Returns the removed
    /// connection names.
    fn remove_node(&mut self, name: &str) -> Vec<String> {
        let Some(node) = self.nodes.get(name) else {
            return Vec::new();
        };

        let attached = node
            .incoming
            .iter()
            .chain(node.outgoing.iter())
            .cloned()
            .collect::<Vec<_>>();
        let mut removed = Vec::new();
        for connection in attached {
            if self.remove_connection(&connection) {
                removed.push(connection);
            }
        }

        if let Some(node) = self.nodes.remove(name) {
            if self.highlighted.as_ref() == Some(&node.object_ref()) {
                self.highlighted = None;
            }
            self.search_matches.remove(name);
            self.view.object_removed(&node.object_ref());
        }
        self.layout_valid = false;
        removed
    }

    /// Per-tick housekeeping: watchdog, layout results, force simulation.
    pub fn tick(&mut self, now: Instant, delta_seconds: f32) {
        self.check_layout_watchdog(now);
        self.poll_layout();
        self.step_simulation(delta_seconds);
    }

    /// Advances every visible connection's particles; returns how many were
    /// launched.
    pub fn advance_particles(&mut self, elapsed_ms: f64) -> usize {
        let mut launched = 0;
        for (name, emitter) in &mut self.emitters {
            if self.connections.get(name).is_some_and(|c| c.is_visible()) {
                launched += emitter.advance(elapsed_ms, &mut self.rng);
            }
        }
        launched
    }

    pub fn particle_emitter(&self, connection: &str) -> Option<&ParticleEmitter> {
        self.emitters.get(connection)
    }

    /// Geometry the renderer draws a connection along, from the current
    /// endpoint positions.
    pub fn connection_path(&self, name: &str) -> Option<ConnectionPath> {
        let connection = self.connections.get(name)?;
        let source = self.nodes.get(connection.source())?.position;
        let target = self.nodes.get(connection.target())?.position;
        Some(connection_path(source, target, self.kind.connection_bulge()))
    }
}
