use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

use eframe::egui::Vec2;
use serde_json::Value;

use super::{GraphEvent, GraphKind, TrafficGraph};
use crate::entity::{GraphObject, Node};
use crate::layout::{
    Dimensions, LayoutEdge, LayoutInput, LayoutJob, LayoutNode, LayoutResponse, TopologyKey,
};

/// Bookkeeping for discrete layout requests in flight.
pub struct LayoutTracker {
    /// Generations dispatched and not yet answered. A watchdog reset empties
    /// it, so answers from before the reset never count against newer
    /// requests.
    in_flight: BTreeSet<u64>,
    requested_at: Option<Instant>,
    pending: Option<(TopologyKey, Dimensions)>,
    generation: u64,
    applied: u64,
    reply: Sender<LayoutResponse>,
    results: Receiver<LayoutResponse>,
}

impl Default for LayoutTracker {
    fn default() -> Self {
        let (reply, results) = mpsc::channel();
        Self {
            in_flight: BTreeSet::new(),
            requested_at: None,
            pending: None,
            generation: 0,
            applied: 0,
            reply,
            results,
        }
    }
}

impl LayoutTracker {
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn applied_generation(&self) -> u64 {
        self.applied
    }
}

fn position_hint(node: &Node) -> Option<Vec2> {
    let position = node.metadata().get("position")?;
    let x = position.get("x").and_then(Value::as_f64)?;
    let y = position.get("y").and_then(Value::as_f64)?;
    Some(Vec2::new(x as f32, y as f32))
}

fn rank_hint(node: &Node) -> Option<usize> {
    node.metadata()
        .get("rank")
        .and_then(Value::as_u64)
        .and_then(|rank| usize::try_from(rank).ok())
}

impl TrafficGraph {
    pub fn layout_tracker(&self) -> &LayoutTracker {
        &self.layout
    }

    /// The visible topology handed to the layout strategy.
    pub fn layout_input(&self) -> LayoutInput {
        let mut nodes = self
            .nodes
            .values()
            .filter(|node| node.is_visible())
            .map(|node| LayoutNode {
                name: node.name().to_owned(),
                size: node.size(),
                weight: node
                    .incoming_volume(&self.connections, None)
                    .max(node.outgoing_volume(&self.connections, None)),
                position_hint: position_hint(node),
                rank_hint: rank_hint(node),
            })
            .collect::<Vec<_>>();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut edges = self
            .connections
            .values()
            .filter(|connection| {
                connection.is_visible()
                    && [connection.source(), connection.target()]
                        .iter()
                        .all(|end| self.nodes.get(*end).is_some_and(|node| node.is_visible()))
            })
            .map(|connection| LayoutEdge {
                name: connection.name().to_owned(),
                source: connection.source().to_owned(),
                target: connection.target().to_owned(),
            })
            .collect::<Vec<_>>();
        edges.sort_by(|a, b| a.name.cmp(&b.name));

        let entry_nodes = self
            .entry_nodes()
            .into_iter()
            .filter(|name| self.nodes.get(name).is_some_and(|node| node.is_visible()))
            .collect();

        let mut options = self.config.layout.clone();
        if self.kind == GraphKind::Focused {
            options.entry_adjacent_ranking = true;
        }

        LayoutInput {
            nodes,
            edges,
            entry_nodes,
            options,
        }
    }

    /// Sends the visible topology to the layout strategy. Marks the layout
    /// valid right away; positions land later through [`Self::poll_layout`].
    /// Returns false when nothing was dispatched.
    pub fn relayout(&mut self) -> bool {
        if !self.current || !self.populated {
            return false;
        }

        let input = self.layout_input();
        let request = (TopologyKey::from_input(&input), self.dimensions);
        if !self.layout.in_flight.is_empty() && self.layout.pending.as_ref() == Some(&request) {
            log::debug!("{}: equivalent layout already outstanding", self.name);
            self.layout_valid = true;
            return false;
        }

        self.layout.generation += 1;
        self.layout.in_flight.insert(self.layout.generation);
        self.layout.requested_at = Some(Instant::now());
        self.layout.pending = Some(request);
        self.layout_valid = true;

        log::debug!(
            "{}: requesting {} layout generation {} for {} nodes",
            self.name,
            self.strategy.name(),
            self.layout.generation,
            input.nodes.len()
        );
        self.dispatcher.submit(LayoutJob {
            graph: self.name.clone(),
            generation: self.layout.generation,
            input,
            dimensions: self.dimensions,
            strategy: self.strategy.clone(),
            reply: self.layout.reply.clone(),
        });

        // Inline dispatch has already answered.
        self.poll_layout();
        true
    }

    /// Applies every layout result that has arrived. Returns how many were
    /// applied.
    pub fn poll_layout(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(response) = self.layout.results.try_recv() {
            self.layout.in_flight.remove(&response.generation);
            if self.apply_layout(response) {
                applied += 1;
            }
        }

        if self.layout.in_flight.is_empty() {
            self.layout.requested_at = None;
            self.layout.pending = None;
        }
        applied
    }

    fn apply_layout(&mut self, response: LayoutResponse) -> bool {
        if response.generation < self.layout.applied {
            log::debug!(
                "{}: dropping layout generation {} older than applied {}",
                self.name,
                response.generation,
                self.layout.applied
            );
            return false;
        }

        self.layout.applied = response.generation;
        let output = response.output;
        for (name, node) in &mut self.nodes {
            if let Some(position) = output.positions.get(name) {
                node.position = *position;
                self.view.position_changed(name, *position);
            }
            node.rank = output.ranks.get(name).copied();
            node.depth = output.columns.get(name).copied();
        }

        self.has_position_data = true;
        self.events.push(GraphEvent::LayoutApplied {
            graph: self.name.clone(),
            generation: response.generation,
        });
        true
    }

    /// Unblocks the force simulation when a layout never answered. A late
    /// answer is still applied.
    pub(crate) fn check_layout_watchdog(&mut self, now: Instant) -> bool {
        let Some(requested_at) = self.layout.requested_at else {
            return false;
        };
        if self.layout.in_flight.is_empty()
            || now.saturating_duration_since(requested_at) < self.config.layout_watchdog()
        {
            return false;
        }

        log::warn!(
            "{}: {} layout request(s) unanswered after {:?}; resetting",
            self.name,
            self.layout.in_flight.len(),
            self.config.layout_watchdog()
        );
        self.layout.in_flight.clear();
        self.layout.requested_at = None;
        self.layout.pending = None;
        true
    }

    pub fn simulation_active(&self) -> bool {
        self.simulation.is_some() && self.layout.in_flight.is_empty() && self.current
    }

    pub(crate) fn step_simulation(&mut self, delta_seconds: f32) -> bool {
        if !self.simulation_active() {
            return false;
        }
        let Some(simulation) = self.simulation.as_mut() else {
            return false;
        };

        let anchor = self
            .nodes
            .values()
            .find(|node| node.is_visible() && node.is_entry_node(self.entry_node.as_deref()))
            .map(|node| node.name());
        simulation.sync(
            self.nodes
                .values()
                .filter(|node| node.is_visible())
                .map(|node| (node.name(), node.position)),
            self.connections
                .values()
                .filter(|connection| connection.is_visible())
                .map(|connection| (connection.source(), connection.target())),
            anchor,
        );

        let moving = simulation.step(delta_seconds);
        for (name, position) in simulation.positions() {
            if let Some(node) = self.nodes.get_mut(name) {
                node.position = position;
                self.view.position_changed(name, position);
            }
        }
        moving
    }
}
