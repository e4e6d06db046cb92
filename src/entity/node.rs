use eframe::egui::{Vec2, vec2};
use serde_json::{Map, Value};

use super::volume::{VolumeCache, VolumeMap, VolumeTotals};
use super::{ConnectionMap, GraphObject, Notice, ObjectId, ObjectRef, class_or_default};
use crate::graph::dimming::DimState;
use crate::snapshot::SnapshotNode;
use crate::util::approx_eq;

#[derive(Debug)]
pub struct Node {
    id: ObjectId,
    name: String,
    class: String,
    metadata: Map<String, Value>,
    notices: Vec<Notice>,
    pub position: Vec2,
    size: f32,
    pub(crate) incoming: Vec<String>,
    pub(crate) outgoing: Vec<String>,
    incoming_volume: VolumeCache,
    outgoing_volume: VolumeCache,
    volume_percent: f64,
    class_percent: VolumeMap,
    pub(crate) filtered: bool,
    pub(crate) default_filtered: bool,
    pub(crate) rank: Option<usize>,
    pub(crate) depth: Option<usize>,
    pub(crate) dim: DimState,
}

impl Node {
    pub fn new(data: &SnapshotNode, default_size: f32) -> Self {
        let position = data
            .position
            .map(|position| vec2(position.x, position.y))
            .unwrap_or(Vec2::ZERO);

        let mut node = Self {
            id: ObjectId::next(),
            name: data.name.clone(),
            class: class_or_default(None),
            metadata: Map::new(),
            notices: Vec::new(),
            position,
            size: data.size.unwrap_or(default_size),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            incoming_volume: VolumeCache::default(),
            outgoing_volume: VolumeCache::default(),
            volume_percent: 0.0,
            class_percent: VolumeMap::new(),
            filtered: false,
            default_filtered: false,
            rank: None,
            depth: None,
            dim: DimState::default(),
        };
        node.update(data);
        node
    }

    /// Merges a snapshot fragment in place. Position is owned by the layout
    /// once the node exists, so it is only read at creation.
    pub fn update(&mut self, data: &SnapshotNode) -> bool {
        let class = class_or_default(data.class.as_deref());
        let metadata = data.metadata.clone().unwrap_or_default();
        let mut changed = false;

        if self.class != class {
            self.class = class;
            changed = true;
        }
        if self.metadata != metadata {
            self.metadata = metadata;
            changed = true;
        }
        if self.notices != data.notices {
            self.notices = data.notices.clone();
            changed = true;
        }
        if let Some(size) = data.size
            && self.size != size
        {
            self.size = size;
            changed = true;
        }
        changed
    }

    pub(crate) fn invalidate_incoming_volume(&self) {
        self.incoming_volume.invalidate();
    }

    pub(crate) fn invalidate_outgoing_volume(&self) {
        self.outgoing_volume.invalidate();
    }

    pub fn incoming_volume_cached(&self) -> bool {
        self.incoming_volume.is_valid()
    }

    pub fn incoming_volume(&self, connections: &ConnectionMap, key: Option<&str>) -> f64 {
        self.incoming_totals(connections).get(key)
    }

    pub fn outgoing_volume(&self, connections: &ConnectionMap, key: Option<&str>) -> f64 {
        self.outgoing_totals(connections).get(key)
    }

    pub fn incoming_totals(&self, connections: &ConnectionMap) -> VolumeTotals {
        self.incoming_volume
            .read(|| sum_volumes(&self.incoming, connections))
    }

    pub fn outgoing_totals(&self, connections: &ConnectionMap) -> VolumeTotals {
        self.outgoing_volume
            .read(|| sum_volumes(&self.outgoing, connections))
    }

    /// Recomputes this node's share of the graph's current volume and its
    /// per-class breakdown. Fields are only written when they move.
    pub fn update_volume(&mut self, current: f64, connections: &ConnectionMap) -> bool {
        let outgoing = self.outgoing_totals(connections);
        let volume_percent = if current > 0.0 {
            outgoing.total / current
        } else {
            0.0
        };

        let class_percent = outgoing
            .by_class
            .iter()
            .map(|(class, value)| {
                let share = if outgoing.total > 0.0 {
                    value / outgoing.total
                } else {
                    0.0
                };
                (class.clone(), share)
            })
            .collect::<VolumeMap>();

        let mut changed = false;
        if !approx_eq(self.volume_percent, volume_percent) {
            self.volume_percent = volume_percent;
            changed = true;
        }
        if self.class_percent != class_percent {
            self.class_percent = class_percent;
            changed = true;
        }
        changed
    }

    /// Entry-node test: an explicit entry name wins, otherwise a node with no
    /// incoming and at least one outgoing connection is an entry.
    pub fn is_entry_node(&self, explicit_entry: Option<&str>) -> bool {
        match explicit_entry {
            Some(entry) => entry == self.name,
            None => self.incoming.is_empty() && !self.outgoing.is_empty(),
        }
    }

    /// True for this node's own name or for the source of one of its
    /// incoming connections. Downstream targets do NOT count: highlight
    /// propagation relies on this upstream-only check, so it is deliberately
    /// not general adjacency.
    pub fn connected_to(&self, name: &str, connections: &ConnectionMap) -> bool {
        if self.name == name {
            return true;
        }

        self.incoming.iter().any(|connection_name| {
            connections
                .get(connection_name)
                .is_some_and(|connection| connection.source() == name)
        })
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn incoming_connections(&self) -> &[String] {
        &self.incoming
    }

    pub fn outgoing_connections(&self) -> &[String] {
        &self.outgoing
    }

    pub fn volume_percent(&self) -> f64 {
        self.volume_percent
    }

    pub fn class_percent(&self) -> &VolumeMap {
        &self.class_percent
    }

    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    pub fn is_default_visible(&self) -> bool {
        !self.default_filtered
    }

    pub(crate) fn attach_incoming(&mut self, connection: &str) {
        if !self.incoming.iter().any(|name| name == connection) {
            self.incoming.push(connection.to_owned());
        }
        self.incoming_volume.invalidate();
    }

    pub(crate) fn attach_outgoing(&mut self, connection: &str) {
        if !self.outgoing.iter().any(|name| name == connection) {
            self.outgoing.push(connection.to_owned());
        }
        self.outgoing_volume.invalidate();
    }

    pub(crate) fn detach(&mut self, connection: &str) {
        let before = self.incoming.len() + self.outgoing.len();
        self.incoming.retain(|name| name != connection);
        self.outgoing.retain(|name| name != connection);
        if self.incoming.len() + self.outgoing.len() != before {
            self.incoming_volume.invalidate();
            self.outgoing_volume.invalidate();
        }
    }
}

fn sum_volumes(names: &[String], connections: &ConnectionMap) -> VolumeTotals {
    let mut totals = VolumeTotals::default();
    for name in names {
        if let Some(connection) = connections.get(name) {
            totals.accumulate(connection.volume(), connection.volume_total());
        }
    }
    totals
}

impl GraphObject for Node {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn notices(&self) -> &[Notice] {
        &self.notices
    }

    fn is_visible(&self) -> bool {
        !self.filtered
    }

    fn object_ref(&self) -> ObjectRef {
        ObjectRef::Node(self.name.clone())
    }
}
