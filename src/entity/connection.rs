use serde_json::Value;

use super::volume::VolumeMap;
use super::{GraphObject, NO_METRICS_NOTICE, Notice, ObjectId, ObjectRef, class_or_default};
use crate::graph::dimming::DimState;
use crate::snapshot::SnapshotConnection;
use crate::util::{approx_eq, connection_name};

#[derive(Debug)]
pub struct Connection {
    id: ObjectId,
    name: String,
    source: String,
    target: String,
    class: String,
    volume: VolumeMap,
    volume_total: f64,
    volume_percent: VolumeMap,
    volume_percent_keys_sorted: Vec<String>,
    volume_greatest: f64,
    notices: Vec<Notice>,
    annotations: Vec<Value>,
    pub(crate) filtered: bool,
    pub(crate) default_filtered: bool,
    pub(crate) valid: bool,
    pub(crate) dim: DimState,
}

impl Connection {
    pub fn new(data: &SnapshotConnection) -> Self {
        let mut connection = Self {
            id: ObjectId::next(),
            name: connection_name(&data.source, &data.target),
            source: data.source.clone(),
            target: data.target.clone(),
            class: class_or_default(None),
            volume: VolumeMap::new(),
            volume_total: 0.0,
            volume_percent: VolumeMap::new(),
            volume_percent_keys_sorted: Vec::new(),
            volume_greatest: 0.0,
            notices: Vec::new(),
            annotations: Vec::new(),
            filtered: false,
            default_filtered: false,
            valid: true,
            dim: DimState::default(),
        };
        connection.update(data);
        connection
    }

    /// Merges a snapshot fragment in place. Returns true when any observable
    /// field changed; the caller is responsible for invalidating the
    /// endpoints' volume caches when the volume moved.
    pub fn update(&mut self, data: &SnapshotConnection) -> bool {
        let volume = data.metrics.clone().unwrap_or_default();
        let volume_total = volume.values().sum::<f64>();

        let mut volume_percent = VolumeMap::new();
        for (class, value) in &volume {
            let share = if volume_total > 0.0 {
                value / volume_total
            } else {
                0.0
            };
            volume_percent.insert(class.clone(), share);
        }

        let mut volume_percent_keys_sorted = volume_percent.keys().cloned().collect::<Vec<_>>();
        volume_percent_keys_sorted.sort_by(|a, b| {
            volume_percent[a]
                .total_cmp(&volume_percent[b])
                .then_with(|| a.cmp(b))
        });

        let mut notices = data.notices.clone();
        if volume.is_empty() {
            notices.push(Notice::new(NO_METRICS_NOTICE, 0));
        }

        let class = class_or_default(data.class.as_deref());

        let changed = self.volume != volume
            || !approx_eq(self.volume_total, volume_total)
            || self.notices != notices
            || self.class != class
            || self.annotations != data.annotations;

        if changed {
            self.volume = volume;
            self.volume_total = volume_total;
            self.volume_percent = volume_percent;
            self.volume_percent_keys_sorted = volume_percent_keys_sorted;
            self.notices = notices;
            self.class = class;
            self.annotations = data.annotations.clone();
        }
        changed
    }

    pub fn update_greatest_volume(&mut self, greatest: f64) -> bool {
        if approx_eq(self.volume_greatest, greatest) {
            return false;
        }
        self.volume_greatest = greatest;
        true
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn volume(&self) -> &VolumeMap {
        &self.volume
    }

    pub fn volume_total(&self) -> f64 {
        self.volume_total
    }

    pub fn volume_for(&self, class: &str) -> f64 {
        self.volume.get(class).copied().unwrap_or(0.0)
    }

    pub fn volume_percent(&self) -> &VolumeMap {
        &self.volume_percent
    }

    /// Traffic classes ordered by ascending share of this connection.
    pub fn volume_percent_keys_sorted(&self) -> &[String] {
        &self.volume_percent_keys_sorted
    }

    pub fn volume_greatest(&self) -> f64 {
        self.volume_greatest
    }

    pub fn annotations(&self) -> &[Value] {
        &self.annotations
    }

    pub fn is_default_visible(&self) -> bool {
        !self.default_filtered
    }
}

impl GraphObject for Connection {
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
        ObjectRef::Connection(self.name.clone())
    }
}
