//! Nodes and connections owned by a [`TrafficGraph`](crate::graph::TrafficGraph).

mod connection;
mod node;
mod notice;
mod volume;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub use connection::Connection;
pub use node::Node;
pub use notice::{NO_METRICS_NOTICE, Notice};
pub use volume::{VolumeCache, VolumeMap, VolumeTotals};

pub type NodeMap = HashMap<String, Node>;
pub type ConnectionMap = HashMap<String, Connection>;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity handed out when an entity is created. Updating an
/// entity in place keeps its id; recreating it does not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Node(String),
    Connection(String),
}

impl ObjectRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Node(name) | Self::Connection(name) => name,
        }
    }
}

/// Read interface shared by nodes and connections.
pub trait GraphObject {
    fn object_id(&self) -> ObjectId;
    fn name(&self) -> &str;
    fn class(&self) -> &str;
    fn notices(&self) -> &[Notice];
    fn is_visible(&self) -> bool;
    fn object_ref(&self) -> ObjectRef;

    fn has_notices(&self, severity_threshold: Option<u8>) -> bool {
        notice::meets_threshold(self.notices(), severity_threshold)
    }

    fn highest_notice_level(&self) -> Option<u8> {
        notice::highest_level(self.notices())
    }
}

pub(crate) fn class_or_default(class: Option<&str>) -> String {
    class.unwrap_or("normal").to_owned()
}
