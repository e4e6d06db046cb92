//! Reconciles periodic traffic snapshots into live, laid-out service graphs.

pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod layout;
pub mod particles;
pub mod scene;
pub mod snapshot;
pub mod util;
pub mod view;

pub use config::EngineConfig;
pub use graph::{GraphKind, StateChange, TrafficGraph};
pub use scene::Scene;
pub use snapshot::{Snapshot, parse_snapshot};
