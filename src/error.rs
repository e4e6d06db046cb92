use thiserror::Error;

/// Non-fatal problems found while applying a snapshot. None of these abort
/// reconciliation; they are logged and reported back in the state change.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("connection {connection} references unknown node {missing}; dropped")]
    DanglingConnection { connection: String, missing: String },

    #[error("maxVolume {0} is not within [0, inf); keeping previous value")]
    InvalidMaxVolume(f64),

    #[error("snapshot for {graph} has no maxVolume; keeping previous value")]
    MissingMaxVolume { graph: String },

    #[error("duplicate node {0} in snapshot; first entry wins")]
    DuplicateNode(String),
}
