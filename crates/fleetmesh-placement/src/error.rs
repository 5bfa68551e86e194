//! Placement error types.

use thiserror::Error;

/// Result type alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Filter pipeline stage that emptied the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Runners,
    Labels,
    Resources,
    Devices,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FilterStage::Runners => "runners",
            FilterStage::Labels => "labels",
            FilterStage::Resources => "resources",
            FilterStage::Devices => "devices",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during placement decisions.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// No node survived the named filter stage; `missing` carries the
    /// requirements nothing could satisfy.
    #[error("no node with {stage}: {missing:?}")]
    NoNode {
        stage: FilterStage,
        missing: Vec<String>,
    },

    #[error("can't allocate device: {0}")]
    DeviceExhausted(String),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("resource manager error: {0}")]
    Resource(#[from] crate::engine::ResourceError),

    #[error("state store error: {0}")]
    State(#[from] fleetmesh_state::StateError),

    #[error("run request encoding: {0}")]
    Encoding(String),
}
