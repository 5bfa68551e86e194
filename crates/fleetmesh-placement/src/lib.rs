//! Placement engine for fleetmesh.
//!
//! Decides which cluster node hosts a given service instance. Nodes are
//! registered with their static capabilities (runners, labels,
//! resources, shareable devices, priority); candidates are filtered in
//! a fixed order and the highest-priority survivor wins. The engine
//! also accumulates each node's pending run request (services, layers,
//! instances awaiting dispatch) and persists it through the state
//! store's per-node blob API.

pub mod engine;
pub mod error;
pub mod filter;
pub mod node;
pub mod types;

pub use engine::{NodeStateStorage, PlacementEngine, ResourceError, ResourceManager};
pub use error::{FilterStage, PlacementError, PlacementResult};
pub use filter::DEFAULT_RUNNERS;
pub use types::*;
