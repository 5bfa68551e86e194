//! State persistence for the fleetmesh coordination core.
//!
//! Holds the durable records the network coordinator and the placement
//! engine reconstruct themselves from on startup: provider-network
//! bindings, per-instance network info, and opaque per-node state blobs.
//! All values are JSON-serialized into redb tables; an in-memory backend
//! is available for tests.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
