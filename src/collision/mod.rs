//! Spatial registration of structural bodies.

pub mod broadphase;

pub use broadphase::{BroadPhase, SpatialGrid};
