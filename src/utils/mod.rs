//! Utility helpers: handle allocation, logging and profiling.

pub mod allocator;
pub mod logging;
pub mod profiling;

pub use allocator::{Arena, BodyHandle};
pub use profiling::StructureProfiler;
