//! Error types for structural operations.

use thiserror::Error;

use crate::utils::allocator::BodyHandle;

/// Errors reported when the structural graph is edited incorrectly.
///
/// Ticks never fail; these only surface from explicit edits such as adding
/// a joint or a part.
#[derive(Debug, Error, PartialEq)]
pub enum StructureError {
    /// Both joint endpoints refer to the same part (or both to the world).
    #[error("joint endpoints must differ (got {0:?} twice)")]
    DegenerateJoint(Option<usize>),

    /// A joint endpoint does not name an existing part.
    #[error("joint endpoint {index} out of range ({part_count} parts)")]
    EndpointOutOfRange { index: usize, part_count: usize },

    /// The entity handle is stale or was never issued.
    #[error("unknown entity: {0:?}")]
    UnknownEntity(BodyHandle),

    /// No part carries the given id.
    #[error("unknown part id: {0}")]
    UnknownPart(i32),

    /// A part with this id already exists on the entity.
    #[error("duplicate part id: {0}")]
    DuplicatePart(i32),

    /// Invalid configuration value.
    #[error("invalid structure configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for structural edits.
pub type Result<T> = std::result::Result<T, StructureError>;
