//! Turning broken joint networks and disconnected meshes into new bodies.

pub mod joint_gen;
pub mod mesh_split;
pub mod reattach;
pub mod split;

use glam::Vec3;

use crate::{
    config::StructureConfig,
    core::{part::PendingImpulse, structure::StructuralState, types::Transform, types::Velocity},
    events::{CreationReason, MeshCut},
};

pub use joint_gen::{calibrate_limits, generate_joints};
pub use mesh_split::{split_part_meshes, MeshSplitReport};
pub use reattach::find_host;
pub use split::{broken_joint_events, materialize_islands, MaterializeReport};

/// Read-only view of the source body handed to the fracture passes.
#[derive(Debug, Clone, Copy)]
pub struct SplitContext<'a> {
    pub config: &'a StructureConfig,
    pub dt: f32,
    pub pose: Transform,
    pub velocity: Velocity,
    pub is_static: bool,
    /// Load consumed this tick, indexed by part before any removal.
    pub pending: &'a [PendingImpulse],
}

/// One part that moved or was created, before the owning body has a handle.
#[derive(Debug, Clone)]
pub struct SpawnedPart {
    pub source_part: i32,
    pub part: i32,
    pub invalid: bool,
    pub cut: Option<MeshCut>,
}

/// Body to be inserted into the world by the caller.
#[derive(Debug)]
pub struct SpawnedBody {
    pub state: StructuralState,
    pub pose: Transform,
    pub velocity: Velocity,
    pub impulse: Vec3,
    pub angular_impulse: Vec3,
    pub reason: CreationReason,
    pub parts: Vec<SpawnedPart>,
}

impl SpawnedBody {
    pub fn mass(&self) -> f32 {
        self.state.total_mass()
    }
}
