//! Structural graph model: geometry, parts, joints and per-body state.

pub mod types;
pub mod mesh;
pub mod part;
pub mod joint;
pub mod structure;

pub use types::{MassProperties, Plane, Transform, Velocity};
pub use mesh::{Aabb, MeshBuilder, MeshSplit, MeshUpdateLog, MeshUpdateRecord, TriangleMesh};
pub use part::{BreakClass, ImpulseAccumulator, Part, PartFlags, PendingImpulse};
pub use joint::{JointDamage, JointFlags, JointKind, JointLimits, JointTension, StructuralJoint, TensionMode};
pub use structure::{DetachedGroup, Explosion, StructuralState};
