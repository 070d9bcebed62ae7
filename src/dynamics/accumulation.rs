use glam::Vec3;

use crate::{core::part::Part, utils::allocator::BodyHandle};

/// What the other side of a resolved contact was.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactPartner {
    /// World geometry or a static body.
    Static,
    /// Soft body, cloth, particles, ...
    NonRigid,
    /// Rigid body whose velocity changed by `velocity_change` while resolving the contact.
    Rigid { velocity_change: Vec3 },
}

/// Which accumulator a contact impulse feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpulseClass {
    /// Sharp impact (`Pext/Lext`).
    Direct,
    /// Gradual load transfer (`Fext/Text`).
    Indirect,
}

/// A resolved contact impulse landing on a structural part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactReport {
    pub body: BodyHandle,
    pub part_id: i32,
    /// World-space contact point.
    pub point: Vec3,
    /// World-space impulse applied to this body.
    pub impulse: Vec3,
    pub partner: ContactPartner,
}

/// Empirical split between impacts and resting load.
///
/// A partner that barely changed velocity is leaning on the body rather than
/// hitting it.
pub fn classify(partner: &ContactPartner, velocity_threshold: f32) -> ImpulseClass {
    match partner {
        ContactPartner::Static | ContactPartner::NonRigid => ImpulseClass::Indirect,
        ContactPartner::Rigid { velocity_change } => {
            if velocity_change.length_squared() < velocity_threshold * velocity_threshold {
                ImpulseClass::Indirect
            } else {
                ImpulseClass::Direct
            }
        }
    }
}

/// Adds the contact impulse and its moment about `com_world` to the part.
pub fn accumulate(part: &Part, com_world: Vec3, point: Vec3, impulse: Vec3, class: ImpulseClass) {
    let angular = (point - com_world).cross(impulse);
    match class {
        ImpulseClass::Direct => part.accum.add_direct(impulse, angular),
        ImpulseClass::Indirect => part.accum.add_indirect(impulse, angular),
    }
}

/// True when the pending load on a part is worth a structural solve.
///
/// Compares against one percent of the part's own weight; torques are scaled
/// by the summed bounding-box size so they compare against forces.
pub fn exceeds_deform_threshold(part: &Part, gravity: Vec3) -> bool {
    let pending = part.accum.peek();
    let p = pending.direct_linear + pending.indirect_linear;
    let l = pending.direct_angular + pending.indirect_angular;
    let extent = part.local_bounds().extent() * 2.0;
    let size = extent.x + extent.y + extent.z;
    let load_sq = p.length_squared().max(l.length_squared() * size * size * 0.1);
    let threshold = part.mass * 0.01;
    load_sq > threshold * threshold * gravity.length_squared()
}
