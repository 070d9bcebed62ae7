use glam::Vec3;

use crate::core::{
    joint::JointLimits,
    structure::{Explosion, StructuralState},
};

/// Explicit one-shot break request, e.g. from gameplay or an explosion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedBreak {
    pub part_id: i32,
    /// World-space linear impulse.
    pub impulse: Vec3,
    /// World-space angular impulse.
    pub angular_impulse: Vec3,
    /// World-space hit point; defaults to the part's centre of mass.
    pub point: Option<Vec3>,
    pub explosion: Option<Explosion>,
}

impl ForcedBreak {
    pub fn new(part_id: i32, impulse: Vec3) -> Self {
        Self {
            part_id,
            impulse,
            angular_impulse: Vec3::ZERO,
            point: None,
            explosion: None,
        }
    }

    pub fn at_point(mut self, point: Vec3) -> Self {
        self.point = Some(point);
        self
    }

    pub fn with_angular(mut self, angular_impulse: Vec3) -> Self {
        self.angular_impulse = angular_impulse;
        self
    }

    pub fn with_explosion(mut self, explosion: Explosion) -> Self {
        self.explosion = Some(explosion);
        self
    }
}

/// Descends from `part` to the child whose bounds lie closest to `local_point`.
pub fn map_hit_to_child(state: &StructuralState, part: usize, local_point: Vec3) -> usize {
    let mut current = part;
    for _ in 0..state.parts.len() {
        let closest = state
            .parts
            .iter()
            .enumerate()
            .filter(|(_, p)| p.parent == Some(current))
            .map(|(i, p)| {
                let bounds = p.local_bounds();
                let clamped = local_point.clamp(bounds.min, bounds.max);
                (i, clamped.distance_squared(local_point))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match closest {
            Some((child, _)) => current = child,
            None => break,
        }
    }
    current
}

/// Breaks the direct-hit joint on `part` closest to the hit when the impulse is large enough.
///
/// Returns the index of the joint that broke.
pub fn try_direct_break(state: &mut StructuralState, part: usize, local_point: Vec3, impulse: f32) -> Option<usize> {
    let (index, joint) = state
        .joints
        .iter()
        .enumerate()
        .filter(|(_, j)| {
            j.is_connecting()
                && j.references(part)
                && j.flags.breakable()
                && j.flags.direct_breaks_only()
        })
        .min_by(|(_, a), (_, b)| {
            a.point
                .distance_squared(local_point)
                .total_cmp(&b.point.distance_squared(local_point))
        })?;

    let pull = JointLimits::effective(joint.limits.pull);
    let trigger = pull * 0.01;
    if impulse * impulse > trigger * trigger {
        state.joints[index].broken = true;
        log::debug!(
            "direct hit of {:.2} broke joint {} on part {}",
            impulse,
            state.joints[index].id,
            state.parts[part].id
        );
        Some(index)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        joint::{JointFlags, StructuralJoint},
        mesh::TriangleMesh,
        part::{Part, PartFlags},
        types::Transform,
    };
    use std::sync::Arc;

    fn wall() -> StructuralState {
        let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
        let mut state = StructuralState::new();
        state.add_part(Part::new(0, mesh.clone(), 10.0)).unwrap();
        state
            .add_part(
                Part::new(1, mesh.clone(), 1.0)
                    .with_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0))),
            )
            .unwrap();
        state
            .add_part(
                Part::new(2, mesh.clone(), 0.2)
                    .with_transform(Transform::from_position(Vec3::new(1.0, 1.0, 0.0)))
                    .with_parent(1, PartFlags::empty(), 0),
            )
            .unwrap();
        state
            .add_joint(
                StructuralJoint::between(0, 0, 1, Vec3::new(0.5, 0.0, 0.0), Vec3::X)
                    .with_limits(JointLimits::uniform(1000.0))
                    .with_flags(JointFlags::BREAKABLE | JointFlags::DIRECT_BREAKS_ONLY),
            )
            .unwrap();
        state
    }

    #[test]
    fn hit_maps_to_nearest_child() {
        let state = wall();
        assert_eq!(map_hit_to_child(&state, 1, Vec3::new(1.0, 1.2, 0.0)), 2);
        assert_eq!(map_hit_to_child(&state, 0, Vec3::ZERO), 0);
    }

    #[test]
    fn direct_hit_needs_one_percent_of_pull() {
        let mut state = wall();
        assert_eq!(try_direct_break(&mut state, 1, Vec3::new(0.6, 0.0, 0.0), 5.0), None);
        assert!(!state.joints[0].broken);
        assert_eq!(try_direct_break(&mut state, 1, Vec3::new(0.6, 0.0, 0.0), 15.0), Some(0));
        assert!(state.joints[0].broken);
    }
}
