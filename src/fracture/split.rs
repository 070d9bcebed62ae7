use glam::{Mat3, Vec3};

use super::{SpawnedBody, SpawnedPart, SplitContext};
use crate::{
    core::{
        part::{Part, PartFlags},
        structure::StructuralState,
        types::{InertiaTensorExt, Transform, Velocity},
    },
    dynamics::island::IslandMap,
    events::{CreationReason, JointBroken, PartRevealed, PartsRemoved, StructureEvent},
    utils::allocator::BodyHandle,
};

/// What one materialization pass did to the source body.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub spawned: Vec<SpawnedBody>,
    /// Parents removed outright by the parent policy.
    pub removed_parents: usize,
    /// Parts left attached because the removal batch was full.
    pub deferred_parts: usize,
}

/// `JointBroken` events for the given joint indices, larger-volume part first.
pub fn broken_joint_events(
    state: &StructuralState,
    joints: &[usize],
    pose: &Transform,
    entity: BodyHandle,
) -> Vec<JointBroken> {
    joints
        .iter()
        .filter_map(|&j| state.joints.get(j))
        .map(|joint| {
            // The world anchor counts as the larger side.
            let side = |slot: Option<usize>| match slot.and_then(|i| state.parts.get(i)) {
                Some(part) => (part.volume(), part.id, part.material_id),
                None => (f32::INFINITY, -1, -1),
            };
            let mut a = side(joint.parts[0]);
            let mut b = side(joint.parts[1]);
            if b.0 > a.0 {
                std::mem::swap(&mut a, &mut b);
            }
            JointBroken {
                entity,
                joint: joint.id,
                point: pose.transform_point(joint.point),
                normal: (pose.rotation * joint.normal).normalize_or_zero(),
                parts: [a.1, b.1],
                materials: [a.2, b.2],
                epicenter: state.epicenter,
            }
        })
        .collect()
}

/// Moves every non-zero island of `map` onto a new body.
///
/// Parents removed by the parent policy are dropped, revealed children are
/// reported, and islands beyond the removal budget stay attached with
/// `deferred_split` set so the next tick retries them.
pub fn materialize_islands(
    state: &mut StructuralState,
    map: &IslandMap,
    ctx: &SplitContext,
    entity: BodyHandle,
    events: &mut Vec<StructureEvent>,
) -> MaterializeReport {
    let mut report = MaterializeReport::default();
    let n = state.parts.len();
    if map.island_of.len() != n {
        log::warn!(
            "island map covers {} parts but the body has {}; skipping split",
            map.island_of.len(),
            n
        );
        return report;
    }

    for &child in &map.revealed {
        events.push(StructureEvent::PartRevealed(PartRevealed {
            entity,
            part: state.parts[child].id,
        }));
    }

    let original_mass = state.total_mass();
    let body_com = mass_weighted_center(state.parts.iter());
    let rate_dt = ctx.dt * ctx.config.direct_impulse_rate;
    let peak = ctx
        .pending
        .iter()
        .map(|p| p.direct_linear * rate_dt + p.indirect_linear)
        .max_by(|a, b| a.length_squared().total_cmp(&b.length_squared()))
        .unwrap_or(Vec3::ZERO);

    // Admit whole islands until the removal budget runs out.
    let removed = map.removed();
    let mut budget_used = removed.len();
    let mut admitted: Vec<usize> = Vec::new();
    for island in 1..map.island_count {
        let members = map.members(island);
        if members.is_empty() {
            continue;
        }
        if !admitted.is_empty() && budget_used + members.len() > ctx.config.max_removed_parts {
            report.deferred_parts += members.len();
            continue;
        }
        budget_used += members.len();
        admitted.push(island);
    }
    if report.deferred_parts > 0 {
        log::warn!(
            "removal batch full, deferring {} parts to the next tick",
            report.deferred_parts
        );
    }
    state.deferred_split = report.deferred_parts > 0;

    // Group index per part; parents to drop go into one extra group that is discarded.
    let discard = admitted.len();
    let mut group_of: Vec<Option<usize>> = vec![None; n];
    for &part in &removed {
        group_of[part] = Some(discard);
    }
    let mut seeds = Vec::with_capacity(admitted.len());
    for (group, &island) in admitted.iter().enumerate() {
        let members = map.members(island);
        for &part in &members {
            group_of[part] = Some(group);
        }
        seeds.push(island_motion(state, &members, ctx, body_com, original_mass, peak));
    }

    let removed_ids: Vec<i32> = (0..n)
        .filter(|&i| group_of[i].is_some())
        .map(|i| state.parts[i].id)
        .collect();

    let mut groups = state.detach_groups(&group_of, discard + 1);
    let dropped = groups.pop().map(|g| g.parts.len()).unwrap_or(0);
    report.removed_parents = dropped;
    state.compact_broken_joints();

    for (group, (velocity, impulse, angular_impulse)) in groups.into_iter().zip(seeds) {
        let mut spawned_state = StructuralState::new();
        spawned_state.next_joint_id = state.next_joint_id;
        let island_mass: f32 = group.parts.iter().map(|p| p.mass).sum();
        let debris = island_mass <= ctx.config.debris_mass_limit;
        let single = group.parts.len() == 1;

        let mut parts = Vec::with_capacity(group.parts.len());
        for mut part in group.parts {
            if debris {
                if let Some(collider_flags) = ctx.config.debris_collider_flags {
                    part.collider_flags = collider_flags;
                }
                part.flags = part.flags & PartFlags::from_bits(ctx.config.debris_flags_mask);
            }
            if single && part.flags.contains(PartFlags::DESTROYED_ON_BREAK) {
                part.flags = PartFlags::empty();
            }
            parts.push(SpawnedPart {
                source_part: part.id,
                part: part.id,
                invalid: part.flags.is_invalid(),
                cut: None,
            });
            spawned_state.next_part_id = spawned_state.next_part_id.max(part.id + 1);
            spawned_state.parts.push(part);
        }
        for joint in group.joints {
            spawned_state.next_joint_id = spawned_state.next_joint_id.max(joint.id + 1);
            spawned_state.joints.push(joint);
        }
        spawned_state.bump();

        report.spawned.push(SpawnedBody {
            state: spawned_state,
            pose: ctx.pose,
            velocity,
            impulse,
            angular_impulse,
            reason: CreationReason::JointsBroken,
            parts,
        });
    }

    for event in removal_events(&removed_ids, original_mass, entity) {
        events.push(StructureEvent::PartsRemoved(event));
    }

    log::debug!(
        "split {} bodies off entity {:?} ({} parents removed, {} parts deferred)",
        report.spawned.len(),
        entity,
        report.removed_parents,
        report.deferred_parts
    );
    report
}

/// Velocity and shockwave impulse of the body formed by `members`.
fn island_motion(
    state: &StructuralState,
    members: &[usize],
    ctx: &SplitContext,
    body_com: Vec3,
    body_mass: f32,
    peak: Vec3,
) -> (Velocity, Vec3, Vec3) {
    let rotation = ctx.pose.rotation;
    let rate_dt = ctx.dt * ctx.config.direct_impulse_rate;
    let island_mass: f32 = members.iter().map(|&i| state.parts[i].mass).sum();
    let island_com = mass_weighted_center(members.iter().map(|&i| &state.parts[i]));

    let override_velocity = members.iter().find_map(|&i| state.parts[i].initial_velocity);
    let mut velocity = override_velocity.unwrap_or_else(|| {
        let mut linear = Vec3::ZERO;
        let mut angular = Vec3::ZERO;
        let mut weight = 0.0;
        for &i in members {
            let part = &state.parts[i];
            let w = if island_mass > 0.0 { part.mass } else { 1.0 };
            let offset = rotation * (part.center_of_mass() - body_com);
            linear += ctx.velocity.at_offset(offset) * w;
            angular += ctx.velocity.angular * w;
            weight += w;
        }
        if weight > 0.0 {
            Velocity::new(linear / weight, angular / weight)
        } else {
            ctx.velocity
        }
    });

    let mut impulse = Vec3::ZERO;
    let mut angular_impulse = Vec3::ZERO;
    for &i in members {
        let part = &state.parts[i];
        let load = ctx.pending.get(i).copied().unwrap_or_default();
        let own = load.direct_linear * rate_dt + load.indirect_linear;
        let has_breakable = state
            .joints
            .iter()
            .any(|j| j.is_structural() && j.references(i) && j.flags.breakable());
        let part_impulse = if has_breakable {
            let share = if body_mass > 0.0 { part.mass / body_mass } else { 0.0 };
            (own * 0.6 + peak * 0.4) * share.max(0.1)
        } else {
            load.direct_linear * rate_dt
        };
        impulse += part_impulse;
        angular_impulse += (rotation * (part.center_of_mass() - island_com)).cross(part_impulse);
    }

    let cap = ctx.config.shockwave_mass_cap * island_mass;
    if impulse.length_squared() > cap * cap {
        let scale = cap / impulse.length();
        impulse *= scale;
        angular_impulse *= scale;
    }

    if island_mass > 0.0 {
        velocity.linear += impulse / island_mass;
        let inv_inertia = composite_inertia(state, members, rotation, island_com).safe_inverse();
        velocity.angular += inv_inertia * angular_impulse;
    }
    (velocity, impulse, angular_impulse)
}

pub(super) fn mass_weighted_center<'a>(parts: impl Iterator<Item = &'a Part>) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut mass = 0.0;
    let mut plain = Vec3::ZERO;
    let mut count = 0;
    for part in parts {
        let com = part.center_of_mass();
        sum += com * part.mass;
        mass += part.mass;
        plain += com;
        count += 1;
    }
    if mass > 0.0 {
        sum / mass
    } else if count > 0 {
        plain / count as f32
    } else {
        Vec3::ZERO
    }
}

/// World-oriented inertia of `members` about `com` (body frame).
fn composite_inertia(state: &StructuralState, members: &[usize], rotation: glam::Quat, com: Vec3) -> Mat3 {
    let mut total = Mat3::ZERO;
    for &i in members {
        let part = &state.parts[i];
        let rot = Mat3::from_quat(rotation * part.transform.rotation);
        let d = rotation * (part.center_of_mass() - com);
        let outer = Mat3::from_cols(d * d.x, d * d.y, d * d.z);
        total += rot * part.body_inertia() * rot.transpose()
            + (Mat3::IDENTITY * d.length_squared() - outer) * part.mass;
    }
    total
}

/// Packs removed part ids into 128-id windows.
fn removal_events(ids: &[i32], original_mass: f32, entity: BodyHandle) -> Vec<PartsRemoved> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut events: Vec<PartsRemoved> = Vec::new();
    for id in sorted {
        match events.last_mut() {
            Some(last) if id - last.id_offset < 128 => {
                last.mask |= 1u128 << (id - last.id_offset);
            }
            _ => events.push(PartsRemoved {
                entity,
                mask: 1,
                id_offset: id,
                original_mass,
            }),
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::StructureConfig,
        core::{joint::StructuralJoint, mesh::TriangleMesh, part::PendingImpulse},
        dynamics::{island::IslandAnalyzer, solver::SolverScratch},
    };
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn row(n: usize) -> StructuralState {
        let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
        let mut state = StructuralState::new();
        for i in 0..n {
            state
                .add_part(
                    Part::new(i as i32, mesh.clone(), 1.0)
                        .with_transform(Transform::from_position(Vec3::new(i as f32, 0.0, 0.0))),
                )
                .unwrap();
        }
        for i in 1..n {
            state
                .add_joint(StructuralJoint::between(
                    -1,
                    i - 1,
                    i,
                    Vec3::new(i as f32 - 0.5, 0.0, 0.0),
                    -Vec3::X,
                ))
                .unwrap();
        }
        state
    }

    fn ctx<'a>(config: &'a StructureConfig, pending: &'a [PendingImpulse]) -> SplitContext<'a> {
        SplitContext {
            config,
            dt: 0.01,
            pose: Transform::default(),
            velocity: Velocity::new(Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO),
            is_static: false,
            pending,
        }
    }

    #[test]
    fn removal_mask_windows_split_at_128_ids() {
        let events = removal_events(&[3, 5, 200], 10.0, BodyHandle::default());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].part_ids(), vec![3, 5]);
        assert_eq!(events[1].part_ids(), vec![200]);
    }

    #[test]
    fn detached_island_becomes_new_body_with_inherited_velocity() {
        let mut state = row(3);
        state.joints[1].broken = true;
        let mut scratch = SolverScratch::new();
        let map = IslandAnalyzer::new().partition(&mut state, &mut scratch);
        let config = StructureConfig::default();
        let pending = vec![PendingImpulse::default(); 3];
        let mut events = Vec::new();

        let report = materialize_islands(&mut state, &map, &ctx(&config, &pending), BodyHandle::default(), &mut events);

        assert_eq!(report.spawned.len(), 1);
        assert_eq!(state.part_count(), 2);
        assert_eq!(state.joint_count(), 1);
        let spawned = &report.spawned[0];
        assert_eq!(spawned.parts.len(), 1);
        assert_relative_eq!(spawned.velocity.linear.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(state.total_mass() + spawned.mass(), 3.0, epsilon = 1e-6);
        assert!(matches!(events[0], StructureEvent::PartsRemoved(_)));
    }

    #[test]
    fn removal_budget_defers_extra_islands() {
        let mut state = row(4);
        for joint in &mut state.joints {
            joint.broken = true;
        }
        let mut scratch = SolverScratch::new();
        let map = IslandAnalyzer::new().partition(&mut state, &mut scratch);
        let mut config = StructureConfig::default();
        config.max_removed_parts = 2;
        let pending = vec![PendingImpulse::default(); 4];
        let mut events = Vec::new();

        let report = materialize_islands(&mut state, &map, &ctx(&config, &pending), BodyHandle::default(), &mut events);

        assert_eq!(report.spawned.len(), 2);
        assert_eq!(report.deferred_parts, 1);
        assert!(state.deferred_split);
        assert_eq!(state.part_count(), 2);
    }

    #[test]
    fn shockwave_is_capped_by_mass() {
        let mut state = row(2);
        state.joints[0].broken = true;
        let mut scratch = SolverScratch::new();
        let map = IslandAnalyzer::new().partition(&mut state, &mut scratch);
        let config = StructureConfig::default();
        let mut pending = vec![PendingImpulse::default(); 2];
        pending[1].direct_linear = Vec3::new(1000.0, 0.0, 0.0);
        let mut events = Vec::new();

        let report = materialize_islands(&mut state, &map, &ctx(&config, &pending), BodyHandle::default(), &mut events);

        let impulse = report.spawned[0].impulse;
        assert_relative_eq!(impulse.length(), config.shockwave_mass_cap, epsilon = 1e-4);
        assert!(impulse.x > 0.0);
        // Inherited body velocity plus the capped shockwave, nothing from the raw load.
        let velocity = report.spawned[0].velocity.linear;
        assert_relative_eq!(velocity.x, config.shockwave_mass_cap, epsilon = 1e-4);
        assert_relative_eq!(velocity.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn world_side_is_reported_first() {
        let mut state = row(1);
        state
            .add_joint(StructuralJoint::to_world(7, 0, Vec3::new(0.0, -0.5, 0.0), Vec3::Y))
            .unwrap();
        let events = broken_joint_events(&state, &[0], &Transform::default(), BodyHandle::default());
        assert_eq!(events[0].joint, 7);
        assert_eq!(events[0].parts, [-1, 0]);
    }
}
