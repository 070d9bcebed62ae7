use std::collections::VecDeque;

use glam::{Quat, Vec3};

use crate::{
    core::{
        joint::{JointKind, JointLimits, StructuralJoint},
        part::PendingImpulse,
        structure::StructuralState,
    },
    dynamics::solver::{JointRelaxationSolver, SolveFrame, SolverScratch},
};

/// Bounds are inflated by this factor before the overlap test.
const OVERLAP_INFLATION: f32 = 1.01;

fn template_score(template: &StructuralJoint, state: &StructuralState, pair: [usize; 2]) -> u32 {
    let endpoints = template.parts;
    let same_pair = endpoints.contains(&Some(pair[0])) && endpoints.contains(&Some(pair[1]));
    if same_pair {
        return 5;
    }
    if endpoints.contains(&Some(pair[0])) || endpoints.contains(&Some(pair[1])) {
        return 4;
    }
    let material = |slot: Option<usize>| slot.and_then(|i| state.parts.get(i)).map(|p| p.material_id);
    let wanted = [state.parts[pair[0]].material_id, state.parts[pair[1]].material_id];
    let have = [material(endpoints[0]), material(endpoints[1])];
    let matches = |m: i32| have.contains(&Some(m));
    if (have[0] == Some(wanted[0]) && have[1] == Some(wanted[1]))
        || (have[0] == Some(wanted[1]) && have[1] == Some(wanted[0]))
    {
        return 3;
    }
    if matches(wanted[0]) || matches(wanted[1]) {
        return 2;
    }
    1
}

/// Adds joints between overlapping parts that are not already connected.
///
/// Limits, flags and sensor size come from the best-matching template joint
/// or fall back to [`JointLimits::SAMPLE`]. Templates are consumed.
pub fn generate_joints(state: &mut StructuralState) -> usize {
    let templates: Vec<StructuralJoint> = state
        .joints
        .iter()
        .filter(|j| matches!(j.kind, JointKind::Template))
        .cloned()
        .collect();

    let n = state.parts.len();
    let mut linked = vec![false; n * n];
    for joint in state.joints.iter().filter(|j| j.is_structural()) {
        if let [Some(a), Some(b)] = joint.parts {
            linked[a * n + b] = true;
            linked[b * n + a] = true;
        }
    }

    let mut created = Vec::new();
    for a in 0..n {
        let bounds_a = state.parts[a].local_bounds().scaled(OVERLAP_INFLATION);
        for b in (a + 1)..n {
            if linked[a * n + b] {
                continue;
            }
            let bounds_b = state.parts[b].local_bounds().scaled(OVERLAP_INFLATION);
            let Some(overlap) = bounds_a.intersection(&bounds_b) else { continue };
            let (pa, pb) = (&state.parts[a], &state.parts[b]);
            if !pa.mesh().intersects(&pa.transform, pb.mesh(), &pb.transform) {
                continue;
            }

            // Heavier part first so the normal points from the lighter part toward it.
            let (first, second) = if pb.mass > pa.mass { (b, a) } else { (a, b) };
            let normal = (state.parts[first].center_of_mass() - state.parts[second].center_of_mass())
                .normalize_or_zero();
            let normal = if normal == Vec3::ZERO { Vec3::Y } else { normal };

            let mut joint = StructuralJoint::between(-1, first, second, overlap.center(), normal)
                .with_limits(JointLimits::SAMPLE);
            let best = templates
                .iter()
                .map(|t| (template_score(t, state, [first, second]), t))
                .max_by_key(|(score, _)| *score);
            if let Some((_, template)) = best {
                joint.limits = template.limits;
                joint.flags = template.flags;
                joint.sensor_size = template.sensor_size;
                joint.damage = template.damage;
            }
            linked[a * n + b] = true;
            linked[b * n + a] = true;
            created.push(joint);
        }
    }

    state.joints.retain(|j| !matches!(j.kind, JointKind::Template));
    let count = created.len();
    for joint in created {
        if let Err(err) = state.add_joint(joint) {
            log::warn!("skipping inferred joint: {err}");
        }
    }
    state.bump();
    log::debug!("inferred {} joints from {} templates", count, templates.len());
    count
}

/// Scales joint limits so each probe load lands exactly at the limit.
///
/// Every probe is solved in test mode; its peak tension ratio is spread over
/// the joints by breadth-first distance from the probed part with weight
/// `1/depth`, and each joint's limits are multiplied by its weighted mean.
/// Probes are consumed. Returns the number of recalibrated joints.
pub fn calibrate_limits(
    state: &mut StructuralState,
    solver: &JointRelaxationSolver,
    scratch: &mut SolverScratch,
    dt: f32,
) -> usize {
    let probes: Vec<(usize, Vec3, Vec3)> = state
        .joints
        .iter()
        .filter_map(|j| match (j.kind, j.parts[0]) {
            (JointKind::ImpulseProbe { linear, angular }, Some(part)) => Some((part, linear, angular)),
            _ => None,
        })
        .collect();
    state.joints.retain(|j| !matches!(j.kind, JointKind::ImpulseProbe { .. }));
    if probes.is_empty() {
        return 0;
    }

    let n = state.parts.len();
    let mut weighted = vec![0.0f32; state.joints.len()];
    let mut weights = vec![0.0f32; state.joints.len()];
    let mut seen = vec![false; state.joints.len()];
    let mut depth = vec![usize::MAX; n];
    let mut queue = VecDeque::new();

    for (part, linear, angular) in probes {
        let mut pending = vec![PendingImpulse::default(); n];
        pending[part].direct_linear = linear;
        pending[part].direct_angular = angular;
        let frame = SolveFrame {
            dt,
            rotation: Quat::IDENTITY,
            pending: &pending,
            epicenter: Some(part),
            test_run: true,
            forced: false,
        };
        let report = solver.solve(state, scratch, &frame);
        if report.max_tension <= 0.0 {
            continue;
        }

        depth.iter_mut().for_each(|d| *d = usize::MAX);
        seen.iter_mut().for_each(|s| *s = false);
        depth[part] = 0;
        queue.clear();
        queue.push_back(part);
        while let Some(current) = queue.pop_front() {
            for &j in scratch.joints_of(current) {
                let joint_depth = depth[current] + 1;
                if !seen[j] {
                    seen[j] = true;
                    let w = 1.0 / joint_depth as f32;
                    weighted[j] += report.max_tension * w;
                    weights[j] += w;
                }
                if let Some(other) = state.joints[j].other(current) {
                    if depth[other] == usize::MAX {
                        depth[other] = joint_depth;
                        queue.push_back(other);
                    }
                }
            }
        }
    }

    let mut calibrated = 0;
    for (j, joint) in state.joints.iter_mut().enumerate() {
        if weights[j] <= 0.0 || joint.limits.is_unbreakable() {
            continue;
        }
        let factor = weighted[j] / weights[j];
        if factor.is_finite() && factor > 0.0 {
            joint.limits = joint.limits.scaled(factor);
            calibrated += 1;
        }
    }
    state.bump();
    log::debug!("calibrated limits of {calibrated} joints");
    calibrated
}
