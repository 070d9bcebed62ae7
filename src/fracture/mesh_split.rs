use std::sync::Arc;

use glam::Vec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{reattach::find_host, split::mass_weighted_center, SpawnedBody, SpawnedPart, SplitContext};
use crate::{
    core::{
        mesh::{Aabb, MeshMassProperties, MeshUpdateRecord, TriangleMesh},
        part::{Part, PartFlags},
        structure::StructuralState,
        types::{InertiaTensorExt, Plane, Transform, Velocity},
    },
    events::{CreationReason, EntityPartCreated, MeshCut, MeshUpdated, StructureEvent},
    utils::allocator::BodyHandle,
};

/// Outcome of one mesh connectivity check over a body.
#[derive(Debug, Default)]
pub struct MeshSplitReport {
    /// Fragments that became standalone bodies.
    pub spawned: Vec<SpawnedBody>,
    pub parts_split: usize,
    pub fragments: usize,
    pub discarded_mass: f32,
    /// Parts whose split was postponed because the addition batch was full.
    pub deferred_parts: usize,
}

#[derive(Debug)]
struct Assessed {
    mesh: TriangleMesh,
    props: MeshMassProperties,
    valid: bool,
}

fn assess(mesh: TriangleMesh, min_volume: f32) -> Assessed {
    let props = mesh.mass_properties();
    let valid = is_simulable(&props, &mesh.bounds, min_volume);
    Assessed { mesh, props, valid }
}

/// Enough volume, strictly positive inertia on every axis and a centre of mass inside the bounds.
fn is_simulable(props: &MeshMassProperties, bounds: &Aabb, min_volume: f32) -> bool {
    let diagonal = props.inertia.principal_diagonal();
    props.volume > 0.0
        && props.volume >= min_volume
        && diagonal.is_finite()
        && diagonal.min_element() > 0.0
        && bounds.contains_point(props.center_of_mass)
}

#[cfg(feature = "parallel")]
fn assess_all(meshes: Vec<TriangleMesh>, min_volume: f32) -> Vec<Assessed> {
    meshes.into_par_iter().map(|m| assess(m, min_volume)).collect()
}

#[cfg(not(feature = "parallel"))]
fn assess_all(meshes: Vec<TriangleMesh>, min_volume: f32) -> Vec<Assessed> {
    meshes.into_iter().map(|m| assess(m, min_volume)).collect()
}

/// Gives an invalid output zero mass and takes it out of collision.
fn invalidate(part: &mut Part) -> f32 {
    let lost = part.mass;
    part.mass = 0.0;
    part.flags.remove(PartFlags::COLLIDES);
    part.flags.insert(PartFlags::INVALID);
    lost
}

/// Splits every structure-changing part whose mesh fell apart above `ground`.
///
/// With an intact joint network fragments become new parts of the same body
/// and joints whose sensor touches a fragment move onto it; otherwise each
/// fragment is returned as a standalone body for the caller to insert.
pub fn split_part_meshes(
    state: &mut StructuralState,
    ground: &[Plane],
    ctx: &SplitContext,
    entity: BodyHandle,
    events: &mut Vec<StructureEvent>,
) -> MeshSplitReport {
    let mut report = MeshSplitReport::default();
    let config = ctx.config;
    let jointed = state.has_joint_network();
    let explosion = state.explosion.take();
    let body_com = mass_weighted_center(state.parts.iter());
    let mut budget = config.max_added_parts;
    let mut movers: Vec<(i32, usize)> = Vec::new();

    for index in 0..state.parts.len() {
        let (split, density, min_volume) = {
            let part = &state.parts[index];
            if !part.flags.structure_changes() || part.flags.is_invalid() {
                continue;
            }
            let frame = ctx.pose.combine(&part.transform);
            let local_ground: Vec<Plane> = ground.iter().map(|p| p.to_local(&frame)).collect();
            let Some(split) = part.mesh().split_into_islands(&local_ground, !ctx.is_static) else {
                continue;
            };
            let v0 = part.mesh_properties().volume;
            let density = if v0 > 0.0 { part.mass / v0 } else { 0.0 };
            (split, density, config.min_fragment_volume_fraction * v0)
        };
        if split.fragments.len() > budget {
            report.deferred_parts += 1;
            log::warn!(
                "addition batch full, postponing split of part {} ({} fragments)",
                state.parts[index].id,
                split.fragments.len()
            );
            continue;
        }
        budget -= split.fragments.len();
        report.parts_split += 1;

        let source_transform = state.parts[index].transform;
        let source_id = state.parts[index].id;
        let record = MeshUpdateRecord {
            removed_triangles: split.removed_triangles.clone(),
            triangle_count: split.remaining.as_ref().map(|m| m.triangle_count()).unwrap_or(0),
            vertex_count: split.remaining.as_ref().map(|m| m.vertices.len()).unwrap_or(0),
        };

        // Remaining mesh stays on the source part.
        let mut discarded = 0.0;
        let remaining_invalid;
        {
            let part = &mut state.parts[index];
            match split.remaining.map(|m| assess(m, min_volume)) {
                Some(kept) => {
                    part.mass = density * kept.props.volume;
                    part.set_mesh(Arc::new(kept.mesh));
                    part.apply_inertia_floor(config.min_axis_inertia_fraction);
                    remaining_invalid = !kept.valid;
                }
                None => {
                    // Every island left; the fragments carry the whole mass.
                    part.mass = 0.0;
                    part.set_mesh(Arc::new(TriangleMesh::new(Vec::new(), Vec::new())));
                    remaining_invalid = true;
                }
            }
            if remaining_invalid {
                discarded += invalidate(part);
            }
        }
        let remaining_com = state.parts[index].center_of_mass();

        let fragments = assess_all(split.fragments, min_volume);
        let mut hosts: Vec<(Arc<TriangleMesh>, usize)> = Vec::with_capacity(fragments.len());
        let mut standalone: Vec<usize> = Vec::new();
        for fragment in fragments {
            let template = &state.parts[index];
            let mesh = Arc::new(fragment.mesh);
            let mut piece = Part::new(source_id, mesh.clone(), density * fragment.props.volume)
                .with_transform(source_transform)
                .with_material(template.material_id)
                .with_break_class(template.break_class)
                .with_flags(template.flags)
                .with_collider_flags(template.collider_flags);
            piece.skin = template.skin;
            piece.apply_inertia_floor(config.min_axis_inertia_fraction);
            if !fragment.valid {
                discarded += invalidate(&mut piece);
            }

            let com_body = piece.center_of_mass();
            let com_world = ctx.pose.transform_point(com_body);
            let impulse = explosion
                .map(|e| e.impulse_at(com_world, piece.volume()))
                .unwrap_or(Vec3::ZERO);
            let direction = match explosion {
                Some(e) => (com_world - e.center).normalize_or_zero(),
                None => (ctx.pose.rotation * (com_body - remaining_com)).normalize_or_zero(),
            };
            let cut = MeshCut {
                mesh: mesh.clone(),
                point: com_world,
                direction,
            };
            let velocity = Velocity::new(
                ctx.velocity.at_offset(ctx.pose.rotation * (com_body - body_com)),
                ctx.velocity.angular,
            );
            let invalid = !fragment.valid;

            if jointed {
                piece.id = state.alloc_part_id();
                if !invalid {
                    piece.accum.add_direct(impulse, Vec3::ZERO);
                }
                events.push(StructureEvent::EntityPartCreated(EntityPartCreated {
                    source: entity,
                    source_part: source_id,
                    entity,
                    part: piece.id,
                    impulse,
                    angular_impulse: Vec3::ZERO,
                    velocity,
                    reason: CreationReason::MeshSplit,
                    invalid,
                    cut: Some(cut),
                }));
                state.parts.push(piece);
                hosts.push((mesh, state.parts.len() - 1));
            } else {
                let mut spawned_state = StructuralState::new();
                let mass = piece.mass;
                spawned_state.next_part_id = source_id + 1;
                spawned_state.parts.push(piece);
                let mut velocity = velocity;
                if mass > 0.0 {
                    velocity.linear += impulse / mass;
                }
                report.spawned.push(SpawnedBody {
                    state: spawned_state,
                    pose: ctx.pose,
                    velocity,
                    impulse,
                    angular_impulse: Vec3::ZERO,
                    reason: CreationReason::MeshSplit,
                    parts: vec![SpawnedPart {
                        source_part: source_id,
                        part: source_id,
                        invalid,
                        cut: Some(cut),
                    }],
                });
                standalone.push(report.spawned.len() - 1);
                hosts.push((mesh, report.spawned.len() - 1));
            }
            report.fragments += 1;
        }

        if jointed {
            rehome_joints(state, index, &hosts);
        }

        // Non-breakable riders follow the piece they sit in.
        let frames: Vec<(&TriangleMesh, Transform)> = hosts
            .iter()
            .map(|(mesh, _)| (mesh.as_ref(), source_transform))
            .collect();
        for child in 0..state.parts.len() {
            let rider = &state.parts[child];
            if rider.parent != Some(index) || rider.is_breakable() {
                continue;
            }
            let Some(host) = find_host(rider, &frames) else { continue };
            let target = hosts[host].1;
            if jointed {
                state.parts[child].parent = Some(target);
            } else {
                movers.push((rider.id, target));
            }
        }

        let last_update = state.parts[index].update_log.push(record);
        let part = &state.parts[index];
        events.push(StructureEvent::MeshUpdated(MeshUpdated {
            entity,
            part: part.id,
            mesh: part.mesh().clone(),
            log: part.update_log.clone(),
            last_update,
            invalid: remaining_invalid,
            discarded_mass: discarded,
        }));
        report.discarded_mass += discarded;
        log::debug!(
            "part {} split into {} fragments ({} standalone), {:.3} kg discarded",
            source_id,
            hosts.len(),
            standalone.len(),
            discarded
        );
    }

    for (id, target) in movers {
        let Some(index) = state.part_index(id) else { continue };
        let Some(mut rider) = state.remove_part(index) else { continue };
        let spawned = &mut report.spawned[target];
        rider.parent = Some(0);
        spawned.state.next_part_id = spawned.state.next_part_id.max(rider.id + 1);
        spawned.parts.push(SpawnedPart {
            source_part: rider.id,
            part: rider.id,
            invalid: rider.flags.is_invalid(),
            cut: None,
        });
        spawned.state.parts.push(rider);
    }

    if report.parts_split > 0 {
        state.bump();
    } else {
        state.explosion = explosion;
    }
    report
}

/// Moves joint endpoints on `source` to the fragment their sensor sphere touches.
fn rehome_joints(state: &mut StructuralState, source: usize, hosts: &[(Arc<TriangleMesh>, usize)]) {
    let frame = state.parts[source].transform;
    let scale = frame.max_scale().max(1e-6);
    for joint in state.joints.iter_mut().filter(|j| j.is_connecting() && j.references(source)) {
        let center = frame.inverse_transform_point(joint.point);
        let radius = joint.sensor_size / scale;
        let Some((_, target)) = hosts.iter().find(|(mesh, _)| mesh.sphere_intersects(center, radius)) else {
            continue;
        };
        for slot in joint.parts.iter_mut() {
            if *slot == Some(source) {
                *slot = Some(*target);
            }
        }
    }
}
