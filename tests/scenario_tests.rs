use std::sync::Arc;

use approx::assert_relative_eq;
use structural_integrity::{
    events::CreationReason, BodyHandle, ContactPartner, ContactReport, JointLimits, Part, PartFlags,
    StructuralBody, StructuralJoint, StructuralState, StructuralWorld, StructureConfig, StructureEvent,
    StructurePhase, Transform, TriangleMesh, Vec3, Velocity,
};

const DT: f32 = 0.01;

fn world() -> StructuralWorld {
    StructuralWorld::new(StructureConfig::default().with_gravity(Vec3::ZERO)).unwrap()
}

fn cube() -> Arc<TriangleMesh> {
    Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)))
}

/// A(-1) - B(0) - C(+1) along X, joint 1 between A and B, joint 2 between B and C.
fn chain(limits: JointLimits) -> StructuralState {
    let mesh = cube();
    let mut state = StructuralState::new();
    for (id, x) in [(0, -1.0), (1, 0.0), (2, 1.0)] {
        state
            .add_part(Part::new(id, mesh.clone(), 1.0).with_transform(Transform::from_position(Vec3::new(x, 0.0, 0.0))))
            .unwrap();
    }
    state
        .add_joint(StructuralJoint::between(1, 0, 1, Vec3::new(-0.5, 0.0, 0.0), -Vec3::X).with_limits(limits))
        .unwrap();
    state
        .add_joint(StructuralJoint::between(2, 1, 2, Vec3::new(0.5, 0.0, 0.0), -Vec3::X).with_limits(limits))
        .unwrap();
    state
}

fn hit(body: BodyHandle, part_id: i32, impulse: Vec3) -> ContactReport {
    ContactReport {
        body,
        part_id,
        point: Vec3::ZERO,
        impulse,
        partner: ContactPartner::Rigid {
            velocity_change: impulse.normalize_or_zero() * -10.0,
        },
    }
}

fn total_mass(world: &StructuralWorld) -> f32 {
    world
        .handles()
        .into_iter()
        .filter_map(|h| world.with_body(h, |b| b.mass()))
        .sum()
}

#[test]
fn runaway_hit_does_not_fling_the_fragment() {
    let world = world();
    let drift = Velocity::new(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
    let handle = world.add_body(StructuralBody::new(chain(JointLimits::uniform(100.0))).with_velocity(drift));
    let contact = ContactReport {
        point: Vec3::new(-1.0, 0.0, 0.0),
        ..hit(handle, 0, Vec3::new(-1.0e5, 0.0, 0.0))
    };
    world.accumulate_contact(&contact).unwrap();

    let report = world.step(DT);
    assert_eq!(report.bodies_created.len(), 1);
    let velocity = world.with_body(report.bodies_created[0], |b| b.velocity).unwrap();
    let cap = StructureConfig::default().shockwave_mass_cap;
    assert!((velocity.linear - drift.linear).length() <= cap + 1e-4);
    assert_relative_eq!(velocity.linear.z, 1.0, epsilon = 1e-4);
    assert!(velocity.linear.x < 0.0);
}

#[test]
fn overloaded_chain_link_detaches_the_pulled_end() {
    let world = world();
    let handle = world.add_body(StructuralBody::new(chain(JointLimits::uniform(100.0))));
    let contact = ContactReport {
        point: Vec3::new(-1.0, 0.0, 0.0),
        ..hit(handle, 0, Vec3::new(-150.0, 0.0, 0.0))
    };
    world.accumulate_contact(&contact).unwrap();

    let report = world.step(DT);
    assert_eq!(report.joints_broken, 1);
    assert_eq!(report.bodies_created.len(), 1);
    assert_eq!(world.body_count(), 2);

    let events = world.drain_events();
    let broken: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StructureEvent::JointBroken(b) => Some(b),
            _ => None,
        })
        .collect();
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].joint, 1);
    let mut sides = broken[0].parts;
    sides.sort_unstable();
    assert_eq!(sides, [0, 1]);

    let created: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StructureEvent::EntityPartCreated(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].source, handle);
    assert_eq!(created[0].source_part, 0);
    assert_eq!(created[0].reason, CreationReason::JointsBroken);
    // The capped shockwave is the only load the fragment leaves with.
    assert_relative_eq!(created[0].impulse.x, -4.0, epsilon = 1e-4);
    assert_relative_eq!(created[0].velocity.linear.x, -4.0, epsilon = 1e-4);

    let (ids, joint_ids) = world
        .with_body(handle, |b| {
            (
                b.structure.parts.iter().map(|p| p.id).collect::<Vec<_>>(),
                b.structure.joints.iter().map(|j| j.id).collect::<Vec<_>>(),
            )
        })
        .unwrap();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(joint_ids, vec![2]);
    assert_relative_eq!(total_mass(&world), 3.0, epsilon = 1e-5);
}

#[test]
fn world_anchored_chain_keeps_the_anchored_side() {
    let mut state = chain(JointLimits::uniform(100.0));
    state.joints[1].limits = JointLimits::uniform(1000.0);
    state
        .add_joint(StructuralJoint::to_world(3, 2, Vec3::new(1.5, 0.0, 0.0), -Vec3::X).with_limits(JointLimits::UNBREAKABLE))
        .unwrap();
    let world = world();
    let handle = world.add_body(StructuralBody::new(state));
    world
        .accumulate_contact(&hit(handle, 0, Vec3::new(-150.0, 0.0, 0.0)))
        .unwrap();

    let report = world.step_entity(handle, DT).unwrap();
    assert_eq!(report.joints_broken, 1);
    assert_eq!(report.bodies_created.len(), 1);
    let spawned_ids = world
        .with_body(report.bodies_created[0], |b| b.structure.parts.iter().map(|p| p.id).collect::<Vec<_>>())
        .unwrap();
    assert_eq!(spawned_ids, vec![0]);
}

#[test]
fn unbreakable_joints_never_break() {
    let world = world();
    let handle = world.add_body(StructuralBody::new(chain(JointLimits::UNBREAKABLE)));
    for _ in 0..10 {
        world
            .accumulate_contact(&hit(handle, 0, Vec3::new(-1.0e6, 3.0e5, 0.0)))
            .unwrap();
        world
            .accumulate_contact(&hit(handle, 2, Vec3::new(1.0e6, 0.0, -2.0e5)))
            .unwrap();
        let report = world.step(DT);
        assert_eq!(report.joints_broken, 0);
        assert!(report.bodies_created.is_empty());
    }
    assert_eq!(world.body_count(), 1);
    assert!(world
        .drain_events()
        .iter()
        .all(|e| !matches!(e, StructureEvent::JointBroken(_))));
    let joints = world.with_body(handle, |b| b.structure.joint_count()).unwrap();
    assert_eq!(joints, 2);
}

#[test]
fn tick_without_load_changes_nothing() {
    let world = world();
    let handle = world.add_body(StructuralBody::new(chain(JointLimits::uniform(100.0))));
    let before = world.with_body(handle, |b| b.structure.modified).unwrap();

    let report = world.step(DT);
    assert!(report.phases.is_empty());

    // Even a forced entity tick with nothing pending only accumulates.
    let report = world.step_entity(handle, DT).unwrap();
    assert_eq!(report.phases, vec![StructurePhase::Accumulating, StructurePhase::Idle]);
    assert_eq!(report.joints_broken, 0);
    assert!(!report.changed_topology());

    let after = world.with_body(handle, |b| b.structure.modified).unwrap();
    assert_eq!(before, after);
    assert!(world.drain_events().is_empty());
    assert_eq!(world.body_count(), 1);
}

#[test]
fn disconnected_mesh_splits_into_one_new_body_per_fragment() {
    let a = TriangleMesh::cuboid(Vec3::new(-1.0, 0.0, 0.0), Vec3::splat(0.5));
    let b = TriangleMesh::cuboid(Vec3::new(1.0, 0.0, 0.0), Vec3::splat(0.5));
    let mesh = Arc::new(TriangleMesh::merge(&[&a, &b]));
    let original_volume = mesh.mass_properties().volume;

    let mut state = StructuralState::new();
    state
        .add_part(Part::new(0, mesh, 2.0).with_flags(PartFlags::COLLIDES | PartFlags::STRUCTURE_CHANGES))
        .unwrap();
    let config = StructureConfig::default()
        .with_gravity(Vec3::ZERO)
        .with_mesh_check_interval(0.05);
    let world = StructuralWorld::new(config).unwrap();
    let handle = world.add_body(
        StructuralBody::new(state).with_velocity(Velocity::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO)),
    );

    let report = world.step(0.05);
    assert_eq!(report.mesh_splits, 1);
    assert_eq!(report.bodies_created.len(), 1);

    let events = world.drain_events();
    let created: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StructureEvent::EntityPartCreated(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].reason, CreationReason::MeshSplit);
    assert!(!created[0].invalid);
    assert!(created[0].cut.is_some());
    assert_relative_eq!(created[0].velocity.linear.z, 3.0, epsilon = 1e-4);
    assert!(events.iter().any(|e| matches!(e, StructureEvent::MeshUpdated(u) if u.part == 0)));

    let kept = world.with_body(handle, |b| b.structure.parts[0].volume()).unwrap();
    let split = world
        .with_body(report.bodies_created[0], |b| b.structure.parts[0].volume())
        .unwrap();
    assert!(kept + split >= 0.998 * original_volume);
    assert_relative_eq!(total_mass(&world), 2.0, epsilon = 1e-4);
}
