use std::sync::Arc;

use structural_integrity::{
    BodyHandle, ContactPartner, ContactReport, ForcedBreak, JointFlags, JointLimits, Part, StructuralBody,
    StructuralJoint, StructuralState, StructuralWorld, StructureConfig, StructureEvent, StructurePhase, Transform,
    TriangleMesh, Vec3,
};

const DT: f32 = 0.01;

fn world() -> StructuralWorld {
    StructuralWorld::new(StructureConfig::default().with_gravity(Vec3::ZERO)).unwrap()
}

/// Part 0 at the origin held by the world, part 1 at +X hanging off it.
fn cantilever(joint: StructuralJoint) -> StructuralState {
    let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
    let mut state = StructuralState::new();
    for (id, x) in [(0, 0.0), (1, 1.0)] {
        state
            .add_part(Part::new(id, mesh.clone(), 1.0).with_transform(Transform::from_position(Vec3::new(x, 0.0, 0.0))))
            .unwrap();
    }
    state
        .add_joint(StructuralJoint::to_world(-1, 0, Vec3::new(-0.5, 0.0, 0.0), Vec3::X).with_limits(JointLimits::UNBREAKABLE))
        .unwrap();
    state.add_joint(joint).unwrap();
    state
}

fn link() -> StructuralJoint {
    StructuralJoint::between(7, 1, 0, Vec3::new(0.5, 0.0, 0.0), Vec3::X).with_limits(JointLimits::uniform(100.0))
}

fn lean(handle: BodyHandle, magnitude: f32) -> ContactReport {
    ContactReport {
        body: handle,
        part_id: 1,
        point: Vec3::new(1.0, 0.0, 0.0),
        impulse: Vec3::new(magnitude, 0.0, 0.0),
        partner: ContactPartner::Static,
    }
}

#[test]
fn sub_limit_load_holds_without_damage() {
    let world = world();
    let handle = world.add_body(StructuralBody::new(cantilever(link())));
    for _ in 0..10 {
        world.accumulate_contact(&lean(handle, 0.4)).unwrap();
        let report = world.step(DT);
        assert_eq!(report.joints_broken, 0);
    }
    assert_eq!(world.body_count(), 1);
}

#[test]
fn residual_load_wears_a_joint_through() {
    let world = world();
    let handle = world.add_body(StructuralBody::new(cantilever(link().with_damage(1.0, 0.0))));

    let mut broke_at = None;
    for tick in 0..10 {
        world.accumulate_contact(&lean(handle, 0.4)).unwrap();
        let report = world.step(DT);
        if report.joints_broken > 0 {
            broke_at = Some(tick);
            break;
        }
        let residual = world
            .with_body(handle, |b| b.structure.joints[1].p_accum.length())
            .unwrap();
        assert!(residual > 0.0);
    }
    let tick = broke_at.expect("accumulated damage should break the joint");
    assert!(tick >= 1, "a single sub-limit load must not break the joint");
    assert_eq!(world.body_count(), 2);
}

#[test]
fn direct_hit_breaks_flagged_joint_without_solving() {
    let world = world();
    let joint = link().with_flags(JointFlags::BREAKABLE | JointFlags::DIRECT_BREAKS_ONLY);
    let handle = world.add_body(StructuralBody::new(cantilever(joint)));

    // 1% of the 100 N pull limit triggers the break.
    let broke = world
        .request_break(handle, ForcedBreak::new(1, Vec3::new(2.0, 0.0, 0.0)).at_point(Vec3::new(0.6, 0.0, 0.0)))
        .unwrap();
    assert!(broke);
    assert!(world.with_body(handle, |b| b.has_forced_break()).unwrap());

    let report = world.step_entity(handle, DT).unwrap();
    assert_eq!(
        report.phases,
        vec![
            StructurePhase::PartitioningIfBroken,
            StructurePhase::Materializing,
            StructurePhase::Idle,
        ]
    );
    assert_eq!(report.bodies_created.len(), 1);

    let events = world.drain_events();
    let broken: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StructureEvent::JointBroken(b) => Some(b),
            _ => None,
        })
        .collect();
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].joint, 7);
    assert_eq!(broken[0].epicenter, Some(1));
}

#[test]
fn weak_direct_hit_only_schedules_a_solve() {
    let world = world();
    let joint = link().with_flags(JointFlags::BREAKABLE | JointFlags::DIRECT_BREAKS_ONLY);
    let handle = world.add_body(StructuralBody::new(cantilever(joint)));

    let broke = world
        .request_break(handle, ForcedBreak::new(1, Vec3::new(0.5, 0.0, 0.0)))
        .unwrap();
    assert!(!broke);

    // Direct-break joints still carry load but never break in the solver.
    let report = world.step_entity(handle, DT).unwrap();
    assert_eq!(
        report.phases,
        vec![StructurePhase::Solving, StructurePhase::Idle]
    );
    assert_eq!(report.joints_broken, 0);
    assert_eq!(world.body_count(), 1);
}

#[test]
fn break_request_on_unknown_body_fails() {
    let world = world();
    let err = world.request_break(BodyHandle::default(), ForcedBreak::new(0, Vec3::X));
    assert!(err.is_err());
}

#[test]
fn light_part_on_heavy_body_still_triggers_a_solve() {
    let world = StructuralWorld::new(StructureConfig::default()).unwrap();
    let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
    let mut state = StructuralState::new();
    state.add_part(Part::new(0, mesh.clone(), 1000.0)).unwrap();
    state
        .add_part(Part::new(1, mesh, 1.0).with_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0))))
        .unwrap();
    state.add_joint(link()).unwrap();
    let handle = world.add_body(StructuralBody::new(state));

    // 5 N·s is far below 1 % of the body's weight but well above the joint's 1 N·s per tick.
    world
        .accumulate_contact(&ContactReport {
            partner: ContactPartner::Rigid {
                velocity_change: Vec3::new(-10.0, 0.0, 0.0),
            },
            ..lean(handle, 5.0)
        })
        .unwrap();
    assert_eq!(world.with_body(handle, |b| b.is_deforming()), Some(true));

    let report = world.step(DT);
    assert!(report.phases.contains(&StructurePhase::Solving));
    assert_eq!(report.joints_broken, 1);
    assert_eq!(world.body_count(), 2);
}
