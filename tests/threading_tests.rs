use approx::assert_relative_eq;
use std::sync::Arc;
use std::thread;
use structural_integrity::{
    ContactPartner, ContactReport, JointLimits, Part, StructuralBody, StructuralJoint, StructuralState,
    StructuralWorld, StructureConfig, Transform, TriangleMesh, Vec3,
};

fn tower() -> StructuralState {
    let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
    let mut state = StructuralState::new();
    for i in 0..2 {
        state
            .add_part(Part::new(i, mesh.clone(), 1.0).with_transform(Transform::from_position(Vec3::new(0.0, i as f32, 0.0))))
            .unwrap();
    }
    state
        .add_joint(StructuralJoint::between(-1, 1, 0, Vec3::new(0.0, 0.5, 0.0), Vec3::Y).with_limits(JointLimits::UNBREAKABLE))
        .unwrap();
    state
}

#[test]
fn test_structural_world_is_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<StructuralWorld>();
}

#[test]
fn test_contacts_accumulate_from_many_threads() {
    let world = Arc::new(StructuralWorld::new(StructureConfig::default()).unwrap());
    let body = world.add_body(StructuralBody::new(tower()));

    let mut handles = vec![];
    for t in 0..4 {
        let world = Arc::clone(&world);
        handles.push(thread::spawn(move || {
            for _ in 0..250 {
                world
                    .accumulate_contact(&ContactReport {
                        body,
                        part_id: t % 2,
                        point: Vec3::new(0.0, (t % 2) as f32, 0.0),
                        impulse: Vec3::new(0.0, -0.01, 0.0),
                        partner: ContactPartner::Static,
                    })
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let pending = world
        .with_body(body, |b| {
            b.structure
                .parts
                .iter()
                .map(|p| p.accum.peek().indirect_linear.y)
                .sum::<f32>()
        })
        .unwrap();
    assert_relative_eq!(pending, -10.0, epsilon = 1e-3);
    assert!(world.with_body(body, |b| b.is_deforming()).unwrap());

    let report = world.step(1.0 / 60.0);
    assert_eq!(report.joints_broken, 0);
    let drained = world
        .with_body(body, |b| b.structure.parts.iter().all(|p| p.accum.is_zero()))
        .unwrap();
    assert!(drained);
}

#[test]
fn test_worlds_step_independently_on_threads() {
    let mut handles = vec![];
    for _ in 0..4 {
        handles.push(thread::spawn(|| {
            let world = StructuralWorld::new(StructureConfig::default()).unwrap();
            let body = world.add_body(StructuralBody::new(tower()));
            world.apply_impulse_at(body, 1, Vec3::new(0.0, 1.0, 0.0), Vec3::X).unwrap();
            world.step(1.0 / 60.0).phases.len()
        }));
    }
    for handle in handles {
        assert!(handle.join().unwrap() > 0);
    }
}
