use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use structural_integrity::{
    dynamics::{IslandAnalyzer, JointRelaxationSolver, SolveFrame, SolverScratch},
    core::PendingImpulse,
    *,
};

const DT: f32 = 1.0 / 60.0;

/// `side x side` wall of unit blocks, bottom row anchored, neighbours jointed.
fn wall(side: usize, limit: f32) -> StructuralState {
    let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
    let mut state = StructuralState::new();
    for y in 0..side {
        for x in 0..side {
            let id = (y * side + x) as i32;
            state
                .add_part(
                    Part::new(id, mesh.clone(), 1.0)
                        .with_transform(Transform::from_position(Vec3::new(x as f32, y as f32, 0.0))),
                )
                .expect("unique part id");
        }
    }
    for y in 0..side {
        for x in 0..side {
            let i = y * side + x;
            let here = Vec3::new(x as f32, y as f32, 0.0);
            if x + 1 < side {
                state
                    .add_joint(
                        StructuralJoint::between(-1, i + 1, i, here + Vec3::X * 0.5, Vec3::X)
                            .with_limits(JointLimits::uniform(limit)),
                    )
                    .expect("valid joint");
            }
            if y + 1 < side {
                state
                    .add_joint(
                        StructuralJoint::between(-1, i + side, i, here + Vec3::Y * 0.5, Vec3::Y)
                            .with_limits(JointLimits::uniform(limit)),
                    )
                    .expect("valid joint");
            }
            if y == 0 {
                state
                    .add_joint(StructuralJoint::to_world(-1, i, here - Vec3::Y * 0.5, Vec3::Y))
                    .expect("valid joint");
            }
        }
    }
    state
}

fn bench_relaxation(c: &mut Criterion) {
    let mut group = c.benchmark_group("joint_relaxation");
    let solver = JointRelaxationSolver::from_config(&StructureConfig::default());
    for &side in &[8usize, 16, 32] {
        group.bench_with_input(BenchmarkId::new("wall", side), &side, |b, &side| {
            let mut state = wall(side, f32::INFINITY);
            let mut scratch = SolverScratch::new();
            let mut pending = vec![PendingImpulse::default(); side * side];
            pending[side * side - 1].direct_linear = Vec3::new(0.0, 0.0, 50.0);
            b.iter(|| {
                let frame = SolveFrame {
                    dt: DT,
                    rotation: Quat::IDENTITY,
                    pending: &pending,
                    epicenter: None,
                    test_run: true,
                    forced: false,
                };
                black_box(solver.solve(&mut state, &mut scratch, &frame))
            })
        });
    }
    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("island_partition");
    for &side in &[16usize, 64] {
        group.bench_with_input(BenchmarkId::new("wall", side), &side, |b, &side| {
            let mut state = wall(side, 100.0);
            // Cut the wall in half horizontally.
            for joint in state.joints.iter_mut() {
                if let [Some(upper), Some(lower)] = joint.parts {
                    joint.broken = upper / side == side / 2 && lower / side == side / 2 - 1;
                }
            }
            let mut analyzer = IslandAnalyzer::new();
            let mut scratch = SolverScratch::new();
            b.iter(|| black_box(analyzer.partition(&mut state, &mut scratch)))
        });
    }
    group.finish();
}

fn bench_world_fracture(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_fracture");
    for &side in &[8usize, 16] {
        group.bench_with_input(BenchmarkId::new("impact", side), &side, |b, &side| {
            b.iter(|| {
                let world = StructuralWorld::new(StructureConfig::default()).expect("valid config");
                let handle = world.add_body(StructuralBody::new(wall(side, 50.0)));
                let top = (side * side - 1) as i32;
                world
                    .apply_impulse_at(handle, top, Vec3::ZERO, Vec3::new(0.0, 0.0, 400.0))
                    .expect("known part");
                black_box(world.step(black_box(DT)))
            })
        });
    }
    group.finish();
}

fn bench_mesh_islands(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_islands");
    for &count in &[4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("blocks", count), &count, |b, &count| {
            let blocks: Vec<TriangleMesh> = (0..count)
                .map(|i| TriangleMesh::cuboid(Vec3::new(i as f32 * 2.0, 0.0, 0.0), Vec3::splat(0.5)))
                .collect();
            let refs: Vec<&TriangleMesh> = blocks.iter().collect();
            let mesh = TriangleMesh::merge(&refs);
            b.iter(|| black_box(mesh.split_into_islands(&[], true)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_relaxation,
    bench_partition,
    bench_world_fracture,
    bench_mesh_islands
);
criterion_main!(benches);
