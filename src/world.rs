use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use parking_lot::{Mutex, RwLock};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::broadphase::BroadPhase,
    config::{StructureConfig, DEFAULT_TICK_BUDGET_MS},
    core::{
        mesh::Aabb,
        part::PendingImpulse,
        structure::StructuralState,
        types::{Plane, Transform, Velocity},
    },
    dynamics::{
        accumulation::{accumulate, classify, exceeds_deform_threshold, ContactReport, ImpulseClass},
        damage::{map_hit_to_child, try_direct_break, ForcedBreak},
        island::IslandAnalyzer,
        solver::{JointRelaxationSolver, SolveFrame, SolverScratch},
    },
    error::{Result, StructureError},
    events::{EntityPartCreated, EventCollector, StructureEvent, StructureEventHandler},
    fracture::{
        broken_joint_events, calibrate_limits, generate_joints, materialize_islands, split_part_meshes,
        SpawnedBody, SplitContext,
    },
    utils::{
        allocator::{Arena, BodyHandle},
        logging::{ScopedTimer, TickBudget},
        profiling::{PhaseTimer, StructureProfiler},
    },
};

/// Where an entity is in its structural tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructurePhase {
    #[default]
    Idle,
    Accumulating,
    Solving,
    PartitioningIfBroken,
    Materializing,
}

/// Rigid body carrying a structural graph.
#[derive(Debug)]
pub struct StructuralBody {
    pub pose: Transform,
    pub velocity: Velocity,
    pub is_static: bool,
    pub awake: bool,
    pub structure: StructuralState,
    deforming: AtomicBool,
    phase: StructurePhase,
    forced: Option<ForcedBreak>,
    direct_hit: bool,
}

impl StructuralBody {
    pub fn new(structure: StructuralState) -> Self {
        Self {
            pose: Transform::default(),
            velocity: Velocity::default(),
            is_static: false,
            awake: true,
            structure,
            deforming: AtomicBool::new(false),
            phase: StructurePhase::Idle,
            forced: None,
            direct_hit: false,
        }
    }

    pub fn with_pose(mut self, pose: Transform) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn phase(&self) -> StructurePhase {
        self.phase
    }

    /// Pending load crossed the deform threshold since the last tick.
    pub fn is_deforming(&self) -> bool {
        self.deforming.load(Ordering::Acquire)
    }

    pub fn mark_deforming(&self) {
        self.deforming.store(true, Ordering::Release);
    }

    pub fn has_forced_break(&self) -> bool {
        self.forced.is_some() || self.direct_hit
    }

    pub fn mass(&self) -> f32 {
        self.structure.total_mass()
    }

    /// Union of part bounds in world space.
    pub fn world_bounds(&self) -> Aabb {
        self.structure
            .parts
            .iter()
            .fold(Aabb::empty(), |acc, p| acc.merged(&p.local_bounds().transformed(&self.pose)))
    }

    fn needs_tick(&self) -> bool {
        self.is_deforming()
            || self.has_forced_break()
            || self.structure.deferred_split
            || self.structure.parts.iter().any(|p| p.flags.structure_changes())
    }

    fn enter(&mut self, phase: StructurePhase, report: &mut TickReport) {
        log::debug!("structure phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        report.phases.push(phase);
    }

    fn tick(&mut self, cx: &mut TickContext<'_>) -> (TickReport, Vec<SpawnedBody>) {
        let mut report = TickReport::default();
        let mut spawned = Vec::new();
        let config = cx.config;

        let forced = self.forced.take();
        let direct_hit = std::mem::take(&mut self.direct_hit);
        if forced.is_none() {
            self.enter(StructurePhase::Accumulating, &mut report);
        }
        if self.structure.fold_merge_placeholders() > 0 {
            log::debug!("folded merge placeholders on entity {:?}", cx.entity);
        }
        let mut pending: Vec<PendingImpulse> = self.structure.parts.iter().map(|p| p.accum.take()).collect();
        if let Some(request) = &forced {
            if let Some(i) = self.structure.part_index(request.part_id) {
                pending[i].direct_linear += request.impulse;
                pending[i].direct_angular += request.angular_impulse;
            }
        }
        let deforming = self.deforming.swap(false, Ordering::AcqRel);
        let epicenter = self.structure.epicenter.and_then(|id| self.structure.part_index(id));

        let mut broken: Vec<usize> = Vec::new();
        if direct_hit {
            broken = (0..self.structure.joints.len())
                .filter(|&j| self.structure.joints[j].broken)
                .collect();
        } else if forced.is_some() || deforming {
            self.enter(StructurePhase::Solving, &mut report);
            let frame = SolveFrame {
                dt: cx.dt,
                rotation: self.pose.rotation,
                pending: &pending,
                epicenter,
                test_run: false,
                forced: forced.is_some(),
            };
            let solve = {
                let _timer = ScopedTimer::new("structure::solve", cx.entity);
                let _phase = PhaseTimer::new(&mut cx.profile.solve_time);
                cx.solver.solve(&mut self.structure, cx.scratch, &frame)
            };
            report.passes = solve.passes;
            report.joints_solved = solve.joints_solved;
            cx.profile.joints_solved += solve.joints_solved;
            broken = solve.broken;
        }

        if !broken.is_empty() {
            report.joints_broken = broken.len();
            cx.profile.joints_broken += broken.len();
            for event in broken_joint_events(&self.structure, &broken, &self.pose, cx.entity) {
                cx.events.push(StructureEvent::JointBroken(event));
            }
        }

        let split_ctx = SplitContext {
            config,
            dt: cx.dt,
            pose: self.pose,
            velocity: self.velocity,
            is_static: self.is_static,
            pending: &pending,
        };

        if !broken.is_empty() || self.structure.deferred_split {
            self.enter(StructurePhase::PartitioningIfBroken, &mut report);
            let map = {
                let _timer = ScopedTimer::new("structure::partition", cx.entity);
                let _phase = PhaseTimer::new(&mut cx.profile.partition_time);
                cx.analyzer.partition(&mut self.structure, cx.scratch)
            };
            if map.detaches_anything() || !map.revealed.is_empty() {
                self.enter(StructurePhase::Materializing, &mut report);
                let _timer = ScopedTimer::new("structure::materialize", cx.entity);
                let _phase = PhaseTimer::new(&mut cx.profile.materialize_time);
                let outcome = materialize_islands(&mut self.structure, &map, &split_ctx, cx.entity, cx.events);
                report.parts_removed += outcome.removed_parents
                    + outcome.spawned.iter().map(|s| s.state.part_count()).sum::<usize>();
                report.parts_deferred += outcome.deferred_parts;
                spawned.extend(outcome.spawned);
            } else {
                self.structure.deferred_split = false;
                self.structure.compact_broken_joints();
            }
        }

        let changing = self.structure.parts.iter().any(|p| p.flags.structure_changes());
        if changing {
            self.structure.split_timer += cx.dt;
            if self.structure.split_timer >= config.mesh_check_interval {
                self.structure.split_timer = 0.0;
                let _timer = ScopedTimer::new("structure::mesh_split", cx.entity);
                let _phase = PhaseTimer::new(&mut cx.profile.mesh_split_time);
                let outcome = split_part_meshes(&mut self.structure, cx.ground, &split_ctx, cx.entity, cx.events);
                if outcome.parts_split > 0 {
                    if self.phase != StructurePhase::Materializing {
                        self.enter(StructurePhase::Materializing, &mut report);
                    }
                    report.mesh_splits += outcome.parts_split;
                    report.discarded_mass += outcome.discarded_mass;
                    cx.profile.mesh_splits += outcome.parts_split;
                }
                report.parts_deferred += outcome.deferred_parts;
                spawned.extend(outcome.spawned);
            }
        } else {
            self.structure.explosion = None;
        }

        self.structure.last_broken = broken.len();
        self.structure.epicenter = None;
        self.enter(StructurePhase::Idle, &mut report);
        (report, spawned)
    }
}

/// Summary of what structural ticks did.
#[derive(Debug, Default, Clone)]
pub struct TickReport {
    /// Phases entered, in order.
    pub phases: Vec<StructurePhase>,
    pub passes: u32,
    pub joints_solved: usize,
    pub joints_broken: usize,
    pub bodies_created: Vec<BodyHandle>,
    pub parts_removed: usize,
    pub parts_deferred: usize,
    pub mesh_splits: usize,
    pub discarded_mass: f32,
    /// Neighbours woken because a new body appeared next to them.
    pub woken: Vec<BodyHandle>,
}

impl TickReport {
    pub fn merge(&mut self, other: TickReport) {
        self.phases.extend(other.phases);
        self.passes = self.passes.max(other.passes);
        self.joints_solved += other.joints_solved;
        self.joints_broken += other.joints_broken;
        self.bodies_created.extend(other.bodies_created);
        self.parts_removed += other.parts_removed;
        self.parts_deferred += other.parts_deferred;
        self.mesh_splits += other.mesh_splits;
        self.discarded_mass += other.discarded_mass;
        self.woken.extend(other.woken);
    }

    pub fn changed_topology(&self) -> bool {
        !self.bodies_created.is_empty() || self.parts_removed > 0 || self.mesh_splits > 0
    }
}

struct TickContext<'a> {
    config: &'a StructureConfig,
    solver: &'a JointRelaxationSolver,
    scratch: &'a mut SolverScratch,
    analyzer: &'a mut IslandAnalyzer,
    ground: &'a [Plane],
    dt: f32,
    entity: BodyHandle,
    events: &'a mut Vec<StructureEvent>,
    profile: &'a mut StructureProfiler,
}

/// Warm buffers shared by every entity tick; held for the whole solve-and-fracture pass.
#[derive(Debug, Default)]
struct SolveWorkspace {
    scratch: SolverScratch,
    analyzer: IslandAnalyzer,
}

/// Entity table and tick driver for structural bodies.
///
/// Lock order: solve workspace, bodies, spatial grid, events, profiler.
pub struct StructuralWorld {
    config: StructureConfig,
    solver: JointRelaxationSolver,
    bodies: RwLock<Arena<StructuralBody>>,
    workspace: Mutex<SolveWorkspace>,
    spatial: Mutex<BroadPhase>,
    events: Mutex<EventCollector>,
    profiler: Mutex<StructureProfiler>,
    ground: RwLock<Vec<Plane>>,
}

impl StructuralWorld {
    pub fn new(config: StructureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            solver: JointRelaxationSolver::from_config(&config),
            spatial: Mutex::new(BroadPhase::new(config.broadphase_cell_size)),
            config,
            bodies: RwLock::new(Arena::new()),
            workspace: Mutex::new(SolveWorkspace::default()),
            events: Mutex::new(EventCollector::new()),
            profiler: Mutex::new(StructureProfiler::default()),
            ground: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &StructureConfig {
        &self.config
    }

    pub fn add_body(&self, body: StructuralBody) -> BodyHandle {
        let bounds = body.world_bounds();
        let handle = self.bodies.write().insert(body);
        self.spatial.lock().update(handle, bounds);
        log::debug!("added structural body {:?}", handle);
        handle
    }

    pub fn remove_body(&self, handle: BodyHandle) -> Option<StructuralBody> {
        let body = self.bodies.write().remove(handle);
        self.spatial.lock().remove(handle);
        body
    }

    pub fn body_count(&self) -> usize {
        self.bodies.read().len()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.read().contains(handle)
    }

    pub fn handles(&self) -> Vec<BodyHandle> {
        self.bodies.read().handles()
    }

    pub fn with_body<R>(&self, handle: BodyHandle, f: impl FnOnce(&StructuralBody) -> R) -> Option<R> {
        self.bodies.read().get(handle).map(f)
    }

    /// Mutable access; spatial registration is refreshed afterwards.
    pub fn with_body_mut<R>(&self, handle: BodyHandle, f: impl FnOnce(&mut StructuralBody) -> R) -> Option<R> {
        let mut bodies = self.bodies.write();
        let body = bodies.get_mut(handle)?;
        let result = f(body);
        let bounds = body.world_bounds();
        self.spatial.lock().update(handle, bounds);
        Some(result)
    }

    /// Copies pose and velocity from the external integrator.
    pub fn sync_body(&self, handle: BodyHandle, pose: Transform, velocity: Velocity) -> Result<()> {
        self.with_body_mut(handle, |body| {
            body.pose = pose;
            body.velocity = velocity;
        })
        .ok_or(StructureError::UnknownEntity(handle))
    }

    pub fn add_ground_plane(&self, plane: Plane) {
        self.ground.write().push(plane);
    }

    /// Bodies whose bounds overlap `area`.
    pub fn overlapping(&self, area: &Aabb) -> Vec<BodyHandle> {
        self.spatial.lock().query_overlaps(area)
    }

    /// Feeds one resolved contact into the part's accumulators.
    ///
    /// Only takes shared locks and may run from any number of threads.
    pub fn accumulate_contact(&self, contact: &ContactReport) -> Result<ImpulseClass> {
        let bodies = self.bodies.read();
        let body = bodies
            .get(contact.body)
            .ok_or(StructureError::UnknownEntity(contact.body))?;
        let part = body
            .structure
            .part_by_id(contact.part_id)
            .ok_or(StructureError::UnknownPart(contact.part_id))?;

        let class = classify(&contact.partner, self.config.indirect_velocity_threshold);
        let com_world = body.pose.transform_point(part.center_of_mass());
        let impulse = contact.impulse * self.config.break_impulse_scale;
        accumulate(part, com_world, contact.point, impulse, class);

        if exceeds_deform_threshold(part, self.config.gravity) {
            body.mark_deforming();
        }
        Ok(class)
    }

    /// Accumulates a batch of contacts; returns how many landed on a known part.
    pub fn accumulate_contacts(&self, contacts: &[ContactReport]) -> usize {
        #[cfg(feature = "parallel")]
        let accepted = contacts
            .par_iter()
            .filter(|c| self.accumulate_contact(c).is_ok())
            .count();
        #[cfg(not(feature = "parallel"))]
        let accepted = contacts
            .iter()
            .filter(|c| self.accumulate_contact(c).is_ok())
            .count();
        if accepted < contacts.len() {
            log::warn!("dropped {} contacts on unknown parts", contacts.len() - accepted);
        }
        accepted
    }

    /// Gameplay impulse at a world point, treated as a direct hit.
    pub fn apply_impulse_at(&self, handle: BodyHandle, part_id: i32, point: Vec3, impulse: Vec3) -> Result<()> {
        let bodies = self.bodies.read();
        let body = bodies.get(handle).ok_or(StructureError::UnknownEntity(handle))?;
        let part = body
            .structure
            .part_by_id(part_id)
            .ok_or(StructureError::UnknownPart(part_id))?;
        let com_world = body.pose.transform_point(part.center_of_mass());
        accumulate(
            part,
            com_world,
            point,
            impulse * self.config.break_impulse_scale,
            ImpulseClass::Direct,
        );
        body.mark_deforming();
        Ok(())
    }

    /// Schedules a one-shot break; returns true when a direct-break joint already gave way.
    pub fn request_break(&self, handle: BodyHandle, request: ForcedBreak) -> Result<bool> {
        let mut bodies = self.bodies.write();
        let body = bodies.get_mut(handle).ok_or(StructureError::UnknownEntity(handle))?;
        let index = body
            .structure
            .part_index(request.part_id)
            .ok_or(StructureError::UnknownPart(request.part_id))?;

        let point = request
            .point
            .unwrap_or_else(|| body.pose.transform_point(body.structure.parts[index].center_of_mass()));
        let local = body.pose.inverse_transform_point(point);
        let target = map_hit_to_child(&body.structure, index, local);

        let mut request = request;
        request.impulse *= self.config.break_impulse_scale;
        request.angular_impulse *= self.config.break_impulse_scale;
        request.part_id = body.structure.parts[target].id;

        let direct = try_direct_break(&mut body.structure, target, local, request.impulse.length()).is_some();
        body.direct_hit |= direct;
        body.structure.epicenter = Some(request.part_id);
        if request.explosion.is_some() {
            body.structure.explosion = request.explosion;
        }
        body.forced = Some(request);
        body.awake = true;
        log::debug!(
            "forced break on entity {:?} part {} (direct hit: {})",
            handle,
            request.part_id,
            direct
        );
        Ok(direct)
    }

    /// Infers joints from part overlap and calibrates them with any probes.
    ///
    /// Returns `(joints created, joints calibrated)`.
    pub fn generate_joints(&self, handle: BodyHandle, dt: f32) -> Result<(usize, usize)> {
        let mut workspace = self.workspace.lock();
        let mut bodies = self.bodies.write();
        let body = bodies.get_mut(handle).ok_or(StructureError::UnknownEntity(handle))?;
        let created = generate_joints(&mut body.structure);
        let calibrated = calibrate_limits(&mut body.structure, &self.solver, &mut workspace.scratch, dt);
        Ok((created, calibrated))
    }

    /// Ticks every entity with pending structural work.
    pub fn step(&self, dt: f32) -> TickReport {
        let handles: Vec<BodyHandle> = self
            .bodies
            .read()
            .iter()
            .filter(|(_, body)| body.needs_tick())
            .map(|(handle, _)| handle)
            .collect();

        let mut report = TickReport::default();
        for handle in handles {
            match self.step_entity(handle, dt) {
                Ok(entity_report) => report.merge(entity_report),
                Err(err) => log::warn!("skipping structural tick: {err}"),
            }
        }
        report
    }

    /// Runs one full structural tick on a single entity.
    pub fn step_entity(&self, handle: BodyHandle, dt: f32) -> Result<TickReport> {
        let budget = TickBudget::start(DEFAULT_TICK_BUDGET_MS);
        let ground = self.ground.read().clone();
        let mut events = Vec::new();
        let mut profile = StructureProfiler {
            ticks: 1,
            ..StructureProfiler::default()
        };

        let mut workspace = self.workspace.lock();
        let SolveWorkspace { scratch, analyzer } = &mut *workspace;
        let mut bodies = self.bodies.write();

        let (mut report, spawned, source_bounds) = {
            let body = bodies.get_mut(handle).ok_or(StructureError::UnknownEntity(handle))?;
            let mut cx = TickContext {
                config: &self.config,
                solver: &self.solver,
                scratch,
                analyzer,
                ground: &ground,
                dt,
                entity: handle,
                events: &mut events,
                profile: &mut profile,
            };
            let (report, spawned) = body.tick(&mut cx);
            if !spawned.is_empty() || report.changed_topology() {
                body.awake = true;
            }
            (report, spawned, body.world_bounds())
        };

        let mut created = Vec::with_capacity(spawned.len());
        for body in spawned {
            let new_body = StructuralBody::new(body.state)
                .with_pose(body.pose)
                .with_velocity(body.velocity);
            let new_handle = bodies.insert(new_body);
            for part in body.parts {
                events.push(StructureEvent::EntityPartCreated(EntityPartCreated {
                    source: handle,
                    source_part: part.source_part,
                    entity: new_handle,
                    part: part.part,
                    impulse: body.impulse,
                    angular_impulse: body.angular_impulse,
                    velocity: body.velocity,
                    reason: body.reason,
                    invalid: part.invalid,
                    cut: part.cut,
                }));
            }
            created.push(new_handle);
        }
        profile.bodies_created += created.len();

        {
            let mut spatial = self.spatial.lock();
            spatial.update(handle, source_bounds);
            for &new_handle in &created {
                let Some(bounds) = bodies.get(new_handle).map(|b| b.world_bounds()) else {
                    continue;
                };
                spatial.update(new_handle, bounds);
                for neighbour in spatial.query_overlaps(&bounds.expanded(self.config.contact_gap)) {
                    if neighbour == handle || created.contains(&neighbour) || report.woken.contains(&neighbour) {
                        continue;
                    }
                    if let Some(other) = bodies.get_mut(neighbour) {
                        if !other.awake {
                            other.awake = true;
                            report.woken.push(neighbour);
                        }
                    }
                }
            }
        }
        drop(bodies);
        drop(workspace);

        report.bodies_created = created;
        if !events.is_empty() {
            self.events.lock().events.extend(events);
        }
        self.profiler.lock().merge(&profile);
        budget.check(handle);
        Ok(report)
    }

    pub fn drain_events(&self) -> Vec<StructureEvent> {
        self.events.lock().drain()
    }

    /// Hands every queued event to `handler` and clears the queue.
    pub fn dispatch_events(&self, handler: &mut dyn StructureEventHandler) -> usize {
        let events = self.drain_events();
        for event in &events {
            handler.on_event(event);
        }
        events.len()
    }

    pub fn profiler(&self) -> StructureProfiler {
        *self.profiler.lock()
    }

    pub fn reset_profiler(&self) {
        self.profiler.lock().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            joint::{JointLimits, StructuralJoint},
            mesh::TriangleMesh,
            part::Part,
        },
        dynamics::accumulation::ContactPartner,
    };
    use std::sync::Arc;

    fn tower(limit: f32) -> StructuralState {
        let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
        let mut state = StructuralState::new();
        for i in 0..2 {
            state
                .add_part(
                    Part::new(i, mesh.clone(), 1.0)
                        .with_transform(Transform::from_position(Vec3::new(0.0, i as f32, 0.0))),
                )
                .unwrap();
        }
        state
            .add_joint(StructuralJoint::to_world(-1, 0, Vec3::new(0.0, -0.5, 0.0), Vec3::Y).with_limits(JointLimits::UNBREAKABLE))
            .unwrap();
        state
            .add_joint(
                StructuralJoint::between(-1, 1, 0, Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
                    .with_limits(JointLimits::uniform(limit)),
            )
            .unwrap();
        state
    }

    fn world() -> StructuralWorld {
        StructuralWorld::new(StructureConfig::default().with_gravity(Vec3::ZERO)).unwrap()
    }

    #[test]
    fn quiet_body_is_not_ticked() {
        let world = world();
        let handle = world.add_body(StructuralBody::new(tower(10.0)));
        let report = world.step(0.01);
        assert!(report.phases.is_empty());
        assert!(world.with_body(handle, |b| b.phase()) == Some(StructurePhase::Idle));
    }

    #[test]
    fn hard_contact_breaks_top_block_off() {
        let world = world();
        let handle = world.add_body(StructuralBody::new(tower(10.0)));
        world
            .accumulate_contact(&ContactReport {
                body: handle,
                part_id: 1,
                point: Vec3::new(0.0, 1.0, 0.0),
                impulse: Vec3::new(0.0, 50.0, 0.0),
                partner: ContactPartner::Rigid {
                    velocity_change: Vec3::new(0.0, -10.0, 0.0),
                },
            })
            .unwrap();

        let report = world.step_entity(handle, 0.01).unwrap();
        assert_eq!(
            report.phases,
            vec![
                StructurePhase::Accumulating,
                StructurePhase::Solving,
                StructurePhase::PartitioningIfBroken,
                StructurePhase::Materializing,
                StructurePhase::Idle,
            ]
        );
        assert_eq!(report.bodies_created.len(), 1);
        assert_eq!(world.body_count(), 2);
        let events = world.drain_events();
        assert!(events.iter().any(|e| matches!(e, StructureEvent::JointBroken(_))));
        assert!(events.iter().any(|e| matches!(e, StructureEvent::EntityPartCreated(c) if c.part == 1)));
    }

    #[test]
    fn new_fragment_wakes_sleeping_neighbour() {
        let world = world();
        let handle = world.add_body(StructuralBody::new(tower(10.0)));
        let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
        let mut crate_state = StructuralState::new();
        crate_state
            .add_part(Part::new(0, mesh, 1.0).with_transform(Transform::from_position(Vec3::new(1.0, 1.0, 0.0))))
            .unwrap();
        let mut neighbour = StructuralBody::new(crate_state);
        neighbour.awake = false;
        let neighbour = world.add_body(neighbour);
        world
            .apply_impulse_at(handle, 1, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 50.0, 0.0))
            .unwrap();

        let report = world.step_entity(handle, 0.01).unwrap();
        assert_eq!(report.bodies_created.len(), 1);
        assert_eq!(report.woken, vec![neighbour]);
        assert_eq!(world.with_body(neighbour, |b| b.awake), Some(true));
    }

    #[test]
    fn unknown_part_is_rejected() {
        let world = world();
        let handle = world.add_body(StructuralBody::new(tower(10.0)));
        let err = world.apply_impulse_at(handle, 42, Vec3::ZERO, Vec3::X).unwrap_err();
        assert_eq!(err, StructureError::UnknownPart(42));
        assert!(world.step_entity(BodyHandle::default(), 0.01).is_err());
    }
}
