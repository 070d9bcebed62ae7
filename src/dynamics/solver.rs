use std::collections::VecDeque;

use glam::{Mat3, Quat, Vec3};

use crate::{
    config::StructureConfig,
    core::{
        joint::{JointLimits, JointTension, TensionMode},
        part::{PartFlags, PendingImpulse},
        structure::StructuralState,
        types::{skew, InertiaTensorExt, Velocity},
    },
};

/// Working state of one part during relaxation.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    pub linear: Vec3,
    pub angular: Vec3,
    pub inv_mass: f32,
    pub inv_inertia: Mat3,
    /// Centre of mass relative to the body origin, world-oriented.
    pub com: Vec3,
}

impl Default for SolverBody {
    fn default() -> Self {
        Self {
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
            inv_mass: 0.0,
            inv_inertia: Mat3::ZERO,
            com: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct JointRow {
    joint: usize,
    parts: [Option<usize>; 2],
    r: [Vec3; 2],
    normal: Vec3,
    linear_kinv: Mat3,
    angular_kinv: Mat3,
    p: Vec3,
    l: Vec3,
    /// Effective limits already multiplied by `dt`.
    limits: JointLimits,
    breakable: bool,
    broken: bool,
}

impl JointRow {
    fn other(&self, part: usize) -> Option<usize> {
        if self.parts[0] == Some(part) {
            self.parts[1]
        } else {
            self.parts[0]
        }
    }

    fn tension(&self) -> JointTension {
        let n = self.normal;
        let pn = self.p.dot(n);
        let pt = (self.p - n * pn).length();
        let ln = self.l.dot(n);
        let lt = (self.l - n * ln).length();
        let ratio = |load: f32, limit: f32| {
            if limit.is_finite() && limit > 0.0 {
                load / limit
            } else {
                0.0
            }
        };

        let candidates = [
            (TensionMode::Twist, ratio(ln.abs(), self.limits.twist)),
            (TensionMode::Bend, ratio(lt, self.limits.bend)),
            (TensionMode::Push, ratio(pn.max(0.0), self.limits.push)),
            (TensionMode::Pull, ratio((-pn).max(0.0), self.limits.pull)),
            (TensionMode::Shift, ratio(pt, self.limits.shift)),
        ];
        candidates
            .into_iter()
            .filter(|(_, r)| *r > 0.0)
            .fold(JointTension::default(), |best, (mode, r)| {
                if r > best.ratio {
                    JointTension { mode, ratio: r }
                } else {
                    best
                }
            })
    }
}

/// Reusable buffers for the relaxation pass, grown on demand.
#[derive(Debug, Default)]
pub struct SolverScratch {
    bodies: Vec<SolverBody>,
    seed_speed_sq: Vec<f32>,
    rows: Vec<JointRow>,
    row_of_joint: Vec<Option<usize>>,
    order: Vec<usize>,
    row_ordered: Vec<bool>,
    adjacency_start: Vec<usize>,
    adjacency: Vec<usize>,
    queue: VecDeque<usize>,
    visited: Vec<bool>,
    part_capacity: usize,
    joint_capacity: usize,
}

impl SolverScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes room for a body of the given size, logging when the buffers grow.
    pub fn reserve(&mut self, parts: usize, joints: usize) {
        if parts > self.part_capacity || joints > self.joint_capacity {
            let parts = parts.max(self.part_capacity);
            let joints = joints.max(self.joint_capacity);
            log::debug!(
                "growing solver scratch: {} -> {} parts, {} -> {} joints",
                self.part_capacity,
                parts,
                self.joint_capacity,
                joints
            );
            self.bodies.reserve(parts.saturating_sub(self.bodies.len()));
            self.seed_speed_sq.reserve(parts.saturating_sub(self.seed_speed_sq.len()));
            self.visited.reserve(parts.saturating_sub(self.visited.len()));
            self.adjacency_start.reserve((parts + 1).saturating_sub(self.adjacency_start.len()));
            self.rows.reserve(joints.saturating_sub(self.rows.len()));
            self.row_of_joint.reserve(joints.saturating_sub(self.row_of_joint.len()));
            self.adjacency.reserve((joints * 2).saturating_sub(self.adjacency.len()));
            self.part_capacity = parts;
            self.joint_capacity = joints;
        }
    }

    pub fn part_capacity(&self) -> usize {
        self.part_capacity
    }

    /// Builds the per-part CSR adjacency over joints that were intact at tick start.
    pub fn build_adjacency(&mut self, state: &StructuralState) {
        let n = state.parts.len();
        self.reserve(n, state.joints.len());
        self.adjacency_start.clear();
        self.adjacency_start.resize(n + 1, 0);
        for joint in state.joints.iter().filter(|j| j.is_connecting()) {
            for part in joint.parts.iter().flatten() {
                self.adjacency_start[*part + 1] += 1;
            }
        }
        for i in 0..n {
            self.adjacency_start[i + 1] += self.adjacency_start[i];
        }

        self.adjacency.clear();
        self.adjacency.resize(self.adjacency_start[n], 0);
        let mut cursor: Vec<usize> = self.adjacency_start[..n].to_vec();
        for (index, joint) in state.joints.iter().enumerate() {
            if !joint.is_connecting() {
                continue;
            }
            for part in joint.parts.iter().flatten() {
                self.adjacency[cursor[*part]] = index;
                cursor[*part] += 1;
            }
        }
    }

    /// Joint indices touching `part`, valid after `build_adjacency`.
    pub fn joints_of(&self, part: usize) -> &[usize] {
        match (self.adjacency_start.get(part), self.adjacency_start.get(part + 1)) {
            (Some(&start), Some(&end)) => &self.adjacency[start..end],
            _ => &[],
        }
    }

    /// Velocity change the last solve gave to `part`.
    pub fn part_velocity(&self, part: usize) -> Velocity {
        self.bodies
            .get(part)
            .map(|b| Velocity::new(b.linear, b.angular))
            .unwrap_or_default()
    }

    /// Squared speed seeded from external load before relaxation.
    pub fn seed_speed_sq(&self, part: usize) -> f32 {
        self.seed_speed_sq.get(part).copied().unwrap_or(0.0)
    }
}

/// Inputs of one relaxation pass that vary per tick.
#[derive(Debug, Clone, Copy)]
pub struct SolveFrame<'a> {
    pub dt: f32,
    /// Orientation of the owning body.
    pub rotation: Quat,
    /// Pending load per part, already scaled.
    pub pending: &'a [PendingImpulse],
    /// Part index the joint ordering starts from.
    pub epicenter: Option<usize>,
    /// Record tension only; nothing breaks and no damage accrues.
    pub test_run: bool,
    /// Driven by an explicit break request, so manually breakable parts may let go.
    pub forced: bool,
}

/// Outcome of one relaxation pass.
#[derive(Debug, Default, Clone)]
pub struct SolveReport {
    pub passes: u32,
    pub joints_solved: usize,
    /// Indices of joints that broke during this pass.
    pub broken: Vec<usize>,
    pub max_tension: f32,
}

/// Gauss-Seidel relaxation of joint impulses against joint limits.
#[derive(Debug, Clone)]
pub struct JointRelaxationSolver {
    pub min_passes: u32,
    pub max_iterations: u32,
    pub direct_impulse_rate: f32,
    pub gravity: Vec3,
    pub gravity_step: f32,
    pub damage_rate: f32,
    pub damage_threshold: f32,
    pub impulse_mass_cap: f32,
}

impl Default for JointRelaxationSolver {
    fn default() -> Self {
        Self::from_config(&StructureConfig::default())
    }
}

impl JointRelaxationSolver {
    pub fn from_config(config: &StructureConfig) -> Self {
        Self {
            min_passes: config.solver_min_passes,
            max_iterations: config.solver_max_iterations.max(1),
            direct_impulse_rate: config.direct_impulse_rate,
            gravity: config.gravity,
            gravity_step: config.joint_gravity_step,
            damage_rate: config.damage_accumulation,
            damage_threshold: config.damage_accumulation_threshold,
            impulse_mass_cap: config.impulse_mass_cap,
        }
    }

    pub fn solve(&self, state: &mut StructuralState, scratch: &mut SolverScratch, frame: &SolveFrame) -> SolveReport {
        scratch.build_adjacency(state);
        self.seed_bodies(state, scratch, frame);
        self.build_rows(state, scratch, frame);

        let mut report = SolveReport::default();
        if scratch.rows.is_empty() {
            return report;
        }

        order_rows(scratch, frame.epicenter);
        report.joints_solved = scratch.order.len();

        let SolverScratch {
            bodies, rows, order, ..
        } = scratch;
        let mut broken_rows = Vec::new();
        loop {
            let mut broke = false;
            let forward = report.passes % 2 == 0;
            for k in 0..order.len() {
                let row = if forward { order[k] } else { order[order.len() - 1 - k] };
                if relax_row(&mut rows[row], bodies) {
                    broke = true;
                    broken_rows.push(row);
                }
            }
            report.passes += 1;
            if report.passes >= self.max_iterations || (report.passes >= self.min_passes && !broke) {
                break;
            }
        }

        let to_body = frame.rotation.inverse();
        for row in order.iter().map(|&r| &rows[r]) {
            let tension = row.tension();
            report.max_tension = report.max_tension.max(tension.ratio);
            let joint = &mut state.joints[row.joint];
            joint.tension = tension;
            if frame.test_run {
                continue;
            }
            if row.broken {
                joint.broken = true;
                continue;
            }

            let (rate, threshold) = joint
                .damage
                .map(|d| (d.rate, d.threshold))
                .unwrap_or((self.damage_rate, self.damage_threshold));
            if rate > 0.0 {
                let factor = if threshold <= 0.0 {
                    rate
                } else if tension.ratio > threshold {
                    rate * (1.0 - threshold / tension.ratio)
                } else {
                    0.0
                };
                if factor > 0.0 {
                    joint.p_accum += to_body * (row.p * factor);
                    joint.l_accum += to_body * (row.l * factor);
                }
            }
        }
        report.broken = broken_rows.iter().map(|&r| rows[r].joint).collect();

        if !report.broken.is_empty() {
            log::debug!(
                "relaxation broke {} of {} joints in {} passes",
                report.broken.len(),
                report.joints_solved,
                report.passes
            );
        }
        report
    }

    fn seed_bodies(&self, state: &StructuralState, scratch: &mut SolverScratch, frame: &SolveFrame) {
        let n = state.parts.len();
        scratch.bodies.clear();
        scratch.seed_speed_sq.clear();
        let rate_dt = frame.dt * self.direct_impulse_rate;
        let gravity_dv = self.gravity * (frame.dt * self.gravity_step);

        for (i, part) in state.parts.iter().enumerate() {
            let mut body = SolverBody {
                com: frame.rotation * part.center_of_mass(),
                ..SolverBody::default()
            };
            if !part.is_immovable() {
                let load = frame.pending.get(i).copied().unwrap_or_default();
                body.inv_mass = part.inverse_mass();
                body.inv_inertia = part.world_inverse_inertia(frame.rotation);
                let cap = part.mass * self.impulse_mass_cap;
                let p = clamp_impulse(load.direct_linear * rate_dt + load.indirect_linear, cap);
                let l = clamp_impulse(load.direct_angular * rate_dt + load.indirect_angular, cap);
                body.linear = p * body.inv_mass + gravity_dv;
                body.angular = body.inv_inertia * l;
            }
            scratch.seed_speed_sq.push(body.linear.length_squared() + body.angular.length_squared());
            scratch.bodies.push(body);
        }
        debug_assert_eq!(scratch.bodies.len(), n);
    }

    fn build_rows(&self, state: &StructuralState, scratch: &mut SolverScratch, frame: &SolveFrame) {
        scratch.rows.clear();
        scratch.row_of_joint.clear();
        scratch.row_of_joint.resize(state.joints.len(), None);

        for (index, joint) in state.joints.iter().enumerate() {
            if !joint.is_connecting() || !joint.flags.breakable() {
                continue;
            }
            let point = frame.rotation * joint.point;
            let normal = (frame.rotation * joint.normal).normalize_or_zero();

            let mut r = [Vec3::ZERO; 2];
            let mut k = Mat3::ZERO;
            let mut angular = Mat3::ZERO;
            for (slot, part) in joint.parts.iter().enumerate() {
                let Some(part) = part else { continue };
                let body = &scratch.bodies[*part];
                r[slot] = point - body.com;
                let rs = skew(r[slot]);
                k += Mat3::IDENTITY * body.inv_mass - rs * body.inv_inertia * rs;
                angular += body.inv_inertia;
            }

            let held = !frame.forced
                && joint
                    .parts
                    .iter()
                    .flatten()
                    .any(|&p| state.parts[p].flags.contains(PartFlags::MANUALLY_BREAKABLE));
            let limits = joint.limits.effective_limits().scaled(frame.dt);
            scratch.row_of_joint[index] = Some(scratch.rows.len());
            scratch.rows.push(JointRow {
                joint: index,
                parts: joint.parts,
                r,
                normal,
                linear_kinv: k.safe_inverse(),
                angular_kinv: angular.safe_inverse(),
                p: frame.rotation * joint.p_accum,
                l: frame.rotation * joint.l_accum,
                limits,
                breakable: joint.is_solver_breakable() && !frame.test_run && !held,
                broken: false,
            });
        }
    }
}

/// Orders rows breadth-first from the epicenter or the fastest part.
/// Rows outside every loaded region are left out of the relaxation.
fn order_rows(scratch: &mut SolverScratch, epicenter: Option<usize>) {
    let SolverScratch {
        bodies,
        seed_speed_sq,
        rows,
        row_of_joint,
        order,
        row_ordered,
        adjacency_start,
        adjacency,
        queue,
        visited,
        ..
    } = scratch;
    let n = bodies.len();
    order.clear();
    queue.clear();
    visited.clear();
    visited.resize(n, false);
    row_ordered.clear();
    row_ordered.resize(rows.len(), false);

    let loaded = |i: usize| seed_speed_sq[i] > 0.0 && bodies[i].inv_mass > 0.0;
    let mut seed = epicenter.filter(|&e| e < n).or_else(|| {
        (0..n)
            .filter(|&i| loaded(i))
            .max_by(|&a, &b| seed_speed_sq[a].total_cmp(&seed_speed_sq[b]))
    });

    while let Some(start) = seed {
        visited[start] = true;
        queue.push_back(start);
        while let Some(part) = queue.pop_front() {
            for &joint in &adjacency[adjacency_start[part]..adjacency_start[part + 1]] {
                let Some(row) = row_of_joint[joint] else { continue };
                if row_ordered[row] {
                    continue;
                }
                row_ordered[row] = true;
                order.push(row);
                if let Some(other) = rows[row].other(part) {
                    if !visited[other] && bodies[other].inv_mass > 0.0 {
                        visited[other] = true;
                        queue.push_back(other);
                    }
                }
            }
        }
        seed = (0..n).find(|&i| !visited[i] && loaded(i));
    }
}

/// Runaway or non-finite loads are cut down to `cap`.
fn clamp_impulse(impulse: Vec3, cap: f32) -> Vec3 {
    if !impulse.is_finite() {
        log::warn!("discarding non-finite structural load {impulse:?}");
        return Vec3::ZERO;
    }
    impulse.clamp_length_max(cap)
}

/// Relaxes one joint; returns true when it broke during this call.
fn relax_row(row: &mut JointRow, bodies: &mut [SolverBody]) -> bool {
    if row.broken {
        return false;
    }
    let mut a = row.parts[0].map(|i| bodies[i]).unwrap_or_default();
    let mut b = row.parts[1].map(|i| bodies[i]).unwrap_or_default();
    let n = row.normal;
    let mut broke = false;

    // Angular: twist about the normal, bend across it.
    let l_prev = row.l;
    let mut l = l_prev - row.angular_kinv * (a.angular - b.angular);
    if row.breakable {
        let mut ln = l.dot(n);
        let mut lt = l - n * ln;
        let twist = row.limits.twist;
        if ln * ln > twist * twist {
            broke = true;
            ln = ln.clamp(-twist, twist);
        }
        let bend = row.limits.bend;
        if lt.length_squared() > bend * bend {
            broke = true;
            lt *= bend / lt.length();
        }
        l = lt + n * ln;
    }
    let dl = l - l_prev;
    a.angular += a.inv_inertia * dl;
    b.angular -= b.inv_inertia * dl;

    // Linear: push and pull along the normal, shift across it.
    let p_prev = row.p;
    let dv = (a.linear + a.angular.cross(row.r[0])) - (b.linear + b.angular.cross(row.r[1]));
    let mut p = p_prev - row.linear_kinv * dv;
    if row.breakable {
        let mut pn = p.dot(n);
        let mut pt = p - n * pn;
        if pn > row.limits.push {
            broke = true;
            pn = row.limits.push;
        } else if pn < -row.limits.pull {
            broke = true;
            pn = -row.limits.pull;
        }
        let shift = row.limits.shift;
        if pt.length_squared() > shift * shift {
            broke = true;
            pt *= shift / pt.length();
        }
        p = pt + n * pn;
    }
    let dp = p - p_prev;
    a.linear += dp * a.inv_mass;
    a.angular += a.inv_inertia * row.r[0].cross(dp);
    b.linear -= dp * b.inv_mass;
    b.angular -= b.inv_inertia * row.r[1].cross(dp);

    row.p = p;
    row.l = l;
    row.broken = broke;
    if let Some(i) = row.parts[0] {
        bodies[i] = a;
    }
    if let Some(i) = row.parts[1] {
        bodies[i] = b;
    }
    broke
}
