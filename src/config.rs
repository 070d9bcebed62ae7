//! Global configuration for the structural integrity subsystem.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StructureError};

/// Default gravity vector applied to joint loads (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Fraction of one tick of gravity fed into the joint solver.
pub const DEFAULT_JOINT_GRAVITY_STEP: f32 = 1.0;

/// Reference rate (Hz) direct impulses are normalised to before solving.
pub const DEFAULT_DIRECT_IMPULSE_RATE: f32 = 100.0;

/// Upper bound on relaxation passes per tick.
pub const DEFAULT_SOLVER_MAX_ITERATIONS: u32 = 23;

/// Passes always performed so breakage can propagate through the network.
pub const DEFAULT_SOLVER_MIN_PASSES: u32 = 3;

/// Fragments smaller than this fraction of the source volume are invalidated.
pub const DEFAULT_MIN_FRAGMENT_VOLUME_FRACTION: f32 = 0.002;

/// Per-axis inertia floor as a fraction of the largest axis.
pub const DEFAULT_MIN_AXIS_INERTIA_FRACTION: f32 = 0.01;

/// Detached parts at or below this mass use the debris collider settings.
pub const DEFAULT_DEBRIS_MASS_LIMIT: f32 = 0.0;

/// Shockwave impulses are capped to this multiple of the part mass.
pub const DEFAULT_SHOCKWAVE_MASS_CAP: f32 = 4.0;

/// Seeded solver impulses are clamped to this multiple of the part mass.
pub const DEFAULT_IMPULSE_MASS_CAP: f32 = 1.0e4;

/// Partner velocity change (m/s) below which a contact counts as gradual load.
pub const DEFAULT_INDIRECT_VELOCITY_THRESHOLD: f32 = 2.0;

/// Seconds between mesh connectivity checks.
pub const DEFAULT_MESH_CHECK_INTERVAL: f32 = 0.1;

/// Maximum number of parts removed from one entity in a single tick.
pub const DEFAULT_MAX_REMOVED_PARTS: usize = 256;

/// Maximum number of fragment parts added to one entity in a single tick.
pub const DEFAULT_MAX_ADDED_PARTS: usize = 64;

/// Contact gap used to pad bounds for neighbour wake-ups.
pub const DEFAULT_CONTACT_GAP: f32 = 0.01;

/// Cell size for the broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 5.0;

/// Wall-clock budget (ms) for one entity tick before a warning is logged.
pub const DEFAULT_TICK_BUDGET_MS: f32 = 4.0;

/// Tunables recognised by the structural solver and fracture executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub gravity: Vec3,
    pub joint_gravity_step: f32,
    /// Multiplier applied to every incoming break impulse.
    pub break_impulse_scale: f32,
    pub direct_impulse_rate: f32,
    pub solver_max_iterations: u32,
    pub solver_min_passes: u32,
    /// Global fatigue rate; joints may override it.
    pub damage_accumulation: f32,
    /// Global fatigue threshold as a fraction of the limit; joints may override it.
    pub damage_accumulation_threshold: f32,
    pub min_fragment_volume_fraction: f32,
    pub min_axis_inertia_fraction: f32,
    pub debris_mass_limit: f32,
    /// Collider flags forced onto debris, `None` keeps the part's own.
    pub debris_collider_flags: Option<u32>,
    /// Mask ANDed into debris part flags.
    pub debris_flags_mask: u32,
    pub shockwave_mass_cap: f32,
    pub impulse_mass_cap: f32,
    pub indirect_velocity_threshold: f32,
    pub mesh_check_interval: f32,
    pub max_removed_parts: usize,
    pub max_added_parts: usize,
    pub contact_gap: f32,
    pub broadphase_cell_size: f32,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_slice(&DEFAULT_GRAVITY),
            joint_gravity_step: DEFAULT_JOINT_GRAVITY_STEP,
            break_impulse_scale: 1.0,
            direct_impulse_rate: DEFAULT_DIRECT_IMPULSE_RATE,
            solver_max_iterations: DEFAULT_SOLVER_MAX_ITERATIONS,
            solver_min_passes: DEFAULT_SOLVER_MIN_PASSES,
            damage_accumulation: 0.0,
            damage_accumulation_threshold: 0.0,
            min_fragment_volume_fraction: DEFAULT_MIN_FRAGMENT_VOLUME_FRACTION,
            min_axis_inertia_fraction: DEFAULT_MIN_AXIS_INERTIA_FRACTION,
            debris_mass_limit: DEFAULT_DEBRIS_MASS_LIMIT,
            debris_collider_flags: None,
            debris_flags_mask: u32::MAX,
            shockwave_mass_cap: DEFAULT_SHOCKWAVE_MASS_CAP,
            impulse_mass_cap: DEFAULT_IMPULSE_MASS_CAP,
            indirect_velocity_threshold: DEFAULT_INDIRECT_VELOCITY_THRESHOLD,
            mesh_check_interval: DEFAULT_MESH_CHECK_INTERVAL,
            max_removed_parts: DEFAULT_MAX_REMOVED_PARTS,
            max_added_parts: DEFAULT_MAX_ADDED_PARTS,
            contact_gap: DEFAULT_CONTACT_GAP,
            broadphase_cell_size: DEFAULT_BROADPHASE_CELL_SIZE,
        }
    }
}

impl StructureConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_solver_iterations(mut self, min_passes: u32, max_iterations: u32) -> Self {
        self.solver_min_passes = min_passes;
        self.solver_max_iterations = max_iterations;
        self
    }

    pub fn with_damage(mut self, rate: f32, threshold: f32) -> Self {
        self.damage_accumulation = rate;
        self.damage_accumulation_threshold = threshold;
        self
    }

    pub fn with_debris(mut self, mass_limit: f32, collider_flags: Option<u32>, flags_mask: u32) -> Self {
        self.debris_mass_limit = mass_limit;
        self.debris_collider_flags = collider_flags;
        self.debris_flags_mask = flags_mask;
        self
    }

    pub fn with_mesh_check_interval(mut self, seconds: f32) -> Self {
        self.mesh_check_interval = seconds;
        self
    }

    /// Rejects settings the solver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.solver_max_iterations == 0 {
            return Err(StructureError::InvalidConfig(
                "solver_max_iterations must be at least 1".into(),
            ));
        }
        if self.solver_min_passes > self.solver_max_iterations {
            return Err(StructureError::InvalidConfig(format!(
                "solver_min_passes ({}) exceeds solver_max_iterations ({})",
                self.solver_min_passes, self.solver_max_iterations
            )));
        }
        if !(0.0..1.0).contains(&self.min_fragment_volume_fraction) {
            return Err(StructureError::InvalidConfig(
                "min_fragment_volume_fraction must be in [0, 1)".into(),
            ));
        }
        if self.damage_accumulation < 0.0 {
            return Err(StructureError::InvalidConfig(
                "damage_accumulation must be non-negative".into(),
            ));
        }
        if self.impulse_mass_cap.is_nan() || self.impulse_mass_cap <= 0.0 {
            return Err(StructureError::InvalidConfig(
                "impulse_mass_cap must be positive".into(),
            ));
        }
        if self.max_removed_parts == 0 {
            return Err(StructureError::InvalidConfig(
                "max_removed_parts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
