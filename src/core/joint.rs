//! Load-bearing joints between parts.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StructureError};

/// Bit set of per-joint behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct JointFlags(u32);

impl JointFlags {
    pub const BREAKABLE: JointFlags = JointFlags(1 << 0);
    /// Only direct hits may break the joint; the solver still routes load through it.
    pub const DIRECT_BREAKS_ONLY: JointFlags = JointFlags(1 << 1);
    /// The two parts do not collide with each other while joined.
    pub const IGNORE_COLLISIONS: JointFlags = JointFlags(1 << 2);

    pub const fn empty() -> Self {
        JointFlags(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: JointFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: JointFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: JointFlags) {
        self.0 &= !other.0;
    }

    pub fn breakable(&self) -> bool {
        self.contains(Self::BREAKABLE)
    }

    pub fn direct_breaks_only(&self) -> bool {
        self.contains(Self::DIRECT_BREAKS_ONLY)
    }

    pub fn ignore_collisions(&self) -> bool {
        self.contains(Self::IGNORE_COLLISIONS)
    }
}

impl std::ops::BitOr for JointFlags {
    type Output = JointFlags;

    fn bitor(self, rhs: JointFlags) -> JointFlags {
        JointFlags(self.0 | rhs.0)
    }
}

/// Force (N) and torque (N·m) capacities of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub push: f32,
    pub pull: f32,
    pub shift: f32,
    pub bend: f32,
    pub twist: f32,
}

impl JointLimits {
    pub const UNBREAKABLE: JointLimits = JointLimits {
        push: f32::INFINITY,
        pull: f32::INFINITY,
        shift: f32::INFINITY,
        bend: f32::INFINITY,
        twist: f32::INFINITY,
    };

    /// Limits used by joint inference when no template applies.
    pub const SAMPLE: JointLimits = JointLimits {
        push: 4e5,
        pull: 1e5,
        shift: 2e5,
        bend: 1e5,
        twist: 2e5,
    };

    pub fn new(push: f32, pull: f32, shift: f32, bend: f32, twist: f32) -> Self {
        Self {
            push,
            pull,
            shift,
            bend,
            twist,
        }
    }

    pub fn uniform(limit: f32) -> Self {
        Self::new(limit, limit, limit, limit, limit)
    }

    /// Non-positive or non-finite limits never break.
    pub fn effective(value: f32) -> f32 {
        if value > 0.0 && value.is_finite() {
            value
        } else {
            f32::INFINITY
        }
    }

    pub fn effective_limits(&self) -> JointLimits {
        JointLimits {
            push: Self::effective(self.push),
            pull: Self::effective(self.pull),
            shift: Self::effective(self.shift),
            bend: Self::effective(self.bend),
            twist: Self::effective(self.twist),
        }
    }

    pub fn is_unbreakable(&self) -> bool {
        let eff = self.effective_limits();
        [eff.push, eff.pull, eff.shift, eff.bend, eff.twist]
            .iter()
            .all(|v| v.is_infinite())
    }

    pub fn scaled(&self, factor: f32) -> JointLimits {
        JointLimits {
            push: self.push * factor,
            pull: self.pull * factor,
            shift: self.shift * factor,
            bend: self.bend * factor,
            twist: self.twist * factor,
        }
    }
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::UNBREAKABLE
    }
}

/// Per-joint fatigue override.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDamage {
    pub rate: f32,
    /// Fraction of the limit above which load accrues as damage; `<= 0` accrues always.
    pub threshold: f32,
}

/// Which limit dominated a joint's load in the last solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TensionMode {
    #[default]
    None,
    Twist,
    Bend,
    Push,
    Pull,
    Shift,
}

/// Diagnostic load summary recorded by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointTension {
    pub mode: TensionMode,
    /// Load over limit for the dominant mode.
    pub ratio: f32,
}

/// What a joint record stands for.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum JointKind {
    #[default]
    Structural,
    /// Supplies limits to joint inference; never solved.
    Template,
    /// Applies an impulse to its first part during limit calibration; never solved.
    ImpulseProbe { linear: Vec3, angular: Vec3 },
}

/// Breakable link between two parts, or a part and the world (`None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralJoint {
    pub id: i32,
    pub parts: [Option<usize>; 2],
    /// Anchor in the owning body's frame.
    pub point: Vec3,
    /// Unit axis pointing from `parts[1]` toward `parts[0]`.
    pub normal: Vec3,
    pub axis_x: Vec3,
    pub limits: JointLimits,
    pub flags: JointFlags,
    pub sensor_size: f32,
    pub damage: Option<JointDamage>,
    /// Residual linear load carried into the next solve.
    pub p_accum: Vec3,
    /// Residual angular load carried into the next solve.
    pub l_accum: Vec3,
    pub broken: bool,
    pub tension: JointTension,
    pub kind: JointKind,
}

impl StructuralJoint {
    pub fn new(id: i32, parts: [Option<usize>; 2], point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            id,
            parts,
            point,
            normal,
            axis_x: normal.any_orthonormal_vector(),
            limits: JointLimits::UNBREAKABLE,
            flags: JointFlags::BREAKABLE,
            sensor_size: 0.05,
            damage: None,
            p_accum: Vec3::ZERO,
            l_accum: Vec3::ZERO,
            broken: false,
            tension: JointTension::default(),
            kind: JointKind::Structural,
        }
    }

    pub fn between(id: i32, a: usize, b: usize, point: Vec3, normal: Vec3) -> Self {
        Self::new(id, [Some(a), Some(b)], point, normal)
    }

    pub fn to_world(id: i32, part: usize, point: Vec3, normal: Vec3) -> Self {
        Self::new(id, [Some(part), None], point, normal)
    }

    pub fn with_limits(mut self, limits: JointLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_flags(mut self, flags: JointFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_damage(mut self, rate: f32, threshold: f32) -> Self {
        self.damage = Some(JointDamage { rate, threshold });
        self
    }

    pub fn with_sensor_size(mut self, size: f32) -> Self {
        self.sensor_size = size;
        self
    }

    pub fn with_axis(mut self, axis_x: Vec3) -> Self {
        self.axis_x = axis_x.normalize_or_zero();
        self
    }

    pub fn as_template(mut self) -> Self {
        self.kind = JointKind::Template;
        self
    }

    pub fn as_probe(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.kind = JointKind::ImpulseProbe { linear, angular };
        self
    }

    /// Checks endpoint topology against the owning body's part count.
    pub fn validate(&self, part_count: usize) -> Result<()> {
        if self.parts[0] == self.parts[1] {
            return Err(StructureError::DegenerateJoint(self.parts[0]));
        }
        for index in self.parts.iter().flatten() {
            if *index >= part_count {
                return Err(StructureError::EndpointOutOfRange {
                    index: *index,
                    part_count,
                });
            }
        }
        Ok(())
    }

    pub fn is_structural(&self) -> bool {
        matches!(self.kind, JointKind::Structural)
    }

    /// Intact structural joint that carries load between its parts.
    pub fn is_connecting(&self) -> bool {
        self.is_structural() && !self.broken
    }

    /// Candidate for solver breakage this tick.
    pub fn is_solver_breakable(&self) -> bool {
        self.is_connecting() && self.flags.breakable() && !self.flags.direct_breaks_only()
    }

    pub fn references(&self, part: usize) -> bool {
        self.parts.contains(&Some(part))
    }

    pub fn is_world_anchored(&self) -> bool {
        self.parts.contains(&None)
    }

    /// Endpoint on the other side from `part`.
    pub fn other(&self, part: usize) -> Option<usize> {
        if self.parts[0] == Some(part) {
            self.parts[1]
        } else {
            self.parts[0]
        }
    }
}
