//! Rigid parts of a structural body and their impulse accumulators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::mesh::{Aabb, MeshMassProperties, MeshUpdateLog, TriangleMesh};
use super::types::{InertiaTensorExt, MassProperties, Transform, Velocity};

/// Bit set of per-part behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PartFlags(u32);

impl PartFlags {
    pub const COLLIDES: PartFlags = PartFlags(1 << 0);
    /// Mesh is checked periodically for internal disconnection.
    pub const STRUCTURE_CHANGES: PartFlags = PartFlags(1 << 1);
    pub const REMOVED: PartFlags = PartFlags(1 << 2);
    /// Degenerate geometry; inert and massless.
    pub const INVALID: PartFlags = PartFlags(1 << 3);
    /// A part detached alone loses all its flags.
    pub const DESTROYED_ON_BREAK: PartFlags = PartFlags(1 << 4);
    /// Only explicit break requests may detach the part.
    pub const MANUALLY_BREAKABLE: PartFlags = PartFlags(1 << 5);

    pub const fn empty() -> Self {
        PartFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        PartFlags(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: PartFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PartFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PartFlags) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: PartFlags, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    pub fn collides(&self) -> bool {
        self.contains(Self::COLLIDES)
    }

    pub fn is_invalid(&self) -> bool {
        self.contains(Self::INVALID)
    }

    pub fn structure_changes(&self) -> bool {
        self.contains(Self::STRUCTURE_CHANGES)
    }
}

impl std::ops::BitOr for PartFlags {
    type Output = PartFlags;

    fn bitor(self, rhs: PartFlags) -> PartFlags {
        PartFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for PartFlags {
    type Output = PartFlags;

    fn bitand(self, rhs: PartFlags) -> PartFlags {
        PartFlags(self.0 & rhs.0)
    }
}

/// How a part takes part in fracture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BreakClass {
    #[default]
    Unbreakable,
    /// Breakable with the given fracture material.
    Breakable(i32),
    /// Placeholder folded into the part with this id before any solve.
    MergeInto(i32),
}

/// `Vec3` made of three `AtomicU32` cells holding `f32` bit patterns.
#[derive(Debug, Default)]
pub struct AtomicVec3 {
    cells: [AtomicU32; 3],
}

impl AtomicVec3 {
    pub fn new(value: Vec3) -> Self {
        Self {
            cells: [
                AtomicU32::new(value.x.to_bits()),
                AtomicU32::new(value.y.to_bits()),
                AtomicU32::new(value.z.to_bits()),
            ],
        }
    }

    pub fn load(&self) -> Vec3 {
        Vec3::new(
            f32::from_bits(self.cells[0].load(Ordering::Acquire)),
            f32::from_bits(self.cells[1].load(Ordering::Acquire)),
            f32::from_bits(self.cells[2].load(Ordering::Acquire)),
        )
    }

    pub fn add(&self, value: Vec3) {
        for (cell, component) in self.cells.iter().zip(value.to_array()) {
            if component != 0.0 {
                atomic_add_f32(cell, component);
            }
        }
    }

    /// Reads the value and resets it to zero.
    pub fn take(&self) -> Vec3 {
        Vec3::new(
            f32::from_bits(self.cells[0].swap(0, Ordering::AcqRel)),
            f32::from_bits(self.cells[1].swap(0, Ordering::AcqRel)),
            f32::from_bits(self.cells[2].swap(0, Ordering::AcqRel)),
        )
    }
}

impl Clone for AtomicVec3 {
    fn clone(&self) -> Self {
        AtomicVec3::new(self.load())
    }
}

fn atomic_add_f32(cell: &AtomicU32, value: f32) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let next = (f32::from_bits(current) + value).to_bits();
        match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

/// Snapshot of the external load pending on one part.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PendingImpulse {
    /// Direct linear impulse `Pext`.
    pub direct_linear: Vec3,
    /// Direct angular impulse `Lext`.
    pub direct_angular: Vec3,
    /// Indirect linear load `Fext`.
    pub indirect_linear: Vec3,
    /// Indirect angular load `Text`.
    pub indirect_angular: Vec3,
}

impl PendingImpulse {
    pub fn is_zero(&self) -> bool {
        self.direct_linear == Vec3::ZERO
            && self.direct_angular == Vec3::ZERO
            && self.indirect_linear == Vec3::ZERO
            && self.indirect_angular == Vec3::ZERO
    }
}

/// Lock-free per-part accumulators fed by contact resolution.
#[derive(Debug, Default, Clone)]
pub struct ImpulseAccumulator {
    direct_linear: AtomicVec3,
    direct_angular: AtomicVec3,
    indirect_linear: AtomicVec3,
    indirect_angular: AtomicVec3,
}

impl ImpulseAccumulator {
    pub fn add_direct(&self, linear: Vec3, angular: Vec3) {
        self.direct_linear.add(linear);
        self.direct_angular.add(angular);
    }

    pub fn add_indirect(&self, linear: Vec3, angular: Vec3) {
        self.indirect_linear.add(linear);
        self.indirect_angular.add(angular);
    }

    pub fn peek(&self) -> PendingImpulse {
        PendingImpulse {
            direct_linear: self.direct_linear.load(),
            direct_angular: self.direct_angular.load(),
            indirect_linear: self.indirect_linear.load(),
            indirect_angular: self.indirect_angular.load(),
        }
    }

    /// Consumes the pending load, leaving the accumulators zeroed.
    pub fn take(&self) -> PendingImpulse {
        PendingImpulse {
            direct_linear: self.direct_linear.take(),
            direct_angular: self.direct_angular.take(),
            indirect_linear: self.indirect_linear.take(),
            indirect_angular: self.indirect_angular.take(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.peek().is_zero()
    }
}

/// Rigid sub-shape of a structural body.
#[derive(Debug, Clone)]
pub struct Part {
    pub id: i32,
    pub mass: f32,
    /// Placement relative to the owning body's frame.
    pub transform: Transform,
    mesh: Arc<TriangleMesh>,
    mesh_props: MeshMassProperties,
    pub material_id: i32,
    pub break_class: BreakClass,
    pub flags: PartFlags,
    pub collider_flags: u32,
    pub accum: ImpulseAccumulator,
    pub skin: Option<u32>,
    /// Structural parent this part rides on.
    pub parent: Option<usize>,
    /// Flags and collider flags to restore when the parent disappears.
    pub saved_flags: Option<(PartFlags, u32)>,
    pub initial_velocity: Option<Velocity>,
    pub update_log: Arc<MeshUpdateLog>,
}

impl Part {
    pub fn new(id: i32, mesh: Arc<TriangleMesh>, mass: f32) -> Self {
        let mesh_props = mesh.mass_properties();
        Self {
            id,
            mass: mass.max(0.0),
            transform: Transform::default(),
            mesh,
            mesh_props,
            material_id: 0,
            break_class: BreakClass::Unbreakable,
            flags: PartFlags::COLLIDES,
            collider_flags: 1,
            accum: ImpulseAccumulator::default(),
            skin: None,
            parent: None,
            saved_flags: None,
            initial_velocity: None,
            update_log: Arc::new(MeshUpdateLog::new()),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material_id: i32) -> Self {
        self.material_id = material_id;
        self
    }

    pub fn with_break_class(mut self, class: BreakClass) -> Self {
        self.break_class = class;
        self
    }

    pub fn with_flags(mut self, flags: PartFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_collider_flags(mut self, collider_flags: u32) -> Self {
        self.collider_flags = collider_flags;
        self
    }

    pub fn with_skin(mut self, skin: u32) -> Self {
        self.skin = Some(skin);
        self
    }

    pub fn with_initial_velocity(mut self, velocity: Velocity) -> Self {
        self.initial_velocity = Some(velocity);
        self
    }

    /// Attaches the part to a parent, saving its current flags and switching to the riding ones.
    pub fn with_parent(mut self, parent: usize, riding_flags: PartFlags, riding_collider_flags: u32) -> Self {
        self.saved_flags = Some((self.flags, self.collider_flags));
        self.parent = Some(parent);
        self.flags = riding_flags;
        self.collider_flags = riding_collider_flags;
        self
    }

    /// Restores the flags saved when the part was attached to its parent.
    pub fn restore_snapshot(&mut self) {
        if let Some((flags, collider_flags)) = self.saved_flags.take() {
            self.flags = flags;
            self.collider_flags = collider_flags;
        }
    }

    pub fn mesh(&self) -> &Arc<TriangleMesh> {
        &self.mesh
    }

    pub fn set_mesh(&mut self, mesh: Arc<TriangleMesh>) {
        self.mesh_props = mesh.mass_properties();
        self.mesh = mesh;
    }

    pub fn mesh_properties(&self) -> &MeshMassProperties {
        &self.mesh_props
    }

    /// Raises weak inertia axes to `fraction` of the strongest one.
    pub fn apply_inertia_floor(&mut self, fraction: f32) {
        self.mesh_props.inertia = self.mesh_props.inertia.with_min_axis(fraction);
    }

    pub fn is_breakable(&self) -> bool {
        matches!(self.break_class, BreakClass::Breakable(_))
    }

    pub fn is_immovable(&self) -> bool {
        self.mass <= 0.0
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// Volume after applying the part scale.
    pub fn volume(&self) -> f32 {
        let s = self.transform.max_scale();
        self.mesh_props.volume * s * s * s
    }

    /// Centre of mass in the owning body's frame.
    pub fn center_of_mass(&self) -> Vec3 {
        self.transform.transform_point(self.mesh_props.center_of_mass)
    }

    /// Inertia in the part frame for the part's own mass.
    pub fn body_inertia(&self) -> Mat3 {
        if self.mesh_props.volume <= f32::EPSILON || self.mass <= 0.0 {
            return Mat3::ZERO;
        }
        let s = self.transform.max_scale();
        self.mesh_props.inertia * (self.mass / self.mesh_props.volume * s * s)
    }

    pub fn mass_properties(&self) -> MassProperties {
        MassProperties {
            mass: self.mass,
            inertia: self.body_inertia(),
            center_of_mass: self.center_of_mass(),
        }
    }

    /// World-space inverse inertia given the owning body's orientation.
    pub fn world_inverse_inertia(&self, body_rotation: Quat) -> Mat3 {
        self.mass_properties()
            .world_inverse_inertia(body_rotation * self.transform.rotation)
    }

    /// Bounds in the owning body's frame.
    pub fn local_bounds(&self) -> Aabb {
        self.mesh.bounds.transformed(&self.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn accumulator_take_zeroes_pending_load() {
        let accum = ImpulseAccumulator::default();
        accum.add_direct(Vec3::X, Vec3::ZERO);
        accum.add_direct(Vec3::X * 2.0, Vec3::Y);
        accum.add_indirect(Vec3::Z, Vec3::ZERO);

        let pending = accum.take();
        assert_relative_eq!(pending.direct_linear.x, 3.0);
        assert_relative_eq!(pending.direct_angular.y, 1.0);
        assert_relative_eq!(pending.indirect_linear.z, 1.0);
        assert!(accum.is_zero());
    }

    #[test]
    fn parent_snapshot_round_trips_flags() {
        let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
        let mut part = Part::new(3, mesh, 1.0)
            .with_flags(PartFlags::COLLIDES | PartFlags::STRUCTURE_CHANGES)
            .with_collider_flags(7)
            .with_parent(0, PartFlags::empty(), 0);
        assert!(!part.flags.collides());

        part.restore_snapshot();
        assert!(part.flags.collides());
        assert!(part.flags.structure_changes());
        assert_eq!(part.collider_flags, 7);
    }

    #[test]
    fn scaled_part_reports_scaled_volume_and_inertia() {
        let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::splat(0.5)));
        let part = Part::new(0, mesh, 6.0).with_transform(Transform {
            scale: Vec3::splat(2.0),
            ..Transform::default()
        });
        assert_relative_eq!(part.volume(), 8.0, epsilon = 1e-4);
        // 2 m cube of mass 6: I = 6 * (4 + 4) / 12
        assert_relative_eq!(part.body_inertia().x_axis.x, 4.0, epsilon = 1e-3);
    }

    #[test]
    fn flag_set_toggles_bits() {
        let mut flags = PartFlags::empty();
        flags.set(PartFlags::REMOVED, true);
        assert!(flags.contains(PartFlags::REMOVED));
        flags.set(PartFlags::REMOVED, false);
        assert_eq!(flags, PartFlags::empty());
    }
}
