//! Per-body structural graph: parts, joints and split bookkeeping.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::joint::StructuralJoint;
use super::part::{BreakClass, Part};
use crate::error::{Result, StructureError};

/// Blast attached to a forced break, applied to fragments of the next mesh split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    /// World-space centre.
    pub center: Vec3,
    /// Impulse per unit of exposed area at unit distance.
    pub pressure: f32,
    /// Distances are clamped to at least this radius.
    pub min_radius: f32,
}

impl Explosion {
    /// Impulse delivered to a fragment whose centre of mass sits at `point`.
    pub fn impulse_at(&self, point: Vec3, volume: f32) -> Vec3 {
        let offset = point - self.center;
        let dist = offset.length().max(self.min_radius).max(1e-3);
        let area = volume.max(0.0).powf(2.0 / 3.0);
        offset.normalize_or_zero() * (self.pressure * area / (dist * dist))
    }
}

/// Parts and joints that left a body together.
#[derive(Debug, Clone, Default)]
pub struct DetachedGroup {
    pub parts: Vec<Part>,
    /// Intact joints with both endpoints in the group, re-indexed into `parts`.
    pub joints: Vec<StructuralJoint>,
    /// Index of each part before it was detached.
    pub source_indices: Vec<usize>,
}

/// Structural graph of one body.
#[derive(Debug, Clone, Default)]
pub struct StructuralState {
    pub parts: Vec<Part>,
    pub joints: Vec<StructuralJoint>,
    /// Bumped on every structural change.
    pub modified: u64,
    /// Part id a forced break starts from.
    pub epicenter: Option<i32>,
    pub split_timer: f32,
    /// Joints broken by the last tick.
    pub last_broken: usize,
    pub next_part_id: i32,
    pub next_joint_id: i32,
    pub explosion: Option<Explosion>,
    /// Set when a removal batch overflowed and partitioning must rerun.
    pub deferred_split: bool,
}

impl StructuralState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn bump(&mut self) {
        self.modified = self.modified.wrapping_add(1);
    }

    pub fn part_index(&self, id: i32) -> Option<usize> {
        self.parts.iter().position(|p| p.id == id)
    }

    pub fn part_by_id(&self, id: i32) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Returns a fresh part id above every id in use.
    pub fn alloc_part_id(&mut self) -> i32 {
        let id = self.next_part_id;
        self.next_part_id += 1;
        id
    }

    pub fn add_part(&mut self, part: Part) -> Result<usize> {
        if self.part_index(part.id).is_some() {
            return Err(StructureError::DuplicatePart(part.id));
        }
        self.next_part_id = self.next_part_id.max(part.id + 1);
        self.parts.push(part);
        self.bump();
        Ok(self.parts.len() - 1)
    }

    /// Adds a joint after validating its endpoints; a negative id is replaced by a fresh one.
    pub fn add_joint(&mut self, mut joint: StructuralJoint) -> Result<usize> {
        joint.validate(self.parts.len())?;
        if joint.id < 0 {
            joint.id = self.next_joint_id;
        }
        self.next_joint_id = self.next_joint_id.max(joint.id + 1);
        self.joints.push(joint);
        self.bump();
        Ok(self.joints.len() - 1)
    }

    /// Removes a part along with every joint touching it; later indices shift down.
    pub fn remove_part(&mut self, index: usize) -> Option<Part> {
        if index >= self.parts.len() {
            return None;
        }
        let part = self.parts.remove(index);

        self.joints.retain(|j| !j.references(index));
        let shift = |slot: &mut Option<usize>| {
            if let Some(i) = slot {
                if *i > index {
                    *i -= 1;
                }
            }
        };
        for joint in &mut self.joints {
            joint.parts.iter_mut().for_each(shift);
        }
        for other in &mut self.parts {
            if other.parent == Some(index) {
                other.parent = None;
            } else {
                shift(&mut other.parent);
            }
        }

        self.bump();
        Some(part)
    }

    /// Drops broken joints for good.
    pub fn compact_broken_joints(&mut self) -> usize {
        let before = self.joints.len();
        self.joints.retain(|j| !j.broken);
        before - self.joints.len()
    }

    /// Any intact structural joint left.
    pub fn has_joint_network(&self) -> bool {
        self.joints.iter().any(|j| j.is_connecting())
    }

    pub fn total_mass(&self) -> f32 {
        self.parts.iter().map(|p| p.mass).sum()
    }

    /// Folds `MergeInto` placeholder parts into their targets and drops them.
    pub fn fold_merge_placeholders(&mut self) -> usize {
        let mut folded = 0;
        let mut index = self.parts.len();
        while index > 0 {
            index -= 1;
            let BreakClass::MergeInto(target_id) = self.parts[index].break_class else {
                continue;
            };
            if let Some(target) = self.part_index(target_id).filter(|&t| t != index) {
                let flags = self.parts[index].flags;
                self.parts[target].flags.insert(flags);
            }
            self.remove_part(index);
            folded += 1;
        }
        folded
    }

    /// Moves every part with `group_of[i] == Some(g)` into group `g`.
    ///
    /// Intact joints inside a group travel with it; joints crossing groups or
    /// linking a group to the remaining parts are dropped.
    pub fn detach_groups(&mut self, group_of: &[Option<usize>], group_count: usize) -> Vec<DetachedGroup> {
        let mut groups: Vec<DetachedGroup> = (0..group_count).map(|_| DetachedGroup::default()).collect();
        if group_count == 0 {
            return groups;
        }

        // New index of each old part, either in a group or in the remaining list.
        let mut placement: Vec<(Option<usize>, usize)> = Vec::with_capacity(self.parts.len());
        let mut kept = 0;
        let mut group_len = vec![0usize; group_count];
        for i in 0..self.parts.len() {
            match group_of.get(i).copied().flatten().filter(|&g| g < group_count) {
                Some(g) => {
                    placement.push((Some(g), group_len[g]));
                    group_len[g] += 1;
                }
                None => {
                    placement.push((None, kept));
                    kept += 1;
                }
            }
        }

        let parts = std::mem::take(&mut self.parts);
        for (i, mut part) in parts.into_iter().enumerate() {
            let (group, _) = placement[i];
            part.parent = part.parent.and_then(|p| {
                let (parent_group, parent_index) = placement[p];
                (parent_group == group).then_some(parent_index)
            });
            match group {
                Some(g) => {
                    groups[g].parts.push(part);
                    groups[g].source_indices.push(i);
                }
                None => self.parts.push(part),
            }
        }

        let joints = std::mem::take(&mut self.joints);
        for mut joint in joints {
            let sides = joint.parts.map(|slot| slot.map(|p| placement[p]));
            let group_a = sides[0].map(|(g, _)| g);
            let group_b = sides[1].map(|(g, _)| g);
            let target = match (group_a, group_b) {
                // Both endpoints stay, or one stays and the other is the world.
                (Some(None), Some(None)) | (Some(None), None) | (None, Some(None)) => None,
                (Some(Some(a)), Some(Some(b))) if a == b => Some(a),
                _ => continue,
            };
            for (slot, side) in joint.parts.iter_mut().zip(sides) {
                *slot = side.map(|(_, index)| index);
            }
            match target {
                Some(g) if joint.is_connecting() => groups[g].joints.push(joint),
                Some(_) => {}
                None => self.joints.push(joint),
            }
        }

        self.bump();
        groups
    }
}
