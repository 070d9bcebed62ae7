//! Structural events (fracture, joint failure, mesh changes)

use std::sync::Arc;

use glam::Vec3;

use crate::core::{
    mesh::{MeshUpdateLog, TriangleMesh},
    types::Velocity,
};
use crate::utils::allocator::BodyHandle;

/// Why a new body or part appeared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationReason {
    /// An island detached after joints broke
    JointsBroken,
    /// A part mesh fell apart into disconnected pieces
    MeshSplit,
}

/// Cut geometry attached to mesh-split creations
#[derive(Debug, Clone)]
pub struct MeshCut {
    /// Mesh of the new part
    pub mesh: Arc<TriangleMesh>,
    /// World-space point the cut is centred on
    pub point: Vec3,
    /// World-space direction of the cut
    pub direction: Vec3,
}

/// A part was moved onto a new body, or a fragment became a part
#[derive(Debug, Clone)]
pub struct EntityPartCreated {
    /// Body the part came from
    pub source: BodyHandle,
    /// Part id on the source body
    pub source_part: i32,
    /// Body that now owns the part (may equal `source`)
    pub entity: BodyHandle,
    /// Part id on the new owner
    pub part: i32,
    /// Linear impulse applied to the new body
    pub impulse: Vec3,
    /// Angular impulse applied to the new body
    pub angular_impulse: Vec3,
    /// Velocity of the new body after creation
    pub velocity: Velocity,
    pub reason: CreationReason,
    /// Fragment geometry was degenerate and the part is inert
    pub invalid: bool,
    /// Present for mesh splits
    pub cut: Option<MeshCut>,
}

/// A joint failed
#[derive(Debug, Clone, PartialEq)]
pub struct JointBroken {
    pub entity: BodyHandle,
    pub joint: i32,
    /// World-space anchor point
    pub point: Vec3,
    /// World-space normal
    pub normal: Vec3,
    /// Part ids, larger-volume part first; `-1` for the world
    pub parts: [i32; 2],
    /// Material ids matching `parts`
    pub materials: [i32; 2],
    /// Part the break started from, if known
    pub epicenter: Option<i32>,
}

/// Batch of parts removed from a body in one tick
#[derive(Debug, Clone, PartialEq)]
pub struct PartsRemoved {
    pub entity: BodyHandle,
    /// Bit `i` set means part id `id_offset + i` was removed
    pub mask: u128,
    pub id_offset: i32,
    /// Body mass before the removal
    pub original_mass: f32,
}

impl PartsRemoved {
    /// Part ids encoded in the mask.
    pub fn part_ids(&self) -> Vec<i32> {
        (0..128)
            .filter(|bit| self.mask & (1u128 << bit) != 0)
            .map(|bit| self.id_offset + bit as i32)
            .collect()
    }
}

/// A part mesh changed shape
#[derive(Debug, Clone)]
pub struct MeshUpdated {
    pub entity: BodyHandle,
    pub part: i32,
    pub mesh: Arc<TriangleMesh>,
    /// Shared append-only log of changes
    pub log: Arc<MeshUpdateLog>,
    /// Index of the entry describing this change
    pub last_update: usize,
    /// Remaining mesh was degenerate and the part is inert
    pub invalid: bool,
    /// Mass lost to invalidated fragments
    pub discarded_mass: f32,
}

/// A child's saved flags were restored because its parent was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRevealed {
    pub entity: BodyHandle,
    pub part: i32,
}

/// Any event emitted by the structural subsystem
#[derive(Debug, Clone)]
pub enum StructureEvent {
    EntityPartCreated(EntityPartCreated),
    JointBroken(JointBroken),
    PartsRemoved(PartsRemoved),
    MeshUpdated(MeshUpdated),
    PartRevealed(PartRevealed),
}

/// Handler trait for structural events
pub trait StructureEventHandler: Send + Sync {
    /// Called once per event, in emission order
    fn on_event(&mut self, event: &StructureEvent);
}

/// Default handler that collects events into a buffer
#[derive(Debug, Default)]
pub struct EventCollector {
    pub events: Vec<StructureEvent>,
}

impl EventCollector {
    /// Create a new event collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StructureEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take every collected event, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<StructureEvent> {
        std::mem::take(&mut self.events)
    }

    /// Part-creation events
    pub fn created(&self) -> impl Iterator<Item = &EntityPartCreated> {
        self.events.iter().filter_map(|e| match e {
            StructureEvent::EntityPartCreated(created) => Some(created),
            _ => None,
        })
    }

    /// Joint-failure events
    pub fn broken_joints(&self) -> impl Iterator<Item = &JointBroken> {
        self.events.iter().filter_map(|e| match e {
            StructureEvent::JointBroken(broken) => Some(broken),
            _ => None,
        })
    }
}

impl StructureEventHandler for EventCollector {
    fn on_event(&mut self, event: &StructureEvent) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_mask_decodes_ids_relative_to_offset() {
        let event = PartsRemoved {
            entity: BodyHandle::default(),
            mask: 0b1010,
            id_offset: 100,
            original_mass: 4.0,
        };
        assert_eq!(event.part_ids(), vec![101, 103]);
    }

    #[test]
    fn drain_empties_the_collector() {
        let mut collector = EventCollector::new();
        collector.push(StructureEvent::PartRevealed(PartRevealed {
            entity: BodyHandle::default(),
            part: 1,
        }));
        assert_eq!(collector.drain().len(), 1);
        assert!(collector.is_empty());
    }
}
