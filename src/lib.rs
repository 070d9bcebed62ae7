//! Structural Integrity – breakable joint networks for rigid-body physics.
//!
//! Bodies are graphs of rigid parts linked by load-bearing joints. Contact
//! impulses accumulate on parts, a relaxation solver propagates them through
//! the joints each tick, and bodies whose joints fail are split into new
//! bodies. Part meshes that fall apart internally are split as well.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod events;
pub mod fracture;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec3};

pub use config::StructureConfig;
pub use core::{
    joint::{JointFlags, JointLimits, StructuralJoint, TensionMode},
    mesh::{Aabb, TriangleMesh},
    part::{BreakClass, Part, PartFlags},
    structure::{Explosion, StructuralState},
    types::{Plane, Transform, Velocity},
};
pub use dynamics::{
    accumulation::{ContactPartner, ContactReport, ImpulseClass},
    damage::ForcedBreak,
};
pub use error::{Result, StructureError};
pub use events::{EventCollector, StructureEvent, StructureEventHandler};
pub use utils::allocator::BodyHandle;
pub use world::{StructuralBody, StructuralWorld, StructurePhase, TickReport};

/// High-level convenience wrapper that owns a [`StructuralWorld`] and a fixed timestep.
pub struct StructuralEngine {
    world: StructuralWorld,
    time_step: f32,
    time_accumulated: f32,
}

impl StructuralEngine {
    /// Creates an engine ticking at `time_step` seconds.
    pub fn new(config: StructureConfig, time_step: f32) -> Result<Self> {
        if time_step <= 0.0 || !time_step.is_finite() {
            return Err(StructureError::InvalidConfig(format!(
                "time step must be positive (got {time_step})"
            )));
        }
        Ok(Self {
            world: StructuralWorld::new(config)?,
            time_step,
            time_accumulated: 0.0,
        })
    }

    /// Adds a body and returns its handle.
    pub fn add_body(&self, body: StructuralBody) -> BodyHandle {
        self.world.add_body(body)
    }

    /// Advances by `dt`, running as many fixed ticks as fit.
    pub fn step(&mut self, dt: f32) -> TickReport {
        self.time_accumulated += dt;
        let mut report = TickReport::default();
        while self.time_accumulated >= self.time_step {
            self.time_accumulated -= self.time_step;
            report.merge(self.world.step(self.time_step));
        }
        report
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    pub fn world(&self) -> &StructuralWorld {
        &self.world
    }

    /// Logs the accumulated phase timings at info level.
    pub fn report_profile(&self) {
        self.world.profiler().report();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn engine_rejects_non_positive_time_step() {
        assert!(StructuralEngine::new(StructureConfig::default(), 0.0).is_err());
        assert!(StructuralEngine::new(StructureConfig::default(), f32::NAN).is_err());
    }

    #[test]
    fn engine_carries_the_partial_step_over() {
        let mut engine = StructuralEngine::new(StructureConfig::default(), 0.01).unwrap();
        engine.step(0.025);
        assert_relative_eq!(engine.time_accumulated, 0.005, epsilon = 1e-6);
        engine.step(0.006);
        assert_relative_eq!(engine.time_accumulated, 0.001, epsilon = 1e-6);
    }
}
