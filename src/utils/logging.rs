use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

use super::allocator::BodyHandle;

/// Trace-level span around one structural phase of one entity.
pub struct ScopedTimer<'a> {
    label: &'a str,
    entity: BodyHandle,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str, entity: BodyHandle) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label} on {entity:?}");
        }
        Self {
            label,
            entity,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} on {:?} ({} µs)", self.label, self.entity, elapsed.as_micros());
        }
    }
}

/// Wall-clock allowance for one entity tick.
#[derive(Debug, Clone, Copy)]
pub struct TickBudget {
    budget: Duration,
    started: Instant,
}

impl TickBudget {
    pub fn start(budget_ms: f32) -> Self {
        Self {
            budget: Duration::from_secs_f32(budget_ms.max(0.0) / 1000.0),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Warns and returns true when the tick ran over.
    pub fn check(&self, entity: BodyHandle) -> bool {
        let elapsed = self.elapsed();
        if elapsed <= self.budget {
            return false;
        }
        warn!(
            "structural tick on {:?} exceeded budget: {:.2} ms > {:.2} ms",
            entity,
            elapsed.as_secs_f32() * 1000.0,
            self.budget.as_secs_f32() * 1000.0
        );
        true
    }
}
