use std::time::{Duration, Instant};

/// Accumulated timing and counters for structural ticks.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructureProfiler {
    pub solve_time: Duration,
    pub partition_time: Duration,
    pub materialize_time: Duration,
    pub mesh_split_time: Duration,

    pub ticks: usize,
    pub joints_solved: usize,
    pub joints_broken: usize,
    pub bodies_created: usize,
    pub mesh_splits: usize,
}

impl StructureProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Folds another profile (e.g. one tick's) into this one.
    pub fn merge(&mut self, other: &StructureProfiler) {
        self.solve_time += other.solve_time;
        self.partition_time += other.partition_time;
        self.materialize_time += other.materialize_time;
        self.mesh_split_time += other.mesh_split_time;
        self.ticks += other.ticks;
        self.joints_solved += other.joints_solved;
        self.joints_broken += other.joints_broken;
        self.bodies_created += other.bodies_created;
        self.mesh_splits += other.mesh_splits;
    }

    pub fn total_time(&self) -> Duration {
        self.solve_time + self.partition_time + self.materialize_time + self.mesh_split_time
    }

    pub fn report(&self) {
        let total_us = self.total_time().as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        log::info!(
            "structure profile: {} ticks, {} joints solved, {} broken, {} bodies, {} mesh splits",
            self.ticks,
            self.joints_solved,
            self.joints_broken,
            self.bodies_created,
            self.mesh_splits
        );
        for (label, duration) in [
            ("solve", self.solve_time),
            ("partition", self.partition_time),
            ("materialize", self.materialize_time),
            ("mesh split", self.mesh_split_time),
        ] {
            log::info!(
                "  {:<12} {:.2} ms ({:.1}%)",
                label,
                duration.as_secs_f32() * 1000.0,
                (duration.as_micros() as f32 / total_us) * 100.0
            );
        }
    }
}

/// Adds the elapsed time of its scope into a profiler slot.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for PhaseTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_counters_and_times() {
        let mut total = StructureProfiler::default();
        let tick = StructureProfiler {
            solve_time: Duration::from_millis(2),
            mesh_split_time: Duration::from_millis(1),
            ticks: 1,
            joints_broken: 3,
            ..StructureProfiler::default()
        };
        total.merge(&tick);
        total.merge(&tick);
        assert_eq!(total.ticks, 2);
        assert_eq!(total.joints_broken, 6);
        assert_eq!(total.total_time(), Duration::from_millis(6));

        total.reset();
        assert_eq!(total.ticks, 0);
    }

    #[test]
    fn phase_timer_adds_into_its_slot() {
        let mut slot = Duration::ZERO;
        {
            let _timer = PhaseTimer::new(&mut slot);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(slot >= Duration::from_millis(1));
    }
}
