use std::collections::VecDeque;

use crate::{core::structure::StructuralState, dynamics::solver::SolverScratch};

/// Island assignment of every part of a body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IslandMap {
    /// Island per part; `None` marks a parent removed outright.
    pub island_of: Vec<Option<usize>>,
    pub island_count: usize,
    /// Parts whose saved flags were restored because their parent was removed.
    pub revealed: Vec<usize>,
}

impl IslandMap {
    /// Parts of island `island`, in index order.
    pub fn members(&self, island: usize) -> Vec<usize> {
        self.island_of
            .iter()
            .enumerate()
            .filter(|(_, i)| **i == Some(island))
            .map(|(part, _)| part)
            .collect()
    }

    pub fn removed(&self) -> Vec<usize> {
        self.island_of
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_none())
            .map(|(part, _)| part)
            .collect()
    }

    /// True when something leaves the main body.
    pub fn detaches_anything(&self) -> bool {
        self.island_of.iter().any(|i| *i != Some(0))
    }
}

/// Partitions parts into islands over the joints still intact.
#[derive(Debug, Default)]
pub struct IslandAnalyzer {
    queue: VecDeque<usize>,
}

impl IslandAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breadth-first partition; island 0 is the anchored (or heaviest) component.
    ///
    /// Applies the parent policy on the way: a jointed child that lands outside
    /// island 0 removes its parent, whose children are re-parented and restored.
    pub fn partition(&mut self, state: &mut StructuralState, scratch: &mut SolverScratch) -> IslandMap {
        scratch.build_adjacency(state);
        let n = state.parts.len();
        let mut island: Vec<Option<usize>> = vec![None; n];
        let mut jointless = vec![true; n];
        for joint in state.joints.iter().filter(|j| j.is_structural()) {
            for part in joint.parts.iter().flatten() {
                jointless[*part] = false;
            }
        }
        // Jointless children ride on their parent instead of seeding islands.
        let rides: Vec<bool> = (0..n)
            .map(|i| jointless[i] && state.parts[i].parent.is_some())
            .collect();

        // Island 0 seeds.
        self.queue.clear();
        let mut anchored = false;
        for joint in state.joints.iter().filter(|j| j.is_connecting() && j.is_world_anchored()) {
            for part in joint.parts.iter().flatten() {
                anchored = true;
                if island[*part].is_none() {
                    island[*part] = Some(0);
                    self.queue.push_back(*part);
                }
            }
        }
        for i in 0..n {
            if state.parts[i].is_immovable() && island[i].is_none() && !rides[i] {
                island[i] = Some(0);
                self.queue.push_back(i);
            }
        }
        if !anchored && self.queue.is_empty() {
            if let Some(root) = heaviest_part(state, scratch, &rides) {
                island[root] = Some(0);
                self.queue.push_back(root);
            }
        }
        self.flood(state, scratch, &mut island, 0);

        let mut island_count = 1;
        for i in 0..n {
            if island[i].is_none() && !rides[i] {
                island[i] = Some(island_count);
                self.queue.push_back(i);
                self.flood(state, scratch, &mut island, island_count);
                island_count += 1;
            }
        }

        let mut removed = vec![false; n];
        let mut revealed = Vec::new();
        loop {
            let victim = (0..n).find_map(|c| {
                let parent = state.parts[c].parent?;
                let detached = !jointless[c] && island[c].map(|i| i != 0).unwrap_or(false);
                (detached && !removed[parent]).then_some(parent)
            });
            let Some(parent) = victim else { break };
            removed[parent] = true;
            let grandparent = state.parts[parent].parent;
            for child in 0..n {
                if state.parts[child].parent == Some(parent) {
                    state.parts[child].restore_snapshot();
                    state.parts[child].parent = grandparent.filter(|g| !removed[*g]);
                    revealed.push(child);
                }
            }
            log::debug!("removing structural parent part {}", state.parts[parent].id);
        }

        // Riders follow the first surviving ancestor; orphans become their own islands.
        for i in 0..n {
            if removed[i] {
                island[i] = None;
                continue;
            }
            if !rides[i] && island[i].is_some() {
                continue;
            }
            let mut cursor = state.parts[i].parent;
            let mut hops = 0;
            let mut resolved = None;
            while let Some(p) = cursor {
                if hops > n {
                    break;
                }
                if !removed[p] && !rides[p] {
                    resolved = island[p];
                    break;
                }
                cursor = state.parts[p].parent;
                hops += 1;
            }
            island[i] = Some(resolved.unwrap_or_else(|| {
                island_count += 1;
                island_count - 1
            }));
        }

        IslandMap {
            island_of: island,
            island_count,
            revealed,
        }
    }

    fn flood(&mut self, state: &StructuralState, scratch: &SolverScratch, island: &mut [Option<usize>], id: usize) {
        while let Some(part) = self.queue.pop_front() {
            for &j in scratch.joints_of(part) {
                let joint = &state.joints[j];
                if joint.broken {
                    continue;
                }
                if let Some(other) = joint.other(part) {
                    if island[other].is_none() {
                        island[other] = Some(id);
                        self.queue.push_back(other);
                    }
                }
            }
        }
    }
}

/// Heaviest part, preferring the slowest and then the lowest index on ties.
fn heaviest_part(state: &StructuralState, scratch: &SolverScratch, skip: &[bool]) -> Option<usize> {
    (0..state.parts.len()).filter(|&i| !skip[i]).min_by(|&a, &b| {
        state.parts[b]
            .mass
            .total_cmp(&state.parts[a].mass)
            .then(scratch.seed_speed_sq(a).total_cmp(&scratch.seed_speed_sq(b)))
            .then(a.cmp(&b))
    })
}
