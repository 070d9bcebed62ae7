//! Load propagation: impulse intake, joint relaxation, damage and islands.

pub mod accumulation;
pub mod damage;
pub mod island;
pub mod solver;

pub use accumulation::{ContactPartner, ContactReport, ImpulseClass};
pub use damage::ForcedBreak;
pub use island::{IslandAnalyzer, IslandMap};
pub use solver::{JointRelaxationSolver, SolveFrame, SolveReport, SolverScratch};
