pub mod autopilot;
pub mod reports;
pub mod tester;

pub use autopilot::{Autopilot, LearnerStrategy, WalkSummary};
pub use tester::*;
