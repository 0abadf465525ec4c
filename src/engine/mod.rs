//! Step execution engine: declarative actions interpreted against a live
//! browser session, one TestExecution record per test case.

pub mod runner;
pub mod steps;

pub use runner::{CaseRunner, ExecutionSummary};
pub use steps::{StepAction, StepExecutor, StepParseError};
