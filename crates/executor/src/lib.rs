//! Launching the coding-agent CLI.
//!
//! One run is one subprocess: the prompt goes in as an argument, stdout and
//! stderr come back separately, and the run is bounded by a deadline and a
//! cancellation token. On unix the child leads its own process group so
//! that anything it spawns dies with it.

pub mod group;
pub mod launcher;
pub mod result;

pub use launcher::{build_args, AgentLauncher, AgentRunner, Availability, RunOptions};
pub use result::{ExecutionResult, ExitClass};
