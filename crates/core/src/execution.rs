//! Task execution module
//!
//! This module handles the actual execution of tasks including command construction,
//! output collection and scheduling under a run policy.

pub mod command;
pub mod output;
pub mod runner;

pub use command::{ShellLauncher, TaskLauncher};
pub use output::{OutputSink, OutputStream};
pub use runner::{ExecutionContext, StdinMode, TaskRunner};
