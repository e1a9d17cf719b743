//! Result types for task runs
//!
//! This module holds the per-task outcome record and the aggregate result of an
//! invocation, along with the pure reduction between them.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use crate::tasks::TaskSpec;
use crate::types::{RunAllError, RunAllResult};

/// Exit code reported for a failure that carries no numeric code of its own,
/// such as a launch failure or a signal
pub const FALLBACK_EXIT_CODE: i32 = 1;

/// The terminal result of one task's execution attempt
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: TaskSpec,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub succeeded: bool,
    /// The scheduler asked this task to terminate
    pub cancelled: bool,
    /// Why the task could not be launched, if it never ran
    pub launch_error: Option<String>,
    pub started_at: Instant,
    pub ended_at: Instant,
}

impl TaskOutcome {
    pub fn from_exit_status(
        task: TaskSpec,
        status: ExitStatus,
        cancelled: bool,
        started_at: Instant,
    ) -> Self {
        Self {
            task,
            exit_code: status.code(),
            signal: signal_name(&status),
            succeeded: status.success(),
            cancelled,
            launch_error: None,
            started_at,
            ended_at: Instant::now(),
        }
    }

    pub fn launch_failed(task: TaskSpec, error: &RunAllError, started_at: Instant) -> Self {
        Self {
            task,
            exit_code: None,
            signal: None,
            succeeded: false,
            cancelled: false,
            launch_error: Some(error.to_string()),
            started_at,
            ended_at: Instant::now(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.ended_at.saturating_duration_since(self.started_at)
    }

    /// Exit code used when this outcome represents the whole run
    pub fn representative_code(&self) -> i32 {
        match self.exit_code {
            Some(code) if code != 0 => code,
            _ => FALLBACK_EXIT_CODE,
        }
    }
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|signo| {
        nix::sys::signal::Signal::try_from(signo)
            .map(|signal| signal.as_str().to_string())
            .unwrap_or_else(|_| format!("signal {}", signo))
    })
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> Option<String> {
    None
}

/// Aggregate result of one invocation
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Outcomes of every task that started, in task-list order
    pub outcomes: Vec<TaskOutcome>,
    /// Tasks never started because an earlier failure cancelled the run
    pub skipped: Vec<TaskSpec>,
    pub overall_succeeded: bool,
    pub overall_exit_code: i32,
}

impl RunResult {
    /// The outcome whose exit code represents a failed run.
    ///
    /// Tasks terminated by the scheduler are only blamed when nothing else failed.
    pub fn first_failure(&self) -> Option<&TaskOutcome> {
        let mut failures = self.outcomes.iter().filter(|o| !o.succeeded);
        let first = failures.clone().next();
        failures.find(|o| !o.cancelled).or(first)
    }

    /// Convert a failed run into a `TaskExit` error
    pub fn into_result(self) -> RunAllResult<RunResult> {
        if self.overall_succeeded {
            return Ok(self);
        }
        let task = self
            .first_failure()
            .map(|o| o.task.raw_invocation.clone())
            .unwrap_or_default();
        Err(RunAllError::TaskExit {
            task,
            code: self.overall_exit_code,
        })
    }
}

/// Reduce task outcomes (already in task-list order) into one result
pub fn aggregate(outcomes: Vec<TaskOutcome>, skipped: Vec<TaskSpec>) -> RunResult {
    let mut result = RunResult {
        overall_succeeded: skipped.is_empty() && outcomes.iter().all(|o| o.succeeded),
        overall_exit_code: 0,
        outcomes,
        skipped,
    };

    if !result.overall_succeeded {
        result.overall_exit_code = result
            .first_failure()
            .map(TaskOutcome::representative_code)
            .unwrap_or(FALLBACK_EXIT_CODE);
    }

    result
}
