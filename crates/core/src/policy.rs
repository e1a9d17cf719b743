//! Run policy
//!
//! The immutable set of flags governing concurrency and failure/output behavior
//! for one invocation.

use crate::configs::run::RunConfig;
use crate::types::{RunAllError, RunAllResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    Parallel,
    #[default]
    Sequential,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPolicy {
    pub mode: ExecutionMode,
    pub continue_on_error: bool,
    pub silent: bool,
    pub print_label: bool,
    pub print_name: bool,
    /// Parallel mode only; `None` means unbounded
    pub max_parallelism: Option<usize>,
}

impl RunPolicy {
    pub fn parallel() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            ..Self::default()
        }
    }

    pub fn sequential() -> Self {
        Self::default()
    }

    /// Fill flags left unset on the command line from a run config.
    /// Boolean flags combine with OR; an explicit bound wins over the config.
    pub fn with_config_defaults(mut self, config: &RunConfig) -> Self {
        self.continue_on_error |= config.continue_on_error.unwrap_or(false);
        self.silent |= config.silent.unwrap_or(false);
        self.print_label |= config.print_label.unwrap_or(false);
        self.print_name |= config.print_name.unwrap_or(false);
        if self.max_parallelism.is_none() {
            self.max_parallelism = config.max_parallel;
        }
        self
    }

    pub fn validate(&self) -> RunAllResult<()> {
        if self.max_parallelism == Some(0) {
            return Err(RunAllError::InvalidPolicy(
                "max parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// How many tasks may run at once for a list of `task_count` tasks
    pub fn concurrency_limit(&self, task_count: usize) -> usize {
        match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => self.max_parallelism.unwrap_or(task_count).max(1),
        }
    }
}
