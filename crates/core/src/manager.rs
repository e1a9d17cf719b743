//! High-level run interface
//!
//! This module provides the [`RunManager`] which serves as the primary entry point
//! for running package scripts. It encapsulates:
//! - Loading the package manifest and the optional run configuration
//! - Resolving task patterns against the script registry
//! - Merging configuration defaults into the run policy
//! - Scheduling the resolved tasks
//!
//! ## Example
//!
//! ```rust,no_run
//! use runall_core::manager::{RunManager, RunManagerConfig};
//! use runall_core::policy::RunPolicy;
//! use std::path::PathBuf;
//!
//! # async fn example() -> runall_core::types::RunAllResult<()> {
//! let manager = RunManager::new(RunManagerConfig {
//!     package_path: PathBuf::from("package.json"),
//!     config_path: None,
//! })?;
//!
//! // Show what would run
//! for task in manager.plan(&["build:*"], &[])? {
//!     println!("{}", task.raw_invocation);
//! }
//!
//! // Run in parallel
//! let result = manager.run(&["build:*"], &[], RunPolicy::parallel()).await?;
//! std::process::exit(result.overall_exit_code);
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::configs::run::{load_run_config, RunConfig, RUN_CONFIG_FILE_NAME};
use crate::execution::{ExecutionContext, ShellLauncher, TaskRunner};
use crate::matcher::{apply_passthrough, match_tasks};
use crate::policy::RunPolicy;
use crate::registry::TaskRegistry;
use crate::results::{aggregate, RunResult};
use crate::tasks::TaskSpec;
use crate::types::RunAllResult;

/// Configuration for initializing a run manager
pub struct RunManagerConfig {
    pub package_path: PathBuf,
    /// Explicit run config; when absent `.runall.yml` next to the manifest is used if present
    pub config_path: Option<PathBuf>,
}

/// High-level manager that owns the script registry and run configuration
pub struct RunManager {
    pub registry: Arc<TaskRegistry>,
    pub run_config: RunConfig,
}

impl RunManager {
    /// Load the run configuration and the script registry
    pub fn new(config: RunManagerConfig) -> RunAllResult<Self> {
        let run_config = Self::load_run_config(&config.package_path, config.config_path.as_deref())?;
        let registry = Self::load_registry(&config.package_path, &run_config)?;

        Ok(Self {
            registry: Arc::new(registry),
            run_config,
        })
    }

    /// Resolve patterns into the concrete task list without running anything
    pub fn plan<S: AsRef<str>>(
        &self,
        patterns: &[S],
        passthrough: &[String],
    ) -> RunAllResult<Vec<TaskSpec>> {
        let tasks = match_tasks(patterns, &self.registry.names())?;
        Ok(apply_passthrough(tasks, passthrough))
    }

    /// Fill unset policy flags from the run configuration
    pub fn effective_policy(&self, policy: RunPolicy) -> RunPolicy {
        policy.with_config_defaults(&self.run_config)
    }

    /// Run tasks against the invocation's own stdio
    pub async fn run<S: AsRef<str>>(
        &self,
        patterns: &[S],
        passthrough: &[String],
        policy: RunPolicy,
    ) -> RunAllResult<RunResult> {
        let mut context = ExecutionContext::inherited();
        context.working_dir = self.registry.package_dir().map(Path::to_path_buf);
        self.run_with_context(patterns, passthrough, policy, context)
            .await
    }

    /// Run tasks with explicitly provided stdio, environment and working directory
    pub async fn run_with_context<S: AsRef<str>>(
        &self,
        patterns: &[S],
        passthrough: &[String],
        policy: RunPolicy,
        context: ExecutionContext,
    ) -> RunAllResult<RunResult> {
        let policy = self.effective_policy(policy);
        policy.validate()?;

        let tasks = self.plan(patterns, passthrough)?;
        if tasks.is_empty() {
            return Ok(aggregate(Vec::new(), Vec::new()));
        }

        let launcher = ShellLauncher::new()
            .with_script_shell(self.run_config.script_shell.clone())
            .with_package_dir(self.registry.package_dir());
        let runner = TaskRunner::new(Arc::new(launcher), self.registry.clone(), context, policy);
        runner.run(&tasks).await
    }

    // Private helper methods

    fn load_run_config(package_path: &Path, explicit: Option<&Path>) -> RunAllResult<RunConfig> {
        if let Some(path) = explicit {
            return load_run_config(path);
        }

        let default_path = package_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(RUN_CONFIG_FILE_NAME);
        if default_path.exists() {
            load_run_config(&default_path)
        } else {
            Ok(RunConfig::default())
        }
    }

    fn load_registry(package_path: &Path, run_config: &RunConfig) -> RunAllResult<TaskRegistry> {
        let Some(task_list) = &run_config.task_list else {
            return TaskRegistry::load(package_path);
        };

        // An override only borrows the package identity when a manifest exists
        let package = if package_path.exists() {
            TaskRegistry::load(package_path).ok()
        } else {
            None
        };
        TaskRegistry::from_task_list(task_list, package.as_ref())
    }
}
