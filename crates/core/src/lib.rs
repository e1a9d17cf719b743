//! runall Core Library
//!
//! This is the core library for the runall script runner. It resolves script
//! names and glob-like patterns against a package's script registry, runs the
//! resulting tasks in parallel or in sequence, and aggregates their outcomes
//! into a single result.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`manager`] - High-level interface tying configuration, resolution and execution together
//! - [`matcher`] - Pattern expansion against known task names
//! - [`execution`] - Command construction, output collection and the task scheduler
//! - [`header`] - Banners printed before each task
//! - [`registry`] - The read-only script registry
//! - [`policy`] - Concurrency and failure policy for one invocation
//! - [`results`] - Task outcomes and their aggregation
//! - [`tasks`] - Task identity and label colors
//! - [`configs`] - Parsing of package manifests and run configuration files
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! The primary entry point is the [`RunManager`]:
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
//! let result = manager.run(&["lint", "build:*"], &[], RunPolicy::sequential()).await?;
//! assert!(result.overall_succeeded);
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod execution;
pub mod header;
pub mod manager;
pub mod matcher;
pub mod policy;
pub mod registry;
pub mod results;
pub mod tasks;
pub mod types;

// Re-export the main types for easier usage
pub use manager::{RunManager, RunManagerConfig};
pub use policy::{ExecutionMode, RunPolicy};
pub use results::{RunResult, TaskOutcome};
pub use tasks::TaskSpec;
pub use types::{RunAllError, RunAllResult};
