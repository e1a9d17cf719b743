//! `.runall.yml` run configuration
//!
//! Defaults for the run policy, an optional script shell and an inline task
//! list that replaces the manifest's scripts.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{RunAllError, RunAllResult};

/// File name looked up next to the package manifest
pub const RUN_CONFIG_FILE_NAME: &str = ".runall.yml";

/// Defaults for one invocation, read from `.runall.yml`. Command-line flags
/// take precedence over every field.
#[derive(Deserialize, Serialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunConfig {
    pub continue_on_error: Option<bool>,
    pub print_label: Option<bool>,
    pub print_name: Option<bool>,
    pub silent: Option<bool>,
    /// Upper bound on concurrently running tasks in parallel mode
    pub max_parallel: Option<usize>,
    /// Shell used to run script bodies instead of the platform default
    pub script_shell: Option<String>,
    /// Inline mapping of task name to command, used instead of the manifest's scripts
    pub task_list: Option<serde_json::Value>,
}

pub fn parse_run_config(yaml_str: &str) -> RunAllResult<RunConfig> {
    let config: RunConfig = serde_yaml::from_str(yaml_str)?;
    Ok(config)
}

pub fn load_run_config(path: &Path) -> RunAllResult<RunConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RunAllError::Config(format!(
            "Failed to read run config {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_run_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_run_config(
            r#"
continueOnError: true
printLabel: true
maxParallel: 4
scriptShell: bash
taskList:
  build: make
"#,
        )
        .unwrap();
        assert_eq!(config.continue_on_error, Some(true));
        assert_eq!(config.print_label, Some(true));
        assert_eq!(config.print_name, None);
        assert_eq!(config.max_parallel, Some(4));
        assert_eq!(config.script_shell.as_deref(), Some("bash"));
        let task_list = config.task_list.unwrap();
        assert_eq!(task_list["build"], "make");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(parse_run_config("parallel: true\n").is_err());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_run_config(&dir.path().join(RUN_CONFIG_FILE_NAME)).unwrap_err();
        assert!(matches!(err, RunAllError::Config(_)));
    }
}
