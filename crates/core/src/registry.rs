//! Script registry
//!
//! A typed, read-only mapping from task name to the script it runs, built once
//! from a `package.json` (or an inline task-list override) before anything runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::configs::manifest::{parse_package_manifest, PackageManifest};
use crate::types::{RunAllError, RunAllResult};

/// Tasks npm runs even when the manifest declares no script by that name
pub const BUILTIN_TASKS: &[&str] = &["env", "restart"];

/// One runnable script and the package it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRegistryEntry {
    pub name: String,
    pub command_body: String,
    pub package_name: String,
    pub package_version: String,
    /// Path of the manifest the script was declared in
    pub package_path: PathBuf,
}

/// Known scripts in declaration order
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: Vec<TaskRegistryEntry>,
    by_name: HashMap<String, usize>,
    builtins: Vec<TaskRegistryEntry>,
    package_path: PathBuf,
    package_name: String,
    package_version: String,
}

impl TaskRegistry {
    /// Load the scripts of the manifest at `package_path`
    pub fn load(package_path: &Path) -> RunAllResult<Self> {
        let content = std::fs::read_to_string(package_path).map_err(|e| {
            RunAllError::Registry(format!(
                "Failed to read package manifest {}: {}",
                package_path.display(),
                e
            ))
        })?;

        let manifest = parse_package_manifest(&content).map_err(|e| {
            RunAllError::Registry(format!(
                "Failed to parse package manifest {}: {}",
                package_path.display(),
                e
            ))
        })?;

        Self::from_manifest(manifest, package_path)
    }

    pub fn from_manifest(manifest: PackageManifest, package_path: &Path) -> RunAllResult<Self> {
        let scripts = manifest.scripts.ok_or_else(|| {
            RunAllError::Registry(format!(
                "Package manifest {} has no scripts",
                package_path.display()
            ))
        })?;

        let mut registry = Self::empty(
            package_path,
            manifest.name.unwrap_or_default(),
            manifest.version.unwrap_or_default(),
        );
        for (name, body) in scripts {
            let body = body.as_str().ok_or_else(|| {
                RunAllError::Registry(format!(
                    "Script '{}' in {} is not a string",
                    name,
                    package_path.display()
                ))
            })?;
            registry.insert(name, body.to_string());
        }

        Ok(registry.with_builtins())
    }

    /// Build a registry from an inline task list, keeping the package identity
    /// of `package` when one was loaded.
    pub fn from_task_list(
        task_list: &serde_json::Value,
        package: Option<&TaskRegistry>,
    ) -> RunAllResult<Self> {
        let map = task_list.as_object().ok_or_else(|| {
            RunAllError::InvalidPolicy("task list must be a mapping of names to commands".to_string())
        })?;

        let mut registry = match package {
            Some(package) => Self::empty(
                &package.package_path,
                package.package_name.clone(),
                package.package_version.clone(),
            ),
            None => Self::default(),
        };
        for (name, body) in map {
            let body = body.as_str().ok_or_else(|| {
                RunAllError::InvalidPolicy(format!(
                    "task list entry '{}' must be a command string",
                    name
                ))
            })?;
            registry.insert(name.clone(), body.to_string());
        }

        Ok(registry.with_builtins())
    }

    fn empty(package_path: &Path, package_name: String, package_version: String) -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            builtins: Vec::new(),
            package_path: package_path.to_path_buf(),
            package_name,
            package_version,
        }
    }

    fn insert(&mut self, name: String, command_body: String) {
        let entry = TaskRegistryEntry {
            name: name.clone(),
            command_body,
            package_name: self.package_name.clone(),
            package_version: self.package_version.clone(),
            package_path: self.package_path.clone(),
        };
        match self.by_name.get(&name) {
            Some(&index) => self.entries[index] = entry,
            None => {
                self.by_name.insert(name, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Add entries for the built-in tasks the scripts do not shadow.
    ///
    /// `env` prints the environment a script would see. `restart` runs the
    /// `stop` script and then the `start` script, skipping whichever is absent.
    fn with_builtins(mut self) -> Self {
        for &name in BUILTIN_TASKS {
            if self.by_name.contains_key(name) {
                continue;
            }
            let command_body = match name {
                "env" => print_env_command().to_string(),
                _ => self.restart_command(),
            };
            self.builtins.push(TaskRegistryEntry {
                name: name.to_string(),
                command_body,
                package_name: self.package_name.clone(),
                package_version: self.package_version.clone(),
                package_path: self.package_path.clone(),
            });
        }
        self
    }

    fn restart_command(&self) -> String {
        let steps: Vec<&str> = ["stop", "start"]
            .iter()
            .filter_map(|name| self.get(name))
            .map(|entry| entry.command_body.as_str())
            .collect();
        if steps.is_empty() {
            no_op_command().to_string()
        } else {
            steps.join(" && ")
        }
    }

    /// Known task names in declaration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// The script named `name`, or the built-in task of that name
    pub fn get(&self, name: &str) -> Option<&TaskRegistryEntry> {
        match self.by_name.get(name) {
            Some(&index) => self.entries.get(index),
            None => self.builtins.iter().find(|entry| entry.name == name),
        }
    }

    pub fn entries(&self) -> &[TaskRegistryEntry] {
        &self.entries
    }

    /// Directory containing the manifest, if the registry came from one
    pub fn package_dir(&self) -> Option<&Path> {
        if self.package_path.as_os_str().is_empty() {
            return None;
        }
        match self.package_path.parent() {
            Some(dir) if dir.as_os_str().is_empty() => Some(Path::new(".")),
            parent => parent,
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn package_version(&self) -> &str {
        &self.package_version
    }
}

fn print_env_command() -> &'static str {
    if cfg!(windows) {
        "set"
    } else {
        "env"
    }
}

fn no_op_command() -> &'static str {
    if cfg!(windows) {
        "exit 0"
    } else {
        "true"
    }
}
