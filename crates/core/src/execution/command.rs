//! Command construction for tasks
//!
//! This module turns a resolved task and its registry entry into the OS command
//! that runs it, the way `npm run-script` would: the script body goes through a
//! shell with the task's arguments appended, and the package's local binaries
//! are put on `PATH`.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::registry::TaskRegistryEntry;
use crate::tasks::TaskSpec;
use crate::types::{RunAllError, RunAllResult};

/// Builds the process for one task
pub trait TaskLauncher: Send + Sync {
    fn command(&self, task: &TaskSpec, entry: &TaskRegistryEntry) -> RunAllResult<Command>;
}

/// Runs script bodies through a shell
#[derive(Debug, Clone, Default)]
pub struct ShellLauncher {
    script_shell: Option<String>,
    bin_dir: Option<PathBuf>,
}

impl ShellLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `shell -c <script>` instead of the platform shell
    pub fn with_script_shell(mut self, script_shell: Option<String>) -> Self {
        self.script_shell = script_shell;
        self
    }

    /// Put `<package_dir>/node_modules/.bin` in front of `PATH`
    pub fn with_package_dir(mut self, package_dir: Option<&Path>) -> Self {
        self.bin_dir = package_dir.map(|dir| dir.join("node_modules").join(".bin"));
        self
    }

    fn shell_command(&self, script: &str) -> Command {
        if let Some(shell) = &self.script_shell {
            let mut command = Command::new(shell);
            command.arg("-c").arg(script);
            return command;
        }

        if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.arg("/d").arg("/s").arg("/c").arg(script);
            command
        } else {
            let mut command = Command::new("sh");
            command.arg("-c").arg(script);
            command
        }
    }

    fn search_path(&self, bin_dir: &Path) -> RunAllResult<std::ffi::OsString> {
        let mut paths = vec![bin_dir.to_path_buf()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths)
            .map_err(|e| RunAllError::Launch(format!("Failed to build PATH: {}", e)))
    }
}

impl TaskLauncher for ShellLauncher {
    fn command(&self, task: &TaskSpec, entry: &TaskRegistryEntry) -> RunAllResult<Command> {
        let script = script_line(&entry.command_body, &task.args);
        let mut command = self.shell_command(&script);

        if !entry.package_name.is_empty() {
            command.env("npm_package_name", &entry.package_name);
        }
        if !entry.package_version.is_empty() {
            command.env("npm_package_version", &entry.package_version);
        }
        if let Some(bin_dir) = &self.bin_dir {
            command.env("PATH", self.search_path(bin_dir)?);
        }

        Ok(command)
    }
}

/// The script body followed by the quoted task arguments. A leading `--` is the
/// run-script separator and is not passed on.
pub fn script_line(body: &str, args: &[String]) -> String {
    let args = match args.split_first() {
        Some((first, rest)) if first == "--" => rest,
        _ => args,
    };
    if args.is_empty() {
        return body.to_string();
    }

    let quoted: Vec<String> = args.iter().map(|arg| quote_arg(arg)).collect();
    format!("{} {}", body, quoted.join(" "))
}

#[cfg(not(windows))]
fn quote_arg(arg: &str) -> String {
    let is_plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if is_plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[cfg(windows)]
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\\\""))
    }
}
