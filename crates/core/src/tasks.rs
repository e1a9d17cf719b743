//! Task identity and label color management
//!
//! This module defines the concrete unit of work produced by pattern resolution
//! and a consistent color mapping for task labels in terminal output.

use colored::*;

/// One concrete, resolvable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskSpec {
    pub name: String,
    pub args: Vec<String>,
    /// `name` followed by the space-joined args, as the user would type it
    pub raw_invocation: String,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        let name = name.into();
        let raw_invocation = if args.is_empty() {
            name.clone()
        } else {
            format!("{} {}", name, args.join(" "))
        };
        Self {
            name,
            args,
            raw_invocation,
        }
    }

    /// Returns a copy of this task with `extra` appended to its arguments
    pub fn with_appended_args(&self, extra: &[String]) -> Self {
        let mut args = self.args.clone();
        args.extend(extra.iter().cloned());
        Self::new(self.name.clone(), args)
    }
}

/// Get a consistent color for a task name
pub fn get_task_color(task_name: &str) -> Color {
    // Use a simple hash of the task name bytes for consistent colors
    let hash = task_name
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

    // Jewel tones that read as "label" colors rather than log levels
    let colors = [
        Color::TrueColor {
            r: 147,
            g: 112,
            b: 219,
        }, // Medium slate blue
        Color::TrueColor {
            r: 64,
            g: 224,
            b: 208,
        }, // Turquoise
        Color::TrueColor {
            r: 255,
            g: 140,
            b: 0,
        }, // Dark orange
        Color::TrueColor {
            r: 199,
            g: 21,
            b: 133,
        }, // Medium violet red
        Color::TrueColor {
            r: 72,
            g: 209,
            b: 204,
        }, // Medium turquoise
        Color::TrueColor {
            r: 138,
            g: 43,
            b: 226,
        }, // Blue violet
    ];

    colors[(hash % colors.len() as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_invocation_without_args() {
        let task = TaskSpec::new("build", Vec::new());
        assert_eq!(task.raw_invocation, "build");
    }

    #[test]
    fn test_raw_invocation_with_args() {
        let task = TaskSpec::new("build", vec!["--watch".to_string(), "-v".to_string()]);
        assert_eq!(task.raw_invocation, "build --watch -v");
    }

    #[test]
    fn test_appended_args_keep_existing_first() {
        let task = TaskSpec::new("test", vec!["a".to_string()]);
        let extended = task.with_appended_args(&["b".to_string()]);
        assert_eq!(extended.args, vec!["a", "b"]);
        assert_eq!(extended.raw_invocation, "test a b");
    }

    #[test]
    fn test_task_color_is_stable() {
        assert_eq!(get_task_color("build:a"), get_task_color("build:a"));
    }
}
