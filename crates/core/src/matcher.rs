//! Task name pattern resolution
//!
//! Expands user-supplied patterns against the ordered list of known task names.
//! Task names use `:` as their namespace separator; `*` stays inside one segment
//! while a `**` segment crosses separators.

use std::collections::HashSet;

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::registry::BUILTIN_TASKS;
use crate::tasks::TaskSpec;
use crate::types::{RunAllError, RunAllResult};

const GLOB_META_CHARS: &[char] = &['*', '?', '[', '{'];

/// A parsed pattern: the bare name matcher plus the arguments embedded after it
struct TaskPattern {
    source: String,
    matcher: NameMatcher,
    args: Vec<String>,
}

enum NameMatcher {
    Literal(String),
    Glob(GlobMatcher),
}

impl TaskPattern {
    fn parse(pattern: &str) -> RunAllResult<Self> {
        let mut parts = pattern.split_whitespace();
        let bare = parts.next().ok_or_else(|| RunAllError::PatternResolution {
            pattern: pattern.to_string(),
        })?;
        let args = parts.map(str::to_string).collect();

        let matcher = if bare.contains(GLOB_META_CHARS) {
            let glob = GlobBuilder::new(&to_path_form(bare))
                .literal_separator(true)
                .build()
                .map_err(|_| RunAllError::PatternResolution {
                    pattern: pattern.to_string(),
                })?;
            NameMatcher::Glob(glob.compile_matcher())
        } else {
            NameMatcher::Literal(bare.to_string())
        };

        Ok(Self {
            source: pattern.to_string(),
            matcher,
            args,
        })
    }

    /// Literal patterns naming an npm built-in task resolve even without a script
    fn builtin(&self) -> Option<&str> {
        match &self.matcher {
            NameMatcher::Literal(literal) if BUILTIN_TASKS.contains(&literal.as_str()) => {
                Some(literal.as_str())
            }
            _ => None,
        }
    }

    fn is_match(&self, name: &str) -> bool {
        match &self.matcher {
            NameMatcher::Literal(literal) => literal == name,
            NameMatcher::Glob(glob) => glob.is_match(to_path_form(name)),
        }
    }
}

/// Task names are matched as if `:` were a path separator. A `/` inside a name
/// is an ordinary character, so the two are swapped.
fn to_path_form(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' => '/',
            '/' => ':',
            other => other,
        })
        .collect()
}

/// Resolve patterns into concrete tasks.
///
/// Output keeps first-seen order across patterns and known-name order within a
/// pattern. Identical `(name, args)` pairs are only emitted once. Any pattern
/// that matches nothing fails the whole resolution, except a literal `env` or
/// `restart`, which falls back to the built-in task.
pub fn match_tasks<S: AsRef<str>>(
    patterns: &[S],
    known_names: &[String],
) -> RunAllResult<Vec<TaskSpec>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for pattern in patterns {
        let pattern = TaskPattern::parse(pattern.as_ref())?;

        let mut matched_any = false;
        for name in known_names.iter().filter(|name| pattern.is_match(name)) {
            matched_any = true;
            let task = TaskSpec::new(name.clone(), pattern.args.clone());
            if seen.insert(task.clone()) {
                resolved.push(task);
            }
        }

        if !matched_any {
            let Some(builtin) = pattern.builtin() else {
                return Err(RunAllError::PatternResolution {
                    pattern: pattern.source.clone(),
                });
            };
            let task = TaskSpec::new(builtin, pattern.args.clone());
            if seen.insert(task.clone()) {
                resolved.push(task);
            }
        }
        debug!(pattern = %pattern.source, "pattern resolved");
    }

    Ok(resolved)
}

/// Append passthrough arguments after any pattern-embedded arguments
pub fn apply_passthrough(tasks: Vec<TaskSpec>, passthrough: &[String]) -> Vec<TaskSpec> {
    if passthrough.is_empty() {
        return tasks;
    }
    tasks
        .iter()
        .map(|task| task.with_appended_args(passthrough))
        .collect()
}
