use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use colored::*;
use runall_core::manager::RunManager;
use runall_core::policy::{ExecutionMode, RunPolicy};
use runall_core::results::RunResult;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task names or glob-like patterns, e.g. "build:*" or "watch:** --poll"
    pub patterns: Vec<String>,

    /// Run tasks in parallel
    #[arg(short = 'p', long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Run tasks one after another (default)
    #[arg(long)]
    pub sequential: bool,

    /// Keep running other tasks when one fails
    #[arg(short = 'c', long)]
    pub continue_on_error: bool,

    /// Prefix every output line with the task name
    #[arg(short = 'l', long)]
    pub print_label: bool,

    /// Show package and command details before each task
    #[arg(short = 'n', long)]
    pub print_name: bool,

    /// Suppress all task output and headers
    #[arg(short = 's', long)]
    pub silent: bool,

    /// Limit how many tasks run at once in parallel mode
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Arguments appended to every task, after any arguments embedded in patterns
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl RunArgs {
    pub fn policy(&self) -> RunPolicy {
        RunPolicy {
            mode: if self.parallel {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            },
            continue_on_error: self.continue_on_error,
            silent: self.silent,
            print_label: self.print_label,
            print_name: self.print_name,
            max_parallelism: self.max_parallel,
        }
    }
}

pub async fn execute(manager: &RunManager, args: RunArgs) -> Result<ExitCode> {
    let policy = manager.effective_policy(args.policy());

    let result = manager
        .run(&args.patterns, &args.args, policy.clone())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if !policy.silent {
        report_failures(&result);
    }

    Ok(exit_code(result.overall_exit_code))
}

fn report_failures(result: &RunResult) {
    for outcome in result.outcomes.iter().filter(|o| !o.succeeded) {
        let reason = if let Some(error) = &outcome.launch_error {
            error.clone()
        } else if let Some(signal) = &outcome.signal {
            format!("terminated by {}", signal)
        } else {
            format!("exited with code {}", outcome.representative_code())
        };
        let cancelled = if outcome.cancelled { " (cancelled)" } else { "" };
        eprintln!(
            "{} {}{}",
            format!("✗ {}", outcome.task.raw_invocation).red().bold(),
            reason,
            cancelled.bright_black()
        );
    }

    if !result.skipped.is_empty() {
        let skipped: Vec<_> = result
            .skipped
            .iter()
            .map(|task| task.raw_invocation.as_str())
            .collect();
        eprintln!("{} {}", "Skipped:".bright_black(), skipped.join(", "));
    }
}

fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
