use anyhow::Result;
use colored::*;
use runall_core::manager::RunManager;

pub fn execute(manager: &RunManager, patterns: &[String], args: &[String]) -> Result<()> {
    println!("{} {}", "Execution plan for".bold(), patterns.join(" ").cyan());

    let tasks = manager
        .plan(patterns, args)
        .map_err(|e| anyhow::anyhow!("Failed to resolve tasks: {}", e))?;

    println!("\n{}:", "Execution order".bold());
    for (i, task) in tasks.iter().enumerate() {
        println!("  {}. {}", i + 1, task.raw_invocation);
    }

    Ok(())
}
