use anyhow::Result;
use colored::*;
use runall_core::manager::RunManager;
use runall_core::tasks::get_task_color;

pub fn execute(manager: &RunManager) -> Result<()> {
    let registry = &manager.registry;

    let heading = if registry.package_name().is_empty() {
        "Scripts".to_string()
    } else {
        format!("Scripts ({}@{})", registry.package_name(), registry.package_version())
    };
    println!("{}", heading.bold().underline());

    if registry.entries().is_empty() {
        println!("  {}", "No scripts found".dimmed());
        return Ok(());
    }

    for entry in registry.entries() {
        println!(
            "{}  {}",
            entry.name.color(get_task_color(&entry.name)).bold(),
            entry.command_body.dimmed()
        );
    }

    Ok(())
}
