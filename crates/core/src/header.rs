//! Task header banners

use colored::*;

use crate::registry::TaskRegistryEntry;

/// Creates the banner printed before a task starts.
///
/// Without a registry entry only the invocation is shown. With one, the banner
/// names the package, the task, the manifest path and the literal command body.
pub fn create_header(
    invocation: &str,
    entry: Option<&TaskRegistryEntry>,
    colorize: bool,
) -> String {
    let Some(entry) = entry else {
        return format!("\n> {}\n\n", invocation);
    };

    let (name, args) = invocation.split_once(' ').unwrap_or((invocation, ""));
    let package_line = format!(
        "> {}@{} {} {}",
        entry.package_name,
        entry.package_version,
        name,
        entry.package_path.display()
    );
    let command_line = format!("> {} {}", entry.command_body, args);

    if colorize {
        format!(
            "\n{}\n{}\n\n",
            package_line.bright_black(),
            command_line.bright_black()
        )
    } else {
        format!("\n{}\n{}\n\n", package_line, command_line)
    }
}
