// Run lifecycle
pub mod down;
pub mod up;

// Offline inspection
pub mod render;
pub mod roles;

use crate::ui;
use colored::Colorize;

/// Print the category, advice and leftover nodes of a failed run.
pub fn print_error_advice(err: &anyhow::Error) {
    let Some(error) = err.chain().find_map(|e| e.downcast_ref::<nodekit::Error>()) else {
        return;
    };
    let category = error.category();

    ui::error(&format!("{}: {error}", category.description()));

    let orphaned = error.orphaned_nodes();
    if !orphaned.is_empty() {
        eprintln!();
        eprintln!("{}", "Nodes left on the provider:".yellow().bold());
        for node in orphaned {
            eprintln!(
                "  {} {} {}",
                node.id,
                node.name,
                node.public_address().unwrap_or("-").dimmed()
            );
        }
    }

    if let nodekit::Error::RemoteExecution { report, .. } = error {
        eprintln!();
        eprintln!("{}", "Role status:".bold());
        for (role, status) in report.iter() {
            eprintln!("  {:<6} {}", role.label(), status.label());
        }
    }

    eprintln!();
    eprintln!("  {} {}", "→".cyan(), category.advice());
    if category.may_leave_nodes() {
        eprintln!(
            "  {} {}",
            "→".cyan(),
            "`stackup down --group <group>` destroys every node in the group".dimmed()
        );
    }
}
