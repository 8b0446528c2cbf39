//! List the roles of the topology.

use crate::Context;
use crate::cli::RolesArgs;
use crate::{config, ui};
use anyhow::Result;
use colored::Colorize;
use nodekit::role::{inbound_ports, required_roles};

pub fn run(ctx: &Context, args: &RolesArgs) -> Result<()> {
    config::validate_group(&args.group)?;

    if !ctx.quiet {
        ui::header(&format!("Roles in group '{}'", args.group));
    }

    for role in required_roles() {
        let ports: Vec<String> = role.ports().iter().map(ToString::to_string).collect();
        println!(
            "  {:<6} {:<14} {:<40} {}",
            role.label().bold(),
            role.description(),
            role.node_name(&args.group),
            ports.join(",").dimmed()
        );
    }

    if !ctx.quiet {
        let all: Vec<String> = inbound_ports().iter().map(ToString::to_string).collect();
        println!();
        ui::kv("Template ports", &all.join(", "));
    }

    Ok(())
}
