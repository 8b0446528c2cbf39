//! Destroy every node in a group.

use crate::Context;
use crate::cli::DownArgs;
use crate::progress;
use crate::{config, ui};
use anyhow::{Context as _, Result};
use nodekit::{Client, Provider, ProvisionedNode};

pub fn run(ctx: &Context, args: &DownArgs) -> Result<()> {
    let group = &args.provider.group;
    config::validate_group(group)?;

    let provider_file = config::provider_file(args.provider.config.as_deref())?;
    let provider_config = config::load_provider(&provider_file)?;
    let keys_dir = config::keys_dir(args.provider.keys_dir.as_deref(), &provider_file);
    let identity_file = keys_dir.join(nodekit::KeyPair::private_key_filename(group));

    let client = Client::new(&provider_config, identity_file)
        .context("Failed to set up the provider")?;

    teardown(ctx, client.provider(), group, args.yes)
}

fn teardown(ctx: &Context, provider: &dyn Provider, group: &str, yes: bool) -> Result<()> {
    let nodes = provider
        .list_nodes(group)
        .with_context(|| format!("Failed to list nodes in group '{group}'"))?;

    if nodes.is_empty() {
        ui::info(&format!("No nodes in group '{group}'"));
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Nodes in group '{group}'"));
        show_nodes(&nodes);
        println!();
    }

    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Destroy {} nodes?", nodes.len()))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::info("Aborted, nothing was destroyed.");
            return Ok(());
        }
    }

    let pb = (!ctx.quiet).then(|| progress::spinner(&format!("Destroying {} nodes", nodes.len())));
    let destroyed = match provider.destroy_matching(group) {
        Ok(destroyed) => destroyed,
        Err(e) => {
            if let Some(pb) = &pb {
                progress::finish_error(pb, "Destroy failed");
            }
            return Err(e).with_context(|| format!("Failed to destroy group '{group}'"));
        }
    };

    let msg = format!("Destroyed {} nodes in group '{group}'", destroyed.len());
    match &pb {
        Some(pb) => progress::finish_success(pb, &msg),
        None => log::info!("{msg}"),
    }

    if destroyed.len() < nodes.len() {
        ui::warn(&format!(
            "{} nodes were listed but not destroyed",
            nodes.len() - destroyed.len()
        ));
    }

    Ok(())
}

fn show_nodes(nodes: &[ProvisionedNode]) {
    for node in nodes {
        println!(
            "  {:<12} {:<32} {}",
            node.id,
            node.name,
            node.public_address().unwrap_or("-")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodekit::backend::memory::MemoryBackend;

    const QUIET: Context = Context {
        verbose: 0,
        quiet: true,
    };

    #[test]
    fn test_teardown_destroys_only_the_group() {
        let backend = MemoryBackend::new().with_created_nodes(vec![
            ProvisionedNode::new("1", "mcw-db").with_group("mcw"),
            ProvisionedNode::new("2", "other-db").with_group("other"),
        ]);
        let template = nodekit::NodeTemplate {
            image: "ubuntu".to_string(),
            location: "a".to_string(),
            hardware_id: "a/small".to_string(),
            inbound_ports: vec![22],
            authorize_public_key: String::new(),
            login_private_key: String::new(),
            node_names: Vec::new(),
        };
        backend.create_batch("mcw", 2, &template).unwrap();

        teardown(&QUIET, &backend, "mcw", true).unwrap();
        assert!(backend.list_nodes("mcw").unwrap().is_empty());
        assert_eq!(backend.list_nodes("other").unwrap().len(), 1);
    }

    #[test]
    fn test_teardown_empty_group() {
        let backend = MemoryBackend::new();
        teardown(&QUIET, &backend, "mcw", false).unwrap();
    }
}
