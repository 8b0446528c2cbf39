//! Create every node and configure its role.

use crate::Context;
use crate::cli::UpArgs;
use crate::progress::{self, RoleProgress};
use crate::{config, ui};
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use nodekit::backend::memory::MemoryBackend;
use nodekit::{
    BindingPolicy, Client, ConfigurationReport, ConfigureMode, DeployOptions, ProviderConfig,
    ProvisioningRequest, Role, RoleBinding, RunScriptOptions, ScriptSettings,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn run(ctx: &Context, args: &UpArgs) -> Result<()> {
    let group = &args.provider.group;
    config::validate_group(group)?;

    let provider_file = config::provider_file(args.provider.config.as_deref())?;
    let provider_config = config::load_provider(&provider_file)?;
    let keys_dir = config::keys_dir(args.provider.keys_dir.as_deref(), &provider_file);
    let keys = config::load_keys(&keys_dir, group)?;

    let request = ProvisioningRequest::build(&provider_config, &keys, group);

    if !ctx.quiet {
        show_plan(&provider_config, &request, args);
    }

    if !args.dry_run && !args.yes && !confirm(&provider_config, &request)? {
        ui::info("Aborted, nothing was created.");
        return Ok(());
    }

    let options = deploy_options(args);
    let recorder = args.dry_run.then(|| Arc::new(MemoryBackend::new()));
    let client = match &recorder {
        Some(backend) => Client::with_provider(Box::new(Arc::clone(backend))),
        None => Client::new(&provider_config, &keys.private_key_path)
            .context("Failed to set up the provider")?,
    };

    let mut report = RunReport::start(&provider_config, group, args.dry_run);
    let result = deploy(ctx, &client, request, &options, &mut report);
    drop(client);
    report.finish(result.as_ref().err());

    if let Some(path) = &args.report {
        save_report(ctx, &report, path, result.is_err())?;
    }

    if let Some(backend) = recorder {
        show_dry_run(ctx, &backend);
    }

    result?;

    if !ctx.quiet {
        println!();
        let elapsed = (report.finished_at.unwrap_or(report.started_at) - report.started_at)
            .to_std()
            .unwrap_or_default();
        ui::success(&format!(
            "All roles configured in {}",
            ui::format_duration(elapsed)
        ));
        if let Some(lb) = report.nodes.get(&Role::LoadBalancer) {
            ui::kv(
                "Load balancer",
                &format!("http://{}/", lb.public_address.as_deref().unwrap_or("-")),
            );
        }
    }

    Ok(())
}

/// Write the report. When the run already failed, a write failure is only
/// a warning so the run's own error still reaches the operator.
fn save_report(ctx: &Context, report: &RunReport, path: &Path, run_failed: bool) -> Result<()> {
    match report.write(path) {
        Ok(()) => {
            if !ctx.quiet {
                ui::dim(&format!("Report written to {}", path.display()));
            }
            Ok(())
        }
        Err(e) if run_failed => {
            ui::warn(&format!("{e:#}"));
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn deploy_options(args: &UpArgs) -> DeployOptions {
    let mut settings = ScriptSettings::default();
    if let Some(password) = &args.db_password {
        settings.db_root_password.clone_from(password);
    }

    DeployOptions {
        policy: if args.strict_names {
            BindingPolicy::NameOnly
        } else {
            BindingPolicy::NameThenPosition
        },
        mode: args
            .jobs
            .map_or(ConfigureMode::Sequential, |jobs| ConfigureMode::Parallel {
                jobs,
            }),
        script: RunScriptOptions {
            block_on_complete: !args.no_block,
            timeout: Duration::from_secs(args.timeout),
        },
        settings,
    }
}

fn deploy(
    ctx: &Context,
    client: &Client,
    request: ProvisioningRequest,
    options: &DeployOptions,
    report: &mut RunReport,
) -> nodekit::Result<()> {
    let key_file = request.key_file.clone();
    let pb = (!ctx.quiet).then(|| {
        progress::spinner(&format!(
            "Creating {} nodes on {}",
            request.count(),
            client.provider().name()
        ))
    });

    let binding = match client.provision(request, options.policy) {
        Ok(binding) => {
            if let Some(pb) = &pb {
                progress::finish_success(pb, "Created servers");
            }
            binding
        }
        Err(e) => {
            if let Some(pb) = &pb {
                progress::finish_error(pb, "Provisioning failed");
            }
            return Err(e);
        }
    };

    report.record_binding(&binding);
    if !ctx.quiet {
        show_binding(&binding, &key_file);
        ui::section("Configuring roles");
    }

    let mut progress = RoleProgress::new(ctx.quiet);
    let result = client.configure(&binding, options, &mut progress);
    progress.finish();

    match result {
        Ok(roles) => {
            report.roles = Some(roles);
            Ok(())
        }
        Err(e) => {
            if let nodekit::Error::RemoteExecution { report: roles, .. } = &e {
                report.roles = Some(roles.clone());
            }
            Err(e)
        }
    }
}

fn confirm(config: &ProviderConfig, request: &ProvisioningRequest) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "Create {} nodes on {} ({})?",
            request.count(),
            config.provider,
            config.location
        ))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn show_plan(config: &ProviderConfig, request: &ProvisioningRequest, args: &UpArgs) {
    ui::header(&format!("stackup: group '{}'", request.group));
    ui::kv("Provider", &format!("{} ({})", config.provider, config.name));
    ui::kv("Location", &config.location);
    ui::kv("Image", &request.template.image);
    ui::kv("Hardware", &request.template.hardware_id);
    let ports: Vec<String> = request
        .template
        .inbound_ports
        .iter()
        .map(ToString::to_string)
        .collect();
    ui::kv("Ports", &ports.join(", "));
    ui::kv(
        "Mode",
        &args
            .jobs
            .map_or_else(|| "sequential".to_string(), |jobs| format!("parallel ({jobs} jobs)")),
    );
    if args.dry_run {
        ui::warn("Dry run: using an in-memory provider, nothing will be created");
    }

    println!();
    for (role, name) in &request.roles {
        println!("  {:<6} {}", role.label().bold(), name);
    }
    println!();
}

fn show_binding(binding: &RoleBinding, key_file: &str) {
    for (role, node) in binding.iter() {
        println!(
            "  {:<6} {:<32} {:<16} {}",
            role.label().bold(),
            node.name,
            node.public_address().unwrap_or("-"),
            node.private_address().unwrap_or("-").dimmed()
        );
        ui::dim(&format!("       {}", node.ssh_hint(key_file)));
    }
}

fn show_dry_run(ctx: &Context, backend: &MemoryBackend) {
    if ctx.quiet {
        return;
    }
    let executions = backend.executions();
    ui::section(&format!("Dry run: {} scripts recorded", executions.len()));
    for execution in executions {
        if ctx.verbose > 0 {
            println!();
            println!(
                "{}",
                format!("# {} on {}", execution.role, execution.node_name).cyan()
            );
            print!("{}", execution.script);
        } else {
            ui::dim(&format!(
                "{:<6} {} ({} lines)",
                execution.role.label(),
                execution.node_name,
                execution.script.lines().count()
            ));
        }
    }
    if ctx.verbose == 0 {
        ui::dim("Use -v to print the scripts");
    }
}

// ============================================================================
// JSON Report
// ============================================================================

#[derive(Debug, Serialize)]
struct NodeEntry {
    id: String,
    name: String,
    public_address: Option<String>,
    private_address: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    provider: String,
    group: String,
    dry_run: bool,
    nodes: BTreeMap<Role, NodeEntry>,
    roles: Option<ConfigurationReport>,
    error: Option<String>,
    orphaned: Vec<String>,
}

impl RunReport {
    fn start(config: &ProviderConfig, group: &str, dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            provider: config.provider.clone(),
            group: group.to_string(),
            dry_run,
            nodes: BTreeMap::new(),
            roles: None,
            error: None,
            orphaned: Vec::new(),
        }
    }

    fn record_binding(&mut self, binding: &RoleBinding) {
        self.nodes = binding
            .iter()
            .map(|(role, node)| {
                (
                    role,
                    NodeEntry {
                        id: node.id.clone(),
                        name: node.name.clone(),
                        public_address: node.public_address().map(ToString::to_string),
                        private_address: node.private_address().map(ToString::to_string),
                    },
                )
            })
            .collect();
    }

    fn finish(&mut self, error: Option<&nodekit::Error>) {
        self.finished_at = Some(Utc::now());
        if let Some(error) = error {
            self.error = Some(error.to_string());
            self.orphaned = error
                .orphaned_nodes()
                .iter()
                .map(|node| node.id.clone())
                .collect();
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))
    }
}
