//! Role configuration: render each role's script and run it on its node.
//!
//! Roles run in dependency order: the database first, then both web servers,
//! then the load balancer. Nothing is retried.

use crate::backend::Provider;
use crate::binding::RoleBinding;
use crate::error::{Error, Result};
use crate::report::{ConfigurationReport, FailureCause, RemoteExecutionFailure, RoleStatus};
use crate::role::Role;
use crate::script::{ConfigScript, RenderContext, ScriptSettings, render};
use crate::types::{ProvisionedNode, RunScriptOptions};
use rayon::prelude::*;

/// How role scripts are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigureMode {
    /// One role at a time; the first failure stops the run
    #[default]
    Sequential,
    /// Database and web servers concurrently, then the load balancer
    Parallel {
        /// Worker threads for the first phase
        jobs: usize,
    },
}

/// Progress callback for configuration runs.
///
/// In parallel mode `on_role_start` is reported for the whole phase before it
/// runs and `on_role_complete` after it finishes.
pub trait ConfigureProgress: Send {
    /// Called before a role's script is dispatched
    fn on_role_start(&mut self, role: Role, node: &ProvisionedNode);

    /// Called when a role's script has finished
    fn on_role_complete(&mut self, role: Role, status: &RoleStatus);
}

/// Progress callback that ignores everything.
pub struct NoProgress;

impl ConfigureProgress for NoProgress {
    fn on_role_start(&mut self, _role: Role, _node: &ProvisionedNode) {}
    fn on_role_complete(&mut self, _role: Role, _status: &RoleStatus) {}
}

/// Runs every role's script against a binding.
pub struct Configurator<'a> {
    provider: &'a dyn Provider,
    mode: ConfigureMode,
    options: RunScriptOptions,
    settings: ScriptSettings,
}

impl<'a> Configurator<'a> {
    /// Sequential configurator with default script options.
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self {
            provider,
            mode: ConfigureMode::default(),
            options: RunScriptOptions::default(),
            settings: ScriptSettings::default(),
        }
    }

    /// Set the dispatch mode.
    pub fn with_mode(mut self, mode: ConfigureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the script execution options.
    pub fn with_options(mut self, options: RunScriptOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the script settings.
    pub fn with_settings(mut self, settings: ScriptSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Render every role's script, in role order.
    ///
    /// Rendering happens before anything is dispatched, so a render error
    /// leaves every node untouched.
    pub fn scripts(&self, binding: &RoleBinding) -> Result<Vec<ConfigScript>> {
        Role::ALL
            .iter()
            .map(|role| {
                let context = RenderContext::from_binding(*role, binding, &self.settings)?;
                render(*role, &context)
            })
            .collect()
    }

    /// Configure every role.
    pub fn configure(&self, binding: &RoleBinding) -> Result<ConfigurationReport> {
        self.configure_with_progress(binding, &mut NoProgress)
    }

    /// Configure every role, reporting progress.
    ///
    /// Returns [`Error::RemoteExecution`] carrying the partial report when any
    /// role fails.
    pub fn configure_with_progress<P: ConfigureProgress>(
        &self,
        binding: &RoleBinding,
        progress: &mut P,
    ) -> Result<ConfigurationReport> {
        let scripts = self.scripts(binding)?;
        let mut report = ConfigurationReport::default();

        let failures = match self.mode {
            ConfigureMode::Sequential => {
                self.run_sequential(binding, &scripts, &mut report, progress)
            }
            ConfigureMode::Parallel { jobs } => {
                self.run_parallel(binding, &scripts, jobs, &mut report, progress)?
            }
        };

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::RemoteExecution { failures, report })
        }
    }

    fn run_sequential<'s, P: ConfigureProgress>(
        &self,
        binding: &RoleBinding,
        scripts: impl IntoIterator<Item = &'s ConfigScript>,
        report: &mut ConfigurationReport,
        progress: &mut P,
    ) -> Vec<RemoteExecutionFailure> {
        for script in scripts {
            let node = binding.get(script.role);
            progress.on_role_start(script.role, node);
            let status = self.run_one(node, script);
            progress.on_role_complete(script.role, &status);
            report.record(script.role, status.clone());

            if let RoleStatus::Failed(cause) = status {
                return vec![failure(script.role, node, cause)];
            }
        }
        Vec::new()
    }

    fn run_parallel<P: ConfigureProgress>(
        &self,
        binding: &RoleBinding,
        scripts: &[ConfigScript],
        jobs: usize,
        report: &mut ConfigurationReport,
        progress: &mut P,
    ) -> Result<Vec<RemoteExecutionFailure>> {
        let (last, first): (Vec<&ConfigScript>, Vec<&ConfigScript>) = scripts
            .iter()
            .partition(|script| script.role == Role::LoadBalancer);

        for script in &first {
            progress.on_role_start(script.role, binding.get(script.role));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .map_err(std::io::Error::other)?;

        let statuses: Vec<(Role, RoleStatus)> = pool.install(|| {
            first
                .par_iter()
                .map(|script| (script.role, self.run_one(binding.get(script.role), script)))
                .collect()
        });

        let mut failures = Vec::new();
        for (role, status) in statuses {
            progress.on_role_complete(role, &status);
            if let RoleStatus::Failed(cause) = &status {
                failures.push(failure(role, binding.get(role), cause.clone()));
            }
            report.record(role, status);
        }

        if !failures.is_empty() {
            log::warn!(
                "{} role(s) failed; not configuring the load balancer",
                failures.len()
            );
            return Ok(failures);
        }

        Ok(self.run_sequential(binding, last, report, progress))
    }

    fn run_one(&self, node: &ProvisionedNode, script: &ConfigScript) -> RoleStatus {
        log::info!("Configuring {} on {} ({})", script.role, node.name, node.id);

        match self.provider.execute_script(node, script, &self.options) {
            Ok(result) if result.is_success() => {
                log::debug!("{} output:\n{}", script.role, result.output);
                RoleStatus::Succeeded
            }
            Ok(result) => {
                log::warn!(
                    "{} script exited with {}: {}",
                    script.role,
                    result.exit_status,
                    result.error.trim()
                );
                RoleStatus::Failed(FailureCause::ExitStatus(result.exit_status))
            }
            Err(e) => {
                log::warn!("{} script could not run: {e}", script.role);
                RoleStatus::Failed(FailureCause::Transport(e.to_string()))
            }
        }
    }
}

fn failure(role: Role, node: &ProvisionedNode, cause: FailureCause) -> RemoteExecutionFailure {
    RemoteExecutionFailure {
        role,
        node_id: node.id.clone(),
        cause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::binding::{BindingPolicy, bind_roles};
    use crate::role::required_roles;
    use crate::types::{LoginAuth, LoginCredentials, NodeTemplate};

    fn provision(backend: &MemoryBackend) -> RoleBinding {
        let names: Vec<(Role, String)> = required_roles()
            .iter()
            .map(|role| (*role, role.node_name("mcw")))
            .collect();
        let template = NodeTemplate {
            image: "ubuntu".to_string(),
            location: "lab".to_string(),
            hardware_id: "lab/small".to_string(),
            inbound_ports: vec![22, 80, 3000, 3306],
            authorize_public_key: "ssh-ed25519 AAAA".to_string(),
            login_private_key: "KEY".to_string(),
            node_names: names.iter().map(|(_, name)| name.clone()).collect(),
        };
        let nodes = backend.create_batch("mcw", names.len(), &template).unwrap();
        bind_roles(&names, nodes, BindingPolicy::NameOnly).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<Role>,
        completed: Vec<Role>,
    }

    impl ConfigureProgress for Recorder {
        fn on_role_start(&mut self, role: Role, _node: &ProvisionedNode) {
            self.started.push(role);
        }

        fn on_role_complete(&mut self, role: Role, _status: &RoleStatus) {
            self.completed.push(role);
        }
    }

    #[test]
    fn test_sequential_success_runs_in_dependency_order() {
        let backend = MemoryBackend::new();
        let binding = provision(&backend);
        let mut recorder = Recorder::default();

        let report = Configurator::new(&backend)
            .configure_with_progress(&binding, &mut recorder)
            .unwrap();

        assert!(report.is_success());
        let roles: Vec<Role> = backend.executions().iter().map(|e| e.role).collect();
        assert_eq!(roles, Role::ALL.to_vec());
        assert_eq!(recorder.started, Role::ALL.to_vec());
        assert_eq!(recorder.completed, Role::ALL.to_vec());
    }

    #[test]
    fn test_load_balancer_lists_web_servers_in_role_order() {
        let backend = MemoryBackend::new();
        let binding = provision(&backend);
        Configurator::new(&backend).configure(&binding).unwrap();

        let executions = backend.executions();
        let lb = executions
            .iter()
            .find(|e| e.role == Role::LoadBalancer)
            .unwrap();
        let web1 = binding.get(Role::WebServer1);
        let web2 = binding.get(Role::WebServer2);
        let line1 = format!(
            "server {} {}",
            web1.name,
            web1.private_address().unwrap()
        );
        let line2 = format!(
            "server {} {}",
            web2.name,
            web2.private_address().unwrap()
        );
        let first = lb.script.find(&line1).unwrap();
        let second = lb.script.find(&line2).unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_sequential_failure_stops_run() {
        let backend = MemoryBackend::new().with_exit_status("mcw-webserver-01", 100);
        let binding = provision(&backend);

        let err = Configurator::new(&backend).configure(&binding).unwrap_err();
        let Error::RemoteExecution { failures, report } = err else {
            panic!("expected remote execution failure");
        };

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].role, Role::WebServer1);
        assert_eq!(failures[0].cause, FailureCause::ExitStatus(100));
        assert_eq!(report.status(Role::Database), &RoleStatus::Succeeded);
        assert_eq!(report.status(Role::WebServer2), &RoleStatus::NotAttempted);
        assert_eq!(report.status(Role::LoadBalancer), &RoleStatus::NotAttempted);
        assert_eq!(backend.executions().len(), 2);
    }

    #[test]
    fn test_transport_failure_is_reported() {
        let backend = MemoryBackend::new().with_transport_error("mcw-db", "connection refused");
        let binding = provision(&backend);

        let err = Configurator::new(&backend).configure(&binding).unwrap_err();
        let Error::RemoteExecution { failures, .. } = err else {
            panic!("expected remote execution failure");
        };
        assert!(matches!(
            &failures[0].cause,
            FailureCause::Transport(message) if message.contains("connection refused")
        ));
    }

    #[test]
    fn test_parallel_collects_every_failure() {
        let backend = MemoryBackend::new()
            .with_exit_status("mcw-webserver-01", 1)
            .with_transport_error("mcw-webserver-02", "timed out");
        let binding = provision(&backend);

        let err = Configurator::new(&backend)
            .with_mode(ConfigureMode::Parallel { jobs: 3 })
            .configure(&binding)
            .unwrap_err();
        let Error::RemoteExecution { failures, report } = err else {
            panic!("expected remote execution failure");
        };

        let failed: Vec<Role> = failures.iter().map(|f| f.role).collect();
        assert_eq!(failed, vec![Role::WebServer1, Role::WebServer2]);
        assert_eq!(report.status(Role::Database), &RoleStatus::Succeeded);
        assert_eq!(report.status(Role::LoadBalancer), &RoleStatus::NotAttempted);
        assert!(
            backend
                .executions()
                .iter()
                .all(|e| e.role != Role::LoadBalancer)
        );
    }

    #[test]
    fn test_parallel_runs_load_balancer_last() {
        let backend = MemoryBackend::new();
        let binding = provision(&backend);

        let report = Configurator::new(&backend)
            .with_mode(ConfigureMode::Parallel { jobs: 3 })
            .configure(&binding)
            .unwrap();

        assert!(report.is_success());
        let executions = backend.executions();
        assert_eq!(executions.len(), 4);
        assert_eq!(executions[3].role, Role::LoadBalancer);
    }

    #[test]
    fn test_non_blocking_option_is_passed_through() {
        let backend = MemoryBackend::new();
        let binding = provision(&backend);
        let options = RunScriptOptions {
            block_on_complete: false,
            ..RunScriptOptions::default()
        };

        Configurator::new(&backend)
            .with_options(options)
            .configure(&binding)
            .unwrap();
        assert!(backend.executions().iter().all(|e| !e.blocking));
    }

    #[test]
    fn test_render_failure_dispatches_nothing() {
        let backend = MemoryBackend::new().with_created_nodes(
            Role::ALL
                .iter()
                .map(|role| {
                    ProvisionedNode::new(role.label(), role.node_name("mcw"))
                        .with_public("203.0.113.1")
                        .with_credentials(LoginCredentials {
                            user: "root".to_string(),
                            auth: LoginAuth::PrivateKey("KEY".to_string()),
                        })
                })
                .collect(),
        );
        let binding = provision(&backend);

        let err = Configurator::new(&backend).configure(&binding).unwrap_err();
        assert!(matches!(err, Error::Render { role: Role::Database, .. }));
        assert!(backend.executions().is_empty());
    }

    #[test]
    fn test_custom_root_password() {
        let backend = MemoryBackend::new();
        let binding = provision(&backend);
        let settings = ScriptSettings {
            db_root_password: "s3cret".to_string(),
        };

        let scripts = Configurator::new(&backend)
            .with_settings(settings)
            .scripts(&binding)
            .unwrap();
        assert!(scripts[0].render().contains("password s3cret"));
    }
}
