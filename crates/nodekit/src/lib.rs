//! # nodekit
//!
//! Provision and configure a small multi-tier web deployment: one MySQL
//! database, two Apache web servers and an HAProxy load balancer in front of
//! them.
//!
//! ## Workflow
//!
//! 1. A [`ProvisioningRequest`] is built from the [`ProviderConfig`] and the
//!    group's [`KeyPair`]: one node name per role, one shared template.
//! 2. The [`Orchestrator`] submits the whole request as a single batch and
//!    binds the returned nodes to roles by name.
//! 3. The [`Configurator`] renders a script per role and runs it on the bound
//!    node: database, then web servers, then the load balancer, whose
//!    configuration lists the web servers' private addresses.
//!
//! ## Failure handling
//!
//! Every failure is fatal and nothing is retried or cleaned up. Errors carry
//! the nodes left on the provider ([`Error::orphaned_nodes`]) and, for script
//! failures, a [`ConfigurationReport`] showing which roles did succeed.
//!
//! ## Example
//!
//! ```
//! use nodekit::{Client, DeployOptions, NoProgress, ProvisioningRequest};
//! use nodekit::backend::memory::MemoryBackend;
//! # use nodekit::{KeyPair, ProviderConfig};
//! # let config = ProviderConfig::from_toml_str(
//! #     "provider = \"lab\"\n[lab]\nname = \"lab\"\nidentity = \"me\"\ncredential = \"x\"\nlocation = \"a\"\nimage = \"ubuntu\"\nhardware = \"small\"\n",
//! # ).unwrap();
//! # let keys = KeyPair {
//! #     public_key: "ssh-ed25519 AAAA".into(),
//! #     private_key: "KEY".into(),
//! #     private_key_path: "mcw.key".into(),
//! # };
//!
//! let client = Client::with_provider(Box::new(MemoryBackend::new()));
//! let request = ProvisioningRequest::build(&config, &keys, "mcw");
//! let deployment = client
//!     .deploy(request, &DeployOptions::default(), &mut NoProgress)
//!     .unwrap();
//! assert!(deployment.report.is_success());
//! ```
//!
//! ## Providers
//!
//! The [`Provider`] trait is the boundary to the compute provider:
//! - [`backend::driver::DriverBackend`]: external driver executable plus `ssh`
//! - [`backend::memory::MemoryBackend`]: in-process, for dry runs and tests

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

/// Provider trait and its implementations.
pub mod backend;
/// Mapping created nodes to roles.
pub mod binding;
/// Provider configuration.
pub mod config;
/// Role configuration runs.
pub mod configurator;
/// Error types.
pub mod error;
/// SSH key material.
pub mod keys;
/// Provisioning requests and node creation.
pub mod orchestrator;
/// Per-role run outcome.
pub mod report;
/// The roles of the topology.
pub mod role;
/// Configuration script rendering.
pub mod script;
/// Scoped provider ownership.
pub mod session;
/// Node and execution types.
pub mod types;

pub use backend::Provider;
pub use binding::{BindingPolicy, RoleBinding};
pub use config::ProviderConfig;
pub use configurator::{ConfigureMode, ConfigureProgress, Configurator, NoProgress};
pub use error::{Error, ErrorCategory, ProvisioningFailure, Result};
pub use keys::KeyPair;
pub use orchestrator::{Orchestrator, ProvisioningRequest};
pub use report::{ConfigurationReport, FailureCause, RemoteExecutionFailure, RoleStatus};
pub use role::{DEFAULT_GROUP, Role};
pub use script::{ConfigScript, RenderContext, ScriptSettings};
pub use session::Session;
pub use types::{
    ExecutionResult, LoginAuth, LoginCredentials, NodeTemplate, ProvisionedNode, RunScriptOptions,
};

use std::path::PathBuf;

/// Options for a full provision-and-configure run.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// How created nodes are bound to roles
    pub policy: BindingPolicy,
    /// How role scripts are dispatched
    pub mode: ConfigureMode,
    /// Script execution options
    pub script: RunScriptOptions,
    /// Script settings
    pub settings: ScriptSettings,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Node bound to each role
    pub binding: RoleBinding,
    /// Status of each role
    pub report: ConfigurationReport,
}

/// High-level client over one provider session.
///
/// The provider is closed when the client is dropped.
pub struct Client {
    session: Session,
}

impl Client {
    /// Create a client driving the configured provider's driver executable.
    pub fn new(config: &ProviderConfig, identity_file: impl Into<PathBuf>) -> Result<Self> {
        let backend = backend::driver::DriverBackend::new(config, identity_file)?;
        Ok(Self::with_provider(Box::new(backend)))
    }

    /// Create a client with a custom provider (dry runs and tests).
    pub fn with_provider(provider: Box<dyn Provider>) -> Self {
        Self {
            session: Session::open(provider),
        }
    }

    /// The underlying provider.
    pub fn provider(&self) -> &dyn Provider {
        self.session.provider()
    }

    /// Create the nodes for `request` and bind them to roles.
    pub fn provision(
        &self,
        request: ProvisioningRequest,
        policy: BindingPolicy,
    ) -> Result<RoleBinding> {
        Orchestrator::new(self.provider(), request)
            .with_policy(policy)
            .provision()
    }

    /// Configure every role of `binding`.
    pub fn configure<P: ConfigureProgress>(
        &self,
        binding: &RoleBinding,
        options: &DeployOptions,
        progress: &mut P,
    ) -> Result<ConfigurationReport> {
        self.configurator(options)
            .configure_with_progress(binding, progress)
    }

    /// A configurator over this client's provider.
    pub fn configurator(&self, options: &DeployOptions) -> Configurator<'_> {
        Configurator::new(self.provider())
            .with_mode(options.mode)
            .with_options(options.script.clone())
            .with_settings(options.settings.clone())
    }

    /// Provision and configure in one call.
    pub fn deploy<P: ConfigureProgress>(
        &self,
        request: ProvisioningRequest,
        options: &DeployOptions,
        progress: &mut P,
    ) -> Result<Deployment> {
        let binding = self.provision(request, options.policy)?;
        let report = self.configure(&binding, options, progress)?;
        Ok(Deployment { binding, report })
    }

    /// Destroy every node in `group`.
    pub fn destroy(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        self.provider().destroy_matching(group)
    }

    /// List the nodes in `group`.
    pub fn list(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        self.provider().list_nodes(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use std::sync::Arc;

    fn request() -> ProvisioningRequest {
        let config = ProviderConfig {
            provider: "lab".to_string(),
            name: "lab-cloud".to_string(),
            identity: "me".to_string(),
            credential: "secret".to_string(),
            location: "zone-a".to_string(),
            image: "ubuntu".to_string(),
            hardware: "small".to_string(),
            driver: None,
        };
        let keys = KeyPair {
            public_key: "ssh-ed25519 AAAA".to_string(),
            private_key: "KEY".to_string(),
            private_key_path: PathBuf::from("mcw.key"),
        };
        ProvisioningRequest::build(&config, &keys, "mcw")
    }

    #[test]
    fn test_deploy_end_to_end() {
        let backend = Arc::new(MemoryBackend::new());
        let client = Client::with_provider(Box::new(Arc::clone(&backend)));

        let deployment = client
            .deploy(request(), &DeployOptions::default(), &mut NoProgress)
            .unwrap();

        for role in Role::ALL {
            assert_eq!(deployment.report.status(role), &RoleStatus::Succeeded);
        }

        let executions = backend.executions();
        let lb = &executions[3];
        assert_eq!(lb.role, Role::LoadBalancer);
        for (_, web) in deployment.binding.web_servers() {
            assert!(lb.script.contains(web.private_address().unwrap()));
        }

        let db = deployment.binding.get(Role::Database);
        assert!(
            executions[0]
                .script
                .contains(&format!("bind-address = {}", db.private_address().unwrap()))
        );

        drop(client);
        assert!(backend.is_closed());
    }

    #[test]
    fn test_failed_deploy_still_closes_provider() {
        let backend = Arc::new(MemoryBackend::new().with_exit_status("mcw-db", 1));
        let client = Client::with_provider(Box::new(Arc::clone(&backend)));

        let err = client
            .deploy(request(), &DeployOptions::default(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::RemoteExecution);

        drop(client);
        assert!(backend.is_closed());
    }

    #[test]
    fn test_destroy_group() {
        let client = Client::with_provider(Box::new(MemoryBackend::new()));
        client
            .provision(request(), BindingPolicy::NameOnly)
            .unwrap();
        assert_eq!(client.list("mcw").unwrap().len(), 4);
        assert_eq!(client.destroy("mcw").unwrap().len(), 4);
        assert!(client.list("mcw").unwrap().is_empty());
    }
}
