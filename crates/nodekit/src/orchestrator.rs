//! Provisioning: one batch request for every role, then role binding.

use crate::backend::Provider;
use crate::binding::{BindingPolicy, RoleBinding, bind_roles};
use crate::config::ProviderConfig;
use crate::error::{Error, ProvisioningFailure, Result};
use crate::keys::KeyPair;
use crate::role::{Role, inbound_ports, required_roles};
use crate::types::NodeTemplate;

/// Everything needed to create the nodes of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Group tag shared by every node
    pub group: String,
    /// Each role with the name it is requested under, in role order
    pub roles: Vec<(Role, String)>,
    /// Template shared by every node
    pub template: NodeTemplate,
    /// Key file shown in login hints
    pub key_file: String,
}

impl ProvisioningRequest {
    /// Build the request for every required role.
    pub fn build(config: &ProviderConfig, keys: &KeyPair, group: &str) -> Self {
        let roles: Vec<(Role, String)> = required_roles()
            .iter()
            .map(|role| (*role, role.node_name(group)))
            .collect();

        let template = NodeTemplate {
            image: config.image.clone(),
            location: config.location.clone(),
            hardware_id: config.hardware_id(),
            inbound_ports: inbound_ports(),
            authorize_public_key: keys.public_key.clone(),
            login_private_key: keys.private_key.clone(),
            node_names: roles.iter().map(|(_, name)| name.clone()).collect(),
        };

        Self {
            group: group.to_string(),
            roles,
            template,
            key_file: keys.private_key_path.display().to_string(),
        }
    }

    /// Number of nodes to create; always one per role.
    pub fn count(&self) -> usize {
        self.roles.len()
    }
}

/// Creates the nodes and binds them to roles.
pub struct Orchestrator<'a> {
    provider: &'a dyn Provider,
    request: ProvisioningRequest,
    policy: BindingPolicy,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator for `request`.
    pub fn new(provider: &'a dyn Provider, request: ProvisioningRequest) -> Self {
        Self {
            provider,
            request,
            policy: BindingPolicy::default(),
        }
    }

    /// Set the binding policy.
    pub fn with_policy(mut self, policy: BindingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The request this orchestrator submits.
    pub fn request(&self) -> &ProvisioningRequest {
        &self.request
    }

    /// Create every node in one batch and bind them to roles.
    ///
    /// Never destroys anything: nodes that came up before a failure are
    /// reported in the error for manual cleanup.
    pub fn provision(&self) -> Result<RoleBinding> {
        let request = &self.request;
        let count = request.count();

        log::info!(
            "Creating {count} nodes in group '{}' on {}",
            request.group,
            self.provider.name()
        );

        let nodes = match self
            .provider
            .create_batch(&request.group, count, &request.template)
        {
            Ok(nodes) => nodes,
            Err(e) => {
                let created = e.orphaned_nodes().to_vec();
                let reason = match e {
                    Error::Provider { message, .. } => message,
                    other => other.to_string(),
                };
                return Err(Error::Provisioning(ProvisioningFailure::new(
                    format!("create failed: {reason}"),
                    created,
                )));
            }
        };

        for node in &nodes {
            log::info!(
                "Created {} ({}): {}",
                node.name,
                node.id,
                node.ssh_hint(&request.key_file)
            );
        }

        if nodes.len() < count {
            return Err(Error::Provisioning(ProvisioningFailure::new(
                format!("provider returned {} of {count} nodes", nodes.len()),
                nodes,
            )));
        }

        let binding = bind_roles(&request.roles, nodes, self.policy)?;

        let (usable, unusable): (Vec<_>, Vec<_>) =
            binding.iter().partition(|(_, node)| node.is_usable());
        if !unusable.is_empty() {
            let missing: Vec<String> = unusable
                .iter()
                .map(|(role, node)| format!("{role} ({})", node.id))
                .collect();
            let bound_roles = usable.iter().map(|(role, _)| *role).collect();
            return Err(Error::Provisioning(
                ProvisioningFailure::new(
                    format!("missing public or private address on {}", missing.join(", ")),
                    binding.nodes(),
                )
                .with_bound_roles(bound_roles),
            ));
        }

        Ok(binding)
    }
}
