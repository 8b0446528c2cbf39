//! Core types exchanged with the provider.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the provider lets us log in to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginAuth {
    /// Private key in PEM/OpenSSH format
    PrivateKey(String),
    /// Plain password
    Password(String),
}

/// Login user plus key or password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    /// Login user name (e.g. "root", "ubuntu")
    pub user: String,
    /// Key or password for that user
    pub auth: LoginAuth,
}

impl Default for LoginCredentials {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            auth: LoginAuth::Password(String::new()),
        }
    }
}

/// A node created by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedNode {
    /// Opaque provider-assigned identifier
    pub id: String,
    /// Name reported by the provider; usually echoes the requested name
    pub name: String,
    /// Group tag the node was created in
    #[serde(default)]
    pub group: String,
    /// Public addresses
    #[serde(default)]
    pub public_addresses: Vec<String>,
    /// Private addresses
    #[serde(default)]
    pub private_addresses: Vec<String>,
    /// Login credentials
    #[serde(default)]
    pub credentials: LoginCredentials,
}

impl ProvisionedNode {
    /// Create a node with no addresses.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group: String::new(),
            public_addresses: Vec::new(),
            private_addresses: Vec::new(),
            credentials: LoginCredentials::default(),
        }
    }

    /// Set the group tag.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Add a public address.
    pub fn with_public(mut self, address: impl Into<String>) -> Self {
        self.public_addresses.push(address.into());
        self
    }

    /// Add a private address.
    pub fn with_private(mut self, address: impl Into<String>) -> Self {
        self.private_addresses.push(address.into());
        self
    }

    /// Set the login credentials.
    pub fn with_credentials(mut self, credentials: LoginCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// First public address, if any.
    pub fn public_address(&self) -> Option<&str> {
        self.public_addresses.first().map(String::as_str)
    }

    /// First private address, if any.
    pub fn private_address(&self) -> Option<&str> {
        self.private_addresses.first().map(String::as_str)
    }

    /// Whether the node has the addresses the rest of the run needs.
    pub fn is_usable(&self) -> bool {
        self.public_address().is_some() && self.private_address().is_some()
    }

    /// `ssh` command an operator can paste to reach the node.
    pub fn ssh_hint(&self, key_file: &str) -> String {
        let host = self.public_address().unwrap_or("<no public address>");
        match self.credentials.auth {
            LoginAuth::PrivateKey(_) => {
                format!("ssh -i {key_file} {}@{host}", self.credentials.user)
            }
            LoginAuth::Password(_) => format!("ssh {}@{host}", self.credentials.user),
        }
    }
}

/// Shared template for every node in one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTemplate {
    /// Image name pattern (e.g. "Ubuntu 12.04")
    pub image: String,
    /// Location / region / zone id
    pub location: String,
    /// Provider hardware id, already zone-scoped where needed
    pub hardware_id: String,
    /// Inbound TCP ports to open
    pub inbound_ports: Vec<u16>,
    /// Public key to authorize for login
    pub authorize_public_key: String,
    /// Private key to use for login instead of provider-issued credentials
    pub login_private_key: String,
    /// Requested node names, one per node
    pub node_names: Vec<String>,
}

/// Outcome of a remote script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit status of the script
    pub exit_status: i32,
    /// Captured standard output
    pub output: String,
    /// Captured standard error
    pub error: String,
}

impl ExecutionResult {
    /// Successful result with no output.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Result with the given exit status.
    pub fn with_status(exit_status: i32) -> Self {
        Self {
            exit_status,
            ..Default::default()
        }
    }

    /// Whether the script exited with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Options for running a script on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScriptOptions {
    /// Wait for the script to finish before returning
    pub block_on_complete: bool,
    /// Give up on the script after this long
    pub timeout: Duration,
}

impl Default for RunScriptOptions {
    fn default() -> Self {
        Self {
            block_on_complete: true,
            timeout: Duration::from_secs(20 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_usable_requires_both_addresses() {
        let node = ProvisionedNode::new("1", "a");
        assert!(!node.is_usable());
        let node = node.with_public("203.0.113.1");
        assert!(!node.is_usable());
        let node = node.with_private("10.0.0.1");
        assert!(node.is_usable());
    }

    #[test]
    fn test_ssh_hint() {
        let node = ProvisionedNode::new("1", "a")
            .with_public("203.0.113.1")
            .with_credentials(LoginCredentials {
                user: "ubuntu".to_string(),
                auth: LoginAuth::PrivateKey("key".to_string()),
            });
        assert_eq!(node.ssh_hint("mcw.key"), "ssh -i mcw.key ubuntu@203.0.113.1");

        let node = node.with_credentials(LoginCredentials::default());
        assert_eq!(node.ssh_hint("mcw.key"), "ssh root@203.0.113.1");
    }

    #[test]
    fn test_node_deserializes_with_defaults() {
        let node: ProvisionedNode =
            serde_json::from_str(r#"{"id": "42", "name": "mcw-lb"}"#).unwrap();
        assert_eq!(node.id, "42");
        assert!(node.public_addresses.is_empty());
        assert_eq!(node.credentials.user, "root");
    }

    #[test]
    fn test_run_script_defaults() {
        let opts = RunScriptOptions::default();
        assert!(opts.block_on_complete);
        assert_eq!(opts.timeout, Duration::from_secs(1200));
    }
}
