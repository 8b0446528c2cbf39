//! Error types for provisioning and configuration runs.
//!
//! Every failure is fatal to the run: nothing here is retried automatically.
//! Errors are categorized so the front end can print actionable advice, in
//! particular when nodes may have been left running on the provider.

use crate::report::{ConfigurationReport, RemoteExecutionFailure};
use crate::role::Role;
use crate::types::ProvisionedNode;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Categories of errors, used to pick user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Provider configuration or key material could not be loaded
    Configuration,
    /// The batch create failed or returned unusable nodes
    Provisioning,
    /// Created nodes could not be mapped to roles
    Binding,
    /// A role's configuration script failed on its node
    RemoteExecution,
    /// A script could not be rendered (programming error)
    Render,
    /// The provider itself misbehaved
    Provider,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether nodes may exist on the provider after this error.
    pub fn may_leave_nodes(&self) -> bool {
        matches!(
            self,
            Self::Provisioning | Self::Binding | Self::RemoteExecution
        )
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration could not be loaded",
            Self::Provisioning => "Provisioning failed",
            Self::Binding => "Nodes could not be mapped to roles",
            Self::RemoteExecution => "Role configuration failed",
            Self::Render => "Script rendering failed",
            Self::Provider => "Provider error",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Check the provider file and the key files next to it",
            Self::Provisioning => {
                "Delete any orphaned nodes from the provider console before running again"
            }
            Self::Binding => {
                "Inspect the created nodes and delete them; re-running creates a second topology"
            }
            Self::RemoteExecution => {
                "Log in to the failed node with the ssh hint above, or tear the group down and retry"
            }
            Self::Render => "This is a bug; please report it with the command you ran",
            Self::Provider => "Check the provider driver and its credentials",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Details of a failed provisioning step.
///
/// Carries whatever the provider did bring up so an operator can clean it up.
/// Nodes are never destroyed automatically.
#[derive(Debug, Clone)]
pub struct ProvisioningFailure {
    /// What went wrong
    pub reason: String,
    /// Roles that had a usable node bound when the failure happened
    pub bound_roles: Vec<Role>,
    /// Nodes that exist on the provider and need manual cleanup
    pub orphaned: Vec<ProvisionedNode>,
}

impl ProvisioningFailure {
    /// Create a failure with no bound roles.
    pub fn new(reason: impl Into<String>, orphaned: Vec<ProvisionedNode>) -> Self {
        Self {
            reason: reason.into(),
            bound_roles: Vec::new(),
            orphaned,
        }
    }

    /// Set the roles that could be bound before failing.
    pub fn with_bound_roles(mut self, roles: Vec<Role>) -> Self {
        self.bound_roles = roles;
        self
    }
}

impl fmt::Display for ProvisioningFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if !self.bound_roles.is_empty() {
            let roles: Vec<String> = self.bound_roles.iter().map(ToString::to_string).collect();
            write!(f, "; bound roles: {}", roles.join(", "))?;
        }
        if !self.orphaned.is_empty() {
            let ids: Vec<&str> = self.orphaned.iter().map(|n| n.id.as_str()).collect();
            write!(
                f,
                "; orphaned nodes need manual cleanup: {}",
                ids.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Errors that can occur during a run.
#[derive(Debug, Error)]
pub enum Error {
    /// A required provider property is missing or the file is malformed
    #[error("configuration error: {message}")]
    ConfigurationLoad {
        /// Description of the missing or invalid property
        message: String,
    },

    /// An SSH key file could not be read
    #[error("could not read key file {path}: {source}")]
    KeyLoad {
        /// Path of the key file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The batch create failed or produced unusable nodes
    #[error("provisioning failed: {0}")]
    Provisioning(ProvisioningFailure),

    /// Created nodes cannot be unambiguously mapped to roles
    #[error("role binding failed: {message}")]
    RoleBinding {
        /// Why the mapping is ambiguous
        message: String,
        /// Nodes that exist on the provider
        nodes: Vec<ProvisionedNode>,
    },

    /// One or more configuration scripts failed
    #[error("{}", describe_failures(.failures))]
    RemoteExecution {
        /// Every failure observed during the run
        failures: Vec<RemoteExecutionFailure>,
        /// Per-role status at the time the run stopped
        report: ConfigurationReport,
    },

    /// A script could not be rendered from its context
    #[error("cannot render {role} script: {message}")]
    Render {
        /// Role being rendered
        role: Role,
        /// Missing or mismatched context
        message: String,
    },

    /// The provider returned an error
    #[error("provider error: {message}")]
    Provider {
        /// Provider message
        message: String,
        /// Nodes the provider reports as created despite the error
        created: Vec<ProvisionedNode>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigurationLoad { .. } | Error::KeyLoad { .. } => ErrorCategory::Configuration,
            Error::Provisioning(_) => ErrorCategory::Provisioning,
            Error::RoleBinding { .. } => ErrorCategory::Binding,
            Error::RemoteExecution { .. } => ErrorCategory::RemoteExecution,
            Error::Render { .. } => ErrorCategory::Render,
            Error::Provider { .. } => ErrorCategory::Provider,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Other,
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigurationLoad {
            message: message.into(),
        }
    }

    /// Shorthand for a provider error that created nothing.
    pub fn provider(message: impl Into<String>) -> Self {
        Error::Provider {
            message: message.into(),
            created: Vec::new(),
        }
    }

    /// Nodes known to exist on the provider when this error was raised.
    pub fn orphaned_nodes(&self) -> &[ProvisionedNode] {
        match self {
            Error::Provisioning(failure) => &failure.orphaned,
            Error::RoleBinding { nodes, .. } => nodes,
            Error::Provider { created, .. } => created,
            _ => &[],
        }
    }
}

fn describe_failures(failures: &[RemoteExecutionFailure]) -> String {
    match failures {
        [] => "remote execution failed".to_string(),
        [only] => only.to_string(),
        many => {
            let parts: Vec<String> = many.iter().map(ToString::to_string).collect();
            format!("{} roles failed: {}", many.len(), parts.join("; "))
        }
    }
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::FailureCause;

    #[test]
    fn test_category_may_leave_nodes() {
        assert!(ErrorCategory::Provisioning.may_leave_nodes());
        assert!(ErrorCategory::RemoteExecution.may_leave_nodes());
        assert!(!ErrorCategory::Configuration.may_leave_nodes());
        assert!(!ErrorCategory::Render.may_leave_nodes());
    }

    #[test]
    fn test_provisioning_failure_display_lists_orphans() {
        let node = ProvisionedNode::new("n-1", "mcw-db");
        let failure = ProvisioningFailure::new("returned 1 of 4 nodes", vec![node])
            .with_bound_roles(vec![Role::Database]);
        let text = Error::Provisioning(failure).to_string();
        assert!(text.contains("returned 1 of 4 nodes"));
        assert!(text.contains("bound roles: db"));
        assert!(text.contains("manual cleanup: n-1"));
    }

    #[test]
    fn test_remote_execution_display() {
        let err = Error::RemoteExecution {
            failures: vec![RemoteExecutionFailure {
                role: Role::WebServer1,
                node_id: "n-2".to_string(),
                cause: FailureCause::ExitStatus(100),
            }],
            report: ConfigurationReport::default(),
        };
        let text = err.to_string();
        assert!(text.contains("web-1"));
        assert!(text.contains("n-2"));
        assert!(text.contains("100"));
        assert_eq!(err.category(), ErrorCategory::RemoteExecution);
    }

    #[test]
    fn test_orphaned_nodes() {
        let err = Error::Provider {
            message: "quota".to_string(),
            created: vec![ProvisionedNode::new("n-9", "x")],
        };
        assert_eq!(err.orphaned_nodes().len(), 1);
        assert!(Error::config("missing").orphaned_nodes().is_empty());
    }
}
