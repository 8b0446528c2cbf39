//! Per-role outcome of a configuration run.

use crate::role::Role;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Why a role's script did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The script ran and exited non-zero
    ExitStatus(i32),
    /// The remote channel failed (connection, timeout)
    Transport(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitStatus(code) => write!(f, "script exited with status {code}"),
            Self::Transport(message) => write!(f, "transport failure: {message}"),
        }
    }
}

/// A role whose configuration script failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteExecutionFailure {
    /// Role being configured
    pub role: Role,
    /// Provider id of the node
    pub node_id: String,
    /// What went wrong
    pub cause: FailureCause,
}

impl fmt::Display for RemoteExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on node {}: {}", self.role, self.node_id, self.cause)
    }
}

/// Status of one role after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum RoleStatus {
    /// Script completed with exit status 0
    Succeeded,
    /// Script failed
    Failed(FailureCause),
    /// Not run because an earlier step failed
    NotAttempted,
}

impl RoleStatus {
    /// Short label for tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::NotAttempted => "not attempted",
        }
    }
}

/// Status of every role, in declared role order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfigurationReport {
    roles: BTreeMap<Role, RoleStatus>,
}

impl Default for ConfigurationReport {
    fn default() -> Self {
        Self {
            roles: Role::ALL
                .iter()
                .map(|role| (*role, RoleStatus::NotAttempted))
                .collect(),
        }
    }
}

impl ConfigurationReport {
    /// Record the outcome of a role.
    pub fn record(&mut self, role: Role, status: RoleStatus) {
        self.roles.insert(role, status);
    }

    /// Status of a role.
    pub fn status(&self, role: Role) -> &RoleStatus {
        self.roles.get(&role).unwrap_or(&RoleStatus::NotAttempted)
    }

    /// Every role with its status.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &RoleStatus)> {
        self.roles.iter().map(|(role, status)| (*role, status))
    }

    /// Roles that completed successfully.
    pub fn succeeded(&self) -> Vec<Role> {
        self.iter()
            .filter(|(_, status)| **status == RoleStatus::Succeeded)
            .map(|(role, _)| role)
            .collect()
    }

    /// Whether every role succeeded.
    pub fn is_success(&self) -> bool {
        self.roles
            .values()
            .all(|status| *status == RoleStatus::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_report_is_all_not_attempted() {
        let report = ConfigurationReport::default();
        assert_eq!(report.iter().count(), 4);
        assert!(report.succeeded().is_empty());
        assert!(!report.is_success());
    }

    #[test]
    fn test_record_and_query() {
        let mut report = ConfigurationReport::default();
        for role in Role::ALL {
            report.record(role, RoleStatus::Succeeded);
        }
        assert!(report.is_success());

        report.record(Role::LoadBalancer, RoleStatus::Failed(FailureCause::ExitStatus(1)));
        assert!(!report.is_success());
        assert_eq!(report.succeeded().len(), 3);
        assert_eq!(report.status(Role::LoadBalancer).label(), "failed");
    }

    #[test]
    fn test_failure_display() {
        let failure = RemoteExecutionFailure {
            role: Role::Database,
            node_id: "n-1".to_string(),
            cause: FailureCause::Transport("timed out".to_string()),
        };
        assert_eq!(failure.to_string(), "db on node n-1: transport failure: timed out");
    }

    #[test]
    fn test_serializes_in_role_order() {
        let mut report = ConfigurationReport::default();
        report.record(Role::Database, RoleStatus::Succeeded);
        report.record(Role::WebServer1, RoleStatus::Failed(FailureCause::ExitStatus(100)));
        let json = serde_json::to_string(&report).unwrap();
        let db = json.find("\"database\"").unwrap();
        let lb = json.find("\"load-balancer\"").unwrap();
        assert!(db < lb);
        assert!(json.contains("\"exit_status\":100"));
        assert!(json.contains("\"not_attempted\""));
    }
}
