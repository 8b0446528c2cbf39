//! The fixed topology: which roles exist and what each one needs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Group tag used when none is given.
pub const DEFAULT_GROUP: &str = "multi-cloud-workshop";

/// Logical position of a node in the topology.
///
/// Variants are declared in dependency order. That order is also the `Ord`
/// of the type, so sorted collections keyed by `Role` iterate database first
/// and load balancer last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// MySQL database node
    Database,
    /// First Apache web server
    WebServer1,
    /// Second Apache web server
    WebServer2,
    /// HAProxy load balancer in front of the web servers
    LoadBalancer,
}

impl Role {
    /// Every role, in declared order.
    pub const ALL: [Role; 4] = [
        Role::Database,
        Role::WebServer1,
        Role::WebServer2,
        Role::LoadBalancer,
    ];

    /// Short label used in logs, reports and on the command line.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Database => "db",
            Role::WebServer1 => "web-1",
            Role::WebServer2 => "web-2",
            Role::LoadBalancer => "lb",
        }
    }

    /// Suffix appended to the group tag to form the node name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Role::Database => "db",
            Role::WebServer1 => "webserver-01",
            Role::WebServer2 => "webserver-02",
            Role::LoadBalancer => "lb",
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Role::Database => "Database",
            Role::WebServer1 | Role::WebServer2 => "Web server",
            Role::LoadBalancer => "Load balancer",
        }
    }

    /// Role-qualified node name within a group, e.g. `multi-cloud-workshop-lb`.
    pub fn node_name(&self, group: &str) -> String {
        format!("{group}-{}", self.suffix())
    }

    /// Inbound TCP ports the role needs opened.
    pub fn ports(&self) -> &'static [u16] {
        match self {
            Role::Database => &[22, 3306],
            Role::WebServer1 | Role::WebServer2 => &[22, 80, 3000],
            Role::LoadBalancer => &[22, 80],
        }
    }

    /// Whether the role is one of the load balancer's backends.
    pub fn is_web_server(&self) -> bool {
        matches!(self, Role::WebServer1 | Role::WebServer2)
    }

    /// Web-server roles in declared order.
    pub fn web_servers() -> impl Iterator<Item = Role> {
        Self::ALL.into_iter().filter(Role::is_web_server)
    }
}

/// Every role the topology needs, in declared order.
pub fn required_roles() -> &'static [Role] {
    &Role::ALL
}

/// Sorted union of the ports of every role.
///
/// All nodes share one template, so the template opens all of these.
pub fn inbound_ports() -> Vec<u16> {
    Role::ALL
        .iter()
        .flat_map(|role| role.ports().iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "db" | "database" => Ok(Role::Database),
            "web-1" | "web1" | "webserver-01" | "web-server-1" => Ok(Role::WebServer1),
            "web-2" | "web2" | "webserver-02" | "web-server-2" => Ok(Role::WebServer2),
            "lb" | "load-balancer" | "loadbalancer" => Ok(Role::LoadBalancer),
            other => Err(format!(
                "unknown role '{other}' (expected one of: db, web-1, web-2, lb)"
            )),
        }
    }
}
