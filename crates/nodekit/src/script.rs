//! Per-role configuration scripts.
//!
//! Rendering is a pure function of the role and its context, so rendering the
//! same input twice yields byte-identical scripts.

use crate::binding::RoleBinding;
use crate::error::{Error, Result};
use crate::role::Role;
use serde::{Deserialize, Serialize};

/// Root password pre-seeded into the MySQL installer when none is configured.
pub const DEFAULT_DB_ROOT_PASSWORD: &str = "admin123";

const APT: &str = "sudo DEBIAN_FRONTEND=noninteractive apt-get -q -y";

/// A load-balancer backend: web-server name plus its private address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    /// Name used on the `server` line
    pub name: String,
    /// Private address the load balancer forwards to
    pub private_address: String,
}

impl Backend {
    /// Create a backend entry.
    pub fn new(name: impl Into<String>, private_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private_address: private_address.into(),
        }
    }
}

/// Knobs that are not derived from the binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    /// MySQL root password
    pub db_root_password: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            db_root_password: DEFAULT_DB_ROOT_PASSWORD.to_string(),
        }
    }
}

/// Role-specific parameters for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderContext {
    /// Database: bind MySQL to the node's own private address
    Database {
        /// Node's private address
        private_address: String,
        /// Root password to pre-seed
        root_password: String,
    },
    /// Web server: greet with the node's own public address
    WebServer {
        /// Node's public address
        public_address: String,
    },
    /// Load balancer: one backend per web server, in role order
    LoadBalancer {
        /// Web-server backends
        backends: Vec<Backend>,
    },
}

impl RenderContext {
    /// Build the context for `role` from a complete binding.
    ///
    /// Load-balancer backends are the web-server roles in declared order,
    /// each with its node name and first private address.
    pub fn from_binding(
        role: Role,
        binding: &RoleBinding,
        settings: &ScriptSettings,
    ) -> Result<Self> {
        let node = binding.get(role);
        let missing = |what: &str| Error::Render {
            role,
            message: format!("node {} has no {what} address", node.id),
        };

        match role {
            Role::Database => Ok(Self::Database {
                private_address: node
                    .private_address()
                    .ok_or_else(|| missing("private"))?
                    .to_string(),
                root_password: settings.db_root_password.clone(),
            }),
            Role::WebServer1 | Role::WebServer2 => Ok(Self::WebServer {
                public_address: node
                    .public_address()
                    .ok_or_else(|| missing("public"))?
                    .to_string(),
            }),
            Role::LoadBalancer => {
                let backends = binding
                    .web_servers()
                    .map(|(web_role, web)| {
                        web.private_address()
                            .map(|address| Backend::new(&web.name, address))
                            .ok_or_else(|| Error::Render {
                                role,
                                message: format!(
                                    "{web_role} node {} has no private address",
                                    web.id
                                ),
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::LoadBalancer { backends })
            }
        }
    }
}

/// Ordered shell commands for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigScript {
    /// Role the script configures
    pub role: Role,
    /// Commands, run in order
    pub commands: Vec<String>,
}

impl ConfigScript {
    /// Full bash script, stopping at the first failing command.
    pub fn render(&self) -> String {
        let mut out = String::from("#!/bin/bash\nset -e\n");
        for command in &self.commands {
            out.push_str(command);
            out.push('\n');
        }
        out
    }
}

/// Render the configuration script for `role`.
///
/// Fails only when the context does not fit the role, or when a load balancer
/// has no backends. Both are programming errors and are never retried.
pub fn render(role: Role, context: &RenderContext) -> Result<ConfigScript> {
    let commands = match (role, context) {
        (
            Role::Database,
            RenderContext::Database {
                private_address,
                root_password,
            },
        ) => database_commands(private_address, root_password),
        (Role::WebServer1 | Role::WebServer2, RenderContext::WebServer { public_address }) => {
            web_server_commands(public_address)
        }
        (Role::LoadBalancer, RenderContext::LoadBalancer { backends }) => {
            if backends.is_empty() {
                return Err(Error::Render {
                    role,
                    message: "no web-server backends".to_string(),
                });
            }
            load_balancer_commands(backends)
        }
        _ => {
            return Err(Error::Render {
                role,
                message: format!("context does not match role: {context:?}"),
            });
        }
    };

    Ok(ConfigScript { role, commands })
}

fn base_commands() -> Vec<String> {
    vec![format!("{APT} update"), format!("{APT} upgrade")]
}

fn database_commands(private_address: &str, root_password: &str) -> Vec<String> {
    let mut commands = base_commands();
    commands.push(format!(
        "echo 'mysql-server mysql-server/root_password password {root_password}' | sudo debconf-set-selections"
    ));
    commands.push(format!(
        "echo 'mysql-server mysql-server/root_password_again password {root_password}' | sudo debconf-set-selections"
    ));
    commands.push(format!("{APT} install mysql-server"));
    commands.push(format!(
        "sudo sed -i -e 's/^bind-address.*/bind-address = {private_address}/' /etc/mysql/my.cnf"
    ));
    commands.push("sudo service mysql restart".to_string());
    commands
}

fn web_server_commands(public_address: &str) -> Vec<String> {
    let mut commands = base_commands();
    commands.push(format!("{APT} install apache2"));
    commands.push(format!(
        "echo 'Hello from {public_address}' | sudo tee /var/www/html/index.html > /dev/null"
    ));
    commands
}

fn load_balancer_commands(backends: &[Backend]) -> Vec<String> {
    let mut commands = base_commands();
    commands.push(format!("{APT} install haproxy"));
    commands.push("sudo sed -i -e 's/ENABLED=0/ENABLED=1/' /etc/default/haproxy".to_string());
    commands.push(format!(
        "sudo tee /etc/haproxy/haproxy.cfg > /dev/null <<'HAPROXY_CFG'\n{}HAPROXY_CFG",
        haproxy_config(backends)
    ));
    commands.push("sudo service haproxy restart".to_string());
    commands
}

/// Full HAProxy configuration balancing port 80 across `backends`.
pub fn haproxy_config(backends: &[Backend]) -> String {
    let mut cfg = String::new();
    cfg.push_str("global\n");
    cfg.push_str("    log 127.0.0.1 local0\n");
    cfg.push_str("    log 127.0.0.1 local1 notice\n");
    cfg.push_str("    maxconn 4096\n");
    cfg.push_str("    user haproxy\n");
    cfg.push_str("    group haproxy\n");
    cfg.push_str("    daemon\n");
    cfg.push_str("    stats socket /tmp/haproxy\n");
    cfg.push('\n');
    cfg.push_str("defaults\n");
    cfg.push_str("    log global\n");
    cfg.push_str("    mode http\n");
    cfg.push_str("    option httplog\n");
    cfg.push_str("    option dontlognull\n");
    cfg.push_str("    retries 3\n");
    cfg.push_str("    option redispatch\n");
    cfg.push_str("    maxconn 2000\n");
    cfg.push_str("    timeout connect 5000\n");
    cfg.push_str("    timeout client 50000\n");
    cfg.push_str("    timeout server 50000\n");
    cfg.push('\n');
    cfg.push_str("listen web-proxy\n");
    cfg.push_str("    bind 0.0.0.0:80\n");
    cfg.push_str("    mode http\n");
    cfg.push_str("    balance roundrobin\n");
    for backend in backends {
        cfg.push_str(&format!(
            "    server {} {}\n",
            backend.name, backend.private_address
        ));
    }
    cfg
}
