//! In-process provider.
//!
//! Fabricates nodes with documentation-range addresses and records every
//! script it is asked to run instead of running it. `stackup up --dry-run`
//! uses it to show exactly what a real run would send; tests use its knobs to
//! simulate provider misbehavior.

use crate::backend::Provider;
use crate::error::{Error, Result};
use crate::role::Role;
use crate::script::ConfigScript;
use crate::types::{
    ExecutionResult, LoginAuth, LoginCredentials, NodeTemplate, ProvisionedNode, RunScriptOptions,
};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A script the backend was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExecution {
    /// Target node id
    pub node_id: String,
    /// Target node name
    pub node_name: String,
    /// Role the script configures
    pub role: Role,
    /// Rendered script text
    pub script: String,
    /// Whether the caller asked to block until completion
    pub blocking: bool,
}

#[derive(Debug, Clone)]
enum ScriptOutcome {
    Exit(i32),
    Transport(String),
}

#[derive(Debug, Default)]
struct State {
    live: Vec<ProvisionedNode>,
    next_id: u32,
    create_calls: usize,
    executions: Vec<RecordedExecution>,
}

/// Provider that keeps everything in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    closed: AtomicBool,
    echo_names: bool,
    created_nodes: Option<Vec<ProvisionedNode>>,
    create_failure: Option<(String, Vec<ProvisionedNode>)>,
    outcomes: BTreeMap<String, ScriptOutcome>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend that creates whatever is asked and runs every script successfully.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            closed: AtomicBool::new(false),
            echo_names: true,
            created_nodes: None,
            create_failure: None,
            outcomes: BTreeMap::new(),
        }
    }

    /// Return exactly these nodes from the next create, in this order.
    pub fn with_created_nodes(mut self, nodes: Vec<ProvisionedNode>) -> Self {
        self.created_nodes = Some(nodes);
        self
    }

    /// Make create fail, reporting `partial` as having come up.
    pub fn with_create_failure(
        mut self,
        message: impl Into<String>,
        partial: Vec<ProvisionedNode>,
    ) -> Self {
        self.create_failure = Some((message.into(), partial));
        self
    }

    /// Give fabricated nodes provider-style names instead of the requested ones.
    pub fn without_name_echo(mut self) -> Self {
        self.echo_names = false;
        self
    }

    /// Scripts on the node named `node_name` exit with `status`.
    pub fn with_exit_status(mut self, node_name: impl Into<String>, status: i32) -> Self {
        self.outcomes
            .insert(node_name.into(), ScriptOutcome::Exit(status));
        self
    }

    /// Scripts on the node named `node_name` fail at the transport level.
    pub fn with_transport_error(
        mut self,
        node_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.outcomes
            .insert(node_name.into(), ScriptOutcome::Transport(message.into()));
        self
    }

    /// Scripts executed so far, in dispatch order.
    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.lock().executions.clone()
    }

    /// Number of create calls received.
    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn fabricate(
        &self,
        state: &mut State,
        group: &str,
        index: usize,
        template: &NodeTemplate,
    ) -> ProvisionedNode {
        state.next_id += 1;
        let n = state.next_id;
        let name = match template.node_names.get(index) {
            Some(name) if self.echo_names => name.clone(),
            _ => format!("{group}-{n:03x}"),
        };
        let auth = if template.login_private_key.is_empty() {
            LoginAuth::Password(format!("pw-{n}"))
        } else {
            LoginAuth::PrivateKey(template.login_private_key.clone())
        };
        ProvisionedNode::new(format!("mem-{n}"), name)
            .with_group(group)
            .with_public(format!("203.0.113.{}", 10 + n))
            .with_private(format!("10.0.0.{}", 10 + n))
            .with_credentials(LoginCredentials {
                user: "root".to_string(),
                auth,
            })
    }
}

impl Provider for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn create_batch(
        &self,
        group: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<ProvisionedNode>> {
        let mut state = self.lock();
        state.create_calls += 1;

        if let Some((message, partial)) = &self.create_failure {
            state.live.extend(partial.iter().cloned());
            return Err(Error::Provider {
                message: message.clone(),
                created: partial.clone(),
            });
        }

        let nodes = match &self.created_nodes {
            Some(nodes) => nodes.clone(),
            None => (0..count)
                .map(|i| self.fabricate(&mut state, group, i, template))
                .collect(),
        };
        state.live.extend(nodes.iter().cloned());
        Ok(nodes)
    }

    fn execute_script(
        &self,
        node: &ProvisionedNode,
        script: &ConfigScript,
        options: &RunScriptOptions,
    ) -> Result<ExecutionResult> {
        self.lock().executions.push(RecordedExecution {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            role: script.role,
            script: script.render(),
            blocking: options.block_on_complete,
        });

        match self.outcomes.get(&node.name) {
            Some(ScriptOutcome::Exit(status)) => Ok(ExecutionResult {
                exit_status: *status,
                output: String::new(),
                error: format!("script exited with {status}"),
            }),
            Some(ScriptOutcome::Transport(message)) => Err(Error::provider(message.clone())),
            None => Ok(ExecutionResult::ok()),
        }
    }

    fn destroy_matching(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        let mut state = self.lock();
        let (destroyed, kept): (Vec<_>, Vec<_>) =
            state.live.drain(..).partition(|node| node.group == group);
        state.live = kept;
        Ok(destroyed)
    }

    fn list_nodes(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        Ok(self
            .lock()
            .live
            .iter()
            .filter(|node| node.group == group)
            .cloned()
            .collect())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(names: &[&str]) -> NodeTemplate {
        NodeTemplate {
            image: "ubuntu".to_string(),
            location: "lab".to_string(),
            hardware_id: "lab/small".to_string(),
            inbound_ports: vec![22],
            authorize_public_key: "ssh-ed25519 AAAA".to_string(),
            login_private_key: "KEY".to_string(),
            node_names: names.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_fabricated_nodes_echo_names() {
        let backend = MemoryBackend::new();
        let nodes = backend
            .create_batch("g", 2, &template(&["g-db", "g-lb"]))
            .unwrap();
        assert_eq!(nodes[0].name, "g-db");
        assert_eq!(nodes[1].name, "g-lb");
        assert!(nodes.iter().all(ProvisionedNode::is_usable));
        assert_ne!(nodes[0].private_address(), nodes[1].private_address());
        assert_eq!(nodes[0].credentials.auth, LoginAuth::PrivateKey("KEY".to_string()));
    }

    #[test]
    fn test_without_name_echo() {
        let backend = MemoryBackend::new().without_name_echo();
        let nodes = backend.create_batch("g", 1, &template(&["g-db"])).unwrap();
        assert_ne!(nodes[0].name, "g-db");
        assert!(nodes[0].name.starts_with("g-"));
    }

    #[test]
    fn test_destroy_and_list_by_group() {
        let backend = MemoryBackend::new();
        backend.create_batch("a", 2, &template(&[])).unwrap();
        backend.create_batch("b", 1, &template(&[])).unwrap();
        assert_eq!(backend.list_nodes("a").unwrap().len(), 2);
        assert_eq!(backend.destroy_matching("a").unwrap().len(), 2);
        assert!(backend.list_nodes("a").unwrap().is_empty());
        assert_eq!(backend.list_nodes("b").unwrap().len(), 1);
        assert_eq!(backend.create_calls(), 2);
    }

    #[test]
    fn test_create_failure_reports_partial() {
        let partial = vec![ProvisionedNode::new("p-1", "g-db").with_group("g")];
        let backend = MemoryBackend::new().with_create_failure("quota exceeded", partial);
        let err = backend.create_batch("g", 4, &template(&[])).unwrap_err();
        assert_eq!(err.orphaned_nodes().len(), 1);
        assert_eq!(backend.list_nodes("g").unwrap().len(), 1);
    }

    #[test]
    fn test_script_outcomes() {
        let backend = MemoryBackend::new()
            .with_exit_status("bad", 2)
            .with_transport_error("gone", "connection refused");
        let script = ConfigScript {
            role: Role::Database,
            commands: vec!["true".to_string()],
        };
        let opts = RunScriptOptions::default();

        let ok = backend
            .execute_script(&ProvisionedNode::new("1", "fine"), &script, &opts)
            .unwrap();
        assert!(ok.is_success());

        let bad = backend
            .execute_script(&ProvisionedNode::new("2", "bad"), &script, &opts)
            .unwrap();
        assert_eq!(bad.exit_status, 2);

        assert!(
            backend
                .execute_script(&ProvisionedNode::new("3", "gone"), &script, &opts)
                .is_err()
        );
        assert_eq!(backend.executions().len(), 3);
    }

    #[test]
    fn test_close_flag() {
        let backend = MemoryBackend::new();
        assert!(!backend.is_closed());
        backend.close();
        assert!(backend.is_closed());
    }
}
