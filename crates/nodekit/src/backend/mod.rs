//! Provider abstraction for node creation and remote execution.
//!
//! The [`Provider`] trait is the boundary to the compute provider, allowing for
//! different implementations:
//! - [`driver::DriverBackend`]: an external driver executable plus `ssh`
//! - [`memory::MemoryBackend`]: in-process fake for dry runs and tests

pub mod driver;
pub mod memory;

use crate::error::Result;
use crate::script::ConfigScript;
use crate::types::{ExecutionResult, NodeTemplate, ProvisionedNode, RunScriptOptions};
use std::sync::Arc;

/// Compute provider operations used by a run.
pub trait Provider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Create `count` nodes in `group` from one template.
    ///
    /// Nodes come back in no particular order. On failure the error should
    /// carry any nodes that did come up (see [`crate::Error::Provider`]).
    fn create_batch(
        &self,
        group: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<ProvisionedNode>>;

    /// Run a script on a node.
    ///
    /// A non-zero exit is reported through [`ExecutionResult::exit_status`];
    /// `Err` means the channel itself failed (connection, timeout).
    fn execute_script(
        &self,
        node: &ProvisionedNode,
        script: &ConfigScript,
        options: &RunScriptOptions,
    ) -> Result<ExecutionResult>;

    /// Destroy every node in `group`, returning what was destroyed.
    fn destroy_matching(&self, group: &str) -> Result<Vec<ProvisionedNode>>;

    /// List the nodes in `group`.
    fn list_nodes(&self, group: &str) -> Result<Vec<ProvisionedNode>>;

    /// Release provider-side resources. Called once when the session ends.
    fn close(&self) {}
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn create_batch(
        &self,
        group: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<ProvisionedNode>> {
        (**self).create_batch(group, count, template)
    }

    fn execute_script(
        &self,
        node: &ProvisionedNode,
        script: &ConfigScript,
        options: &RunScriptOptions,
    ) -> Result<ExecutionResult> {
        (**self).execute_script(node, script, options)
    }

    fn destroy_matching(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        (**self).destroy_matching(group)
    }

    fn list_nodes(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        (**self).list_nodes(group)
    }

    fn close(&self) {
        (**self).close();
    }
}
