//! Provider backed by an external driver executable and `ssh`.
//!
//! The driver owns everything provider-specific. It is invoked as:
//!
//! - `<driver> create --group G --count N` with the [`NodeTemplate`] as JSON on stdin
//! - `<driver> destroy --group G`
//! - `<driver> list --group G`
//!
//! and prints a JSON array of [`ProvisionedNode`] on stdout. A failed create
//! may still print the nodes that came up. Credentials reach the driver
//! through `STACKUP_PROVIDER`, `STACKUP_IDENTITY` and `STACKUP_CREDENTIAL`.
//!
//! Scripts are uploaded over `ssh` with the login key and then run from the
//! uploaded file with stdin closed, so a command that reads stdin cannot
//! swallow the rest of the script.

use crate::backend::Provider;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::role::Role;
use crate::script::ConfigScript;
use crate::types::{ExecutionResult, LoginAuth, NodeTemplate, ProvisionedNode, RunScriptOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use subprocess::{CaptureData, Exec, ExitStatus, NullFile, Popen, Redirection};

/// Exit status `ssh` uses for its own errors.
const SSH_ERROR_STATUS: u32 = 255;

/// Remote directory scripts are uploaded to.
const DEFAULT_REMOTE_DIR: &str = "/tmp";

/// Provider that shells out to a driver executable.
pub struct DriverBackend {
    driver: PathBuf,
    ssh: PathBuf,
    remote_dir: String,
    provider: String,
    identity: String,
    credential: String,
    identity_file: PathBuf,
}

impl DriverBackend {
    /// Create a backend for the configured provider.
    ///
    /// Uses the configured driver, or looks up `stackup-<provider>` on `$PATH`.
    pub fn new(config: &ProviderConfig, identity_file: impl Into<PathBuf>) -> Result<Self> {
        let driver = find_driver(config)?;
        Ok(Self::with_driver(driver, config, identity_file))
    }

    /// Create a backend with an explicit driver path.
    pub fn with_driver(
        driver: impl Into<PathBuf>,
        config: &ProviderConfig,
        identity_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            driver: driver.into(),
            ssh: PathBuf::from("ssh"),
            remote_dir: DEFAULT_REMOTE_DIR.to_string(),
            provider: config.provider.clone(),
            identity: config.identity.clone(),
            credential: config.credential.clone(),
            identity_file: identity_file.into(),
        }
    }

    /// Use another `ssh` executable.
    pub fn with_ssh(mut self, ssh: impl Into<PathBuf>) -> Self {
        self.ssh = ssh.into();
        self
    }

    /// Upload scripts to `dir` on the node instead of `/tmp`.
    pub fn with_remote_dir(mut self, dir: impl Into<String>) -> Self {
        self.remote_dir = dir.into();
        self
    }

    /// Path of the driver executable.
    pub fn driver(&self) -> &Path {
        &self.driver
    }

    /// Run the driver and capture its output.
    fn run_driver(&self, args: &[&str], stdin: Option<&str>) -> Result<CaptureData> {
        log::debug!("{} {}", self.driver.display(), args.join(" "));

        let exec = Exec::cmd(&self.driver)
            .args(args)
            .env("STACKUP_PROVIDER", &self.provider)
            .env("STACKUP_IDENTITY", &self.identity)
            .env("STACKUP_CREDENTIAL", &self.credential)
            .stdout(Redirection::Pipe)
            .stderr(Redirection::Pipe);
        let exec = match stdin {
            Some(input) => exec.stdin(input),
            None => exec.stdin(NullFile),
        };

        exec.capture().map_err(|e| {
            Error::provider(format!(
                "failed to execute driver {}: {e}",
                self.driver.display()
            ))
        })
    }

    /// Run a driver subcommand that answers with a node list.
    fn run_node_command(
        &self,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<Vec<ProvisionedNode>> {
        let output = self.run_driver(args, stdin)?;
        let command = args.first().copied().unwrap_or_default();
        let nodes = parse_nodes(&output.stdout).map_err(|e| {
            Error::provider(format!(
                "driver {command} returned an unreadable node list ({e}): {}",
                output.stdout_str().trim()
            ))
        });

        if !output.success() {
            return Err(Error::Provider {
                message: format!(
                    "driver {command} failed ({}): {}",
                    describe_status(output.exit_status),
                    output.stderr_str().trim()
                ),
                created: nodes.unwrap_or_default(),
            });
        }

        nodes
    }

    fn ssh_exec(&self, node: &ProvisionedNode, remote: &str) -> Result<Exec> {
        let host = node
            .public_address()
            .ok_or_else(|| Error::provider(format!("node {} has no public address", node.id)))?;

        if let LoginAuth::Password(_) = node.credentials.auth {
            return Err(Error::provider(format!(
                "node {} only offers password login, which the ssh transport does not support",
                node.id
            )));
        }

        Ok(Exec::cmd(&self.ssh)
            .arg("-i")
            .arg(&self.identity_file)
            .args(&["-o", "BatchMode=yes"])
            .args(&["-o", "StrictHostKeyChecking=accept-new"])
            .args(&["-o", "ConnectTimeout=30"])
            .arg(format!("{}@{host}", node.credentials.user))
            .arg(remote))
    }
}

impl Provider for DriverBackend {
    fn name(&self) -> &str {
        &self.provider
    }

    fn create_batch(
        &self,
        group: &str,
        count: usize,
        template: &NodeTemplate,
    ) -> Result<Vec<ProvisionedNode>> {
        let template_json = serde_json::to_string(template)?;
        let count = count.to_string();
        self.run_node_command(
            &["create", "--group", group, "--count", &count],
            Some(&template_json),
        )
    }

    fn execute_script(
        &self,
        node: &ProvisionedNode,
        script: &ConfigScript,
        options: &RunScriptOptions,
    ) -> Result<ExecutionResult> {
        let remote = remote_command(script.role, &self.remote_dir, options.block_on_complete);
        let started = Instant::now();

        let mut child = self
            .ssh_exec(node, &remote)?
            .stdin(Redirection::Pipe)
            .stdout(Redirection::Pipe)
            .stderr(Redirection::Pipe)
            .popen()
            .map_err(|e| Error::provider(format!("failed to execute ssh: {e}")))?;

        let captured = child
            .communicate_start(Some(script.render().into_bytes()))
            .limit_time(options.timeout)
            .read();

        let (output, error) = match captured {
            Ok((stdout, stderr)) => (lossy(stdout), lossy(stderr)),
            // ssh exited before taking the whole script; its status decides
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                log::debug!("ssh to node {} closed its input early", node.id);
                let (stdout, stderr) = e.capture;
                (lossy(stdout), lossy(stderr))
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                stop(&mut child);
                return Err(timed_out(node, options));
            }
            Err(e) => {
                stop(&mut child);
                return Err(Error::provider(format!(
                    "lost output of ssh to node {}: {e}",
                    node.id
                )));
            }
        };

        let remaining = options.timeout.saturating_sub(started.elapsed());
        let status = child
            .wait_timeout(remaining)
            .map_err(|e| Error::provider(format!("failed to wait for ssh: {e}")))?;
        let Some(status) = status else {
            stop(&mut child);
            return Err(timed_out(node, options));
        };

        let exit_status = match status {
            ExitStatus::Exited(SSH_ERROR_STATUS) => {
                return Err(Error::provider(format!(
                    "ssh to node {} failed: {}",
                    node.id,
                    error.trim()
                )));
            }
            ExitStatus::Exited(code) => i32::try_from(code).unwrap_or(-1),
            other => {
                log::debug!("ssh to node {} ended with {other:?}", node.id);
                -1
            }
        };

        Ok(ExecutionResult {
            exit_status,
            output,
            error,
        })
    }

    fn destroy_matching(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        self.run_node_command(&["destroy", "--group", group], None)
    }

    fn list_nodes(&self, group: &str) -> Result<Vec<ProvisionedNode>> {
        self.run_node_command(&["list", "--group", group], None)
    }
}

/// Shell command run on the node; the script itself arrives on stdin.
fn remote_command(role: Role, dir: &str, block_on_complete: bool) -> String {
    if block_on_complete {
        format!(
            "f=$(mktemp {dir}/stackup-{role}.XXXXXX) && cat > \"$f\" && bash \"$f\" < /dev/null; \
             rc=$?; rm -f \"$f\"; exit $rc"
        )
    } else {
        let base = format!("{dir}/stackup-{role}");
        format!("cat > {base}.sh && {{ nohup bash {base}.sh > {base}.log 2>&1 < /dev/null & }}")
    }
}

fn find_driver(config: &ProviderConfig) -> Result<PathBuf> {
    let name = config
        .driver
        .clone()
        .unwrap_or_else(|| format!("stackup-{}", config.provider));
    which::which(&name).map_err(|_| {
        Error::config(format!(
            "provider driver '{name}' not found; set '{}.driver' in the provider file",
            config.provider
        ))
    })
}

fn parse_nodes(stdout: &[u8]) -> serde_json::Result<Vec<ProvisionedNode>> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text.trim())
}

fn describe_status(status: ExitStatus) -> String {
    match status {
        ExitStatus::Exited(code) => format!("exit {code}"),
        ExitStatus::Signaled(signal) => format!("killed by signal {signal}"),
        other => format!("{other:?}"),
    }
}

fn lossy(bytes: Option<Vec<u8>>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

fn timed_out(node: &ProvisionedNode, options: &RunScriptOptions) -> Error {
    Error::provider(format!(
        "script on node {} timed out after {}s",
        node.id,
        options.timeout.as_secs()
    ))
}

/// Kill ssh and reap it.
fn stop(child: &mut Popen) {
    if let Err(e) = child.kill() {
        log::debug!("failed to kill ssh: {e}");
    }
    if let Err(e) = child.wait() {
        log::debug!("failed to reap ssh: {e}");
    }
}
