//! Cluster connection and kubectl access.
//!
//! This module provides the `ClusterConnection` type. Every cluster read and
//! write goes through the configured `kubectl`, which picks up `KUBECONFIG`
//! from the environment like any other kubectl invocation.

use crate::config::{ConfigError, E2eConfig};
use crate::fixtures::node::{self, NodeInfo};
use crate::fixtures::{List, PodInfo, ServiceInfo};
use segmentation_probe::ExecOutput;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::process::{Output, Stdio};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Cluster connection errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Failed to run {program}: {source}. Ensure kubectl is installed and KUBECONFIG points at the test cluster")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("kubectl {args} failed ({status}): {stderr}")]
    CommandFailed {
        args: String,
        status: String,
        stderr: String,
    },

    #[error("API server not ready: {message}")]
    ApiNotReady { message: String },

    #[error("I/O error talking to kubectl: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Connection to the cluster under test.
#[derive(Debug, Clone)]
pub struct ClusterConnection {
    config: E2eConfig,
}

impl ClusterConnection {
    /// Create a connection from environment configuration.
    ///
    /// Fails with an actionable error if the API server is not ready.
    pub async fn from_env() -> Result<Self, ClusterError> {
        Self::new(E2eConfig::from_env()?).await
    }

    /// Create a connection with explicit configuration.
    pub async fn new(config: E2eConfig) -> Result<Self, ClusterError> {
        let cluster = Self { config };
        cluster.check_api_ready().await?;
        Ok(cluster)
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    /// Check that the API server answers `/readyz` with `ok`.
    pub async fn check_api_ready(&self) -> Result<(), ClusterError> {
        let body = self
            .kubectl(&["get", "--raw", "/readyz"])
            .await
            .map_err(|e| ClusterError::ApiNotReady {
                message: e.to_string(),
            })?;

        if body.trim() != "ok" {
            return Err(ClusterError::ApiNotReady {
                message: format!("/readyz returned {:?}", body.trim()),
            });
        }

        Ok(())
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.config.kubectl);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> ClusterError {
        ClusterError::Spawn {
            program: self.config.kubectl.clone(),
            source,
        }
    }

    fn check_status(args: &[&str], output: &Output) -> Result<(), ClusterError> {
        if output.status.success() {
            return Ok(());
        }
        Err(ClusterError::CommandFailed {
            args: args.join(" "),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run kubectl and return stdout.
    pub async fn kubectl(&self, args: &[&str]) -> Result<String, ClusterError> {
        debug!(args = %args.join(" "), "kubectl");

        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        Self::check_status(args, &output)?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run kubectl with `input` on stdin and return stdout.
    pub async fn kubectl_with_stdin(
        &self,
        args: &[&str],
        input: &str,
    ) -> Result<String, ClusterError> {
        debug!(args = %args.join(" "), "kubectl (stdin)");

        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
            // Dropping stdin closes the pipe so kubectl sees EOF
        }

        let output = child.wait_with_output().await?;
        Self::check_status(args, &output)?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run kubectl with `-o json` appended and deserialize the result.
    pub async fn get_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, ClusterError> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["-o", "json"]);
        let stdout = self.kubectl(&full).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Create or update the object described by `manifest`.
    pub async fn apply(&self, manifest: &Value) -> Result<(), ClusterError> {
        self.kubectl_with_stdin(&["apply", "-f", "-"], &manifest.to_string())
            .await?;
        Ok(())
    }

    /// Run `command` through `/bin/sh -c` inside `pod`.
    ///
    /// Returns trimmed stdout and the remote command's own stderr. A non-zero
    /// remote exit is still `Ok`: kubectl reports it with a trailing
    /// `command terminated with exit code N` line, which is stripped. Any
    /// other kubectl failure (missing pod, API or RBAC errors) is an error.
    pub async fn exec_shell(
        &self,
        namespace: &str,
        pod: &str,
        command: &str,
    ) -> Result<ExecOutput, ClusterError> {
        let args = ["exec", "-n", namespace, pod, "--", "/bin/sh", "-c", command];
        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            return Ok(ExecOutput::new(stdout.trim(), stderr.trim()));
        }

        match remote_exit_stderr(&stderr) {
            Some(remote) => Ok(ExecOutput::new(stdout.trim(), remote)),
            None => Err(ClusterError::CommandFailed {
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            }),
        }
    }

    pub async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.apply(&json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": name},
        }))
        .await
    }

    /// Start deleting `name`; does not wait for finalizers.
    pub async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.kubectl(&[
            "delete",
            "namespace",
            name,
            "--ignore-not-found=true",
            "--wait=false",
        ])
        .await?;
        Ok(())
    }

    /// Whether `name` still exists, including while it is terminating.
    pub async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError> {
        let out = self
            .kubectl(&[
                "get",
                "namespace",
                name,
                "--ignore-not-found=true",
                "-o",
                "name",
            ])
            .await?;
        Ok(!out.trim().is_empty())
    }

    pub async fn nodes(&self) -> Result<Vec<NodeInfo>, ClusterError> {
        let list: List<NodeInfo> = self.get_json(&["get", "nodes"]).await?;
        Ok(list.items)
    }

    /// Up to `max` ready, schedulable nodes, ordered by name.
    pub async fn ready_schedulable_nodes(&self, max: usize) -> Result<Vec<NodeInfo>, ClusterError> {
        Ok(node::ready_schedulable(self.nodes().await?, max))
    }

    pub async fn service(&self, namespace: &str, name: &str) -> Result<ServiceInfo, ClusterError> {
        self.get_json(&["get", "service", "-n", namespace, name]).await
    }

    pub async fn pod(&self, namespace: &str, name: &str) -> Result<PodInfo, ClusterError> {
        self.get_json(&["get", "pod", "-n", namespace, name]).await
    }

    /// Pods in `namespace` matching a label selector and an optional field selector.
    pub async fn pods(
        &self,
        namespace: &str,
        label_selector: &str,
        field_selector: Option<&str>,
    ) -> Result<Vec<PodInfo>, ClusterError> {
        let mut args = vec!["get", "pods", "-n", namespace, "-l", label_selector];
        if let Some(fields) = field_selector {
            args.extend(["--field-selector", fields]);
        }
        let list: List<PodInfo> = self.get_json(&args).await?;
        Ok(list.items)
    }

    /// Delete a pod and wait for it to be gone.
    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.kubectl(&[
            "delete",
            "pod",
            "-n",
            namespace,
            name,
            "--ignore-not-found=true",
            "--wait=true",
        ])
        .await?;
        Ok(())
    }
}

/// Last stderr line kubectl exec writes when the remote command exits non-zero.
const REMOTE_EXIT_TRAILER: &str = "command terminated with exit code ";

/// The remote command's stderr, if kubectl's stderr ends with the remote exit
/// trailer. `None` means kubectl itself failed.
fn remote_exit_stderr(stderr: &str) -> Option<&str> {
    let stderr = stderr.trim_end();
    let (head, last) = stderr.rsplit_once('\n').unwrap_or(("", stderr));
    let code = last.trim().strip_prefix(REMOTE_EXIT_TRAILER)?;
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(head.trim())
}
