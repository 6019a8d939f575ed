//! Canary pods for segmentation checks.
//!
//! This module deploys the agnhost pods the scenarios probe from and to:
//! idle clients, a long-sleeping client for the default network, and
//! `netexec` UDP backends that answer `hostname` with their pod name.
//!
//! Pods are pinned with `spec.nodeName`, bypassing the scheduler, so a
//! scenario controls exactly which node each client and backend lands on.

use crate::cluster::{ClusterConnection, ClusterError};
use crate::eventual::{assert_eventually, ConsistencyCategory, EventualError};
use segmentation_probe::ExecOutput;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// Container name used for every canary.
pub const CANARY_CONTAINER: &str = "agnhost";

#[derive(Debug, Error)]
pub enum CanaryError {
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Canary {pod} did not become ready: {source}")]
    NotReady {
        pod: String,
        #[source]
        source: EventualError,
    },
}

/// What the canary container runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanaryRole {
    /// `agnhost pause`; an idle client to exec probes from.
    Client,
    /// `sleep 2000000`; the plain default-network client.
    Sleeper,
    /// `agnhost netexec --udp-port=<port>`; a UDP backend.
    UdpServer { port: u16 },
}

#[derive(Debug, Clone)]
pub struct CanaryConfig {
    pub name: String,
    pub namespace: String,
    pub node_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub role: CanaryRole,
}

impl CanaryConfig {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, role: CanaryRole) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            node_name: None,
            labels: BTreeMap::new(),
            role,
        }
    }

    #[must_use]
    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Pod manifest running `image`.
    pub fn manifest(&self, image: &str) -> Value {
        let mut container = json!({
            "name": CANARY_CONTAINER,
            "image": image,
        });

        match &self.role {
            CanaryRole::Client => {
                container["args"] = json!(["pause"]);
            }
            CanaryRole::Sleeper => {
                container["command"] = json!(["sleep", "2000000"]);
            }
            CanaryRole::UdpServer { port } => {
                container["args"] = json!(["netexec", format!("--udp-port={port}")]);
                container["ports"] = json!([{"containerPort": port, "protocol": "UDP"}]);
            }
        }

        let mut spec = json!({
            "containers": [container],
            "terminationGracePeriodSeconds": 0,
        });
        if let Some(node) = &self.node_name {
            spec["nodeName"] = json!(node);
        }

        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": self.labels,
            },
            "spec": spec,
        })
    }
}

/// A deployed, running canary pod.
#[derive(Debug, Clone)]
pub struct CanaryPod {
    cluster: ClusterConnection,
    name: String,
    namespace: String,
    node_name: String,
}

impl CanaryPod {
    /// Create the pod and wait until it is running and ready.
    pub async fn deploy(
        cluster: &ClusterConnection,
        config: CanaryConfig,
    ) -> Result<Self, CanaryError> {
        info!(
            pod = %config.name,
            namespace = %config.namespace,
            node = config.node_name.as_deref().unwrap_or("<scheduler>"),
            role = ?config.role,
            "Deploying canary pod"
        );

        cluster
            .apply(&config.manifest(&cluster.config().agnhost_image))
            .await?;

        let qualified = format!("{}/{}", config.namespace, config.name);
        let (namespace, name) = (config.namespace.as_str(), config.name.as_str());
        assert_eventually(
            ConsistencyCategory::PodStartup,
            &format!("pod {qualified} running"),
            move || async move {
                let pod = cluster
                    .pod(namespace, name)
                    .await
                    .map_err(|e| e.to_string())?;
                if pod.is_terminal() {
                    return Err(format!("pod entered phase {}", pod.phase()));
                }
                Ok(pod.is_running_and_ready())
            },
        )
        .await
        .map_err(|source| CanaryError::NotReady {
            pod: qualified.clone(),
            source,
        })?;

        // The pinned node is authoritative; fall back to what the scheduler chose.
        let node_name = match config.node_name {
            Some(node) => node,
            None => cluster
                .pod(&config.namespace, &config.name)
                .await?
                .spec
                .node_name
                .unwrap_or_default(),
        };

        Ok(Self {
            cluster: cluster.clone(),
            name: config.name,
            namespace: config.namespace,
            node_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Run a shell command inside the canary.
    pub async fn exec(&self, command: &str) -> Result<ExecOutput, ClusterError> {
        self.cluster
            .exec_shell(&self.namespace, &self.name, command)
            .await
    }

    /// Delete the canary pod.
    pub async fn cleanup(&self) -> Result<(), ClusterError> {
        let result = self.cluster.delete_pod(&self.namespace, &self.name).await;
        if let Err(e) = &result {
            warn!(pod = %self.qualified_name(), error = %e, "Canary cleanup failed");
        }
        result
    }
}
