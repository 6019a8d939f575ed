//! OVN-Kubernetes control-plane helpers.

use crate::cluster::{ClusterConnection, ClusterError};
use crate::eventual::{assert_eventually, ConsistencyCategory, EventualError};
use thiserror::Error;
use tracing::info;

/// Label selector of the ovnkube-node DaemonSet pods.
pub const OVNKUBE_NODE_SELECTOR: &str = "name=ovnkube-node";

#[derive(Debug, Error)]
pub enum OvnkError {
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Could not find ovnkube-node pod running on node {node}")]
    PodNotFound { node: String },

    #[error("Replacement ovnkube-node pod on node {node} never became ready: {source}")]
    NotReplaced {
        node: String,
        #[source]
        source: EventualError,
    },
}

/// Delete the ovnkube-node pod on `node_name` and wait for its replacement
/// to be running and ready.
pub async fn restart_ovnkube_node_pod(
    cluster: &ClusterConnection,
    namespace: &str,
    node_name: &str,
) -> Result<(), OvnkError> {
    let field_selector = format!("spec.nodeName={node_name}");
    let pods = cluster
        .pods(namespace, OVNKUBE_NODE_SELECTOR, Some(&field_selector))
        .await?;
    let old = pods.first().ok_or_else(|| OvnkError::PodNotFound {
        node: node_name.to_string(),
    })?;
    let old_name = old.metadata.name.as_str();

    info!(pod = %old_name, node = %node_name, "Restarting ovnkube-node pod");
    cluster.delete_pod(namespace, old_name).await?;

    let field_selector = field_selector.as_str();
    assert_eventually(
        ConsistencyCategory::PodReplacement,
        &format!("ovnkube-node running on {node_name}"),
        move || async move {
            let pods = cluster
                .pods(namespace, OVNKUBE_NODE_SELECTOR, Some(field_selector))
                .await?;
            Ok::<_, ClusterError>(
                pods.iter()
                    .any(|p| p.metadata.name != old_name && p.is_running_and_ready()),
            )
        },
    )
    .await
    .map_err(|source| OvnkError::NotReplaced {
        node: node_name.to_string(),
        source,
    })?;

    info!(node = %node_name, "ovnkube-node pod is running again");
    Ok(())
}
