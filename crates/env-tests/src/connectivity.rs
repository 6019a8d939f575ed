//! Service reachability checks from canary clients.
//!
//! Every cluster IP of a service, and every host IP of a node for NodePort
//! checks, is probed separately, so dual-stack clusters exercise both
//! families. Probes use UDP (`nc -u -w 1`): a blocked path yields an empty
//! reply rather than a connection error.

use crate::canary::CanaryPod;
use crate::fixtures::{NodeInfo, ServiceInfo};
use segmentation_probe::probe::probe;
use segmentation_probe::{node_host_ips_drop_mask, Expectation, HostAddressError, ProbeError, UdpProbe};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("Service {service} has no ports")]
    NoServicePort { service: String },

    #[error("Service {service} has no node port allocated")]
    NoNodePort { service: String },

    #[error("Service {service} has no cluster IPs")]
    NoClusterIp { service: String },

    #[error("Host address lookup failed: {0}")]
    HostAddress(#[from] HostAddressError),

    #[error("Failed to verify that {check}: {source}")]
    Probe {
        check: String,
        #[source]
        source: ProbeError,
    },
}

fn not_str(expectation: &Expectation) -> &'static str {
    if expectation.should_connect() {
        ""
    } else {
        "not "
    }
}

async fn run_probe(
    client: &CanaryPod,
    check: String,
    target: UdpProbe,
    expectation: &Expectation,
) -> Result<(), ConnectivityError> {
    info!("{check}");

    let command = target.shell_command();
    let command = command.as_str();
    probe(expectation, expectation.default_policy(), move || {
        client.exec(command)
    })
    .await
    .map_err(|source| ConnectivityError::Probe { check, source })
}

/// Probe every cluster IP of `service` on its first target port.
pub async fn check_cluster_ips(
    client: &CanaryPod,
    service: &ServiceInfo,
    expectation: &Expectation,
) -> Result<(), ConnectivityError> {
    let port = service
        .first_port()
        .ok_or_else(|| ConnectivityError::NoServicePort {
            service: service.qualified_name(),
        })?;
    let target_port = port.target_port().to_string();

    if service.spec.cluster_ips.is_empty() {
        return Err(ConnectivityError::NoClusterIp {
            service: service.qualified_name(),
        });
    }

    for cluster_ip in &service.spec.cluster_ips {
        let check = format!(
            "Client {} should {}reach service {} on cluster IP {} port {}",
            client.qualified_name(),
            not_str(expectation),
            service.qualified_name(),
            cluster_ip,
            target_port,
        );
        run_probe(
            client,
            check,
            UdpProbe::hostname(cluster_ip.as_str(), &target_port),
            expectation,
        )
        .await?;
    }

    Ok(())
}

/// Probe every host IP of `node` on the first node port of `service`.
///
/// `node_role` only labels the log line, e.g. "local node" or "server node".
pub async fn check_node_port(
    client: &CanaryPod,
    service: &ServiceInfo,
    node: &NodeInfo,
    node_role: &str,
    expectation: &Expectation,
) -> Result<(), ConnectivityError> {
    let node_port = service
        .first_port()
        .ok_or_else(|| ConnectivityError::NoServicePort {
            service: service.qualified_name(),
        })?
        .node_port
        .ok_or_else(|| ConnectivityError::NoNodePort {
            service: service.qualified_name(),
        })?;

    for node_ip in node_host_ips_drop_mask(node)? {
        let check = format!(
            "Client {} should {}connect to NodePort service {} on {}:{} (node {}, {})",
            client.qualified_name(),
            not_str(expectation),
            service.qualified_name(),
            node_ip,
            node_port,
            node.name(),
            node_role,
        );
        run_probe(
            client,
            check,
            UdpProbe::hostname(node_ip, node_port),
            expectation,
        )
        .await?;
    }

    Ok(())
}
