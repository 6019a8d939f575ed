//! Host IP extraction from the OVN node primary interface annotation.
//!
//! OVN-Kubernetes records each node's primary interface addresses as
//! `{"ipv4":"172.18.0.2/16","ipv6":"fc00:f853:ccd:e793::2/64"}`. NodePort
//! checks need the bare addresses, one probe per address family.

use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Annotation carrying the node's primary interface CIDRs.
pub const NODE_PRIMARY_IFADDR_ANNOTATION: &str = "k8s.ovn.org/node-primary-ifaddr";

/// Anything with a name and string annotations, typically a cluster node.
pub trait AnnotatedObject {
    fn name(&self) -> &str;
    fn annotation(&self, key: &str) -> Option<&str>;
}

/// Host address extraction errors. None of these are retryable.
#[derive(Debug, Error)]
pub enum HostAddressError {
    #[error("{key} annotation not found for node {node:?}")]
    AnnotationNotFound { key: String, node: String },

    #[error("failed to unmarshal annotation {key} for node {node:?}: {source}")]
    Deserialization {
        key: String,
        node: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("node {node:?} does not have any IP information set")]
    NoAddressData { node: String },

    #[error("failed to parse node host cidr {value:?}: {reason}")]
    MalformedAddress { value: String, reason: String },
}

#[derive(Debug, Default, Deserialize)]
struct PrimaryIfAddr {
    #[serde(default)]
    ipv4: Option<String>,
    #[serde(default)]
    ipv6: Option<String>,
}

/// Host IPs of `node`, taken from [`NODE_PRIMARY_IFADDR_ANNOTATION`] with the
/// prefix length dropped.
///
/// # Errors
///
/// See [`host_ips_from_annotation`].
pub fn node_host_ips_drop_mask<N: AnnotatedObject + ?Sized>(
    node: &N,
) -> Result<BTreeSet<String>, HostAddressError> {
    host_ips_from_annotation(node, NODE_PRIMARY_IFADDR_ANNOTATION)
}

/// Host IPs of `node`, taken from the `ipv4`/`ipv6` CIDRs stored under `key`.
///
/// # Errors
///
/// - [`HostAddressError::AnnotationNotFound`] if `key` is not set
/// - [`HostAddressError::Deserialization`] if the value is not the expected JSON object
/// - [`HostAddressError::NoAddressData`] if neither family is set
/// - [`HostAddressError::MalformedAddress`] if a value is not `address/prefix`
pub fn host_ips_from_annotation<N: AnnotatedObject + ?Sized>(
    node: &N,
    key: &str,
) -> Result<BTreeSet<String>, HostAddressError> {
    let raw = node
        .annotation(key)
        .ok_or_else(|| HostAddressError::AnnotationNotFound {
            key: key.to_string(),
            node: node.name().to_string(),
        })?;

    let parsed: PrimaryIfAddr =
        serde_json::from_str(raw).map_err(|source| HostAddressError::Deserialization {
            key: key.to_string(),
            node: node.name().to_string(),
            source,
        })?;

    let cidrs: Vec<String> = [parsed.ipv4, parsed.ipv6]
        .into_iter()
        .flatten()
        .filter(|cidr| !cidr.is_empty())
        .collect();

    if cidrs.is_empty() {
        return Err(HostAddressError::NoAddressData {
            node: node.name().to_string(),
        });
    }

    cidrs.iter().map(|cidr| drop_mask(cidr)).collect()
}

fn drop_mask(cidr: &str) -> Result<String, HostAddressError> {
    // IpNetwork accepts a bare address as a host route; the annotation never
    // omits the prefix, so treat that as malformed.
    if !cidr.contains('/') {
        return Err(HostAddressError::MalformedAddress {
            value: cidr.to_string(),
            reason: "missing prefix length".to_string(),
        });
    }

    let network: IpNetwork = cidr
        .parse()
        .map_err(|e: ipnetwork::IpNetworkError| HostAddressError::MalformedAddress {
            value: cidr.to_string(),
            reason: e.to_string(),
        })?;

    Ok(network.ip().to_canonical().to_string())
}
