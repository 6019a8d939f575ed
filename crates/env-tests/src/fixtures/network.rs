//! NetworkAttachmentDefinition fixture for user-defined networks.

use crate::config::IpFamilies;
use serde_json::{json, Value};
use std::fmt;

/// NAD name shared by the service scenarios.
pub const TENANT_NAD_NAME: &str = "tenant-red";

pub const UDN_IPV4_SUBNET: &str = "10.128.0.0/16";
pub const UDN_IPV6_SUBNET: &str = "2014:100:200::0/60";

/// MTU leaves room for the Geneve overlay header.
const UDN_MTU: u32 = 1300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Layer3,
    Layer2,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer3 => write!(f, "layer3"),
            Self::Layer2 => write!(f, "layer2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRole {
    Primary,
    Secondary,
}

impl fmt::Display for NetworkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkAttachmentConfig {
    pub name: String,
    pub namespace: String,
    pub topology: Topology,
    pub cidr: String,
    pub role: NetworkRole,
}

impl NetworkAttachmentConfig {
    /// Primary UDN over the suite's tenant subnets, restricted to `families`.
    pub fn primary(namespace: &str, topology: Topology, families: IpFamilies) -> Self {
        Self {
            name: TENANT_NAD_NAME.to_string(),
            namespace: namespace.to_string(),
            topology,
            cidr: correct_cidr_family(UDN_IPV4_SUBNET, UDN_IPV6_SUBNET, families),
            role: NetworkRole::Primary,
        }
    }

    /// OVN network name. Namespaces are unique per test, so the network is too.
    pub fn network_name(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }

    /// CNI config stored in the NAD's `spec.config`.
    pub fn cni_config(&self) -> Value {
        json!({
            "cniVersion": "0.3.0",
            "name": self.network_name(),
            "type": "ovn-k8s-cni-overlay",
            "topology": self.topology.to_string(),
            "subnets": self.cidr,
            "mtu": UDN_MTU,
            "netAttachDefName": format!("{}/{}", self.namespace, self.name),
            "role": self.role.to_string(),
        })
    }

    pub fn to_manifest(&self) -> Value {
        json!({
            "apiVersion": "k8s.cni.cncf.io/v1",
            "kind": "NetworkAttachmentDefinition",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
            },
            "spec": {
                "config": self.cni_config().to_string(),
            },
        })
    }
}

/// Subnet(s) matching the cluster's IP families, comma-joined when dual stack.
pub fn correct_cidr_family(ipv4_cidr: &str, ipv6_cidr: &str, families: IpFamilies) -> String {
    let mut cidrs = Vec::with_capacity(2);
    if families.ipv4 {
        cidrs.push(ipv4_cidr);
    }
    if families.ipv6 {
        cidrs.push(ipv6_cidr);
    }
    cidrs.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    const V4: IpFamilies = IpFamilies {
        ipv4: true,
        ipv6: false,
    };
    const V6: IpFamilies = IpFamilies {
        ipv4: false,
        ipv6: true,
    };
    const DUAL: IpFamilies = IpFamilies {
        ipv4: true,
        ipv6: true,
    };

    #[test]
    fn test_correct_cidr_family() {
        assert_eq!(correct_cidr_family("a", "b", V4), "a");
        assert_eq!(correct_cidr_family("a", "b", V6), "b");
        assert_eq!(correct_cidr_family("a", "b", DUAL), "a,b");
    }

    #[test]
    fn test_primary_layer3_manifest() {
        let nad = NetworkAttachmentConfig::primary("udn-services-1", Topology::Layer3, DUAL);
        let manifest = nad.to_manifest();

        assert_eq!(manifest["kind"], "NetworkAttachmentDefinition");
        assert_eq!(manifest["metadata"]["name"], TENANT_NAD_NAME);
        assert_eq!(manifest["metadata"]["namespace"], "udn-services-1");

        let config_str = manifest["spec"]["config"]
            .as_str()
            .expect("config is a JSON string");
        let config: Value = serde_json::from_str(config_str).expect("config is valid JSON");
        assert_eq!(config["type"], "ovn-k8s-cni-overlay");
        assert_eq!(config["topology"], "layer3");
        assert_eq!(config["role"], "primary");
        assert_eq!(config["subnets"], "10.128.0.0/16,2014:100:200::0/60");
        assert_eq!(config["netAttachDefName"], "udn-services-1/tenant-red");
        assert_eq!(config["name"], "udn-services-1_tenant-red");
    }

    #[test]
    fn test_layer2_ipv4_only() {
        let nad = NetworkAttachmentConfig::primary("ns", Topology::Layer2, V4);
        let config = nad.cni_config();
        assert_eq!(config["topology"], "layer2");
        assert_eq!(config["subnets"], UDN_IPV4_SUBNET);
    }

    #[test]
    fn test_secondary_role_in_cni_config() {
        let nad = NetworkAttachmentConfig {
            role: NetworkRole::Secondary,
            ..NetworkAttachmentConfig::primary("ns", Topology::Layer3, V4)
        };
        assert_eq!(nad.cni_config()["role"], "secondary");
        assert_eq!(nad.network_name(), "ns_tenant-red");
    }
}
