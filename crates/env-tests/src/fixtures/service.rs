//! Service fixture: UDP NodePort manifests and the spec fields probes need.

use super::ObjectMeta;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInfo {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default, rename = "clusterIPs")]
    pub cluster_ips: Vec<String>,

    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub port: i32,

    #[serde(default)]
    pub target_port: Option<IntOrString>,

    #[serde(default)]
    pub node_port: Option<i32>,
}

/// Kubernetes `IntOrString`, as used by `targetPort`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(i32),
    String(String),
}

impl fmt::Display for IntOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl ServiceInfo {
    pub fn first_port(&self) -> Option<&ServicePort> {
        self.spec.ports.first()
    }

    pub fn qualified_name(&self) -> String {
        self.metadata.qualified_name()
    }
}

impl ServicePort {
    /// Port the backend listens on; defaults to `port` when unset.
    pub fn target_port(&self) -> IntOrString {
        self.target_port
            .clone()
            .unwrap_or(IntOrString::Int(self.port))
    }
}

/// A NodePort service exposing one UDP port, dual stack when available.
pub fn udp_node_port_service(
    name: &str,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    port: u16,
    target_port: u16,
) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": namespace,
        },
        "spec": {
            "type": "NodePort",
            "ipFamilyPolicy": "PreferDualStack",
            "selector": selector,
            "ports": [{
                "name": "udp",
                "protocol": "UDP",
                "port": port,
                "targetPort": target_port,
            }],
        },
    })
}
