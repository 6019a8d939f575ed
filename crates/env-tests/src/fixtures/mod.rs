//! Cluster object fixtures: manifests the suite creates and the subset of
//! kubectl JSON it reads back.

pub mod network;
pub mod node;
pub mod pod;
pub mod service;

use serde::Deserialize;
use std::collections::BTreeMap;

pub use network::{NetworkAttachmentConfig, NetworkRole, Topology};
pub use node::NodeInfo;
pub use pod::PodInfo;
pub use service::{ServiceInfo, ServicePort};

/// `kubectl get ... -o json` list wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    pub items: Vec<T>,
}

/// The metadata fields the suite reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// `namespace/name`, or just `name` for cluster-scoped objects.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}
