//! Node fixture.

use super::ObjectMeta;
use segmentation_probe::AnnotatedObject;
use serde::Deserialize;

/// Taint effects that keep a toleration-less test pod off a node.
const BLOCKING_TAINT_EFFECTS: [&str; 2] = ["NoSchedule", "NoExecute"];

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: NodeSpec,

    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub unschedulable: bool,

    #[serde(default)]
    pub taints: Vec<Taint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Taint {
    pub effect: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
}

impl NodeInfo {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True")
    }

    /// Not cordoned and free of taints that would repel a plain test pod.
    pub fn is_schedulable(&self) -> bool {
        !self.spec.unschedulable
            && !self
                .spec
                .taints
                .iter()
                .any(|t| BLOCKING_TAINT_EFFECTS.contains(&t.effect.as_str()))
    }
}

impl AnnotatedObject for NodeInfo {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }
}

/// Up to `max` ready, schedulable nodes, ordered by name.
pub fn ready_schedulable(nodes: Vec<NodeInfo>, max: usize) -> Vec<NodeInfo> {
    let mut nodes: Vec<NodeInfo> = nodes
        .into_iter()
        .filter(|n| n.is_ready() && n.is_schedulable())
        .collect();
    nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    nodes.truncate(max);
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::List;
    use segmentation_probe::node_host_ips_drop_mask;

    const NODES_JSON: &str = r#"{
        "items": [
            {
                "metadata": {
                    "name": "ovn-worker2",
                    "annotations": {
                        "k8s.ovn.org/node-primary-ifaddr": "{\"ipv4\":\"172.18.0.4/16\",\"ipv6\":\"fc00:f853:ccd:e793::4/64\"}"
                    }
                },
                "spec": {},
                "status": {"conditions": [{"type": "Ready", "status": "True"}]}
            },
            {
                "metadata": {"name": "ovn-control-plane"},
                "spec": {"taints": [{"key": "node-role.kubernetes.io/control-plane", "effect": "NoSchedule"}]},
                "status": {"conditions": [{"type": "Ready", "status": "True"}]}
            },
            {
                "metadata": {"name": "ovn-worker"},
                "spec": {},
                "status": {"conditions": [{"type": "Ready", "status": "True"}]}
            },
            {
                "metadata": {"name": "ovn-worker3"},
                "spec": {"unschedulable": true},
                "status": {"conditions": [{"type": "Ready", "status": "True"}]}
            },
            {
                "metadata": {"name": "ovn-worker4"},
                "status": {"conditions": [{"type": "Ready", "status": "False"}]}
            }
        ]
    }"#;

    fn nodes() -> Vec<NodeInfo> {
        serde_json::from_str::<List<NodeInfo>>(NODES_JSON)
            .expect("node list should parse")
            .items
    }

    #[test]
    fn test_ready_schedulable_filters_and_sorts() {
        let selected = ready_schedulable(nodes(), 3);
        let names: Vec<&str> = selected.iter().map(NodeInfo::name).collect();
        assert_eq!(names, vec!["ovn-worker", "ovn-worker2"]);
    }

    #[test]
    fn test_ready_schedulable_respects_max() {
        let selected = ready_schedulable(nodes(), 1);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "ovn-worker");
    }

    #[test]
    fn test_prefer_no_schedule_taint_is_schedulable() {
        let node: NodeInfo = serde_json::from_str(
            r#"{"metadata": {"name": "n"}, "spec": {"taints": [{"key": "k", "effect": "PreferNoSchedule"}]}}"#,
        )
        .unwrap();
        assert!(node.is_schedulable());
        assert!(!node.is_ready());
    }

    #[test]
    fn test_node_annotation_feeds_host_address_extraction() {
        let node = nodes().into_iter().next().unwrap();
        let ips = node_host_ips_drop_mask(&node).expect("annotation should parse");
        assert!(ips.contains("172.18.0.4"));
        assert!(ips.contains("fc00:f853:ccd:e793::4"));
    }
}
