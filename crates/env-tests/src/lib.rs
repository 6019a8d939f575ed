//! UDN Network Segmentation Test Suite
//!
//! This crate provides environment tests for OVN-Kubernetes user-defined
//! networks (UDN). Tests create namespaces, network attachments, services and
//! agnhost pods in a live cluster, then assert which cluster IP and NodePort
//! paths are reachable from clients on the UDN and on the default network.
//!
//! # Features
//!
//! - `smoke`: API server readiness and node address annotations (30s)
//! - `udn`: Service segmentation scenarios for layer3 and layer2 UDNs (3-5min)
//! - `resilience`: ovnkube-node restart after a UDN service exists
//! - `all`: Enable all test categories
//!
//! # Prerequisites
//!
//! 1. An OVN-Kubernetes kind cluster with at least 3 schedulable nodes
//! 2. `KUBECONFIG` pointing at it and kubectl in PATH
//! 3. `OVN_GATEWAY_MODE`, `OVN_ENABLE_INTERCONNECT`, `KIND_IPV4_SUPPORT` and
//!    `KIND_IPV6_SUPPORT` exported as the kind scripts do
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs 0 env-tests (no default features)
//! cargo test
//!
//! # Smoke tests only
//! cargo test -p udn-env-tests --features smoke
//!
//! # Full suite
//! cargo test -p udn-env-tests --features all
//! ```

pub mod canary;
pub mod cluster;
pub mod config;
pub mod connectivity;
pub mod eventual;
pub mod fixtures;
pub mod ovnk;
