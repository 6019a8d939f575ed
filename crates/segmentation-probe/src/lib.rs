//! Reachability probing and node address helpers for UDN segmentation tests.
//!
//! Nothing in this crate talks to a cluster. Callers hand in the command
//! executor and the node object, which keeps every check unit-testable.

#![warn(clippy::pedantic)]

/// Module for building the UDP probe commands run inside client pods
pub mod command;

/// Module for bounded-retry reachability checks
pub mod probe;

/// Module for extracting host IPs from node annotations
pub mod host_addr;

pub use command::UdpProbe;
pub use host_addr::{node_host_ips_drop_mask, AnnotatedObject, HostAddressError};
pub use probe::{
    expect_reachable, expect_unreachable, ExecOutput, Expectation, ProbeError, ProbePolicy,
};
