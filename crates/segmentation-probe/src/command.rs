//! UDP probe command construction.
//!
//! The probe sends one datagram with `nc -u` and waits one second for the
//! reply. The agnhost `netexec` UDP server answers the `hostname` payload with
//! the name of the pod serving the request, so a successful probe's stdout is
//! the backend pod name and a blocked probe's stdout is empty.

use std::fmt;

/// Payload understood by the agnhost `netexec` UDP server.
pub const HOSTNAME_PAYLOAD: &str = "hostname";

/// Seconds `nc` waits for a reply before giving up.
pub const NC_WAIT_SECS: u32 = 1;

/// A one-shot UDP send/receive against `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpProbe {
    pub host: String,
    pub port: String,
    pub payload: String,
}

impl UdpProbe {
    /// Probe `host:port` with the `hostname` payload.
    pub fn hostname(host: impl Into<String>, port: impl fmt::Display) -> Self {
        Self {
            host: host.into(),
            port: port.to_string(),
            payload: HOSTNAME_PAYLOAD.to_string(),
        }
    }

    /// Replace the payload sent to the server.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Shell command line, suitable for `/bin/sh -c`.
    pub fn shell_command(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UdpProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "echo {} | nc -u -w {} {} {}",
            self.payload, NC_WAIT_SECS, self.host, self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_probe_ipv4() {
        let probe = UdpProbe::hostname("10.96.0.15", 80);
        assert_eq!(
            probe.shell_command(),
            "echo hostname | nc -u -w 1 10.96.0.15 80"
        );
    }

    #[test]
    fn test_hostname_probe_ipv6_is_not_bracketed() {
        // nc takes host and port as separate arguments
        let probe = UdpProbe::hostname("fd00:10:96::a", "30080");
        assert_eq!(
            probe.shell_command(),
            "echo hostname | nc -u -w 1 fd00:10:96::a 30080"
        );
    }

    #[test]
    fn test_custom_payload() {
        let probe = UdpProbe::hostname("10.0.0.1", 53).with_payload("ping");
        assert_eq!(probe.shell_command(), "echo ping | nc -u -w 1 10.0.0.1 53");
    }
}
