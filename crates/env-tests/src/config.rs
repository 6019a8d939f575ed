//! Environment configuration for the segmentation suite.
//!
//! The suite runs against clusters brought up by the OVN-Kubernetes kind
//! scripts, which export the gateway mode, interconnect and IP family
//! settings as environment variables.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default agnhost image for client and backend pods.
pub const DEFAULT_AGNHOST_IMAGE: &str = "registry.k8s.io/e2e-test-images/agnhost:2.53";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid boolean for {var}: {value:?}")]
    InvalidBool { var: String, value: String },

    #[error("Invalid gateway mode: {0:?} (expected \"shared\" or \"local\")")]
    InvalidGatewayMode(String),

    #[error("Neither IPv4 nor IPv6 is enabled (KIND_IPV4_SUPPORT / KIND_IPV6_SUPPORT)")]
    NoIpFamily,
}

/// OVN gateway mode of the cluster under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    #[default]
    Shared,
    Local,
}

impl FromStr for GatewayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "local" => Ok(Self::Local),
            _ => Err(ConfigError::InvalidGatewayMode(s.to_string())),
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// IP families enabled in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpFamilies {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl IpFamilies {
    pub fn is_dual_stack(&self) -> bool {
        self.ipv4 && self.ipv6
    }
}

#[derive(Debug, Clone)]
pub struct E2eConfig {
    pub kubectl: String,
    pub ovn_namespace: String,
    pub gateway_mode: GatewayMode,
    pub interconnect: bool,
    pub ip_families: IpFamilies,
    pub agnhost_image: String,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            ovn_namespace: "ovn-kubernetes".to_string(),
            gateway_mode: GatewayMode::Shared,
            interconnect: false,
            ip_families: IpFamilies {
                ipv4: true,
                ipv6: false,
            },
            agnhost_image: DEFAULT_AGNHOST_IMAGE.to_string(),
        }
    }
}

impl E2eConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let kubectl = vars.get("KUBECTL").cloned().unwrap_or(defaults.kubectl);

        let ovn_namespace = vars
            .get("OVN_NAMESPACE")
            .cloned()
            .unwrap_or(defaults.ovn_namespace);

        let gateway_mode = match vars.get("OVN_GATEWAY_MODE") {
            Some(value) => value.parse()?,
            None => defaults.gateway_mode,
        };

        let interconnect = parse_bool(vars, "OVN_ENABLE_INTERCONNECT", defaults.interconnect)?;

        let ip_families = IpFamilies {
            ipv4: parse_bool(vars, "KIND_IPV4_SUPPORT", defaults.ip_families.ipv4)?,
            ipv6: parse_bool(vars, "KIND_IPV6_SUPPORT", defaults.ip_families.ipv6)?,
        };
        if !ip_families.ipv4 && !ip_families.ipv6 {
            return Err(ConfigError::NoIpFamily);
        }

        let agnhost_image = vars
            .get("AGNHOST_IMAGE")
            .cloned()
            .unwrap_or(defaults.agnhost_image);

        Ok(Self {
            kubectl,
            ovn_namespace,
            gateway_mode,
            interconnect,
            ip_families,
            agnhost_image,
        })
    }

    pub fn is_gateway_mode_local(&self) -> bool {
        self.gateway_mode == GatewayMode::Local
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    var: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = vars.get(var) else {
        return Ok(default);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var: var.to_string(),
            value: value.clone(),
        }),
    }
}
