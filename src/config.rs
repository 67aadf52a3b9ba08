use crate::utils::ip_utils::parse_cidrs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How the IPv6 address of a dual-stack allocation relates to the IPv4 one
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DualStackMode {
    /// Each family takes its lowest free address
    #[default]
    Independent,
    /// The IPv6 address is derived from the MAC (prefix + modified EUI-64)
    Eui64,
}

/// Runtime knobs of the allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpamOptions {
    pub dual_stack_mode: DualStackMode,
}

/// Top-level configuration structure that mirrors the YAML configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub subnets: Vec<SubnetConfig>,
    /// Allocations replayed in order after the subnets are created
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocations: Vec<AllocationConfig>,
}

/// General settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GeneralConfig {
    /// Log filter used when RUST_LOG is not set (error, warn, info, debug, trace, off)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub dual_stack_mode: DualStackMode,
}

/// One logical subnet
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubnetConfig {
    pub name: String,
    /// `v4`, `v6` or `v4,v6` CIDR
    pub cidr: String,
    /// Single addresses or `a..b` ranges never handed out by random allocation
    #[serde(default)]
    pub exclude_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_pools: Vec<IpPoolConfig>,
}

/// Named partition of a subnet
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IpPoolConfig {
    pub name: String,
    pub ips: Vec<String>,
}

/// One address request
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AllocationConfig {
    pub pod: String,
    /// Defaults to the pod name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nic: Option<String>,
    pub subnet: String,
    #[serde(default)]
    pub pool: String,
    /// Static address(es); random allocation when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default)]
    pub skip: Vec<String>,
    #[serde(default = "default_dual_stack")]
    pub dual_stack: bool,
    #[serde(default)]
    pub force: bool,
}

fn default_dual_stack() -> bool {
    true
}

impl AllocationConfig {
    pub fn nic_name(&self) -> &str {
        self.nic.as_deref().unwrap_or(&self.pod)
    }
}

const LOG_LEVELS: [&str; 6] = ["error", "warn", "info", "debug", "trace", "off"];

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(level) = &self.general.log_level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(ValidationError::InvalidGeneral(format!(
                    "unknown log_level {:?}, expected one of {}",
                    level,
                    LOG_LEVELS.join(", ")
                )));
            }
        }

        let mut subnet_names = HashSet::new();
        for subnet in &self.subnets {
            Self::validate_subnet(subnet)?;
            if !subnet_names.insert(subnet.name.as_str()) {
                return Err(ValidationError::InvalidSubnet(format!(
                    "subnet {} is declared more than once",
                    subnet.name
                )));
            }
        }

        for (i, allocation) in self.allocations.iter().enumerate() {
            if allocation.pod.is_empty() {
                return Err(ValidationError::InvalidAllocation(format!(
                    "allocation #{} has an empty pod name",
                    i
                )));
            }
            if !subnet_names.contains(allocation.subnet.as_str()) {
                return Err(ValidationError::InvalidAllocation(format!(
                    "allocation for pod {} refers to unknown subnet {}",
                    allocation.pod, allocation.subnet
                )));
            }
        }

        Ok(())
    }

    fn validate_subnet(subnet: &SubnetConfig) -> Result<(), ValidationError> {
        if subnet.name.is_empty() {
            return Err(ValidationError::InvalidSubnet(
                "subnet name cannot be empty".to_string(),
            ));
        }
        parse_cidrs(&subnet.cidr).map_err(|e| {
            ValidationError::InvalidSubnet(format!("subnet {}: {}", subnet.name, e))
        })?;

        let mut pool_names = HashSet::new();
        for pool in &subnet.ip_pools {
            if pool.name.is_empty() {
                return Err(ValidationError::InvalidSubnet(format!(
                    "subnet {} has an ippool without a name",
                    subnet.name
                )));
            }
            if !pool_names.insert(pool.name.as_str()) {
                return Err(ValidationError::InvalidSubnet(format!(
                    "subnet {} declares ippool {} more than once",
                    subnet.name, pool.name
                )));
            }
        }
        Ok(())
    }

    pub fn options(&self) -> IpamOptions {
        IpamOptions {
            dual_stack_mode: self.general.dual_stack_mode,
        }
    }
}

/// Validation errors for configuration
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid subnet configuration: {0}")]
    InvalidSubnet(String),
    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(
            r#"
subnets:
  - name: ovn-default
    cidr: 10.16.0.0/16
allocations:
  - pod: default/nginx
    subnet: ovn-default
"#,
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.options(), IpamOptions::default());
        assert!(config.subnets[0].exclude_ips.is_empty());

        let allocation = &config.allocations[0];
        assert_eq!(allocation.nic_name(), "default/nginx");
        assert!(allocation.dual_stack);
        assert!(!allocation.force);
        assert!(allocation.pool.is_empty());
    }

    #[test]
    fn test_dual_stack_mode() {
        let config = parse(
            r#"
general:
  dual_stack_mode: eui64
subnets: []
"#,
        );
        assert_eq!(config.options().dual_stack_mode, DualStackMode::Eui64);
    }

    #[test]
    fn test_rejects_bad_subnets() {
        let config = parse(
            r#"
subnets:
  - name: a
    cidr: 10.16.0.0/33
"#,
        );
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSubnet(_))));

        let config = parse(
            r#"
subnets:
  - name: a
    cidr: 10.16.0.0/16
  - name: a
    cidr: 10.17.0.0/16
"#,
        );
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSubnet(_))));

        let config = parse(
            r#"
subnets:
  - name: a
    cidr: 10.16.0.0/16
    ip_pools:
      - name: p
        ips: [10.16.1.0/24]
      - name: p
        ips: [10.16.2.0/24]
"#,
        );
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSubnet(_))));
    }

    #[test]
    fn test_rejects_unknown_subnet_and_log_level() {
        let config = parse(
            r#"
subnets:
  - name: a
    cidr: 10.16.0.0/16
allocations:
  - pod: p1
    subnet: b
"#,
        );
        assert!(matches!(config.validate(), Err(ValidationError::InvalidAllocation(_))));

        let config = parse(
            r#"
general:
  log_level: loud
subnets: []
"#,
        );
        assert!(matches!(config.validate(), Err(ValidationError::InvalidGeneral(_))));
    }
}
