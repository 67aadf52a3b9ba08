use crate::config::{Config, DualStackMode};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file '{}'", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file '{}'", config_path.display()))?;

    info!(
        "Configuration declares {} subnet(s) and {} allocation(s)",
        config.subnets.len(),
        config.allocations.len()
    );

    config.validate()?;

    Ok(config)
}

/// CLI arguments that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub dual_stack_mode: Option<DualStackMode>,
}

/// Apply CLI overrides to a loaded configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    if let Some(level) = &overrides.log_level {
        info!("Overriding log level with {}", level);
        config.general.log_level = Some(level.clone());
    }

    if let Some(mode) = overrides.dual_stack_mode {
        info!("Overriding dual-stack mode with {:?}", mode);
        config.general.dual_stack_mode = mode;
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
general:
  log_level: debug
subnets:
  - name: ovn-default
    cidr: 10.16.0.0/16,fd00:10:16::/64
    exclude_ips: ["10.16.0.1", "fd00:10:16::1"]
    ip_pools:
      - name: pool-a
        ips: ["10.16.1.0/24"]
allocations:
  - pod: default/nginx
    subnet: ovn-default
    pool: pool-a
  - pod: default/db
    nic: db.default
    subnet: ovn-default
    ip: 10.16.0.10
"#;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();
        temp_file
    }

    #[test]
    fn test_load_config() {
        let temp_file = write_config(YAML);
        let config = load_config(temp_file.path()).unwrap();

        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.subnets.len(), 1);
        assert_eq!(config.subnets[0].ip_pools[0].name, "pool-a");
        assert_eq!(config.allocations[1].nic_name(), "db.default");
        assert_eq!(config.allocations[1].ip.as_deref(), Some("10.16.0.10"));
    }

    #[test]
    fn test_load_config_errors() {
        let missing = Path::new("/nonexistent/kube-ipam.yaml");
        let err = load_config(missing).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));

        let temp_file = write_config("subnets: [");
        let err = load_config(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));

        let temp_file = write_config("subnets:\n  - name: a\n    cidr: 10.0.0.0/40\n");
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let temp_file = write_config(YAML);
        let mut config = load_config(temp_file.path()).unwrap();

        let overrides = CliOverrides {
            log_level: Some("warn".to_string()),
            dual_stack_mode: Some(DualStackMode::Eui64),
        };
        apply_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("warn"));
        assert_eq!(config.options().dual_stack_mode, DualStackMode::Eui64);

        let bad = CliOverrides {
            log_level: Some("chatty".to_string()),
            ..Default::default()
        };
        assert!(apply_overrides(&mut config, &bad).is_err());
    }
}
