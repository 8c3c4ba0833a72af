//! Configuration file support for sriov-flowmgrd
//!
//! Loads and validates the flow manager configuration from TOML files.
//! Default location: [`DEFAULT_CONFIG_FILE`](crate::DEFAULT_CONFIG_FILE)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use sdn_flow_common::pusher::{DEFAULT_CONTROLLER_PORT, STATIC_FLOW_BASE_PATH};
use sdn_flow_common::{FlowMgrError, FlowMgrResult};

use crate::tables::{vnic_types, DEFAULT_SWITCH_CONNECTIONS_FILE};

/// SDN controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller host
    #[serde(default = "default_server")]
    pub server: String,

    /// Controller REST port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Static flow pusher resource path
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

/// Switch wiring configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// YAML file describing the switch and its cabling
    #[serde(default = "default_switch_connections_file_path")]
    pub switch_connections_file_path: String,
}

/// Port binding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// VNIC types the flow manager will bind
    #[serde(default = "default_supported_vnic_types")]
    pub supported_vnic_types: Vec<String>,
}

/// Complete sriov-flowmgrd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMgrConfig {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub topology: TopologyConfig,

    #[serde(default)]
    pub binding: BindingConfig,
}

fn default_server() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_CONTROLLER_PORT
}

fn default_timeout() -> u64 {
    10
}

fn default_base_path() -> String {
    STATIC_FLOW_BASE_PATH.to_string()
}

fn default_switch_connections_file_path() -> String {
    DEFAULT_SWITCH_CONNECTIONS_FILE.to_string()
}

fn default_supported_vnic_types() -> Vec<String> {
    vec![vnic_types::DIRECT.to_string(), vnic_types::MACVTAP.to_string()]
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            timeout_secs: default_timeout(),
            base_path: default_base_path(),
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            switch_connections_file_path: default_switch_connections_file_path(),
        }
    }
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            supported_vnic_types: default_supported_vnic_types(),
        }
    }
}

impl BindingConfig {
    /// Check if a VNIC type is bound by the flow manager
    pub fn supports(&self, vnic_type: &str) -> bool {
        self.supported_vnic_types
            .iter()
            .any(|supported| supported == vnic_type)
    }
}

impl FlowMgrConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> FlowMgrResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                FlowMgrError::config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(FlowMgrError::io(path, e)),
        }
    }

    /// Get the controller request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.controller.timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> FlowMgrResult<()> {
        if self.controller.server.is_empty() {
            return Err(FlowMgrError::config("server must not be empty"));
        }

        if self.controller.port == 0 {
            return Err(FlowMgrError::config("port must be > 0"));
        }

        if self.controller.timeout_secs == 0 {
            return Err(FlowMgrError::config("timeout_secs must be > 0"));
        }

        if !self.controller.base_path.starts_with('/') {
            return Err(FlowMgrError::config("base_path must start with '/'"));
        }

        if self.topology.switch_connections_file_path.is_empty() {
            return Err(FlowMgrError::config(
                "switch_connections_file_path must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FlowMgrConfig::default();
        assert_eq!(config.controller.server, "localhost");
        assert_eq!(config.controller.port, 8800);
        assert_eq!(config.controller.base_path, "/wm/staticflowentrypusher");
        assert_eq!(
            config.topology.switch_connections_file_path,
            DEFAULT_SWITCH_CONNECTIONS_FILE
        );
        assert_eq!(config.binding.supported_vnic_types, vec!["direct", "macvtap"]);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(FlowMgrConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let mut config = FlowMgrConfig::default();
        config.controller.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_timeout() {
        let mut config = FlowMgrConfig::default();
        config.controller.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_server() {
        let mut config = FlowMgrConfig::default();
        config.controller.server.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_relative_base_path() {
        let mut config = FlowMgrConfig::default();
        config.controller.base_path = "wm/staticflowentrypusher".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_duration() {
        assert_eq!(FlowMgrConfig::default().timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_supports_vnic_type() {
        let binding = BindingConfig::default();
        assert!(binding.supports("direct"));
        assert!(binding.supports("macvtap"));
        assert!(!binding.supports("normal"));
        assert!(!binding.supports("direct-physical"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[controller]
server = "10.0.0.5"
port = 8080

[topology]
switch_connections_file_path = "/tmp/switch.yaml"
"#;
        let config: FlowMgrConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.controller.server, "10.0.0.5");
        assert_eq!(config.controller.port, 8080);
        assert_eq!(config.topology.switch_connections_file_path, "/tmp/switch.yaml");
        // Unspecified values should use defaults
        assert_eq!(config.controller.timeout_secs, 10);
        assert_eq!(config.binding.supported_vnic_types, vec!["direct", "macvtap"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[controller]\nserver = \"ctrl\"\ntimeout_secs = 3").unwrap();

        let config = FlowMgrConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.controller.server, "ctrl");
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[controller\nserver = ").unwrap();

        let err = FlowMgrConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, FlowMgrError::Config { .. }));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = FlowMgrConfig::load_or_default("/nonexistent/path.conf").unwrap();
        assert_eq!(config, FlowMgrConfig::default());
    }
}
