//! Static switch wiring description
//!
//! The operator describes which host physical function, or which external
//! alias, is cabled to which port of the switch:
//!
//! ```yaml
//! switches:
//!   - switch_dpid: "00:00:00:00:00:00:00:01"
//!     ports:
//!       - host_id: compute-1
//!         phys_function_address: "0000:81:00.0"
//!         switch_port: 1
//!       - host_id: compute-1
//!         phys_function_address: "0000:81:00.1"
//!         mac_address: "fa:16:3e:00:00:01"
//!         switch_port: 2
//!       - alias: uplink
//!         switch_port: 48
//! ```
//!
//! The file is loaded once at startup into an immutable [`TopologyStore`].

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use sdn_flow_common::{FlowMgrError, FlowMgrResult};

use crate::types::{string_or_number, SwitchPort};

/// Switch port wired to a host physical function
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostPortEntry {
    /// Compute host name (matched by substring)
    pub host_id: String,
    /// Physical-function address pattern (matched by substring)
    pub phys_function_address: String,
    /// Static MAC to adopt for ports without one
    #[serde(default)]
    pub mac_address: Option<String>,
    pub switch_port: SwitchPort,
}

/// Switch port wired to an external device known by alias
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasPortEntry {
    pub alias: String,
    pub switch_port: SwitchPort,
}

/// One wired switch port
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SwitchPortEntry {
    /// Keyed by host and physical function
    Host(HostPortEntry),
    /// Keyed by external alias
    Alias(AliasPortEntry),
}

impl SwitchPortEntry {
    /// Switch port this entry is wired to
    pub fn switch_port(&self) -> &SwitchPort {
        match self {
            SwitchPortEntry::Host(entry) => &entry.switch_port,
            SwitchPortEntry::Alias(entry) => &entry.switch_port,
        }
    }
}

/// A switch and its wired ports, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwitchDescriptor {
    /// Datapath identifier
    #[serde(rename = "switch_dpid", deserialize_with = "string_or_number")]
    pub dpid: String,
    #[serde(default)]
    pub ports: Vec<SwitchPortEntry>,
}

#[derive(Debug, Deserialize)]
struct TopologyDocument {
    switches: Vec<SwitchDescriptor>,
}

/// Immutable in-memory wiring of the single managed switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyStore {
    switch: SwitchDescriptor,
}

impl TopologyStore {
    /// Load the wiring description from a YAML file
    pub fn load(path: impl AsRef<Path>) -> FlowMgrResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| FlowMgrError::io(path, e))?;
        let store = Self::from_yaml_str(&content)?;
        info!(
            "Loaded switch connections from {}: switch {} with {} ports",
            path.display(),
            store.dpid(),
            store.switch.ports.len()
        );
        Ok(store)
    }

    /// Parse the wiring description from YAML text
    pub fn from_yaml_str(content: &str) -> FlowMgrResult<Self> {
        let document: TopologyDocument = serde_yaml::from_str(content).map_err(yaml_error)?;

        let mut switches = document.switches.into_iter();
        let switch = switches
            .next()
            .ok_or_else(|| FlowMgrError::config("switch connections declare no switches"))?;

        let ignored = switches.count();
        if ignored > 0 {
            warn!(
                "Only one switch is supported; ignoring {} additional switch(es) after {}",
                ignored, switch.dpid
            );
        }
        if switch.ports.is_empty() {
            warn!("Switch {} declares no wired ports", switch.dpid);
        }
        debug!("Switch wiring: {:?}", switch);

        Ok(Self { switch })
    }

    /// Wrap an already-built switch description
    pub fn from_switch(switch: SwitchDescriptor) -> Self {
        Self { switch }
    }

    /// The managed switch
    pub fn switch(&self) -> &SwitchDescriptor {
        &self.switch
    }

    /// Datapath id of the managed switch
    pub fn dpid(&self) -> &str {
        &self.switch.dpid
    }
}

fn yaml_error(e: serde_yaml::Error) -> FlowMgrError {
    let position = e
        .location()
        .map(|mark| format!(" at position: ({}:{})", mark.line(), mark.column()))
        .unwrap_or_default();
    FlowMgrError::config(format!("Invalid format{}: {}", position, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOPOLOGY: &str = r#"
switches:
  - switch_dpid: "00:00:00:00:00:00:00:01"
    ports:
      - host_id: compute-1
        phys_function_address: "0000:81:00.0"
        switch_port: 1
      - host_id: compute-2
        phys_function_address: "0000:81:00.1"
        mac_address: "fa:16:3e:00:00:02"
        switch_port: "2"
      - alias: uplink
        switch_port: 48
"#;

    #[test]
    fn test_parse_topology() {
        let store = TopologyStore::from_yaml_str(TOPOLOGY).unwrap();
        assert_eq!(store.dpid(), "00:00:00:00:00:00:00:01");

        let ports = &store.switch().ports;
        assert_eq!(ports.len(), 3);
        match &ports[1] {
            SwitchPortEntry::Host(entry) => {
                assert_eq!(entry.host_id, "compute-2");
                assert_eq!(entry.mac_address.as_deref(), Some("fa:16:3e:00:00:02"));
                assert_eq!(entry.switch_port.as_str(), "2");
            }
            other => panic!("Expected host entry, got {:?}", other),
        }
        match &ports[2] {
            SwitchPortEntry::Alias(entry) => assert_eq!(entry.alias, "uplink"),
            other => panic!("Expected alias entry, got {:?}", other),
        }
        assert_eq!(ports[2].switch_port().as_str(), "48");
    }

    #[test]
    fn test_only_first_switch_is_used() {
        let yaml = r#"
switches:
  - switch_dpid: "first"
    ports: []
  - switch_dpid: "second"
    ports: []
"#;
        let store = TopologyStore::from_yaml_str(yaml).unwrap();
        assert_eq!(store.dpid(), "first");
    }

    #[test]
    fn test_no_switches_is_config_error() {
        let err = TopologyStore::from_yaml_str("switches: []").unwrap_err();
        assert!(matches!(err, FlowMgrError::Config { .. }));
    }

    #[test]
    fn test_entry_with_both_shapes_rejected() {
        let yaml = r#"
switches:
  - switch_dpid: "dp"
    ports:
      - host_id: compute-1
        phys_function_address: "0000:81:00.0"
        alias: uplink
        switch_port: 1
"#;
        assert!(TopologyStore::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_malformed_yaml_reports_position() {
        let yaml = "switches:\n  - switch_dpid: [unclosed\n";
        let err = TopologyStore::from_yaml_str(yaml).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Invalid format"));
        assert!(message.contains("at position"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOPOLOGY.as_bytes()).unwrap();

        let store = TopologyStore::load(file.path()).unwrap();
        assert_eq!(store.switch().ports.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TopologyStore::load("/nonexistent/switch_connections.yaml").unwrap_err();
        assert!(matches!(err, FlowMgrError::Io { .. }));
    }
}
