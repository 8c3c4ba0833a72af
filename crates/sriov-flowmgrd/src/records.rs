//! Control-plane port records and their resolution into port descriptors
//!
//! The control plane keeps ports and port bindings as loosely typed
//! records whose interesting parts are JSON text payloads. Everything is
//! decoded and validated here, before it reaches matching and synthesis.
//!
//! Resolution rules:
//!
//! - A binding contributes an SR-IOV port when its VNIC type is direct and
//!   it has been bound. Its VLAN comes from the vif details and its
//!   physical function from the PCI slot in the binding profile.
//! - A port whose device id decodes to a JSON identity carrying an alias,
//!   VLAN or dpid is external. Only the first one on a network is used.
//! - A neighbour with a malformed payload is dropped with a warning; the
//!   port being bound fails the bind instead.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use sdn_flow_common::{FlowMgrError, FlowMgrResult};

use crate::pci::physical_function_address;
use crate::tables::{fields, vnic_types, VIF_TYPE_UNBOUND};
use crate::types::{ExternalIdentity, PortDescriptor, Vlan};

fn default_admin_state_up() -> bool {
    true
}

/// Accepts a payload stored either as JSON text or as an inline JSON value
fn json_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// A port as stored by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Instance id, or a JSON identity for external ports
    #[serde(default, deserialize_with = "json_text")]
    pub device_id: String,
    #[serde(default)]
    pub device_owner: Option<String>,
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
}

/// A port binding as stored by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortBindingRecord {
    pub port_id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub vnic_type: String,
    #[serde(default)]
    pub vif_type: String,
    /// JSON object carrying the bound VLAN
    #[serde(default, deserialize_with = "json_text")]
    pub vif_details: String,
    /// JSON object carrying the virtual function's PCI slot
    #[serde(default, deserialize_with = "json_text")]
    pub profile: String,
}

impl PortBindingRecord {
    /// Returns true for bound SR-IOV direct bindings
    pub fn is_bound_direct(&self) -> bool {
        self.vnic_type.contains(vnic_types::DIRECT) && !self.vif_type.contains(VIF_TYPE_UNBOUND)
    }
}

/// Read access to the control plane's port data
#[async_trait]
pub trait PortRecordSource: Send + Sync {
    /// Bindings of the network's administratively up ports
    async fn port_bindings(&self, network_id: &str) -> FlowMgrResult<Vec<PortBindingRecord>>;

    /// The network's administratively up ports that have an owner
    async fn ports(&self, network_id: &str) -> FlowMgrResult<Vec<PortRecord>>;

    /// A single port, looked up by id or unique id prefix
    async fn port(&self, port_id: &str) -> FlowMgrResult<Option<PortRecord>>;
}

fn parse_object(payload: &str, what: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("{} is not a JSON object: {}", what, other)),
        Err(e) => Err(format!("{} is not valid JSON: {}", what, e)),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}

fn optional_string(map: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("'{}' has unexpected value {}", key, other)),
    }
}

/// Decode an external port identity from a device id
///
/// Returns `Ok(None)` when the device id is not an external identity at
/// all (ordinary instance ids are not JSON), and an error when it is one
/// but cannot be decoded.
pub fn decode_external_identity(device_id: &str) -> Result<Option<(ExternalIdentity, Vlan)>, String> {
    let map = match serde_json::from_str::<Value>(device_id) {
        Ok(Value::Object(map)) => map,
        _ => return Ok(None),
    };

    let external = truthy(map.get(fields::ALIAS))
        || truthy(map.get(fields::VLAN))
        || truthy(map.get(fields::DPID));
    if !external {
        return Ok(None);
    }

    let vlan = Vlan::from_json(map.get(fields::VLAN).unwrap_or(&Value::Null))?;
    let identity = ExternalIdentity {
        alias: optional_string(&map, fields::ALIAS)?,
        dpid: optional_string(&map, fields::DPID)?,
        mac_address: optional_string(&map, fields::MAC_ADDRESS)?,
    };
    Ok(Some((identity, vlan)))
}

/// Decode the bound VLAN from a binding's vif details
pub fn decode_vif_vlan(vif_details: &str) -> Result<Vlan, String> {
    let map = parse_object(vif_details, "vif_details")?;
    let vlan = map
        .get(fields::VLAN)
        .ok_or_else(|| format!("vif_details has no '{}'", fields::VLAN))?;
    Vlan::from_json(vlan)
}

/// Decode the virtual function's PCI slot from a binding profile
pub fn decode_pci_slot(profile: &str) -> Result<String, String> {
    let map = parse_object(profile, "profile")?;
    match map.get(fields::PCI_SLOT) {
        Some(Value::String(slot)) if !slot.is_empty() => Ok(slot.clone()),
        Some(other) => Err(format!("profile has invalid '{}': {}", fields::PCI_SLOT, other)),
        None => Err(format!("profile has no '{}'", fields::PCI_SLOT)),
    }
}

/// Build the descriptor of an SR-IOV port from its binding
///
/// `vlan` overrides the VLAN stored in the vif details.
pub fn describe_binding(
    binding: &PortBindingRecord,
    mac_address: Option<String>,
    vlan: Option<Vlan>,
) -> FlowMgrResult<PortDescriptor> {
    let malformed = |message: String| FlowMgrError::malformed(&binding.port_id, message);

    let vlan = match vlan {
        Some(vlan) => vlan,
        None => decode_vif_vlan(&binding.vif_details).map_err(malformed)?,
    };
    let pci_slot = decode_pci_slot(&binding.profile).map_err(malformed)?;
    let pf_address = physical_function_address(&pci_slot)
        .ok_or_else(|| malformed(format!("invalid PCI slot '{}'", pci_slot)))?;

    Ok(PortDescriptor {
        id: binding.port_id.clone(),
        mac_address,
        vlan,
        kind: crate::types::PortKind::Sriov {
            host: binding.host.clone(),
            pf_address,
        },
    })
}

/// Resolves control-plane records into port descriptors
pub struct PortResolver<'a> {
    source: &'a dyn PortRecordSource,
}

impl<'a> PortResolver<'a> {
    /// Create a resolver over a record source
    pub fn new(source: &'a dyn PortRecordSource) -> Self {
        Self { source }
    }

    /// The network's external port, if any
    pub async fn external_port(&self, network_id: &str, exclude_port_id: &str) -> FlowMgrResult<Option<PortDescriptor>> {
        for port in self.source.ports(network_id).await? {
            if port.id == exclude_port_id {
                continue;
            }
            match decode_external_identity(&port.device_id) {
                Ok(Some((identity, vlan))) => {
                    debug!("External port on network {}: {}", network_id, port.id);
                    return Ok(Some(PortDescriptor::external(port.id, identity, vlan)));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Dropping external port {}: {}", port.id, e);
                }
            }
        }
        Ok(None)
    }

    /// The network's bound SR-IOV ports other than `exclude_port_id`
    pub async fn sriov_ports(&self, network_id: &str, exclude_port_id: &str) -> FlowMgrResult<Vec<PortDescriptor>> {
        let mut ports = Vec::new();

        for binding in self.source.port_bindings(network_id).await? {
            if binding.port_id == exclude_port_id || !binding.is_bound_direct() {
                continue;
            }

            let Some(record) = self.source.port(&binding.port_id).await? else {
                warn!("Binding for unknown port {}, skipping", binding.port_id);
                continue;
            };

            match describe_binding(&binding, record.mac_address, None) {
                Ok(port) => ports.push(port),
                Err(e) => warn!("Dropping port: {}", e),
            }
        }

        debug!(
            "SR-IOV ports on network {}: {:?}",
            network_id,
            ports.iter().map(|p| p.id.as_str()).collect::<Vec<_>>()
        );
        Ok(ports)
    }

    /// Working set of the network without `exclude_port_id`: the external
    /// port first, then SR-IOV ports in record order
    ///
    /// Ids are unique; an external port that also has a direct binding is
    /// only taken as external.
    pub async fn network_ports(&self, network_id: &str, exclude_port_id: &str) -> FlowMgrResult<Vec<PortDescriptor>> {
        let mut ports = Vec::new();
        if let Some(external) = self.external_port(network_id, exclude_port_id).await? {
            ports.push(external);
        }

        for port in self.sriov_ports(network_id, exclude_port_id).await? {
            if ports.iter().any(|known| known.id == port.id) {
                debug!("Port {} already in the working set, skipping", port.id);
                continue;
            }
            ports.push(port);
        }
        Ok(ports)
    }

    /// Binding of the port being bound
    pub async fn current_binding(&self, network_id: &str, port_id: &str) -> FlowMgrResult<PortBindingRecord> {
        self.source
            .port_bindings(network_id)
            .await?
            .into_iter()
            .find(|binding| binding.port_id == port_id)
            .ok_or_else(|| FlowMgrError::port_not_found(port_id))
    }

    /// Descriptor of the port being bound; any decoding failure fails the bind
    pub async fn current_port(&self, binding: &PortBindingRecord, vlan: Option<Vlan>) -> FlowMgrResult<PortDescriptor> {
        let record = self
            .source
            .port(&binding.port_id)
            .await?
            .ok_or_else(|| FlowMgrError::port_not_found(&binding.port_id))?;
        describe_binding(binding, record.mac_address, vlan)
    }

    /// Ids of every port on the network that can take part in flows,
    /// excluding `exclude_port_id`
    ///
    /// Payloads are not decoded, so ports whose records have since gone bad
    /// still get their flows retired.
    pub async fn flow_member_ids(&self, network_id: &str, exclude_port_id: &str) -> FlowMgrResult<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();

        for port in self.source.ports(network_id).await? {
            if !matches!(decode_external_identity(&port.device_id), Ok(None)) {
                ids.push(port.id);
                break;
            }
        }
        for binding in self.source.port_bindings(network_id).await? {
            if binding.is_bound_direct() {
                ids.push(binding.port_id);
            }
        }

        let mut seen = HashSet::new();
        ids.retain(|id| id != exclude_port_id && seen.insert(id.clone()));
        Ok(ids)
    }
}

/// Port records of one network
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkRecords {
    #[serde(default)]
    pub ports: Vec<PortRecord>,
    #[serde(default)]
    pub port_bindings: Vec<PortBindingRecord>,
}

/// Record source backed by a JSON snapshot of the control plane
///
/// ```json
/// {
///   "networks": {
///     "net1": {
///       "ports": [{"id": "p1", "mac_address": "fa:16:3e:00:00:01", "device_owner": "compute:nova"}],
///       "port_bindings": [{"port_id": "p1", "host": "compute-1", "vnic_type": "direct",
///                          "vif_type": "hw_veb", "vif_details": {"vlan": "100"},
///                          "profile": {"pci_slot": "0000:81:10.1"}}]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotRecords {
    #[serde(default)]
    networks: BTreeMap<String, NetworkRecords>,
}

impl SnapshotRecords {
    /// Load a snapshot from a JSON file
    pub fn load(path: impl AsRef<Path>) -> FlowMgrResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| FlowMgrError::io(path, e))?;
        Self::from_json_str(&content).map_err(|e| match e {
            FlowMgrError::Config { message } => {
                FlowMgrError::config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Parse a snapshot from JSON text
    pub fn from_json_str(content: &str) -> FlowMgrResult<Self> {
        serde_json::from_str(content).map_err(|e| {
            FlowMgrError::config(format!(
                "Invalid port records at position: ({}:{}): {}",
                e.line(),
                e.column(),
                e
            ))
        })
    }

    /// Add or replace a network's records
    pub fn with_network(mut self, network_id: impl Into<String>, records: NetworkRecords) -> Self {
        self.networks.insert(network_id.into(), records);
        self
    }

    fn network(&self, network_id: &str) -> Option<&NetworkRecords> {
        self.networks.get(network_id)
    }
}

#[async_trait]
impl PortRecordSource for SnapshotRecords {
    async fn port_bindings(&self, network_id: &str) -> FlowMgrResult<Vec<PortBindingRecord>> {
        let Some(network) = self.network(network_id) else {
            return Ok(Vec::new());
        };
        Ok(network
            .port_bindings
            .iter()
            .filter(|binding| {
                network
                    .ports
                    .iter()
                    .any(|port| port.id == binding.port_id && port.admin_state_up)
            })
            .cloned()
            .collect())
    }

    async fn ports(&self, network_id: &str) -> FlowMgrResult<Vec<PortRecord>> {
        let Some(network) = self.network(network_id) else {
            return Ok(Vec::new());
        };
        Ok(network
            .ports
            .iter()
            .filter(|port| port.admin_state_up && port.device_owner.is_some())
            .cloned()
            .collect())
    }

    async fn port(&self, port_id: &str) -> FlowMgrResult<Option<PortRecord>> {
        let all = || self.networks.values().flat_map(|network| network.ports.iter());

        if let Some(port) = all().find(|port| port.id == port_id) {
            return Ok(Some(port.clone()));
        }

        let mut matches = all().filter(|port| port.id.starts_with(port_id));
        match (matches.next(), matches.next()) {
            (Some(port), None) => Ok(Some(port.clone())),
            (Some(_), Some(_)) => {
                warn!("Port id prefix {} is ambiguous", port_id);
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}
