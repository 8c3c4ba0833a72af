//! Type definitions for sriov-flowmgrd

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Highest usable 802.1Q VLAN id
pub const MAX_VLAN_ID: u16 = 4094;

/// VLAN membership of a port
///
/// The control plane encodes "untagged" as `"0"`; it is kept as an explicit
/// variant here so that no VLAN action is ever emitted for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Vlan {
    /// No 802.1Q tag
    #[default]
    Untagged,
    /// Tagged with the given id
    Tagged(u16),
}

impl Vlan {
    /// Returns the VLAN id when tagged
    pub fn id(&self) -> Option<u16> {
        match self {
            Vlan::Untagged => None,
            Vlan::Tagged(id) => Some(*id),
        }
    }

    /// Returns true if the port carries a tag
    pub fn is_tagged(&self) -> bool {
        matches!(self, Vlan::Tagged(_))
    }

    fn from_number(n: u64) -> Result<Self, String> {
        match n {
            0 => Ok(Vlan::Untagged),
            n if n <= u64::from(MAX_VLAN_ID) => Ok(Vlan::Tagged(n as u16)),
            _ => Err(format!("VLAN id {} out of range", n)),
        }
    }

    /// Decodes a VLAN from a JSON payload value
    ///
    /// `null`, `""`, `0` and `"0"` all mean untagged.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::Null => Ok(Vlan::Untagged),
            serde_json::Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| format!("invalid VLAN id {}", n))
                .and_then(Self::from_number),
            serde_json::Value::String(s) => s.parse(),
            other => Err(format!("invalid VLAN value {}", other)),
        }
    }
}

impl FromStr for Vlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Vlan::Untagged);
        }
        let n: u64 = s
            .parse()
            .map_err(|_| format!("invalid VLAN id '{}'", s))?;
        Self::from_number(n)
    }
}

impl fmt::Display for Vlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vlan::Untagged => write!(f, "0"),
            Vlan::Tagged(id) => write!(f, "{}", id),
        }
    }
}

impl From<Vlan> for String {
    fn from(vlan: Vlan) -> Self {
        vlan.to_string()
    }
}

/// Switch-local port identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SwitchPort(String);

impl SwitchPort {
    /// Create a new SwitchPort
    pub fn new(port: impl Into<String>) -> Self {
        Self(port.into())
    }

    /// Returns the port as sent to the controller
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwitchPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SwitchPort {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        string_or_number(deserializer).map(SwitchPort)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

/// Accepts a YAML/JSON scalar written either as a string or as an integer
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Unsigned(n) => n.to_string(),
        Scalar::Signed(n) => n.to_string(),
    })
}

/// Identity payload of an externally attached port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Alias of the switch port the external device is wired to
    pub alias: Option<String>,
    /// Switch the device claims to be attached to
    pub dpid: Option<String>,
    /// MAC address of the external device
    pub mac_address: Option<String>,
}

/// How a port is attached to the switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    /// SR-IOV virtual function on a compute host
    Sriov {
        /// Owning compute node
        host: String,
        /// Derived physical-function bus address
        pf_address: String,
    },
    /// External device identified by alias
    External(ExternalIdentity),
}

/// A connected interface, as resolved from the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Stable port identity
    pub id: String,
    /// MAC address, when known
    pub mac_address: Option<String>,
    /// VLAN membership
    pub vlan: Vlan,
    /// Attachment
    pub kind: PortKind,
}

impl PortDescriptor {
    /// Create a descriptor for an SR-IOV port
    pub fn sriov(
        id: impl Into<String>,
        host: impl Into<String>,
        pf_address: impl Into<String>,
        vlan: Vlan,
    ) -> Self {
        Self {
            id: id.into(),
            mac_address: None,
            vlan,
            kind: PortKind::Sriov {
                host: host.into(),
                pf_address: pf_address.into(),
            },
        }
    }

    /// Create a descriptor for an external port
    pub fn external(id: impl Into<String>, identity: ExternalIdentity, vlan: Vlan) -> Self {
        Self {
            id: id.into(),
            mac_address: identity.mac_address.clone(),
            vlan,
            kind: PortKind::External(identity),
        }
    }

    /// Sets the MAC address
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    /// Returns true for externally attached ports
    pub fn is_external(&self) -> bool {
        matches!(self.kind, PortKind::External(_))
    }
}

/// A port that has been assigned its ingress switch port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiredPort {
    pub id: String,
    pub mac_address: Option<String>,
    pub vlan: Vlan,
    pub ingress_port: SwitchPort,
}

/// Wired ports grouped by switch datapath id
pub type SwitchGroups = BTreeMap<String, Vec<WiredPort>>;
