//! Static flow model and controller wire format.
//!
//! Flow names are the only handle the controller keeps for a flow, so the
//! naming helpers here are shared by rule synthesis and retirement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Priority of MAC-discriminated unicast and broadcast rules.
pub const PRIORITY_DEFAULT: u16 = 1000;

/// Priority of unicast rules that do not match on destination MAC.
pub const PRIORITY_NO_MAC: u16 = 990;

/// Destination MAC matched by broadcast fan-out rules.
pub const BROADCAST_MAC: &str = "ff:ff:ff:ff:ff:ff";

/// Suffix of broadcast flow names.
pub const BROADCAST_SUFFIX: &str = "Broadcast";

/// Name of the unicast flow carrying traffic from `src` to `dst`.
pub fn pairwise_flow_name(network: &str, src: &str, dst: &str) -> String {
    format!("{}-{}-{}", network, src, dst)
}

/// Name of the broadcast fan-out flow entered from `src`.
pub fn broadcast_flow_name(network: &str, src: &str) -> String {
    format!("{}-{}-{}", network, src, BROADCAST_SUFFIX)
}

/// A single primitive in a flow's action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum FlowAction {
    /// Rewrite the VLAN tag.
    SetVlanId(u16),
    /// Send out of a switch port.
    Output(String),
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::SetVlanId(vlan) => write!(f, "set-vlan-id={}", vlan),
            FlowAction::Output(port) => write!(f, "output={}", port),
        }
    }
}

impl From<FlowAction> for String {
    fn from(action: FlowAction) -> Self {
        action.to_string()
    }
}

/// Comma-joins an action list, without a trailing separator.
pub fn join_actions(actions: &[FlowAction]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// A static forwarding rule to install on one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRule {
    /// Datapath identifier of the switch.
    pub switch: String,
    /// Flow name, also the deletion key.
    pub name: String,
    pub priority: u16,
    /// Switch port the traffic enters on.
    pub ingress_port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_match: Option<u16>,
    /// Ordered actions: VLAN rewrites interleaved with outputs.
    pub actions: Vec<FlowAction>,
}

impl FlowRule {
    /// Builds the controller body used to create this rule.
    pub fn to_entry(&self) -> StaticFlowEntry {
        StaticFlowEntry {
            switch: self.switch.clone(),
            name: self.name.clone(),
            priority: self.priority.to_string(),
            ingress_port: self.ingress_port.clone(),
            dst_mac: self.dst_mac.clone(),
            vlan_id: self.vlan_match.map(|vlan| vlan.to_string()),
            active: "true".to_string(),
            actions: join_actions(&self.actions),
        }
    }
}

/// JSON body of a static flow entry creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticFlowEntry {
    pub switch: String,
    pub name: String,
    pub priority: String,
    #[serde(rename = "ingress-port")]
    pub ingress_port: String,
    #[serde(rename = "dst-mac", default, skip_serializing_if = "Option::is_none")]
    pub dst_mac: Option<String>,
    #[serde(rename = "vlan-id", default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<String>,
    pub active: String,
    pub actions: String,
}

/// JSON body of a static flow entry deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDeletion {
    pub switch: String,
    pub name: String,
}

/// Contiguous index range of flows created on one switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowRange {
    pub start: usize,
    pub end: usize,
}

/// Created-flow ranges keyed by switch datapath identifier.
pub type FlowRanges = BTreeMap<String, FlowRange>;
