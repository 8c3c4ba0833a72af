//! sriov-flowmgrd - static flow manager for SR-IOV ports on an SDN switch
//!
//! Keeps the OpenFlow rules of a network in step with its ports: SR-IOV
//! virtual functions and an optional external port are matched against the
//! static switch wiring, and full pairwise plus broadcast connectivity is
//! pushed to the controller's static flow pusher, with VLAN retagging done
//! by the switch.

mod config;
mod flow_mgr;
mod matcher;
mod pci;
mod records;
mod retire;
mod segment;
mod synth;
mod tables;
mod topology;
mod types;

pub use config::*;
pub use flow_mgr::{BindOutcome, BindRequest, DeleteOutcome, FlowMgr};
pub use matcher::match_ports;
pub use pci::physical_function_address;
pub use records::*;
pub use retire::{disconnect, flows_to_remove};
pub use segment::*;
pub use synth::{broadcast_rules, connect, pairwise_rules, synthesize, ConnectReport};
pub use tables::*;
pub use topology::*;
pub use types::*;
