//! Common infrastructure for static flow provisioning on an SDN switch.
//!
//! This crate provides the pieces shared by the flow manager daemon and
//! its tests:
//!
//! - [`flow`]: Flow rules, action lists, flow naming and the controller wire format
//! - [`pusher`]: The [`FlowPusher`] transport trait and its REST implementation
//! - [`error`]: Error types for flow provisioning operations
//!
//! # Architecture
//!
//! Flow managers follow this pattern:
//!
//! 1. Resolve the ports of a network from the control plane
//! 2. Match them against the static switch wiring
//! 3. Synthesize the pairwise and broadcast rules for the network
//! 4. Push or delete each rule individually through a [`FlowPusher`]
//!
//! # Example
//!
//! ```ignore
//! use sdn_flow_common::{FlowPusher, StaticFlowClient, FlowMgrResult};
//!
//! async fn install(client: &StaticFlowClient, rules: &[FlowRule]) -> FlowMgrResult<()> {
//!     for rule in rules {
//!         client.push(&rule.to_entry()).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod flow;
pub mod pusher;

// Re-export commonly used items at crate root
pub use error::{FlowMgrError, FlowMgrResult};
pub use flow::{
    broadcast_flow_name, pairwise_flow_name, FlowAction, FlowDeletion, FlowRange, FlowRanges,
    FlowRule, StaticFlowEntry, BROADCAST_MAC, PRIORITY_DEFAULT, PRIORITY_NO_MAC,
};
pub use pusher::{FlowPusher, RestResponse, StaticFlowClient};
