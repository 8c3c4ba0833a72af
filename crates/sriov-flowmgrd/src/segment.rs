//! Network segment selection for port binding

use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::tables::network_types;
use crate::types::{Vlan, MAX_VLAN_ID};

/// A segment of the network a port is being bound to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkSegment {
    /// Segment identity
    pub id: String,
    /// Segment type ("vlan", "flat", ...)
    pub network_type: String,
    #[serde(default)]
    pub physical_network: Option<String>,
    #[serde(default)]
    pub segmentation_id: Option<u32>,
}

/// Check if a segment can be bound
///
/// Only VLAN and flat segments are bindable. When the binding agent
/// reports device mappings, the segment's physical network must be one
/// of them.
pub fn check_segment(segment: &NetworkSegment, device_mappings: Option<&HashMap<String, String>>) -> bool {
    let bindable = matches!(
        segment.network_type.as_str(),
        network_types::VLAN | network_types::FLAT
    );
    if !bindable {
        return false;
    }

    match device_mappings {
        Some(mappings) => {
            debug!(
                "Checking segment {} for mappings {:?}",
                segment.id, mappings
            );
            segment
                .physical_network
                .as_ref()
                .is_some_and(|physnet| mappings.contains_key(physnet))
        }
        None => true,
    }
}

/// VLAN a bound port carries on this segment
///
/// Flat segments are untagged. Returns `None` for segment types that are
/// not bindable or VLAN segments without a usable segmentation id.
pub fn vif_vlan(segment: &NetworkSegment) -> Option<Vlan> {
    match segment.network_type.as_str() {
        network_types::VLAN => segment
            .segmentation_id
            .filter(|id| (1..=u32::from(MAX_VLAN_ID)).contains(id))
            .map(|id| Vlan::Tagged(id as u16)),
        network_types::FLAT => Some(Vlan::Untagged),
        _ => None,
    }
}

/// First bindable segment, in the order given
pub fn select_segment<'a>(
    segments: &'a [NetworkSegment],
    device_mappings: Option<&HashMap<String, String>>,
) -> Option<&'a NetworkSegment> {
    segments
        .iter()
        .find(|segment| check_segment(segment, device_mappings) && vif_vlan(segment).is_some())
}
