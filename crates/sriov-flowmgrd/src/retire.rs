//! Flow retirement for a port leaving its network
//!
//! Flow names are regenerated with the same rule synthesis uses, so no
//! controller lookup is needed to find what to delete.

use tracing::{debug, info, instrument, warn};

use sdn_flow_common::{
    broadcast_flow_name, pairwise_flow_name, FlowDeletion, FlowMgrError, FlowMgrResult,
    FlowPusher, FlowRanges,
};

/// Names of every flow involving `current`
///
/// For each other port on the network, the forward and inverse unicast
/// names, followed by the current port's own broadcast name. The current
/// port is skipped if it still appears among `remaining`.
pub fn flows_to_remove<'a, I>(current: &str, remaining: I, network: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names = Vec::new();
    for other in remaining {
        if other == current {
            continue;
        }
        names.push(pairwise_flow_name(network, current, other));
        names.push(pairwise_flow_name(network, other, current));
    }
    names.push(broadcast_flow_name(network, current));

    debug!("Flows to remove: {:?}", names);
    names
}

/// Delete the named flows from a switch, in order
///
/// Returns the number deleted. Stops at the first failure with
/// [`FlowMgrError::BatchAborted`]; later names are never requested.
#[instrument(skip(pusher, names), fields(count = names.len()))]
pub async fn disconnect(pusher: &dyn FlowPusher, names: &[String], dpid: &str) -> FlowMgrResult<usize> {
    let mut deleted = 0;
    for name in names {
        let deletion = FlowDeletion {
            switch: dpid.to_string(),
            name: name.clone(),
        };
        if let Err(e) = pusher.remove(&deletion).await {
            warn!("Flow {} not deleted after {} deleted: {}", name, deleted, e);
            return Err(FlowMgrError::aborted(deleted, FlowRanges::new(), e));
        }
        deleted += 1;
    }

    info!("{} flows deleted from switch {}", deleted, dpid);
    Ok(deleted)
}
