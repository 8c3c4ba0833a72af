//! Topology matching: assigns each port the switch port it is cabled to

use tracing::{debug, warn};

use crate::topology::{SwitchDescriptor, SwitchPortEntry};
use crate::types::{ExternalIdentity, PortDescriptor, PortKind, SwitchGroups, WiredPort};

/// Result of scanning the wiring for one port
#[derive(Debug, Clone, PartialEq, Eq)]
struct PortMatch<'a> {
    entry: &'a SwitchPortEntry,
    adopted_mac: Option<&'a str>,
}

/// Finds the first wiring entry that matches `port`, in declaration order.
fn find_entry<'a>(switch: &'a SwitchDescriptor, port: &'a PortDescriptor) -> Option<PortMatch<'a>> {
    switch.ports.iter().find_map(|entry| match (&port.kind, entry) {
        (PortKind::External(identity), SwitchPortEntry::Alias(alias_entry)) => {
            let alias = identity.alias.as_deref()?;
            (alias == alias_entry.alias).then(|| PortMatch {
                entry,
                adopted_mac: identity.mac_address.as_deref(),
            })
        }
        (PortKind::Sriov { host, pf_address }, SwitchPortEntry::Host(host_entry)) => {
            if host.is_empty() || pf_address.is_empty() {
                return None;
            }
            let matched = host_entry.phys_function_address.contains(pf_address.as_str())
                && host_entry.host_id.contains(host.as_str());
            matched.then(|| PortMatch {
                entry,
                adopted_mac: host_entry.mac_address.as_deref(),
            })
        }
        _ => None,
    })
}

/// Match ports against the switch wiring and group them by switch
///
/// Ports are scanned in the order given and each port takes the first
/// matching entry. A port that matches no entry is not cabled to the switch
/// and is left out of the result. Only the single configured switch is
/// ever used as the grouping key.
pub fn match_ports(switch: &SwitchDescriptor, ports: &[PortDescriptor]) -> SwitchGroups {
    let mut groups = SwitchGroups::new();

    for port in ports {
        let Some(found) = find_entry(switch, port) else {
            warn!(
                "Port {} is not wired to switch {}, skipping",
                port.id, switch.dpid
            );
            continue;
        };

        if let PortKind::External(ExternalIdentity {
            dpid: Some(claimed), ..
        }) = &port.kind
        {
            if *claimed != switch.dpid {
                warn!(
                    "External port {} claims switch {}, grouping under {}",
                    port.id, claimed, switch.dpid
                );
            }
        }

        let mac_address = port
            .mac_address
            .clone()
            .or_else(|| found.adopted_mac.map(str::to_string));

        let wired = WiredPort {
            id: port.id.clone(),
            mac_address,
            vlan: port.vlan,
            ingress_port: found.entry.switch_port().clone(),
        };
        debug!(
            "Port {} enters switch {} on port {}",
            wired.id, switch.dpid, wired.ingress_port
        );

        groups.entry(switch.dpid.clone()).or_default().push(wired);
    }

    groups
}
