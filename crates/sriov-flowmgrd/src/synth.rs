//! Flow synthesis: full pairwise connectivity plus broadcast fan-out
//!
//! Rule generation is pure; [`connect`] pushes the generated rules one at a
//! time and stops at the first failure. Rules created before the failure
//! stay on the switch.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use sdn_flow_common::{
    broadcast_flow_name, pairwise_flow_name, FlowAction, FlowMgrError, FlowMgrResult,
    FlowPusher, FlowRange, FlowRanges, FlowRule, BROADCAST_MAC, PRIORITY_DEFAULT,
    PRIORITY_NO_MAC,
};

use crate::types::{SwitchGroups, Vlan, WiredPort};

/// Outcome of a successful synthesis pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectReport {
    /// Number of rules created
    pub created: usize,
    /// Created-rule index range per switch
    pub ranges: FlowRanges,
}

fn pairwise_rule(
    dpid: &str,
    network: &str,
    src: &WiredPort,
    dst: &WiredPort,
    group_size: usize,
) -> FlowRule {
    // Two-member groups and MAC-less destinations need no MAC discrimination.
    let (priority, dst_mac) = match &dst.mac_address {
        Some(mac) if group_size != 2 => (PRIORITY_DEFAULT, Some(mac.clone())),
        _ => (PRIORITY_NO_MAC, None),
    };

    let mut actions = Vec::with_capacity(2);
    if let Vlan::Tagged(vlan) = dst.vlan {
        actions.push(FlowAction::SetVlanId(vlan));
    }
    actions.push(FlowAction::Output(dst.ingress_port.to_string()));

    FlowRule {
        switch: dpid.to_string(),
        name: pairwise_flow_name(network, &src.id, &dst.id),
        priority,
        ingress_port: src.ingress_port.to_string(),
        dst_mac,
        vlan_match: src.vlan.id(),
        actions,
    }
}

/// Unicast rules for every ordered pair of distinct ports in a group
pub fn pairwise_rules(dpid: &str, network: &str, ports: &[WiredPort]) -> Vec<FlowRule> {
    let mut rules = Vec::with_capacity(ports.len() * ports.len().saturating_sub(1));
    for (i, src) in ports.iter().enumerate() {
        for (j, dst) in ports.iter().enumerate() {
            if i == j {
                continue;
            }
            rules.push(pairwise_rule(dpid, network, src, dst, ports.len()));
        }
    }
    rules
}

fn broadcast_rule(dpid: &str, network: &str, ports: &[WiredPort], src_index: usize) -> FlowRule {
    let src = &ports[src_index];
    let mut actions = Vec::new();
    let mut last_tag: Option<u16> = None;

    for (j, dst) in ports.iter().enumerate() {
        if j == src_index {
            continue;
        }
        match dst.vlan {
            Vlan::Tagged(vlan) if last_tag != Some(vlan) => {
                actions.push(FlowAction::SetVlanId(vlan));
                last_tag = Some(vlan);
            }
            Vlan::Tagged(_) => {}
            Vlan::Untagged => last_tag = None,
        }
        actions.push(FlowAction::Output(dst.ingress_port.to_string()));
    }

    FlowRule {
        switch: dpid.to_string(),
        name: broadcast_flow_name(network, &src.id),
        priority: PRIORITY_DEFAULT,
        ingress_port: src.ingress_port.to_string(),
        dst_mac: Some(BROADCAST_MAC.to_string()),
        vlan_match: src.vlan.id(),
        actions,
    }
}

/// Broadcast fan-out rules, one per port; empty for groups of two or fewer
pub fn broadcast_rules(dpid: &str, network: &str, ports: &[WiredPort]) -> Vec<FlowRule> {
    if ports.len() <= 2 {
        return Vec::new();
    }
    (0..ports.len())
        .map(|i| broadcast_rule(dpid, network, ports, i))
        .collect()
}

fn ensure_single_switch(groups: &SwitchGroups) -> FlowMgrResult<()> {
    if groups.len() > 1 {
        return Err(FlowMgrError::Topology {
            switches: groups.len(),
        });
    }
    Ok(())
}

/// Every rule the network needs, in push order
pub fn synthesize(groups: &SwitchGroups, network: &str) -> FlowMgrResult<Vec<FlowRule>> {
    ensure_single_switch(groups)?;

    let mut rules = Vec::new();
    for (dpid, ports) in groups {
        rules.extend(pairwise_rules(dpid, network, ports));
        rules.extend(broadcast_rules(dpid, network, ports));
    }
    Ok(rules)
}

/// Synthesize and push every rule of the network
///
/// Aborts at the first rejected push with [`FlowMgrError::BatchAborted`],
/// carrying the number of rules created so far and the switch ranges.
#[instrument(skip(pusher, groups), fields(endpoint = %pusher.endpoint()))]
pub async fn connect(
    pusher: &dyn FlowPusher,
    groups: &SwitchGroups,
    network: &str,
) -> FlowMgrResult<ConnectReport> {
    ensure_single_switch(groups)?;

    let mut report = ConnectReport::default();
    for (dpid, ports) in groups {
        let start = report.created;
        report.ranges.insert(
            dpid.clone(),
            FlowRange {
                start,
                end: start,
            },
        );

        let rules = pairwise_rules(dpid, network, ports)
            .into_iter()
            .chain(broadcast_rules(dpid, network, ports));

        for rule in rules {
            debug!(flow = %rule.name, switch = %dpid, "Creating flow");
            if let Err(e) = pusher.push(&rule.to_entry()).await {
                warn!(
                    "Flow {} rejected after {} created: {}",
                    rule.name, report.created, e
                );
                return Err(FlowMgrError::aborted(report.created, report.ranges, e));
            }
            report.created += 1;
            if let Some(range) = report.ranges.get_mut(dpid) {
                range.end = report.created;
            }
        }
    }

    info!(
        "Created {} flows for network {}, ranges {:?}",
        report.created, network, report.ranges
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SwitchPort;
    use pretty_assertions::assert_eq;

    const DPID: &str = "00:00:00:00:00:00:00:01";

    fn port(id: &str, vlan: Vlan, mac: Option<&str>, ingress: &str) -> WiredPort {
        WiredPort {
            id: id.to_string(),
            mac_address: mac.map(str::to_string),
            vlan,
            ingress_port: SwitchPort::new(ingress),
        }
    }

    fn names(rules: &[FlowRule]) -> Vec<&str> {
        rules.iter().map(|r| r.name.as_str()).collect()
    }

    fn out(port: &str) -> FlowAction {
        FlowAction::Output(port.to_string())
    }

    #[test]
    fn test_two_port_group() {
        let ports = vec![
            port("A", Vlan::Tagged(10), None, "1"),
            port("B", Vlan::Untagged, Some("aa:bb"), "2"),
        ];

        let pairwise = pairwise_rules(DPID, "net", &ports);
        assert_eq!(names(&pairwise), vec!["net-A-B", "net-B-A"]);
        assert!(pairwise.iter().all(|r| r.priority == PRIORITY_NO_MAC));
        assert!(pairwise.iter().all(|r| r.dst_mac.is_none()));
        assert!(broadcast_rules(DPID, "net", &ports).is_empty());

        // A is tagged: match its VLAN; B is untagged: no rewrite.
        assert_eq!(pairwise[0].vlan_match, Some(10));
        assert_eq!(pairwise[0].ingress_port, "1");
        assert_eq!(pairwise[0].actions, vec![out("2")]);

        // B is untagged: no match; A is tagged: rewrite to A's VLAN.
        assert_eq!(pairwise[1].vlan_match, None);
        assert_eq!(pairwise[1].actions, vec![FlowAction::SetVlanId(10), out("1")]);
    }

    #[test]
    fn test_three_port_group_names() {
        let ports = vec![
            port("p1", Vlan::Untagged, Some("00:00:00:00:00:01"), "1"),
            port("p2", Vlan::Untagged, Some("00:00:00:00:00:02"), "2"),
            port("p3", Vlan::Untagged, Some("00:00:00:00:00:03"), "3"),
        ];
        let groups = SwitchGroups::from([(DPID.to_string(), ports)]);

        let rules = synthesize(&groups, "net1").unwrap();
        assert_eq!(
            names(&rules),
            vec![
                "net1-p1-p2",
                "net1-p1-p3",
                "net1-p2-p1",
                "net1-p2-p3",
                "net1-p3-p1",
                "net1-p3-p2",
                "net1-p1-Broadcast",
                "net1-p2-Broadcast",
                "net1-p3-Broadcast",
            ]
        );
    }

    #[test]
    fn test_mac_match_in_larger_groups() {
        let ports = vec![
            port("a", Vlan::Untagged, Some("00:00:00:00:00:0a"), "1"),
            port("b", Vlan::Untagged, None, "2"),
            port("c", Vlan::Untagged, Some("00:00:00:00:00:0c"), "3"),
        ];
        let rules = pairwise_rules(DPID, "n", &ports);

        let a_to_b = rules.iter().find(|r| r.name == "n-a-b").unwrap();
        assert_eq!(a_to_b.priority, PRIORITY_NO_MAC);
        assert_eq!(a_to_b.dst_mac, None);

        let a_to_c = rules.iter().find(|r| r.name == "n-a-c").unwrap();
        assert_eq!(a_to_c.priority, PRIORITY_DEFAULT);
        assert_eq!(a_to_c.dst_mac.as_deref(), Some("00:00:00:00:00:0c"));
    }

    #[test]
    fn test_broadcast_vlan_tracking() {
        let ports = vec![
            port("src", Vlan::Tagged(5), None, "1"),
            port("b", Vlan::Tagged(10), None, "2"),
            port("c", Vlan::Tagged(10), None, "3"),
            port("d", Vlan::Untagged, None, "4"),
            port("e", Vlan::Tagged(10), None, "5"),
            port("f", Vlan::Tagged(20), None, "6"),
        ];
        let rules = broadcast_rules(DPID, "n", &ports);
        assert_eq!(rules.len(), 6);

        let first = &rules[0];
        assert_eq!(first.name, "n-src-Broadcast");
        assert_eq!(first.dst_mac.as_deref(), Some(BROADCAST_MAC));
        assert_eq!(first.priority, PRIORITY_DEFAULT);
        assert_eq!(first.vlan_match, Some(5));
        assert_eq!(
            first.to_entry().actions,
            "set-vlan-id=10,output=2,output=3,output=4,set-vlan-id=10,output=5,set-vlan-id=20,output=6"
        );
    }

    #[test]
    fn test_broadcast_untagged_members() {
        let ports = vec![
            port("a", Vlan::Untagged, None, "1"),
            port("b", Vlan::Untagged, None, "2"),
            port("c", Vlan::Untagged, None, "3"),
        ];
        let rules = broadcast_rules(DPID, "n", &ports);
        assert_eq!(rules[1].to_entry().actions, "output=1,output=3");
        assert_eq!(rules[1].vlan_match, None);
    }

    #[test]
    fn test_multiple_switches_rejected() {
        let groups = SwitchGroups::from([
            ("dp1".to_string(), vec![port("a", Vlan::Untagged, None, "1")]),
            ("dp2".to_string(), vec![port("b", Vlan::Untagged, None, "1")]),
        ]);
        let err = synthesize(&groups, "n").unwrap_err();
        assert!(matches!(err, FlowMgrError::Topology { switches: 2 }));
    }

    #[test]
    fn test_single_port_group_has_no_rules() {
        let groups = SwitchGroups::from([(
            DPID.to_string(),
            vec![port("a", Vlan::Tagged(7), None, "1")],
        )]);
        assert!(synthesize(&groups, "n").unwrap().is_empty());
    }
}
