//! FlowMgr - bind/delete orchestration for SR-IOV ports

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use sdn_flow_common::{broadcast_flow_name, FlowMgrResult, FlowPusher, FlowRule};

use crate::config::BindingConfig;
use crate::matcher::match_ports;
use crate::records::{PortRecordSource, PortResolver};
use crate::retire::{disconnect, flows_to_remove};
use crate::segment::{select_segment, vif_vlan, NetworkSegment};
use crate::synth::{connect, synthesize, ConnectReport};
use crate::topology::TopologyStore;
use crate::types::{PortDescriptor, SwitchGroups};

/// A port being bound to a network
#[derive(Debug, Clone, Default)]
pub struct BindRequest {
    pub network_id: String,
    pub port_id: String,
    /// Candidate segments, in preference order; empty to use the bound VLAN
    pub segments: Vec<NetworkSegment>,
    /// Physical network mappings reported by the binding agent
    pub device_mappings: Option<HashMap<String, String>>,
}

impl BindRequest {
    pub fn new(network_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            port_id: port_id.into(),
            ..Default::default()
        }
    }

    pub fn with_segments(mut self, segments: Vec<NetworkSegment>) -> Self {
        self.segments = segments;
        self
    }
}

/// Outcome of a bind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BindOutcome {
    /// The port is not ours to bind; nothing was pushed
    Refused { reason: String },
    /// Flows were synthesized and pushed for the whole network
    Connected(ConnectReport),
}

/// Outcome of a delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Flows of the deleted port removed from the switch
    pub deleted: usize,
    /// Resynthesis over the surviving ports
    pub reconnected: ConnectReport,
}

/// FlowMgr keeps a network's static flows in step with its ports
///
/// Every operation recomputes the network's full flow set from the
/// control-plane records. Operations on different networks are
/// independent; callers must serialize operations on the same network.
pub struct FlowMgr {
    /// Switch wiring, loaded once
    topology: Arc<TopologyStore>,

    /// Controller transport
    pusher: Arc<dyn FlowPusher>,

    /// Control-plane port data
    records: Arc<dyn PortRecordSource>,

    /// VNIC types this manager binds
    binding: BindingConfig,
}

impl FlowMgr {
    /// Creates a new FlowMgr binding direct and macvtap ports
    pub fn new(
        topology: Arc<TopologyStore>,
        pusher: Arc<dyn FlowPusher>,
        records: Arc<dyn PortRecordSource>,
    ) -> Self {
        Self {
            topology,
            pusher,
            records,
            binding: BindingConfig::default(),
        }
    }

    /// Replace the binding configuration
    pub fn with_binding_config(mut self, binding: BindingConfig) -> Self {
        self.binding = binding;
        self
    }

    fn resolver(&self) -> PortResolver<'_> {
        PortResolver::new(self.records.as_ref())
    }

    fn group(&self, ports: &[PortDescriptor]) -> SwitchGroups {
        match_ports(self.topology.switch(), ports)
    }

    /// Working set for binding `request`, with the bound port last
    ///
    /// Returns `Err(reason)` inside `Ok` when the port is refused.
    async fn bind_working_set(&self, request: &BindRequest) -> FlowMgrResult<Result<Vec<PortDescriptor>, String>> {
        let resolver = self.resolver();
        let binding = resolver
            .current_binding(&request.network_id, &request.port_id)
            .await?;

        if !self.binding.supports(&binding.vnic_type) {
            return Ok(Err(format!(
                "unsupported vnic_type '{}'",
                binding.vnic_type
            )));
        }

        let vlan = if request.segments.is_empty() {
            None
        } else {
            let Some(segment) = select_segment(&request.segments, request.device_mappings.as_ref()) else {
                return Ok(Err("no bindable segment".to_string()));
            };
            debug!(
                "Port {} bound on segment {} ({})",
                request.port_id, segment.id, segment.network_type
            );
            vif_vlan(segment)
        };

        let current = resolver.current_port(&binding, vlan).await?;
        let mut ports = resolver
            .network_ports(&request.network_id, &request.port_id)
            .await?;
        ports.push(current);
        Ok(Ok(ports))
    }

    /// Bind a port: resynthesize and push the network's full flow set
    #[instrument(skip(self, request), fields(network = %request.network_id, port = %request.port_id))]
    pub async fn bind_port(&self, request: &BindRequest) -> FlowMgrResult<BindOutcome> {
        let ports = match self.bind_working_set(request).await? {
            Ok(ports) => ports,
            Err(reason) => {
                info!("Refusing to bind port {}: {}", request.port_id, reason);
                return Ok(BindOutcome::Refused { reason });
            }
        };

        let groups = self.group(&ports);
        let report = connect(self.pusher.as_ref(), &groups, &request.network_id).await?;
        Ok(BindOutcome::Connected(report))
    }

    /// Rules a bind would push, without contacting the controller
    pub async fn plan(&self, request: &BindRequest) -> FlowMgrResult<Vec<FlowRule>> {
        match self.bind_working_set(request).await? {
            Ok(ports) => synthesize(&self.group(&ports), &request.network_id),
            Err(reason) => {
                info!("Port {} would not be bound: {}", request.port_id, reason);
                Ok(Vec::new())
            }
        }
    }

    /// Push the flow set of the network's current ports, leaving out `exclude_port_id`
    #[instrument(skip(self))]
    pub async fn connect_network(&self, network_id: &str, exclude_port_id: &str) -> FlowMgrResult<ConnectReport> {
        let ports = self
            .resolver()
            .network_ports(network_id, exclude_port_id)
            .await?;
        let groups = self.group(&ports);
        connect(self.pusher.as_ref(), &groups, network_id).await
    }

    /// Delete a port: retire its flows, then reconnect the survivors
    #[instrument(skip(self))]
    pub async fn delete_port(&self, network_id: &str, port_id: &str) -> FlowMgrResult<DeleteOutcome> {
        let remaining = self
            .resolver()
            .flow_member_ids(network_id, port_id)
            .await?;
        let names = flows_to_remove(port_id, remaining.iter().map(String::as_str), network_id);

        let deleted = disconnect(self.pusher.as_ref(), &names, self.topology.dpid()).await?;

        if remaining.len() == 2 {
            let stale: Vec<String> = remaining
                .iter()
                .map(|id| broadcast_flow_name(network_id, id))
                .collect();
            debug!("Broadcast flows {:?} are left on the switch", stale);
        }

        let reconnected = self.connect_network(network_id, port_id).await.map_err(|e| {
            warn!("Survivors of network {} not reconnected: {}", network_id, e);
            e
        })?;

        info!(
            "Port {} deleted: {} flows removed, {} recreated",
            port_id, deleted, reconnected.created
        );
        Ok(DeleteOutcome {
            deleted,
            reconnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use sdn_flow_common::{FlowDeletion, FlowMgrError, StaticFlowEntry};
    use std::sync::Mutex;

    use crate::records::{NetworkRecords, SnapshotRecords};

    const TOPOLOGY: &str = r#"
switches:
  - switch_dpid: "00:00:00:00:00:00:00:01"
    ports:
      - host_id: compute-1
        phys_function_address: "0000:81:00.0"
        switch_port: 1
      - host_id: compute-2
        phys_function_address: "0000:81:00.0"
        switch_port: 2
      - host_id: compute-3
        phys_function_address: "0000:81:00.0"
        switch_port: 3
"#;

    #[derive(Default)]
    struct MockPusher {
        pushed: Mutex<Vec<StaticFlowEntry>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FlowPusher for MockPusher {
        fn endpoint(&self) -> String {
            "mock".to_string()
        }

        async fn push(&self, entry: &StaticFlowEntry) -> FlowMgrResult<()> {
            self.pushed.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn remove(&self, deletion: &FlowDeletion) -> FlowMgrResult<()> {
            self.removed.lock().unwrap().push(deletion.name.clone());
            Ok(())
        }

        async fn list(&self, _dpid: &str) -> FlowMgrResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn records(vnic_type: &str) -> SnapshotRecords {
        let json = serde_json::json!({
            "ports": [
                {"id": "p1", "mac_address": "fa:16:3e:00:00:01", "device_id": "vm-1", "device_owner": "compute:nova"},
                {"id": "p2", "mac_address": "fa:16:3e:00:00:02", "device_id": "vm-2", "device_owner": "compute:nova"},
                {"id": "p3", "mac_address": "fa:16:3e:00:00:03", "device_id": "vm-3", "device_owner": "compute:nova"}
            ],
            "port_bindings": [
                {"port_id": "p1", "host": "compute-1", "vnic_type": "direct", "vif_type": "hw_veb",
                 "vif_details": {"vlan": "100"}, "profile": {"pci_slot": "0000:81:10.0"}},
                {"port_id": "p2", "host": "compute-2", "vnic_type": "direct", "vif_type": "hw_veb",
                 "vif_details": {"vlan": "200"}, "profile": {"pci_slot": "0000:81:10.2"}},
                {"port_id": "p3", "host": "compute-3", "vnic_type": vnic_type, "vif_type": "hw_veb",
                 "vif_details": {"vlan": "0"}, "profile": {"pci_slot": "0000:81:10.4"}}
            ]
        });
        let network: NetworkRecords = serde_json::from_value(json).unwrap();
        SnapshotRecords::default().with_network("net1", network)
    }

    fn mgr(vnic_type: &str) -> (FlowMgr, Arc<MockPusher>) {
        let pusher = Arc::new(MockPusher::default());
        let mgr = FlowMgr::new(
            Arc::new(TopologyStore::from_yaml_str(TOPOLOGY).unwrap()),
            pusher.clone(),
            Arc::new(records(vnic_type)),
        );
        (mgr, pusher)
    }

    #[tokio::test]
    async fn test_bind_port_pushes_network_flows() {
        let (mgr, pusher) = mgr("direct");

        let outcome = mgr.bind_port(&BindRequest::new("net1", "p3")).await.unwrap();
        let BindOutcome::Connected(report) = outcome else {
            panic!("expected connected outcome");
        };
        assert_eq!(report.created, 9);

        let pushed = pusher.pushed.lock().unwrap();
        assert_eq!(pushed[0].name, "net1-p1-p2");
        // The bound port comes last in the working set.
        assert_eq!(pushed[5].name, "net1-p3-p2");
        assert_eq!(pushed[8].name, "net1-p3-Broadcast");
        assert_eq!(pushed[8].actions, "set-vlan-id=100,output=1,set-vlan-id=200,output=2");
    }

    #[tokio::test]
    async fn test_bind_unsupported_vnic_type_is_refused() {
        let (mgr, pusher) = mgr("normal");

        let outcome = mgr.bind_port(&BindRequest::new("net1", "p3")).await.unwrap();
        assert!(matches!(outcome, BindOutcome::Refused { .. }));
        assert!(pusher.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_binding_config_restricts_vnic_types() {
        let (mgr, pusher) = mgr("direct");
        let mgr = mgr.with_binding_config(BindingConfig {
            supported_vnic_types: vec!["macvtap".to_string()],
        });

        let outcome = mgr.bind_port(&BindRequest::new("net1", "p3")).await.unwrap();
        assert!(matches!(outcome, BindOutcome::Refused { .. }));
        assert!(pusher.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bind_segment_overrides_vlan() {
        let (mgr, _) = mgr("direct");
        let request = BindRequest::new("net1", "p3").with_segments(vec![NetworkSegment {
            id: "seg".to_string(),
            network_type: "vlan".to_string(),
            physical_network: Some("physnet1".to_string()),
            segmentation_id: Some(300),
        }]);

        let rules = mgr.plan(&request).await.unwrap();
        let to_p3 = rules.iter().find(|r| r.name == "net1-p1-p3").unwrap();
        assert_eq!(to_p3.to_entry().actions, "set-vlan-id=300,output=3");
    }

    #[tokio::test]
    async fn test_bind_without_bindable_segment_is_refused() {
        let (mgr, _) = mgr("direct");
        let request = BindRequest::new("net1", "p3").with_segments(vec![NetworkSegment {
            id: "seg".to_string(),
            network_type: "vxlan".to_string(),
            physical_network: None,
            segmentation_id: Some(5000),
        }]);

        let outcome = mgr.bind_port(&request).await.unwrap();
        assert_eq!(
            outcome,
            BindOutcome::Refused {
                reason: "no bindable segment".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_bind_unknown_port() {
        let (mgr, _) = mgr("direct");
        let err = mgr.bind_port(&BindRequest::new("net1", "p9")).await.unwrap_err();
        assert!(matches!(err, FlowMgrError::PortNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_port_retires_and_reconnects() {
        let (mgr, pusher) = mgr("direct");

        let outcome = mgr.delete_port("net1", "p3").await.unwrap();
        assert_eq!(outcome.deleted, 2 * (3 - 1) + 1);
        assert_eq!(
            *pusher.removed.lock().unwrap(),
            vec![
                "net1-p3-p1",
                "net1-p1-p3",
                "net1-p3-p2",
                "net1-p2-p3",
                "net1-p3-Broadcast",
            ]
        );

        // Two survivors: pairwise only.
        assert_eq!(outcome.reconnected.created, 2);
        let pushed = pusher.pushed.lock().unwrap();
        let names: Vec<_> = pushed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["net1-p1-p2", "net1-p2-p1"]);
    }

    #[tokio::test]
    async fn test_delete_to_two_ports_keeps_survivor_broadcasts() {
        let (mgr, pusher) = mgr("direct");

        mgr.delete_port("net1", "p1").await.unwrap();
        let removed = pusher.removed.lock().unwrap();
        assert!(removed.contains(&"net1-p1-Broadcast".to_string()));
        assert!(!removed.contains(&"net1-p2-Broadcast".to_string()));
        assert!(!removed.contains(&"net1-p3-Broadcast".to_string()));
    }
}
