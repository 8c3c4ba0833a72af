//! Control-plane record constants for sriov-flowmgrd

/// Default path of the static switch wiring description
pub const DEFAULT_SWITCH_CONNECTIONS_FILE: &str =
    "/etc/neutron/plugins/ml2/ml2_tef_switch_connections.yaml";

/// Default path of the daemon configuration file
pub const DEFAULT_CONFIG_FILE: &str = "/etc/neutron/plugins/ml2/ml2_tef_flowmgrd.conf";

/// Network segment types
pub mod network_types {
    /// 802.1Q tagged segment
    pub const VLAN: &str = "vlan";

    /// Untagged segment
    pub const FLAT: &str = "flat";
}

/// VNIC types of port bindings
pub mod vnic_types {
    /// SR-IOV direct-attached virtual function
    pub const DIRECT: &str = "direct";

    /// macvtap over a virtual function
    pub const MACVTAP: &str = "macvtap";

    /// Ordinary virtio port
    pub const NORMAL: &str = "normal";
}

/// VIF type of a binding that has not been bound yet
pub const VIF_TYPE_UNBOUND: &str = "unbound";

/// Field names inside JSON payloads carried by port records
pub mod fields {
    /// VLAN in vif_details and device identity
    pub const VLAN: &str = "vlan";

    /// PCI slot of the virtual function in the binding profile
    pub const PCI_SLOT: &str = "pci_slot";

    /// Switch port alias in device identity
    pub const ALIAS: &str = "alias";

    /// Switch datapath id in device identity
    pub const DPID: &str = "dpid";

    /// MAC address in device identity
    pub const MAC_ADDRESS: &str = "mac_address";
}
