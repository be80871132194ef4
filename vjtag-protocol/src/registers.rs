use crate::bits;
use std::fmt::Display;

/// Physical instruction-register opcodes for the Altera virtual JTAG scheme.
/// These are constant across every device supporting virtual JTAG and are
/// not published in the BSDL.
pub const USER0: u64 = 0x0C;
pub const USER1: u64 = 0x0E;

/// JEDEC manufacturer ID expected in hub and node registers on Altera parts.
pub const ALTERA_MANUFACTURER_ID: u16 = 0x06E;

/// SLD node type tags, as assigned by the vendor.
pub const SIGNAL_TAP_NODE_ID: u8 = 0x00;
pub const SERIAL_FLASH_LOADER_NODE_ID: u8 = 0x04;
pub const VJTAG_NODE_ID: u8 = 0x08;
pub const JTAG_TO_AVALON_NODE_ID: u8 = 0x84;

/// Human-readable name of an SLD node type tag, for diagnostics.
pub fn node_type_name(node_id: u8) -> &'static str {
    match node_id {
        VJTAG_NODE_ID => "Virtual JTAG",
        JTAG_TO_AVALON_NODE_ID => "JTAG to Avalon bridge",
        SIGNAL_TAP_NODE_ID => "Signal Tap",
        SERIAL_FLASH_LOADER_NODE_ID => "Serial Flash Loader",
        _ => "unknown",
    }
}

/// The hub IP configuration register, shifted out of the SLD hub as eight
/// 4-bit nibble scans and reassembled into one 32-bit word.
///
/// Layout:
///
/// ```text
///  31          27 | 26       19 | 18            8 | 7             0
/// ----------------+-------------+-----------------+-----------------
///  HUB IP version |  node count |  manufacturer   |  m (VIR value
///                 |             |  ID (0x06E)     |  field width)
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HubConfig {
    /// Version of the hub IP.
    pub hub_ip_version: u8,
    /// Number of SLD nodes attached to the hub, not counting the hub itself.
    pub node_count: u8,
    /// JEDEC manufacturer ID of the hub.
    pub manufacturer_id: u16,
    /// Width in bits of the per-node virtual-IR value field, `m`.
    pub address_data_width: u8,
}

impl HubConfig {
    /// Decode the assembled 32-bit hub configuration word.
    pub fn decode(word: u32) -> HubConfig {
        let raw = word.to_le_bytes();
        HubConfig {
            hub_ip_version: bits::unpack(&raw, 27, 5) as u8,
            node_count: bits::unpack(&raw, 19, 8) as u8,
            manufacturer_id: bits::unpack(&raw, 8, 11) as u16,
            address_data_width: bits::unpack(&raw, 0, 8) as u8,
        }
    }

    /// Total length in bits of a routed virtual-IR scan: the node address
    /// field on top of the `m`-bit VIR value field.
    pub fn vir_length(&self) -> usize {
        bits::address_field_width(self.node_count) as usize + self.address_data_width as usize
    }
}

impl Display for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hub v{}: {} node(s), manufacturer 0x{:03x}, m = {}",
            self.hub_ip_version, self.node_count, self.manufacturer_id, self.address_data_width
        )
    }
}

/// One node's `SLD_NODE_INFO` register, shifted out of the hub with the same
/// eight-nibble sequence as [`HubConfig`], once per attached node.
///
/// Layout:
///
/// ```text
///  31          27 | 26       19 | 18            8 | 7             0
/// ----------------+-------------+-----------------+-----------------
///   node version  |   node ID   |  manufacturer   |   instance ID
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeInfo {
    /// Version of the node IP.
    pub version: u8,
    /// Vendor-assigned node type tag, e.g. [`VJTAG_NODE_ID`].
    pub node_id: u8,
    /// JEDEC manufacturer ID of the node.
    pub manufacturer_id: u16,
    /// Instance number distinguishing multiple nodes of the same type.
    pub instance_id: u8,
}

impl NodeInfo {
    /// Decode the assembled 32-bit node info word.
    pub fn decode(word: u32) -> NodeInfo {
        let raw = word.to_le_bytes();
        NodeInfo {
            version: bits::unpack(&raw, 27, 5) as u8,
            node_id: bits::unpack(&raw, 19, 8) as u8,
            manufacturer_id: bits::unpack(&raw, 8, 11) as u16,
            instance_id: bits::unpack(&raw, 0, 8) as u8,
        }
    }

    /// Human-readable name of this node's type tag.
    pub fn type_name(&self) -> &'static str {
        node_type_name(self.node_id)
    }
}

impl Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (id 0x{:02x}) v{}, manufacturer 0x{:03x}, instance {}",
            self.type_name(),
            self.node_id,
            self.version,
            self.manufacturer_id,
            self.instance_id
        )
    }
}
