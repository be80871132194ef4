use crate::error::DiscoveryError;
use crate::{RISCV_DTMCS, ScanChain, Tap};
use vjtag_protocol::{
    ALTERA_MANUFACTURER_ID, HubConfig, NodeInfo, USER0, USER1, VJTAG_NODE_ID, bits,
};

/// Width of the first, blind virtual-IR shift addressing the hub. `m` and
/// `n` are unknown at that point; 64 zero bits cover the most conservative
/// case for `m + n` and must not be narrowed.
const HUB_SELECT_BITS: usize = 64;

/// Every hub register is shifted out as this many 4-bit nibble scans.
const NIBBLES_PER_WORD: usize = 8;

/// Result of a successful discovery run: the hub dimensions plus the address
/// of the Virtual JTAG node behind it.
///
/// Produced by [`VirtualJtag::discover`] and consumed by every later
/// [`VirtualJtag::route_to_node`] call; a re-run of discovery replaces it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Discovery {
    /// Number of SLD nodes enumerated behind the hub.
    pub node_count: u8,
    /// Width in bits of the per-node virtual-IR value field, `m`.
    pub address_data_width: u8,
    /// Address of the Virtual JTAG node: its 1-based position in the hub's
    /// enumeration order. Address 0 is the hub itself.
    pub vjtag_node_address: u8,
}

impl Discovery {
    /// Width in bits of the node address field, `n`.
    pub fn address_field_width(&self) -> u32 {
        bits::address_field_width(self.node_count)
    }

    /// Total length in bits of a routed virtual-IR scan, `n + m`.
    pub fn vir_length(&self) -> usize {
        self.address_field_width() as usize + self.address_data_width as usize
    }
}

/// Discovery and addressing engine for one Virtual JTAG endpoint.
///
/// Generic over the physical [`ScanChain`] engine that executes the shifts.
#[derive(Debug)]
pub struct VirtualJtag<C: ScanChain> {
    chain: C,
    discovery: Option<Discovery>,
}

impl<C: ScanChain> VirtualJtag<C> {
    pub fn new(chain: C) -> VirtualJtag<C> {
        VirtualJtag {
            chain,
            discovery: None,
        }
    }

    /// The result of the last successful [`discover`](Self::discover) run,
    /// if any.
    pub fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    /// Release the underlying scan chain.
    pub fn into_chain(self) -> C {
        self.chain
    }

    /// Enumerate the SLD hub and locate the Virtual JTAG node.
    ///
    /// Runs the full protocol: TAP reset, hub selection through `USER1`, a
    /// nibble-wise read of the hub configuration register, enumeration of
    /// every node info register, and finally a routed scan to the RISC-V
    /// DTMCS selector as a connectivity check. The result is published only
    /// once all of that succeeded; until then any previous discovery is
    /// invalidated.
    pub fn discover(&mut self, tap: &Tap) -> Result<&Discovery, DiscoveryError> {
        log::debug!(
            "initialising Altera Virtual JTAG discovery (ir_length = {})",
            tap.ir_length
        );
        self.discovery = None;

        self.chain.reset_tap();

        // USER1 targets the virtual IR: the DR scans that follow carry an
        // address field selecting the hub or one of its nodes.
        self.shift_opcode(tap, USER1);

        // Address the hub. Its address and its HUB_INFO instruction are both
        // zero, so a run of zeros selects it regardless of the still-unknown
        // register dimensions.
        let zeros = [0u8; HUB_SELECT_BITS / 8];
        self.chain.shift_data(HUB_SELECT_BITS, Some(&zeros), None);

        // USER0 exposes the hub's virtual DR for the nibble scans below.
        self.shift_opcode(tap, USER0);

        self.execute("hub selection")?;

        let word = self.shift_register_word("hub configuration register")?;
        let hub = HubConfig::decode(word);
        log::debug!("hub configuration register (raw 0x{:08x})", word);
        log::debug!("  m_width         = {}", hub.address_data_width);
        log::debug!("  manufacturer_id = 0x{:03x}", hub.manufacturer_id);
        log::debug!("  node_count      = {}", hub.node_count);
        log::debug!("  version         = {}", hub.hub_ip_version);
        log::debug!("  VIR length      = {}", hub.vir_length());
        if hub.manufacturer_id != ALTERA_MANUFACTURER_ID {
            log::warn!(
                "unexpected hub manufacturer ID 0x{:03x} (raw register 0x{:08x})",
                hub.manufacturer_id,
                word
            );
        }

        // The node info registers continue on the same virtual DR stream.
        // The order in which they shift out assigns each node its address,
        // starting at 1 for the first node.
        let mut vjtag_node_address = None;
        for address in 1..=hub.node_count {
            let word = self.shift_register_word("node info register")?;
            let node = NodeInfo::decode(word);
            log::debug!("node {}: {} (raw 0x{:08x})", address, node, word);
            if node.node_id == VJTAG_NODE_ID && vjtag_node_address.is_none() {
                vjtag_node_address = Some(address);
                if node.manufacturer_id != ALTERA_MANUFACTURER_ID {
                    log::warn!(
                        "Virtual JTAG node has unexpected manufacturer ID 0x{:03x}",
                        node.manufacturer_id
                    );
                }
            }
        }

        let Some(vjtag_node_address) = vjtag_node_address else {
            log::error!(
                "no Virtual JTAG instance found behind the hub ({} node(s) scanned)",
                hub.node_count
            );
            return Err(DiscoveryError::NoVjtagFound {
                nodes_scanned: hub.node_count,
            });
        };
        log::debug!("Virtual JTAG node at address {}", vjtag_node_address);

        let discovery = Discovery {
            node_count: hub.node_count,
            address_data_width: hub.address_data_width,
            vjtag_node_address,
        };

        // Hand off to the debug transport: route one scan to its
        // control/status register before publishing the result.
        self.vir_scan(tap, &discovery, RISCV_DTMCS)?;

        Ok(self.discovery.insert(discovery))
    }

    /// Build and execute a virtual-IR scan addressed to the previously
    /// discovered Virtual JTAG node.
    ///
    /// `vir_value` is opaque to this crate; it selects a register inside the
    /// node, for example [`RISCV_DMI`](crate::RISCV_DMI). Requires a prior
    /// successful [`discover`](Self::discover) and fails fast with
    /// [`DiscoveryError::NotDiscovered`], issuing no shifts, otherwise.
    pub fn route_to_node(&mut self, tap: &Tap, vir_value: u32) -> Result<(), DiscoveryError> {
        let Some(discovery) = self.discovery else {
            return Err(DiscoveryError::NotDiscovered);
        };
        self.vir_scan(tap, &discovery, vir_value)
    }

    /// Shift `(node address << m) | vir_value` through the `n + m`-bit
    /// virtual IR, then expose the node's virtual DR.
    fn vir_scan(
        &mut self,
        tap: &Tap,
        discovery: &Discovery,
        vir_value: u32,
    ) -> Result<(), DiscoveryError> {
        self.shift_opcode(tap, USER1);

        // One DR shift both selects the node through the address bits on top
        // and presents the desired VIR value in the low m bits. The two
        // fields are packed separately so a large m cannot overflow an
        // intermediate shift.
        let m = discovery.address_data_width as usize;
        let n = discovery.address_field_width() as usize;
        let mut dr = vec![0u8; (n + m).div_ceil(8)];
        bits::pack(&mut dr, 0, m, u64::from(vir_value));
        bits::pack(&mut dr, m, n, u64::from(discovery.vjtag_node_address));
        self.chain.shift_data(n + m, Some(&dr), None);

        self.shift_opcode(tap, USER0);

        self.execute("virtual IR scan")
    }

    /// Queue a physical IR scan carrying `opcode`.
    fn shift_opcode(&mut self, tap: &Tap, opcode: u64) {
        let mut ir = [0u8; 8];
        bits::pack(&mut ir, 0, tap.ir_length, opcode);
        self.chain.shift_instruction(tap, tap.ir_length, &ir);
    }

    /// Shift one 32-bit hub register out as eight serialized 4-bit scans.
    ///
    /// Each nibble must pass through the update-DR state before the next
    /// scan starts, so every scan is executed individually. The first nibble
    /// received lands in the top four bits and is shifted down by each
    /// successive one, reassembling the word with the first nibble as its
    /// least significant.
    fn shift_register_word(&mut self, stage: &'static str) -> Result<u32, DiscoveryError> {
        let mut word: u32 = 0;
        for _ in 0..NIBBLES_PER_WORD {
            let mut nibble = [0u8; 1];
            self.chain.shift_data(4, None, Some(&mut nibble));
            self.execute(stage)?;
            word = (word >> 4) | (u32::from(nibble[0] & 0xF) << 28);
        }
        Ok(word)
    }

    fn execute(&mut self, stage: &'static str) -> Result<(), DiscoveryError> {
        self.chain
            .execute_queue()
            .map_err(|source| DiscoveryError::Transport { stage, source })
    }
}

#[cfg(test)]
mod test {
    use super::{Discovery, VirtualJtag};
    use crate::error::{DiscoveryError, TransportError};
    use crate::{RISCV_DTMCS, ScanChain, Tap};
    use vjtag_protocol::bits;

    const IR_LENGTH: usize = 10;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Op {
        Reset,
        Ir { num_bits: usize, value: u64 },
        Dr { num_bits: usize, out: Option<u64> },
        Execute,
    }

    /// Scripted scan chain: serves queued nibble responses for capture scans
    /// and records every operation. `fail_at_execute` makes the n-th call to
    /// `execute_queue` report a transport failure.
    #[derive(Default)]
    struct MockChain {
        ops: Vec<Op>,
        nibbles: Vec<u8>,
        executes: usize,
        fail_at_execute: Option<usize>,
    }

    impl MockChain {
        /// Serve `word` as the next register read, nibble by nibble in the
        /// order the shift-down reassembly expects (least significant
        /// nibble first on the wire).
        fn feed_word(&mut self, word: u32) {
            for i in 0..8 {
                self.nibbles.push(((word >> (4 * i)) & 0xF) as u8);
            }
        }

        fn dr_scans(&self, num_bits: usize) -> Vec<&Op> {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Dr { num_bits: b, .. } if *b == num_bits))
                .collect()
        }
    }

    impl ScanChain for MockChain {
        fn reset_tap(&mut self) {
            self.ops.push(Op::Reset);
        }

        fn shift_instruction(&mut self, _tap: &Tap, num_bits: usize, value: &[u8]) {
            self.ops.push(Op::Ir {
                num_bits,
                value: bits::unpack(value, 0, num_bits),
            });
        }

        fn shift_data(&mut self, num_bits: usize, out: Option<&[u8]>, capture: Option<&mut [u8]>) {
            if let Some(capture) = capture {
                capture[0] = if self.nibbles.is_empty() {
                    0
                } else {
                    self.nibbles.remove(0)
                };
            }
            self.ops.push(Op::Dr {
                num_bits,
                out: out.map(|o| bits::unpack(o, 0, num_bits.min(64))),
            });
        }

        fn execute_queue(&mut self) -> Result<(), TransportError> {
            self.executes += 1;
            if self.fail_at_execute == Some(self.executes) {
                return Err(TransportError::new("injected failure"));
            }
            self.ops.push(Op::Execute);
            Ok(())
        }
    }

    fn hub_word(node_count: u8, m: u8) -> u32 {
        (u32::from(node_count) << 19) | (0x06E << 8) | u32::from(m)
    }

    fn node_word(node_id: u8, instance_id: u8) -> u32 {
        (u32::from(node_id) << 19) | (0x06E << 8) | u32::from(instance_id)
    }

    #[test]
    fn discover_decodes_topology() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut chain = MockChain::default();
        chain.feed_word(hub_word(3, 16));
        chain.feed_word(node_word(0x00, 0));
        chain.feed_word(node_word(0x08, 0));
        chain.feed_word(node_word(0x04, 0));

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        let discovery = *vjtag.discover(&tap).unwrap();

        assert_eq!(
            discovery,
            Discovery {
                node_count: 3,
                address_data_width: 16,
                vjtag_node_address: 2,
            }
        );
        assert_eq!(discovery.address_field_width(), 2);
        assert_eq!(discovery.vir_length(), 18);
        assert_eq!(vjtag.discovery(), Some(&discovery));

        // Hub selection: reset, USER1, 64 zero bits, USER0, one execution.
        assert_eq!(
            chain.ops[..5],
            [
                Op::Reset,
                Op::Ir {
                    num_bits: IR_LENGTH,
                    value: 0x0E
                },
                Op::Dr {
                    num_bits: 64,
                    out: Some(0)
                },
                Op::Ir {
                    num_bits: IR_LENGTH,
                    value: 0x0C
                },
                Op::Execute,
            ]
        );

        // Four register words, eight serialized nibble scans each.
        assert_eq!(chain.dr_scans(4).len(), 32);

        // The hand-off scan routes DTMCS to node address 2.
        assert_eq!(
            chain.dr_scans(18),
            [&Op::Dr {
                num_bits: 18,
                out: Some((2 << 16) | u64::from(RISCV_DTMCS)),
            }]
        );
    }

    #[test]
    fn nibble_reassembly_matches_field_positions() {
        // Feeding nibbles such that bits [26:19] = 2 and bits [7:0] = 16
        // must decode to two nodes and a 16-bit value field.
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(2, 16));
        chain.feed_word(node_word(0x08, 0));
        chain.feed_word(node_word(0x00, 0));

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        let discovery = vjtag.discover(&tap).unwrap();
        assert_eq!(discovery.node_count, 2);
        assert_eq!(discovery.address_data_width, 16);
        assert_eq!(discovery.vjtag_node_address, 1);
    }

    #[test]
    fn first_matching_node_wins() {
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(3, 8));
        chain.feed_word(node_word(0x08, 0));
        chain.feed_word(node_word(0x08, 1));
        chain.feed_word(node_word(0x08, 2));

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        assert_eq!(vjtag.discover(&tap).unwrap().vjtag_node_address, 1);
    }

    #[test]
    fn no_vjtag_node_fails_without_publishing() {
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(2, 16));
        chain.feed_word(node_word(0x00, 0));
        chain.feed_word(node_word(0x04, 0));

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        match vjtag.discover(&tap) {
            Err(DiscoveryError::NoVjtagFound { nodes_scanned }) => assert_eq!(nodes_scanned, 2),
            other => panic!("expected NoVjtagFound, got {:?}", other.map(|d| *d)),
        }
        assert_eq!(vjtag.discovery(), None);
    }

    #[test]
    fn empty_hub_fails() {
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(0, 16));

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        match vjtag.discover(&tap) {
            Err(DiscoveryError::NoVjtagFound { nodes_scanned }) => assert_eq!(nodes_scanned, 0),
            other => panic!("expected NoVjtagFound, got {:?}", other.map(|d| *d)),
        }
        // Only the hub configuration register was shifted.
        assert_eq!(chain.dr_scans(4).len(), 8);
    }

    #[test]
    fn route_before_discovery_issues_no_shifts() {
        let mut chain = MockChain::default();
        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        match vjtag.route_to_node(&tap, 0x11) {
            Err(DiscoveryError::NotDiscovered) => {}
            other => panic!("expected NotDiscovered, got {:?}", other),
        }
        drop(vjtag);
        assert!(chain.ops.is_empty());
    }

    #[test]
    fn route_encodes_address_and_vir_value() {
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(3, 16));
        chain.feed_word(node_word(0x00, 0));
        chain.feed_word(node_word(0x08, 0));
        chain.feed_word(node_word(0x04, 0));

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        vjtag.discover(&tap).unwrap();
        vjtag.route_to_node(&tap, 0x11).unwrap();
        drop(vjtag);

        let last = &chain.ops[chain.ops.len() - 4..];
        assert_eq!(
            last,
            [
                Op::Ir {
                    num_bits: IR_LENGTH,
                    value: 0x0E
                },
                Op::Dr {
                    num_bits: 18,
                    out: Some((2 << 16) | 0x11),
                },
                Op::Ir {
                    num_bits: IR_LENGTH,
                    value: 0x0C
                },
                Op::Execute,
            ]
        );
    }

    #[test]
    fn transport_failure_during_hub_selection() {
        let mut chain = MockChain::default();
        chain.fail_at_execute = Some(1);

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        match vjtag.discover(&tap) {
            Err(DiscoveryError::Transport { stage, .. }) => assert_eq!(stage, "hub selection"),
            other => panic!("expected Transport, got {:?}", other.map(|d| *d)),
        }
        assert_eq!(vjtag.discovery(), None);
        drop(vjtag);
        // No nibble scan was issued past the failure.
        assert!(chain.dr_scans(4).is_empty());
    }

    #[test]
    fn transport_failure_stops_nibble_stream() {
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(2, 16));
        chain.feed_word(node_word(0x08, 0));
        // Execution 1 is hub selection; executions 2..=9 are hub config
        // nibbles; 10 is the first node info nibble.
        chain.fail_at_execute = Some(10);

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        match vjtag.discover(&tap) {
            Err(DiscoveryError::Transport { stage, .. }) => {
                assert_eq!(stage, "node info register")
            }
            other => panic!("expected Transport, got {:?}", other.map(|d| *d)),
        }
        drop(vjtag);
        // Eight hub nibbles plus the one that failed.
        assert_eq!(chain.dr_scans(4).len(), 9);
    }

    #[test]
    fn transport_failure_during_routing() {
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(1, 16));
        chain.feed_word(node_word(0x08, 0));
        // Executions: 1 hub selection, 2..=9 hub config nibbles, 10..=17
        // node info nibbles, 18 the DTMCS hand-off scan.
        chain.fail_at_execute = Some(18);

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        match vjtag.discover(&tap) {
            Err(DiscoveryError::Transport { stage, .. }) => assert_eq!(stage, "virtual IR scan"),
            other => panic!("expected Transport, got {:?}", other.map(|d| *d)),
        }
        // The self-check failed, so the result was never published.
        assert_eq!(vjtag.discovery(), None);
    }

    #[test]
    fn rediscovery_replaces_previous_result() {
        let mut chain = MockChain::default();
        chain.feed_word(hub_word(1, 16));
        chain.feed_word(node_word(0x08, 0));

        let tap = Tap::new(IR_LENGTH);
        let mut vjtag = VirtualJtag::new(&mut chain);
        assert_eq!(vjtag.discover(&tap).unwrap().vjtag_node_address, 1);

        // Second run sees a bigger topology.
        vjtag.chain.feed_word(hub_word(2, 8));
        vjtag.chain.feed_word(node_word(0x00, 0));
        vjtag.chain.feed_word(node_word(0x08, 0));
        let second = *vjtag.discover(&tap).unwrap();
        assert_eq!(second.node_count, 2);
        assert_eq!(second.address_data_width, 8);
        assert_eq!(second.vjtag_node_address, 2);
    }
}
