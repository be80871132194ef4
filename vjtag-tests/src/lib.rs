//! Test support for the virtual JTAG workspace: a behavioral simulation of
//! an Altera SLD hub sitting behind a physical TAP.
//!
//! [`SimulatedSldHub`] implements the `ScanChain` seam the discovery engine
//! drives. It applies queued instruction and data scans when the queue
//! executes, serves the hub configuration and node info registers as 4-bit
//! nibble scans while `USER0` is committed, records every virtual-IR write
//! made under `USER1`, and can fail a chosen queue execution to exercise
//! transport-error paths. Scan serialization is asserted: a nibble scan
//! queued before the previous one executed is a protocol bug in the caller.

use vjtag_discovery::{ScanChain, Tap, TransportError};
use vjtag_protocol::{ALTERA_MANUFACTURER_ID, USER0, USER1, bits};

/// One simulated SLD node, as reported by its `SLD_NODE_INFO` register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SldNode {
    pub node_id: u8,
    pub instance_id: u8,
    pub version: u8,
    pub manufacturer_id: u16,
}

impl SldNode {
    pub fn new(node_id: u8, instance_id: u8) -> SldNode {
        SldNode {
            node_id,
            instance_id,
            version: 1,
            manufacturer_id: ALTERA_MANUFACTURER_ID,
        }
    }

    fn info_word(&self) -> u32 {
        let mut raw = [0u8; 4];
        bits::pack(&mut raw, 27, 5, u64::from(self.version));
        bits::pack(&mut raw, 19, 8, u64::from(self.node_id));
        bits::pack(&mut raw, 8, 11, u64::from(self.manufacturer_id));
        bits::pack(&mut raw, 0, 8, u64::from(self.instance_id));
        u32::from_le_bytes(raw)
    }
}

enum Queued {
    Reset,
    Instruction(u64),
    DataWrite { num_bits: usize, value: u64 },
}

/// Simulated SLD hub and scan-chain engine in one.
pub struct SimulatedSldHub {
    nodes: Vec<SldNode>,
    address_data_width: u8,
    /// Committed physical instruction, valid after the queue executed.
    ir: Option<u64>,
    pending: Vec<Queued>,
    unexecuted_captures: usize,
    /// Remaining nibbles of the hub config / node info stream.
    stream: Vec<u8>,
    stream_pos: usize,
    vir_writes: Vec<(usize, u64)>,
    resets: usize,
    executions: usize,
    fail_at_execution: Option<usize>,
}

impl SimulatedSldHub {
    pub fn new(address_data_width: u8, nodes: Vec<SldNode>) -> SimulatedSldHub {
        SimulatedSldHub {
            nodes,
            address_data_width,
            ir: None,
            pending: Vec::new(),
            unexecuted_captures: 0,
            stream: Vec::new(),
            stream_pos: 0,
            vir_writes: Vec::new(),
            resets: 0,
            executions: 0,
            fail_at_execution: None,
        }
    }

    /// Make the n-th call to `execute_queue` (1-based) fail.
    pub fn fail_at_execution(&mut self, n: usize) {
        self.fail_at_execution = Some(n);
    }

    /// Every virtual-IR write observed under `USER1`, as
    /// `(bit width, value)` pairs in shift order.
    pub fn vir_writes(&self) -> &[(usize, u64)] {
        &self.vir_writes
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    fn hub_config_word(&self) -> u32 {
        let mut raw = [0u8; 4];
        bits::pack(&mut raw, 27, 5, 1);
        bits::pack(&mut raw, 19, 8, self.nodes.len() as u64);
        bits::pack(&mut raw, 8, 11, u64::from(ALTERA_MANUFACTURER_ID));
        bits::pack(&mut raw, 0, 8, u64::from(self.address_data_width));
        u32::from_le_bytes(raw)
    }

    /// Selecting the hub (address 0) rewinds the info stream: hub config
    /// word first, then one info word per node in enumeration order. Nibbles
    /// stream least significant first.
    fn arm_info_stream(&mut self) {
        let words: Vec<u32> = std::iter::once(self.hub_config_word())
            .chain(self.nodes.iter().map(SldNode::info_word))
            .collect();
        log::debug!("hub selected, rewinding info stream ({} words)", words.len());
        self.stream.clear();
        self.stream_pos = 0;
        for word in words {
            for i in 0..8 {
                self.stream.push(((word >> (4 * i)) & 0xF) as u8);
            }
        }
    }

    fn next_nibble(&mut self) -> u8 {
        let nibble = self.stream.get(self.stream_pos).copied().unwrap_or(0);
        self.stream_pos += 1;
        nibble
    }
}

impl ScanChain for SimulatedSldHub {
    fn reset_tap(&mut self) {
        self.pending.push(Queued::Reset);
    }

    fn shift_instruction(&mut self, _tap: &Tap, num_bits: usize, value: &[u8]) {
        self.pending
            .push(Queued::Instruction(bits::unpack(value, 0, num_bits)));
    }

    fn shift_data(&mut self, num_bits: usize, out: Option<&[u8]>, capture: Option<&mut [u8]>) {
        if let Some(capture) = capture {
            // Nibble reads depend on the previous scan having passed
            // update-DR, so the queue must be drained between them.
            assert!(
                self.pending.is_empty() && self.unexecuted_captures == 0,
                "capture scan queued behind unexecuted scans"
            );
            assert_eq!(self.ir, Some(USER0), "capture scan without USER0 committed");
            assert_eq!(num_bits, 4, "hub registers stream in 4-bit scans");
            capture[0] = self.next_nibble();
            self.unexecuted_captures += 1;
            return;
        }
        let value = out.map_or(0, |o| bits::unpack(o, 0, num_bits.min(64)));
        self.pending.push(Queued::DataWrite { num_bits, value });
    }

    fn execute_queue(&mut self) -> Result<(), TransportError> {
        self.executions += 1;
        log::trace!(
            "execution {}: {} queued scan(s)",
            self.executions,
            self.pending.len()
        );
        if self.fail_at_execution == Some(self.executions) {
            self.pending.clear();
            self.unexecuted_captures = 0;
            return Err(TransportError::new("simulated scan failure"));
        }
        self.unexecuted_captures = 0;
        for op in std::mem::take(&mut self.pending) {
            match op {
                Queued::Reset => {
                    self.resets += 1;
                    self.ir = None;
                }
                Queued::Instruction(opcode) => self.ir = Some(opcode),
                Queued::DataWrite { num_bits, value } => {
                    if self.ir == Some(USER1) {
                        self.vir_writes.push((num_bits, value));
                        let m = usize::from(self.address_data_width);
                        let address = if num_bits > m { value >> m } else { 0 };
                        if address == 0 {
                            self.arm_info_stream();
                        }
                    }
                    // Writes under USER0 target the selected node's virtual
                    // DR and are outside this simulation.
                }
            }
        }
        Ok(())
    }
}
