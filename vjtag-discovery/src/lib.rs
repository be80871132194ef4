//! # Virtual JTAG Discovery Library
//!
//! This crate discovers and addresses an Altera Virtual JTAG debug endpoint
//! reachable through a vendor System Level Debug (SLD) hub, and builds the
//! virtual-IR scans that route later debug traffic to it.
//!
//! ## Overview
//!
//! An FPGA exposes its debug fabric through a single physical JTAG Test
//! Access Port with just two vendor instructions, `USER0` and `USER1`. Every
//! addressable register behind that port — the SLD hub itself and each node
//! attached to it — has to be located at runtime: early shifts return width
//! and address information that determines the width of later shifts. This
//! crate runs that enumeration protocol and remembers where the Virtual JTAG
//! node lives, so that a debug transport (for example a RISC-V DTM) can be
//! reached through it.
//!
//! ## Architecture
//!
//! The crate is built around two main components:
//!
//! - **[`ScanChain`] Trait**: the seam to the physical JTAG scan-chain
//!   engine. The host environment queues instruction and data register scans
//!   and executes them; this crate never touches hardware directly.
//! - **[`VirtualJtag`]**: a generic engine over a [`ScanChain`] that runs the
//!   discovery protocol once per invocation and afterwards builds routed
//!   virtual-IR scans any number of times.
//!
//! ## How It Works
//!
//! 1. The TAP is reset and `USER1` selects the virtual instruction register.
//! 2. 64 zero bits address the SLD hub (address 0) without knowing the real
//!    register width yet.
//! 3. `USER0` exposes the hub's virtual data register, and the hub
//!    configuration register is shifted out as eight serialized 4-bit scans.
//! 4. The decoded node count and value-field width fix the dimensions of all
//!    later scans; each node's info register is shifted out the same way and
//!    its position becomes its address.
//! 5. The first node tagged as Virtual JTAG is recorded, and a routed scan to
//!    the RISC-V DTMCS selector serves as a connectivity check.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use vjtag_discovery::{RISCV_DMI, Tap, VirtualJtag};
//!
//! let chain = MyScanChain::open()?;
//! let tap = Tap::new(10);
//!
//! let mut vjtag = VirtualJtag::new(chain);
//! let discovery = vjtag.discover(&tap)?;
//! println!("Virtual JTAG node at address {}", discovery.vjtag_node_address);
//!
//! // Point subsequent DR scans at the debug module interface register.
//! vjtag.route_to_node(&tap, RISCV_DMI)?;
//! ```
//!
//! ## Error Handling
//!
//! Physical failures reported by the scan chain abort the protocol step in
//! progress and surface as [`error::DiscoveryError::Transport`] with the
//! stage name attached. There are no retries at this layer; a failed
//! discovery may simply be run again from scratch.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Enable debug logging to
//! see the decoded hub configuration and every enumerated node's info
//! register. No logger is initialized here; configure one in the host, for
//! example with `env_logger`.
//!
//! ## Thread Model
//!
//! Fully synchronous and single-threaded: every protocol step blocks on the
//! scan-chain engine completing the queued shifts before the next step is
//! issued. The engine takes `&mut self` throughout, so a concurrent or
//! re-entrant discovery cannot be expressed.
pub mod discovery;
pub mod error;

pub use discovery::{Discovery, VirtualJtag};
pub use error::{DiscoveryError, TransportError};

/// Virtual-IR selectors of the RISC-V debug transport module reached through
/// the Virtual JTAG node.
pub const RISCV_DTMCS: u32 = 0x10;
pub const RISCV_DMI: u32 = 0x11;

/// Read-only handle for the physical TAP the SLD hub sits behind.
///
/// Owned by the scan-chain collaborator; this crate only needs to know how
/// wide the physical instruction register is.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tap {
    /// Length in bits of the physical instruction register. At most 64.
    pub ir_length: usize,
}

impl Tap {
    pub fn new(ir_length: usize) -> Tap {
        debug_assert!(ir_length <= 64);
        Tap { ir_length }
    }
}

/// Trait that the physical JTAG scan-chain engine must implement.
///
/// This trait is the boundary between the discovery protocol and the
/// hardware. Scans are queued and take effect when [`execute_queue`] runs;
/// capture buffers hold valid data only after a successful execution.
///
/// The discovery protocol depends on scans executing strictly in the order
/// they were queued, and it executes the queue between dependent shifts
/// itself — implementations must not reorder or coalesce scans across an
/// execution.
///
/// [`execute_queue`]: ScanChain::execute_queue
pub trait ScanChain {
    /// Queue a TAP logic reset (test-logic-reset state).
    fn reset_tap(&mut self);

    /// Queue a scan of `num_bits` into the physical instruction register of
    /// `tap`. `value` holds the opcode in little-endian bit order.
    fn shift_instruction(&mut self, tap: &Tap, num_bits: usize, value: &[u8]);

    /// Queue a scan of `num_bits` through the physical data register.
    ///
    /// `out` supplies the bits to drive on TDI (`None` drives zeros);
    /// `capture` receives the bits latched from TDO once the queue executes.
    /// Each scan passes through the update-DR state before the next one
    /// starts.
    fn shift_data(&mut self, num_bits: usize, out: Option<&[u8]>, capture: Option<&mut [u8]>);

    /// Execute all queued scans, blocking until the hardware has completed
    /// them. On failure the queue state is unspecified and the caller is
    /// expected to abandon the operation in progress.
    fn execute_queue(&mut self) -> Result<(), TransportError>;
}

impl<T: ScanChain + ?Sized> ScanChain for &mut T {
    fn reset_tap(&mut self) {
        (**self).reset_tap()
    }

    fn shift_instruction(&mut self, tap: &Tap, num_bits: usize, value: &[u8]) {
        (**self).shift_instruction(tap, num_bits, value)
    }

    fn shift_data(&mut self, num_bits: usize, out: Option<&[u8]>, capture: Option<&mut [u8]>) {
        (**self).shift_data(num_bits, out, capture)
    }

    fn execute_queue(&mut self) -> Result<(), TransportError> {
        (**self).execute_queue()
    }
}
