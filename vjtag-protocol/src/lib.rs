//! # Virtual JTAG Protocol Library
//!
//! This crate provides the data-plane building blocks for talking to an
//! [Altera Virtual JTAG](https://www.intel.com/content/www/us/en/docs/programmable/683705/)
//! System Level Debug (SLD) hub: a bit-field codec for assembling and taking
//! apart the registers shifted through the physical JTAG data register, and
//! the layouts of the two self-describing registers the hub exposes.
//!
//! ## Overview
//!
//! An FPGA with virtual JTAG support multiplexes any number of debug "nodes"
//! behind a single physical Test Access Port. The TAP offers only two fixed
//! instructions for this purpose, `USER0` and `USER1`, so every virtual
//! register has to be located at runtime by shifting bit fields of initially
//! unknown width through one physical channel. This library implements the
//! pure, I/O-free part of that scheme:
//!
//! - Packing and unpacking integer fields at arbitrary bit offsets and
//!   widths ([`bits::pack`], [`bits::unpack`])
//! - Deriving the node address field width from a node count
//!   ([`bits::address_field_width`])
//! - Decoding the hub configuration register ([`HubConfig`]) and the
//!   per-node info register ([`NodeInfo`])
//! - The fixed protocol constants: `USER0`/`USER1` opcodes, the Altera
//!   manufacturer ID and the vendor node type tags
//!
//! The stateful discovery protocol built on top of these primitives lives in
//! the `vjtag-discovery` crate.
//!
//! ## Basic Usage
//!
//! ### Decoding a hub configuration word
//!
//! ```
//! use vjtag_protocol::HubConfig;
//!
//! // As assembled from eight 4-bit nibble scans.
//! let word = (2 << 19) | (0x06E << 8) | 16;
//! let hub = HubConfig::decode(word);
//! assert_eq!(hub.node_count, 2);
//! assert_eq!(hub.address_data_width, 16);
//! assert_eq!(hub.vir_length(), 18);
//! ```
//!
//! ### Building a routed virtual-IR field
//!
//! ```
//! use vjtag_protocol::bits;
//!
//! // Node address 2 in the high bits, VIR value 0x10 in the low m bits.
//! let m = 16;
//! let mut dr = [0u8; 3];
//! bits::pack(&mut dr, 0, m, 0x10);
//! bits::pack(&mut dr, m, 2, 2);
//! assert_eq!(bits::unpack(&dr, 0, 18), (2 << 16) | 0x10);
//! ```
//!
//! ## Bit Order
//!
//! All buffers use little-endian bit order: bit `k` of a field occupies bit
//! `k % 8` of byte `k / 8`. This is the order in which a JTAG data register
//! shift presents bits on TDI, least significant first.
//!
//! ## Error Handling
//!
//! The codec has no failure path. Buffer capacity is a caller contract and
//! short buffers panic; field values are truncated to their declared width.

pub mod bits;
pub mod registers;
pub use registers::*;
