/// Bit-field packing and unpacking primitives shared by every register this
/// protocol shifts.
///
/// All offsets are absolute bit positions in a little-endian bit stream:
/// bit `k` of the stream is bit `k % 8` of byte `k / 8`. This matches the
/// order in which a JTAG data register shifts bits onto the wire.

/// Write the low `bit_width` bits of `value` into `buf` starting at
/// `bit_offset`. Bits above `bit_width` are ignored, so callers may pass an
/// untruncated value. A zero width writes nothing. The buffer must hold at
/// least `bit_offset + bit_width` bits; a short buffer is a caller bug and
/// panics.
pub fn pack(buf: &mut [u8], bit_offset: usize, bit_width: usize, value: u64) {
    debug_assert!(bit_width <= 64);
    for i in 0..bit_width {
        let pos = bit_offset + i;
        let mask = 1u8 << (pos % 8);
        if (value >> i) & 1 != 0 {
            buf[pos / 8] |= mask;
        } else {
            buf[pos / 8] &= !mask;
        }
    }
}

/// Read `bit_width` bits from `buf` starting at `bit_offset`.
/// Exact inverse of [`pack`] for the same offset and width.
pub fn unpack(buf: &[u8], bit_offset: usize, bit_width: usize) -> u64 {
    debug_assert!(bit_width <= 64);
    let mut value = 0u64;
    for i in 0..bit_width {
        let pos = bit_offset + i;
        if buf[pos / 8] & (1 << (pos % 8)) != 0 {
            value |= 1 << i;
        }
    }
    value
}

/// Number of address bits needed to select any of `node_count` SLD nodes or
/// the hub itself, which always occupies address 0:
/// the smallest `n` with `2^n >= node_count + 1`.
pub fn address_field_width(node_count: u8) -> u32 {
    u8::BITS - node_count.leading_zeros()
}

#[test]
fn address_width_covers_hub_and_nodes() {
    assert_eq!(address_field_width(0), 0);
    assert_eq!(address_field_width(1), 1);
    assert_eq!(address_field_width(2), 2);
    assert_eq!(address_field_width(3), 2);
    assert_eq!(address_field_width(4), 3);
    assert_eq!(address_field_width(7), 3);
    assert_eq!(address_field_width(8), 4);
    assert_eq!(address_field_width(255), 8);

    for c in 0..=255u8 {
        let n = address_field_width(c);
        // 2^n addresses must cover the hub plus every node, and n must be
        // minimal.
        assert!(1u64 << n >= u64::from(c) + 1);
        if n > 0 {
            assert!(1u64 << (n - 1) < u64::from(c) + 1);
        }
    }
}
