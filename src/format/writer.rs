//! Low-level binary writing utilities for header serialization.
//!
//! These are the inverses of the functions in [`reader`](super::reader).

use std::io::{self, Write};

/// Writes a variable-length encoded u64.
///
/// The first byte carries one leading 1-bit per extra little-endian byte that
/// follows; its remaining low bits hold the most significant bits of the value.
/// Values below `0x80` take one byte, a full u64 takes nine.
pub fn write_variable_u64<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    let mut buf = [0u8; 9];
    let len = encode_variable_u64(value, &mut buf);
    w.write_all(&buf[..len])
}

/// Returns the encoded length of `value` in bytes (1..=9).
pub fn variable_u64_len(value: u64) -> usize {
    // Number of extra bytes is the smallest n with value < 2^(7 * (n + 1)),
    // capped at 8.
    (0..8)
        .find(|&extra| value < 1u64 << (7 * (extra + 1)))
        .map_or(9, |extra| extra + 1)
}

fn encode_variable_u64(value: u64, buf: &mut [u8; 9]) -> usize {
    let len = variable_u64_len(value);
    let extra = len - 1;
    if extra == 8 {
        buf[0] = 0xFF;
        buf[1..9].copy_from_slice(&value.to_le_bytes());
        return len;
    }

    let prefix_bits = (0xFF00u16 >> extra) as u8;
    let high = (value >> (8 * extra)) as u8;
    buf[0] = prefix_bits | high;
    buf[1..=extra].copy_from_slice(&value.to_le_bytes()[..extra]);
    len
}

/// Writes an unsigned 32-bit little-endian integer.
pub fn write_u32_le<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes an unsigned 64-bit little-endian integer.
pub fn write_u64_le<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes a single byte.
pub fn write_u8<W: Write>(w: &mut W, value: u8) -> io::Result<()> {
    w.write_all(&[value])
}

/// Writes a boolean vector as a bitmask, most significant bit first,
/// zero-padded to a byte boundary.
pub fn write_bool_vector<W: Write>(w: &mut W, bits: &[bool]) -> io::Result<()> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
        bytes[i / 8] |= 0x80 >> (i % 8);
    }
    w.write_all(&bytes)
}

/// Writes an optional boolean vector: marker `1` when every entry is `true`,
/// otherwise marker `0` followed by the bitmask.
pub fn write_all_or_bits<W: Write>(w: &mut W, bits: &[bool]) -> io::Result<()> {
    if bits.iter().all(|&b| b) {
        write_u8(w, 1)
    } else {
        write_u8(w, 0)?;
        write_bool_vector(w, bits)
    }
}
