//! Primitive decoders for header fields.
//!
//! Everything here reads from any [`Read`] and reports truncation as an
//! [`io::ErrorKind::UnexpectedEof`] error; the header parser turns that into a
//! [`CorruptHeader`](crate::Error::CorruptHeader) with the offset it stopped at.

use std::io::{self, Read};

/// Reads one VarInt.
///
/// The number of leading one bits in the first byte (0 to 8) is the number
/// of little-endian bytes that follow. Whatever bits of the first byte are
/// left below the terminating zero become the most significant part of the
/// value; with eight leading ones the following eight bytes are the value.
pub fn read_variable_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let first = read_u8(r)?;
    let extra = first.leading_ones() as usize;

    let mut low = [0u8; 8];
    r.read_exact(&mut low[..extra])?;
    let low = u64::from_le_bytes(low);

    if extra == 8 {
        return Ok(low);
    }
    let high = u64::from(first) & (0x7F >> extra);
    Ok(low | (high << (8 * extra)))
}

/// Reads a little-endian `u32`.
pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a little-endian `u64`.
pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads one byte.
pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads a packed bit vector of `count` flags, most significant bit first.
pub fn read_bool_vector<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<bool>> {
    let bytes = read_bytes(r, count.div_ceil(8))?;
    Ok((0..count)
        .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
        .collect())
}

/// Reads an "all defined" marker and, when it is zero, the bit vector after it.
pub fn read_all_or_bits<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<bool>> {
    match read_u8(r)? {
        0 => read_bool_vector(r, count),
        _ => Ok(vec![true; count]),
    }
}

/// Reads exactly `count` bytes.
pub fn read_bytes<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Counts the set flags.
pub fn count_true(bits: &[bool]) -> usize {
    bits.iter().filter(|&&b| b).count()
}
