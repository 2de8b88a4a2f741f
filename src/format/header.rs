//! The fixed 32-byte prologue: signature, version and start header.

use crate::checksum::Crc32;
use crate::{Error, Result};
use std::io::Read;

use super::reader::{read_u8, read_u32_le};
use super::{SIGNATURE, SIGNATURE_HEADER_SIZE, VERSION_MAJOR, VERSION_MINOR};

/// The start header of an archive.
///
/// Locates and validates the variable-length header that follows the packed
/// streams. The offset is relative to the end of the 32-byte prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartHeader {
    /// Offset from the end of the prologue to the next header.
    pub next_header_offset: u64,
    /// Size of the next header (compressed if encoded).
    pub next_header_size: u64,
    /// CRC of the next header data.
    pub next_header_crc: u32,
}

impl StartHeader {
    /// Describes a header of `data` placed `offset` bytes after the prologue.
    pub fn for_header(offset: u64, data: &[u8]) -> Self {
        Self {
            next_header_offset: offset,
            next_header_size: data.len() as u64,
            next_header_crc: Crc32::compute(data),
        }
    }

    /// Parses the signature and start header from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The signature is invalid
    /// - The version is newer than this engine understands
    /// - The start header CRC doesn't match
    /// - The prologue is truncated
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let mut sig = [0u8; 6];
        r.read_exact(&mut sig)
            .map_err(|_| Error::InvalidFormat("file too short for a signature".into()))?;
        if sig != *SIGNATURE {
            return Err(Error::InvalidFormat("invalid 7z signature".into()));
        }

        let version_major = read_u8(r)?;
        let version_minor = read_u8(r)?;
        if version_major != VERSION_MAJOR || version_minor > VERSION_MINOR {
            return Err(Error::UnsupportedFeature {
                feature: "unsupported archive version",
            });
        }

        let start_header_crc = read_u32_le(r)?;

        let mut data = [0u8; 20];
        r.read_exact(&mut data)
            .map_err(|_| Error::corrupt_header(12, "truncated start header"))?;

        let calculated_crc = Crc32::compute(&data);
        if calculated_crc != start_header_crc {
            return Err(Error::corrupt_header(
                12,
                format!(
                    "start header CRC mismatch: expected {:#x}, got {:#x}",
                    start_header_crc, calculated_crc
                ),
            ));
        }

        let (offset, rest) = data.split_at(8);
        let (size, crc) = rest.split_at(8);
        Ok(Self {
            next_header_offset: u64::from_le_bytes(le_array(offset)),
            next_header_size: u64::from_le_bytes(le_array(size)),
            next_header_crc: u32::from_le_bytes(le_array(crc)),
        })
    }

    /// Serializes the whole 32-byte prologue.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_HEADER_SIZE as usize] {
        let mut out = [0u8; SIGNATURE_HEADER_SIZE as usize];
        out[..6].copy_from_slice(SIGNATURE);
        out[6] = VERSION_MAJOR;
        out[7] = VERSION_MINOR;
        out[12..20].copy_from_slice(&self.next_header_offset.to_le_bytes());
        out[20..28].copy_from_slice(&self.next_header_size.to_le_bytes());
        out[28..32].copy_from_slice(&self.next_header_crc.to_le_bytes());
        let crc = Crc32::compute(&out[12..32]);
        out[8..12].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Returns the byte position where the next header starts.
    pub fn next_header_position(&self) -> u64 {
        SIGNATURE_HEADER_SIZE + self.next_header_offset
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn create_valid_header(offset: u64, size: u64, next_crc: u32) -> Vec<u8> {
        StartHeader {
            next_header_offset: offset,
            next_header_size: size,
            next_header_crc: next_crc,
        }
        .to_bytes()
        .to_vec()
    }

    #[test]
    fn test_valid_start_header() {
        let data = create_valid_header(100, 50, 0x12345678);
        let header = StartHeader::parse(&mut Cursor::new(data)).unwrap();

        assert_eq!(header.next_header_offset, 100);
        assert_eq!(header.next_header_size, 50);
        assert_eq!(header.next_header_crc, 0x12345678);
        assert_eq!(header.next_header_position(), 132);
    }

    #[test]
    fn test_prologue_layout() {
        let data = create_valid_header(1, 2, 3);
        assert_eq!(data.len(), 32);
        assert_eq!(&data[..6], SIGNATURE);
        assert_eq!(data[6], 0);
        assert_eq!(data[7], 4);
        assert_eq!(&data[12..20], &1u64.to_le_bytes());
    }

    #[test]
    fn test_invalid_signature() {
        let mut data = create_valid_header(0, 0, 0);
        data[0] = 0x00;
        let err = StartHeader::parse(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_every_flipped_start_header_byte_is_detected() {
        for pos in 8..32 {
            let mut data = create_valid_header(100, 50, 0x12345678);
            data[pos] ^= 0x01;
            let err = StartHeader::parse(&mut Cursor::new(data)).unwrap_err();
            assert!(err.is_format_error(), "byte {pos} not detected: {err}");
        }
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut data = create_valid_header(0, 0, 0);
        data[7] = 5;
        let err = StartHeader::parse(&mut Cursor::new(data)).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_truncated_header() {
        let data = create_valid_header(0, 0, 0);
        assert!(StartHeader::parse(&mut Cursor::new(&data[..20])).is_err());
    }

    #[test]
    fn test_for_header() {
        let header = StartHeader::for_header(10, b"Hello, World!");
        assert_eq!(header.next_header_size, 13);
        assert_eq!(header.next_header_crc, 0xEC4AC3D0);
    }
}
