//! Container format constants, property tags and the header model.
//!
//! This module contains the magic numbers and the closed set of property tags
//! used by the header codec, plus the parsers and writers for each header
//! structure.

pub mod files;
pub mod header;
pub mod parser;
pub mod reader;
pub mod streams;
pub mod writer;

use crate::{Error, Result};

/// The container signature (magic bytes).
///
/// Every valid archive starts with these 6 bytes: `'7' 'z' 0xBC 0xAF 0x27 0x1C`
pub const SIGNATURE: &[u8; 6] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Size of the fixed prologue in bytes.
///
/// The prologue contains:
/// - 6 bytes: signature
/// - 2 bytes: version (major, minor)
/// - 4 bytes: start header CRC
/// - 8 bytes: next header offset
/// - 8 bytes: next header size
/// - 4 bytes: next header CRC
pub const SIGNATURE_HEADER_SIZE: u64 = 32;

/// Archive version - major.
pub const VERSION_MAJOR: u8 = 0;

/// Archive version - minor.
pub const VERSION_MINOR: u8 = 4;

/// Property tags used in the header byte stream.
///
/// Every tag byte the parser encounters must map onto one of these; anything
/// else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyId {
    /// Terminates every container structure.
    End = 0x00,
    /// Raw header.
    Header = 0x01,
    /// Archive properties.
    ArchiveProperties = 0x02,
    /// Additional streams info.
    AdditionalStreamsInfo = 0x03,
    /// Main streams info.
    MainStreamsInfo = 0x04,
    /// Files info.
    FilesInfo = 0x05,
    /// Pack info.
    PackInfo = 0x06,
    /// Unpack info.
    UnpackInfo = 0x07,
    /// Substreams info.
    SubStreamsInfo = 0x08,
    /// Size list.
    Size = 0x09,
    /// Digest list.
    Crc = 0x0A,
    /// Folder list.
    Folder = 0x0B,
    /// Per-output unpack sizes.
    CodersUnpackSize = 0x0C,
    /// Number of unpack streams in folders.
    NumUnpackStream = 0x0D,
    /// Empty stream bitmap.
    EmptyStream = 0x0E,
    /// Empty file bitmap.
    EmptyFile = 0x0F,
    /// Anti (deletion) bitmap.
    Anti = 0x10,
    /// File names.
    Name = 0x11,
    /// Creation time.
    CTime = 0x12,
    /// Access time.
    ATime = 0x13,
    /// Modification time.
    MTime = 0x14,
    /// Windows file attributes.
    WinAttributes = 0x15,
    /// Comment.
    Comment = 0x16,
    /// Encoded header.
    EncodedHeader = 0x17,
    /// Start position.
    StartPos = 0x18,
    /// Padding.
    Dummy = 0x19,
}

impl PropertyId {
    /// Maps a tag byte onto a property id.
    pub fn from_u8(value: u8) -> Option<Self> {
        use PropertyId::*;
        const ALL: [PropertyId; 26] = [
            End,
            Header,
            ArchiveProperties,
            AdditionalStreamsInfo,
            MainStreamsInfo,
            FilesInfo,
            PackInfo,
            UnpackInfo,
            SubStreamsInfo,
            Size,
            Crc,
            Folder,
            CodersUnpackSize,
            NumUnpackStream,
            EmptyStream,
            EmptyFile,
            Anti,
            Name,
            CTime,
            ATime,
            MTime,
            WinAttributes,
            Comment,
            EncodedHeader,
            StartPos,
            Dummy,
        ];
        ALL.get(value as usize).copied()
    }

    /// Returns the tag byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Cursor over in-memory header bytes; its position doubles as the error offset.
pub(crate) type HeaderCursor<'a> = std::io::Cursor<&'a [u8]>;

/// Reads one property tag, failing on bytes outside the known set.
pub(crate) fn read_property_id(r: &mut HeaderCursor<'_>) -> Result<PropertyId> {
    let offset = r.position();
    let value = reader::read_u8(r)?;
    PropertyId::from_u8(value)
        .ok_or_else(|| Error::corrupt_header(offset, format!("unknown property id {value:#04x}")))
}

/// Returns the number of unread header bytes.
pub(crate) fn remaining(r: &HeaderCursor<'_>) -> u64 {
    (r.get_ref().len() as u64).saturating_sub(r.position())
}

/// Builds the error for a known tag in a place where it is not allowed.
pub(crate) fn unexpected_property(offset: u64, id: PropertyId, context: &str) -> Error {
    Error::corrupt_header(offset, format!("unexpected property {id:?} in {context}"))
}

/// Windows file attribute constants.
pub mod attributes {
    /// Read-only file.
    pub const READONLY: u32 = 0x01;
    /// Directory.
    pub const DIRECTORY: u32 = 0x10;
    /// Archive file.
    pub const ARCHIVE: u32 = 0x20;
    /// Unix permissions are stored in the high 16 bits.
    pub const UNIX_EXTENSION: u32 = 0x8000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_signature() {
        assert_eq!(SIGNATURE.len(), 6);
        assert_eq!(SIGNATURE[0], b'7');
        assert_eq!(SIGNATURE[1], b'z');
    }

    #[test]
    fn test_property_ids_roundtrip() {
        for value in 0u8..=0x19 {
            let id = PropertyId::from_u8(value).unwrap();
            assert_eq!(id.as_u8(), value);
        }
        assert_eq!(PropertyId::from_u8(0x14), Some(PropertyId::MTime));
        assert_eq!(PropertyId::from_u8(0x1A), None);
        assert_eq!(PropertyId::from_u8(0xFF), None);
    }

    #[test]
    fn test_read_property_id_unknown_tag() {
        let data = [0x00u8, 0x42];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(read_property_id(&mut cursor).unwrap(), PropertyId::End);
        let err = read_property_id(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { offset: 1, .. }));
        assert!(err.is_format_error());
    }
}
