//! Top-level header block: a raw [`Header`] or an encoded one.

use std::io::{ErrorKind, Write};

use crate::{Error, Result};

use super::files::{ArchiveEntry, FilesInfo};
use super::reader::{read_bytes, read_u8, read_variable_u64};
use super::streams::{Folder, ResourceLimits, StreamsInfo};
use super::writer::{write_u8, write_variable_u64};
use super::{HeaderCursor, PropertyId, read_property_id, remaining, unexpected_property};

/// One opaque archive-level property record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveProperty {
    /// Record type byte (never zero).
    pub kind: u8,
    /// Record payload.
    pub data: Vec<u8>,
}

/// The raw archive header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Archive-level property records, carried through unchanged.
    pub archive_properties: Vec<ArchiveProperty>,
    /// Additional streams info, parsed but not otherwise used.
    pub additional_streams: Option<StreamsInfo>,
    /// Main streams info describing the packed file data.
    pub main_streams: Option<StreamsInfo>,
    /// Per-entry metadata.
    pub files_info: Option<FilesInfo>,
}

impl Header {
    fn parse(r: &mut HeaderCursor<'_>, limits: &ResourceLimits) -> Result<Self> {
        let mut header = Header::default();

        loop {
            let offset = r.position();
            match read_property_id(r)? {
                PropertyId::End => break,
                PropertyId::ArchiveProperties => {
                    header.archive_properties = parse_archive_properties(r)?;
                }
                PropertyId::AdditionalStreamsInfo => {
                    header.additional_streams = Some(StreamsInfo::parse(r, limits)?);
                }
                PropertyId::MainStreamsInfo => {
                    header.main_streams = Some(StreamsInfo::parse(r, limits)?);
                }
                PropertyId::FilesInfo => {
                    header.files_info = Some(FilesInfo::parse(r, limits)?);
                }
                other => return Err(unexpected_property(offset, other, "header")),
            }
        }

        Ok(header)
    }

    /// Writes the header including its leading tag.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u8(w, PropertyId::Header.as_u8())?;

        if !self.archive_properties.is_empty() {
            write_u8(w, PropertyId::ArchiveProperties.as_u8())?;
            for property in &self.archive_properties {
                write_u8(w, property.kind)?;
                write_variable_u64(w, property.data.len() as u64)?;
                w.write_all(&property.data)?;
            }
            write_u8(w, PropertyId::End.as_u8())?;
        }
        if let Some(streams) = &self.additional_streams {
            write_u8(w, PropertyId::AdditionalStreamsInfo.as_u8())?;
            streams.write(w)?;
        }
        if let Some(streams) = &self.main_streams {
            write_u8(w, PropertyId::MainStreamsInfo.as_u8())?;
            streams.write(w)?;
        }
        if let Some(files) = &self.files_info {
            files.write(w)?;
        }

        write_u8(w, PropertyId::End.as_u8())?;
        Ok(())
    }

    /// Serializes the header into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }

    /// Returns the folders of the main streams.
    pub fn folders(&self) -> &[Folder] {
        self.main_streams
            .as_ref()
            .map(StreamsInfo::folders)
            .unwrap_or(&[])
    }

    /// Builds the entry list by overlaying FilesInfo onto the stream layout.
    pub fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        match &self.files_info {
            Some(files) => files.to_entries(self.main_streams.as_ref()),
            None => {
                let streams = self.main_streams.as_ref().map(StreamsInfo::substreams);
                match streams.transpose()? {
                    Some(s) if s.total_streams() > 0 => Err(Error::InvalidFormat(
                        "archive has data streams but no files info".into(),
                    )),
                    _ => Ok(Vec::new()),
                }
            }
        }
    }
}

fn parse_archive_properties(r: &mut HeaderCursor<'_>) -> Result<Vec<ArchiveProperty>> {
    let mut properties = Vec::new();
    loop {
        let kind = read_u8(r)?;
        if kind == PropertyId::End.as_u8() {
            return Ok(properties);
        }
        let offset = r.position();
        let size = read_variable_u64(r)?;
        if size > remaining(r) {
            return Err(Error::corrupt_header(offset, "archive property exceeds header"));
        }
        properties.push(ArchiveProperty {
            kind,
            data: read_bytes(r, size as usize)?,
        });
    }
}

/// The block located by the start header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderBlock {
    /// A plain header.
    Raw(Header),
    /// Streams info describing where the packed header bytes live and how to
    /// decode them; the decoded bytes hold a [`HeaderBlock::Raw`].
    Encoded(StreamsInfo),
}

impl HeaderBlock {
    /// Parses a header block from its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptHeader`] for unknown or misplaced tags and for
    /// truncated input, with the byte offset where parsing stopped.
    pub fn parse(data: &[u8], limits: &ResourceLimits) -> Result<Self> {
        let mut r = HeaderCursor::new(data);
        Self::parse_block(&mut r, limits).map_err(|err| match err {
            Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Error::corrupt_header(r.position(), "truncated header")
            }
            other => other,
        })
    }

    fn parse_block(r: &mut HeaderCursor<'_>, limits: &ResourceLimits) -> Result<Self> {
        let offset = r.position();
        match read_property_id(r)? {
            PropertyId::Header => Ok(HeaderBlock::Raw(Header::parse(r, limits)?)),
            PropertyId::EncodedHeader => Ok(HeaderBlock::Encoded(StreamsInfo::parse(r, limits)?)),
            other => Err(unexpected_property(offset, other, "header block")),
        }
    }

    /// Writes the block including its leading tag.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            HeaderBlock::Raw(header) => header.write(w),
            HeaderBlock::Encoded(streams) => {
                write_u8(w, PropertyId::EncodedHeader.as_u8())?;
                streams.write(w)
            }
        }
    }

    /// Serializes the block into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::files::FileProperty;
    use crate::format::streams::{Coder, PackInfo, UnpackInfo};

    fn sample_header() -> Header {
        let mut folder = Folder::single(Coder::simple(&[0x00], None));
        folder.unpack_sizes = vec![11];
        folder.unpack_crc = Some(0xABCD);
        Header {
            archive_properties: vec![],
            additional_streams: None,
            main_streams: Some(StreamsInfo {
                pack_info: Some(PackInfo {
                    pack_pos: 0,
                    pack_sizes: vec![11],
                    pack_digests: vec![None],
                }),
                unpack_info: Some(UnpackInfo {
                    folders: vec![folder],
                }),
                substreams_info: None,
            }),
            files_info: Some(FilesInfo {
                num_files: 1,
                properties: vec![FileProperty::Names(vec!["hello.txt".into()])],
            }),
        }
    }

    #[test]
    fn test_raw_header_roundtrip() {
        let block = HeaderBlock::Raw(sample_header());
        let bytes = block.to_bytes().unwrap();
        assert_eq!(bytes[0], PropertyId::Header.as_u8());
        assert_eq!(*bytes.last().unwrap(), PropertyId::End.as_u8());

        let parsed = HeaderBlock::parse(&bytes, &ResourceLimits::default()).unwrap();
        assert_eq!(parsed, block);

        let HeaderBlock::Raw(header) = parsed else {
            panic!("expected raw header");
        };
        let entries = header.entries().unwrap();
        assert_eq!(entries[0].name, "hello.txt");
        assert_eq!(entries[0].size, 11);
        assert_eq!(entries[0].crc, Some(0xABCD));
    }

    #[test]
    fn test_encoded_header_roundtrip() {
        let streams = sample_header().main_streams.unwrap();
        let block = HeaderBlock::Encoded(streams);
        let bytes = block.to_bytes().unwrap();
        assert_eq!(bytes[0], PropertyId::EncodedHeader.as_u8());
        assert_eq!(
            HeaderBlock::parse(&bytes, &ResourceLimits::default()).unwrap(),
            block
        );
    }

    #[test]
    fn test_archive_properties_roundtrip() {
        let mut header = sample_header();
        header.archive_properties = vec![ArchiveProperty {
            kind: 0x42,
            data: vec![1, 2, 3],
        }];
        let bytes = header.to_bytes().unwrap();
        let parsed = HeaderBlock::parse(&bytes, &ResourceLimits::default()).unwrap();
        assert_eq!(parsed, HeaderBlock::Raw(header));
    }

    #[test]
    fn test_every_truncation_is_a_format_error() {
        let bytes = HeaderBlock::Raw(sample_header()).to_bytes().unwrap();
        for len in 0..bytes.len() {
            let err = HeaderBlock::parse(&bytes[..len], &ResourceLimits::default()).unwrap_err();
            assert!(err.is_format_error(), "truncated at {len}: {err}");
        }
    }

    #[test]
    fn test_unknown_top_level_tag() {
        let err = HeaderBlock::parse(&[0x30], &ResourceLimits::default()).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { offset: 0, .. }));

        let err = HeaderBlock::parse(&[PropertyId::FilesInfo.as_u8()], &ResourceLimits::default())
            .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_empty_header_has_no_entries() {
        let header = Header::default();
        assert!(header.entries().unwrap().is_empty());
        assert_eq!(header.to_bytes().unwrap(), vec![0x01, 0x00]);
    }
}
