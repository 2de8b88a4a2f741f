//! Opening an archive: prologue, header location and encoded-header bootstrap.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::rc::Rc;

use log::debug;

use crate::checksum::Crc32;
use crate::codec::CodecRegistry;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::format::header::StartHeader;
use crate::format::parser::{Header, HeaderBlock};
use crate::lifecycle::LifecycleState;
use crate::{Error, Result};

use super::decompression::{PackLayout, decode_header};
use super::{ExtractOptions, Extractor};

impl<'r> Extractor<'r, BufReader<File>> {
    /// Opens an archive file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the archive is invalid.
    pub fn open_path(
        path: impl AsRef<Path>,
        registry: &'r CodecRegistry,
        options: ExtractOptions,
    ) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open(BufReader::new(file), registry, options)
    }
}

impl<'r, R: Read + Seek> Extractor<'r, R> {
    /// Opens an archive that starts at the source's current position.
    ///
    /// Reads the prologue, checks the header's location and CRC, and parses
    /// it. An encoded header is decoded with the registry first; the decoded
    /// bytes must hold a plain header.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFormat`] for a bad signature, a header outside the
    ///   container or an encoded header nested in another
    /// - [`Error::CorruptHeader`] for a damaged start header or header block
    /// - [`Error::UnsupportedMethod`] if the header was encoded with a codec
    ///   the registry lacks
    pub fn open(mut reader: R, registry: &'r CodecRegistry, options: ExtractOptions) -> Result<Self> {
        let archive_start = reader.stream_position()?;
        let container_end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(archive_start))?;

        let start_header = StartHeader::parse(&mut reader)?;
        let data_start = archive_start + SIGNATURE_HEADER_SIZE;
        debug!(
            "start header: next header at +{:#x}, {} bytes",
            start_header.next_header_offset, start_header.next_header_size
        );

        let source = Rc::new(RefCell::new(reader));
        let header = if start_header.next_header_size == 0 {
            debug!("archive has no header");
            Header::default()
        } else {
            let block = read_header_block(&source, &start_header, data_start, container_end, &options)?;
            match HeaderBlock::parse(&block, &options.limits)? {
                HeaderBlock::Raw(header) => header,
                HeaderBlock::Encoded(streams) => {
                    debug!("header is encoded");
                    let decoded = decode_header(
                        &source,
                        &streams,
                        data_start,
                        container_end,
                        registry,
                        options.password_provider(),
                        &options.limits,
                    )?;
                    match HeaderBlock::parse(&decoded, &options.limits)? {
                        HeaderBlock::Raw(header) => header,
                        HeaderBlock::Encoded(_) => {
                            return Err(Error::InvalidFormat(
                                "encoded header decodes to another encoded header".into(),
                            ));
                        }
                    }
                }
            }
        };

        let entries = header.entries()?;
        let layout = match &header.main_streams {
            Some(streams) => PackLayout::new(streams, data_start, container_end)?,
            None => PackLayout::default(),
        };

        let mut folder_entries = vec![Vec::new(); header.folders().len()];
        for (index, entry) in entries.iter().enumerate() {
            if let Some(members) = entry.folder_index.and_then(|f| folder_entries.get_mut(f)) {
                members.push(index);
            }
        }

        debug!(
            "opened archive: {} entries in {} folders",
            entries.len(),
            folder_entries.len()
        );
        Ok(Self {
            source,
            registry,
            options,
            state: LifecycleState::Open,
            header,
            entries,
            layout,
            folder_entries,
        })
    }
}

/// Reads and checks the block the start header points at.
fn read_header_block<R: Read + Seek>(
    source: &Rc<RefCell<R>>,
    start_header: &StartHeader,
    data_start: u64,
    container_end: u64,
    options: &ExtractOptions,
) -> Result<Vec<u8>> {
    let position = data_start.checked_add(start_header.next_header_offset);
    let end = position.and_then(|p| p.checked_add(start_header.next_header_size));
    let (Some(position), Some(end)) = (position, end) else {
        return Err(Error::InvalidFormat("next header position overflows".into()));
    };
    if end > container_end {
        return Err(Error::InvalidFormat(format!(
            "next header at {position:#x} ({} bytes) lies beyond the container end at {container_end:#x}",
            start_header.next_header_size
        )));
    }
    if start_header.next_header_size > options.limits.max_header_bytes {
        return Err(Error::ResourceLimitExceeded(format!(
            "header of {} bytes (limit {})",
            start_header.next_header_size, options.limits.max_header_bytes
        )));
    }

    let mut block = vec![0u8; start_header.next_header_size as usize];
    {
        let mut reader = source.borrow_mut();
        reader.seek(SeekFrom::Start(position))?;
        reader.read_exact(&mut block)?;
    }

    let actual = Crc32::compute(&block);
    if actual != start_header.next_header_crc {
        return Err(Error::corrupt_header(
            0,
            format!(
                "header CRC mismatch: expected {:#x}, got {actual:#x}",
                start_header.next_header_crc
            ),
        ));
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::streams::ResourceLimits;
    use crate::write::{Compressor, WriteOptions};
    use std::io::Cursor;

    fn empty_archive(registry: &CodecRegistry) -> Vec<u8> {
        let mut compressor =
            Compressor::new(Cursor::new(Vec::new()), registry, WriteOptions::default()).unwrap();
        compressor.finalize().unwrap();
        compressor.into_inner().into_inner()
    }

    #[test]
    fn test_open_empty_archive() {
        let registry = CodecRegistry::default();
        let data = empty_archive(&registry);
        let extractor =
            Extractor::open(Cursor::new(data), &registry, ExtractOptions::default()).unwrap();
        assert!(extractor.entries().is_empty());
    }

    #[test]
    fn test_open_headerless_prologue() {
        let registry = CodecRegistry::default();
        let data = StartHeader::default().to_bytes().to_vec();
        let extractor =
            Extractor::open(Cursor::new(data), &registry, ExtractOptions::default()).unwrap();
        assert!(extractor.entries().is_empty());
    }

    #[test]
    fn test_open_at_offset() {
        let registry = CodecRegistry::default();
        let mut data = b"prefix".to_vec();
        data.extend(empty_archive(&registry));
        let mut cursor = Cursor::new(data);
        cursor.set_position(6);
        assert!(Extractor::open(cursor, &registry, ExtractOptions::default()).is_ok());
    }

    #[test]
    fn test_header_beyond_end() {
        let registry = CodecRegistry::default();
        let mut data = empty_archive(&registry);
        data.pop();
        let err = Extractor::open(Cursor::new(data), &registry, ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_header_crc_mismatch() {
        let registry = CodecRegistry::default();
        let mut data = empty_archive(&registry);
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let err = Extractor::open(Cursor::new(data), &registry, ExtractOptions::default())
            .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_header_over_limit() {
        let registry = CodecRegistry::default();
        let data = empty_archive(&registry);
        let options = ExtractOptions::new().limits(ResourceLimits::new().max_header_bytes(1));
        let err = Extractor::open(Cursor::new(data), &registry, options).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_not_an_archive() {
        let registry = CodecRegistry::default();
        let err = Extractor::open(
            Cursor::new(b"PK\x03\x04 definitely not 7z".to_vec()),
            &registry,
            ExtractOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }
}
