//! Header serialization and header compression.

use std::cell::Cell;
use std::io::{Seek, Write};

use log::debug;

use crate::Result;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::format::files::{ArchiveEntry, FilesInfo};
use crate::format::parser::{Header, HeaderBlock};
use crate::format::streams::{PackInfo, StreamsInfo, UnpackInfo};

use super::Compressor;

/// Builds the raw header for the finalized entries.
///
/// An archive without entries gets a bare header with no streams or files
/// info.
fn build_header(entries: &[ArchiveEntry], main_streams: Option<StreamsInfo>) -> Header {
    if entries.is_empty() {
        return Header::default();
    }
    Header {
        main_streams,
        files_info: Some(FilesInfo::from_entries(entries)),
        ..Default::default()
    }
}

impl<W: Write + Seek> Compressor<'_, W> {
    /// Serializes the header and returns the block the start header points at.
    ///
    /// With header compression on, the raw header is first encoded into the
    /// sink as one more packed stream, and the returned block is an encoded
    /// header describing it.
    pub(super) fn encode_header(
        &mut self,
        entries: &[ArchiveEntry],
        main_streams: Option<StreamsInfo>,
    ) -> Result<Vec<u8>> {
        let raw = build_header(entries, main_streams).to_bytes()?;
        if !self.options.compress_header || entries.is_empty() {
            return Ok(raw);
        }

        let pack_start = self.sink.stream_position()?;
        let encoded = self.encode_folder(&mut raw.as_slice(), &Cell::new(0))?;

        let mut folder = encoded.folder;
        folder.unpack_crc = Some(encoded.unpacked.crc);

        let streams = StreamsInfo {
            pack_info: Some(PackInfo {
                pack_pos: pack_start - self.archive_start - SIGNATURE_HEADER_SIZE,
                pack_sizes: vec![encoded.packed.size],
                pack_digests: vec![None],
            }),
            unpack_info: Some(UnpackInfo {
                folders: vec![folder],
            }),
            substreams_info: None,
        };
        let block = HeaderBlock::Encoded(streams).to_bytes()?;

        debug!(
            "header compressed: {} -> {} bytes (+{} byte block)",
            raw.len(),
            encoded.packed.size,
            block.len()
        );
        Ok(block)
    }
}
