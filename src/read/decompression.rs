//! Folder decoding over the shared container.
//!
//! Every packed stream is exposed as a [`BoundedWindow`] over the container,
//! the folder's coder graph turns those windows into one decoded stream, and
//! a [`SplitWriter`] cuts that stream back into entries.

use std::cell::RefCell;
use std::io::{self, Read, Seek, Write};
use std::rc::Rc;

use log::{debug, trace};

use crate::checksum::{Crc32Reader, StreamDigest};
use crate::codec::{CodecRegistry, CoderGraph, PasswordProvider};
use crate::format::files::ArchiveEntry;
use crate::format::streams::{Folder, ResourceLimits, StreamsInfo};
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::stream::{BoundedWindow, NullSink, SplitWriter};
use crate::{Error, Result};

use super::{Extractor, Selection};

/// Absolute byte ranges of the packed streams described by one StreamsInfo,
/// and the first packed stream of every folder.
#[derive(Debug, Clone, Default)]
pub(super) struct PackLayout {
    ranges: Vec<(u64, u64)>,
    first_pack: Vec<usize>,
}

impl PackLayout {
    /// Resolves pack positions against `data_start`, the container offset
    /// right after the prologue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if a packed stream runs past
    /// `container_end` or the folders need more packed streams than exist.
    pub(super) fn new(streams: &StreamsInfo, data_start: u64, container_end: u64) -> Result<Self> {
        let folders = streams.folders();
        let mut first_pack = Vec::with_capacity(folders.len());
        let mut needed = 0usize;
        for folder in folders {
            first_pack.push(needed);
            needed += folder.packed_streams.len();
        }

        let mut ranges = Vec::new();
        if let Some(pack) = &streams.pack_info {
            let mut pos = data_start.saturating_add(pack.pack_pos);
            for &size in &pack.pack_sizes {
                let end = pos
                    .checked_add(size)
                    .filter(|&end| end <= container_end)
                    .ok_or_else(|| {
                        Error::InvalidFormat(format!(
                            "packed stream at {pos:#x} ({size} bytes) runs past the end of the container"
                        ))
                    })?;
                ranges.push((pos, size));
                pos = end;
            }
        }

        if needed > ranges.len() {
            return Err(Error::InvalidFormat(format!(
                "folders use {needed} packed streams but only {} exist",
                ranges.len()
            )));
        }
        Ok(Self { ranges, first_pack })
    }

    /// Returns the total size of the packed streams of one folder.
    pub(super) fn packed_size(&self, folder: &Folder, folder_index: usize) -> u64 {
        self.folder_ranges(folder, folder_index)
            .map(|ranges| ranges.iter().map(|&(_, size)| size).sum())
            .unwrap_or(0)
    }

    fn folder_ranges(&self, folder: &Folder, folder_index: usize) -> Option<&[(u64, u64)]> {
        let first = *self.first_pack.get(folder_index)?;
        self.ranges.get(first..first + folder.packed_streams.len())
    }

    /// Builds the decoder producing the primary output of a folder.
    pub(super) fn folder_decoder<'a, R: Read + Seek + 'a>(
        &self,
        source: &Rc<RefCell<R>>,
        folder: &Folder,
        folder_index: usize,
        registry: &CodecRegistry,
        password: Option<&dyn PasswordProvider>,
    ) -> Result<Box<dyn Read + 'a>> {
        let ranges = self.folder_ranges(folder, folder_index).ok_or_else(|| {
            Error::InvalidFormat(format!("folder {folder_index} has no packed streams"))
        })?;
        let packed = ranges
            .iter()
            .map(|&(start, size)| {
                trace!("folder {folder_index}: packed stream at {start:#x}, {size} bytes");
                Box::new(BoundedWindow::new(Rc::clone(source), start, size)) as Box<dyn Read + 'a>
            })
            .collect();

        CoderGraph::new(folder)?.build_decoder(packed, registry, password)
    }
}

/// Decodes the raw header bytes an encoded header describes.
///
/// # Errors
///
/// - [`Error::InvalidFormat`] unless the encoded header holds exactly one folder
/// - [`Error::ResourceLimitExceeded`] if the decoded size is over the limit
/// - [`Error::StreamBoundary`] if the decoder ends early
/// - [`Error::CorruptHeader`] if the decoded bytes fail the folder CRC
pub(super) fn decode_header<R: Read + Seek>(
    source: &Rc<RefCell<R>>,
    streams: &StreamsInfo,
    data_start: u64,
    container_end: u64,
    registry: &CodecRegistry,
    password: Option<&dyn PasswordProvider>,
    limits: &ResourceLimits,
) -> Result<Vec<u8>> {
    let [folder] = streams.folders() else {
        return Err(Error::InvalidFormat(format!(
            "encoded header has {} folders",
            streams.folders().len()
        )));
    };

    let size = folder.unpack_size()?;
    if size > limits.max_header_bytes {
        return Err(Error::ResourceLimitExceeded(format!(
            "decoded header of {size} bytes (limit {})",
            limits.max_header_bytes
        )));
    }

    let layout = PackLayout::new(streams, data_start, container_end)?;
    let decoder = layout.folder_decoder(source, folder, 0, registry, password)?;
    let mut reader = Crc32Reader::new(decoder.take(size));
    let mut data = Vec::with_capacity(size as usize);
    reader.read_to_end(&mut data)?;

    if data.len() as u64 != size {
        return Err(Error::StreamBoundary(format!(
            "encoded header decoded to {} of {size} bytes",
            data.len()
        )));
    }
    if let Some(expected) = folder.unpack_crc {
        let actual = reader.crc();
        if actual != expected {
            return Err(Error::corrupt_header(
                0,
                format!("decoded header CRC mismatch: expected {expected:#x}, got {actual:#x}"),
            ));
        }
    }

    debug!("decoded encoded header: {size} bytes");
    Ok(data)
}

/// Where the bytes of one sub-stream go.
enum EntrySink<W> {
    /// A sink supplied by the caller for a selected entry.
    Caller(W),
    /// Bytes of an unselected entry that has to be decoded to get past it.
    Discard(NullSink),
}

impl<W: Write> Write for EntrySink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EntrySink::Caller(w) => w.write(buf),
            EntrySink::Discard(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EntrySink::Caller(w) => w.flush(),
            EntrySink::Discard(w) => w.flush(),
        }
    }
}

/// Progress bookkeeping for one extraction call.
pub(super) struct ExtractProgress<'p> {
    reporter: &'p mut dyn ProgressReporter,
    total_bytes: u64,
    processed_bytes: u64,
    pub(super) packed_bytes: u64,
}

impl<'p> ExtractProgress<'p> {
    pub(super) fn new(reporter: &'p mut dyn ProgressReporter, total_bytes: u64) -> Self {
        reporter.on_total(total_bytes);
        Self {
            reporter,
            total_bytes,
            processed_bytes: 0,
            packed_bytes: 0,
        }
    }

    /// Reports one finished entry. Extraction does not stop on `false`.
    pub(super) fn entry_done(&mut self, entry_index: usize, entry_bytes: u64, included: bool) {
        self.processed_bytes += entry_bytes;
        let update = ProgressUpdate {
            included,
            entry_index,
            entry_bytes,
            processed_bytes: self.processed_bytes,
            total_bytes: self.total_bytes,
            packed_bytes: self.packed_bytes,
        };
        let _ = self.reporter.on_progress(&update);
    }
}

impl<R: Read + Seek> Extractor<'_, R> {
    /// Decodes one folder in full, handing selected entries to `open` and
    /// `close` and discarding the rest.
    ///
    /// Each entry's CRC is checked as its sub-stream completes, before it is
    /// passed to `close`; the folder CRC is checked once the folder ends.
    pub(super) fn decode_folder<W, O, C>(
        &self,
        folder_index: usize,
        selection: &Selection,
        open: &mut O,
        close: &mut C,
        progress: &mut ExtractProgress<'_>,
    ) -> Result<()>
    where
        W: Write,
        O: FnMut(usize, &ArchiveEntry) -> Result<W>,
        C: FnMut(usize, &ArchiveEntry, W) -> Result<()>,
    {
        let folder = self.header.folders().get(folder_index).ok_or_else(|| {
            Error::InvalidFormat(format!("folder {folder_index} does not exist"))
        })?;
        let members = self
            .folder_entries
            .get(folder_index)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let entries = &self.entries;
        let sizes: Vec<u64> = members.iter().map(|&i| entries[i].size).collect();

        debug!(
            "decoding folder {folder_index}: {} coders, {} sub-streams, {} bytes",
            folder.coders.len(),
            members.len(),
            sizes.iter().sum::<u64>()
        );

        let decoder = self.layout.folder_decoder(
            &self.source,
            folder,
            folder_index,
            self.registry,
            self.options.password_provider(),
        )?;
        let mut reader = Crc32Reader::new(decoder);

        let mut splitter = SplitWriter::new(
            sizes,
            |k| {
                let index = members[k];
                if selection.contains(index) {
                    open(index, &entries[index])
                        .map(EntrySink::Caller)
                        .map_err(io::Error::from)
                } else {
                    Ok(EntrySink::Discard(NullSink::new()))
                }
            },
            |k, sink: EntrySink<W>, digest: StreamDigest| {
                let index = members[k];
                let entry = &entries[index];
                if let Some(expected) = entry.crc {
                    if digest.crc != expected {
                        return Err(Error::CrcMismatch {
                            entry_index: index,
                            entry_name: Some(entry.name.clone()),
                            expected,
                            actual: digest.crc,
                        }
                        .into());
                    }
                }

                progress.entry_done(index, digest.size, matches!(sink, EntrySink::Caller(_)));
                match sink {
                    EntrySink::Caller(w) => close(index, entry, w).map_err(io::Error::from),
                    EntrySink::Discard(_) => Ok(()),
                }
            },
        );

        io::copy(&mut reader, &mut splitter)?;
        splitter.finish()?;

        if let Some(expected) = folder.unpack_crc {
            let actual = reader.crc();
            if actual != expected {
                return Err(Error::FolderCrcMismatch {
                    folder_index,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}
