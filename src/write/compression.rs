//! Folder encoding for the finalize pass.

use std::cell::Cell;
use std::io::{self, Read, Seek, Write};

use log::debug;

use crate::checksum::{Crc32Reader, Crc32Writer, StreamDigest};
use crate::format::files::ArchiveEntry;
use crate::format::streams::{Coder, Folder, PackInfo, StreamsInfo, SubStreamsInfo, UnpackInfo};
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::stream::ConcatReader;
use crate::{Error, Result};

use super::{Compressor, EntrySource, PendingEntry, WriteResult};

/// Counts bytes handed to the sink so progress can report packed totals
/// while an encoder still holds the sink.
struct CountingWriter<'c, W> {
    inner: W,
    count: &'c Cell<u64>,
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// One encoded folder and the digests observed on both sides of the coder.
pub(super) struct EncodedFolder {
    pub(super) folder: Folder,
    pub(super) packed: StreamDigest,
    pub(super) unpacked: StreamDigest,
}

/// Streams being accumulated into the main StreamsInfo.
#[derive(Default)]
struct StreamLayout {
    folders: Vec<Folder>,
    pack_sizes: Vec<u64>,
    pack_digests: Vec<Option<u32>>,
    num_unpack_streams: Vec<u64>,
    unpack_sizes: Vec<u64>,
    digests: Vec<Option<u32>>,
}

impl StreamLayout {
    fn push_folder(&mut self, encoded: EncodedFolder, streams: &[StreamDigest]) {
        self.folders.push(encoded.folder);
        self.pack_sizes.push(encoded.packed.size);
        self.pack_digests.push(Some(encoded.packed.crc));
        self.num_unpack_streams.push(streams.len() as u64);
        for digest in streams {
            self.unpack_sizes.push(digest.size);
            self.digests.push(Some(digest.crc));
        }
    }

    fn into_streams_info(self) -> Option<StreamsInfo> {
        if self.folders.is_empty() {
            return None;
        }
        Some(StreamsInfo {
            pack_info: Some(PackInfo {
                pack_pos: 0,
                pack_sizes: self.pack_sizes,
                pack_digests: self.pack_digests,
            }),
            unpack_info: Some(UnpackInfo {
                folders: self.folders,
            }),
            substreams_info: Some(SubStreamsInfo {
                num_unpack_streams: self.num_unpack_streams,
                unpack_sizes: self.unpack_sizes,
                digests: self.digests,
            }),
        })
    }
}

/// Shared state for progress updates during one finalize pass.
struct ProgressState<'p> {
    reporter: &'p mut dyn ProgressReporter,
    total_bytes: u64,
    processed_bytes: u64,
}

impl ProgressState<'_> {
    fn entry_done(&mut self, entry_index: usize, entry_bytes: u64, packed_bytes: u64) -> Result<()> {
        self.processed_bytes += entry_bytes;
        let update = ProgressUpdate {
            included: true,
            entry_index,
            entry_bytes,
            processed_bytes: self.processed_bytes,
            total_bytes: self.total_bytes,
            packed_bytes,
        };
        if self.reporter.on_progress(&update) {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }
}

impl<W: Write + Seek> Compressor<'_, W> {
    /// Encodes `input` with the configured method as one single-coder folder
    /// written at the sink's current position.
    pub(super) fn encode_folder<R: Read>(
        &mut self,
        input: &mut R,
        packed_bytes: &Cell<u64>,
    ) -> Result<EncodedFolder> {
        let registry = self.registry;
        let method_id = self.options.method.method_id();
        let level = self.options.level;

        let mut packed = Crc32Writer::new(CountingWriter {
            inner: &mut self.sink,
            count: packed_bytes,
        });
        let mut source = Crc32Reader::new(input);

        let mut encoder = registry.encoder(method_id, Box::new(&mut packed), level)?;
        io::copy(&mut source, &mut encoder)?;
        let properties = encoder.properties();
        encoder.finish()?;

        let packed = packed.digest();
        let unpacked = source.digest();

        let mut folder = Folder::single(Coder::simple(method_id, properties));
        folder.unpack_sizes = vec![unpacked.size];

        debug!("encoded folder: {} -> {} bytes", unpacked.size, packed.size);
        Ok(EncodedFolder {
            folder,
            packed,
            unpacked,
        })
    }

    /// Compresses the data of every pending entry.
    ///
    /// Returns the final entry list with realized sizes and CRCs, the main
    /// streams info (absent when no entry carries data) and the statistics.
    pub(super) fn compress_entries(
        &mut self,
        pending: Vec<PendingEntry>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(Vec<ArchiveEntry>, Option<StreamsInfo>, WriteResult)> {
        let mut entries = Vec::with_capacity(pending.len());
        let mut sources: Vec<Option<EntrySource>> = Vec::new();
        let mut stream_entries = Vec::new();

        for PendingEntry { entry, source } in pending {
            if let Some(source) = source {
                stream_entries.push(entries.len());
                sources.push(Some(source));
            }
            entries.push(entry);
        }

        let total_bytes = stream_entries.iter().map(|&i| entries[i].size).sum();
        progress.on_total(total_bytes);
        let mut progress = ProgressState {
            reporter: progress,
            total_bytes,
            processed_bytes: 0,
        };

        let packed_bytes = Cell::new(0u64);
        let mut layout = StreamLayout::default();

        if self.options.solid && sources.len() > 1 {
            let count = sources.len();
            let (encoded, digests) = {
                let open = |i: usize| -> io::Result<Box<dyn Read>> {
                    sources[i]
                        .take()
                        .ok_or_else(|| io::Error::other(format!("source {i} already consumed")))?
                        .open()
                };
                let mut reader = ConcatReader::new(count, open).on_boundary(
                    |i, digest: &StreamDigest| {
                        progress
                            .entry_done(stream_entries[i], digest.size, packed_bytes.get())
                            .map_err(io::Error::from)
                    },
                );
                let encoded = self.encode_folder(&mut reader, &packed_bytes)?;
                (encoded, reader.into_digests())
            };
            layout.push_folder(encoded, &digests);
        } else {
            for (stream, slot) in sources.iter_mut().enumerate() {
                let Some(source) = slot.take() else {
                    continue;
                };
                let mut input = source.open()?;
                let encoded = self.encode_folder(&mut input, &packed_bytes)?;
                let digest = encoded.unpacked;
                layout.push_folder(encoded, &[digest]);
                progress.entry_done(stream_entries[stream], digest.size, packed_bytes.get())?;
            }
        }

        for (&entry_index, (&size, &crc)) in stream_entries
            .iter()
            .zip(layout.unpack_sizes.iter().zip(&layout.digests))
        {
            let entry = &mut entries[entry_index];
            entry.size = size;
            entry.crc = crc;
        }

        let result = WriteResult {
            entries_written: entries.iter().filter(|e| e.is_file()).count(),
            directories_written: entries.iter().filter(|e| e.is_directory).count(),
            total_size: layout.unpack_sizes.iter().sum(),
            compressed_size: layout.pack_sizes.iter().sum(),
            folders_written: layout.folders.len(),
            header_size: 0,
        };

        Ok((entries, layout.into_streams_info(), result))
    }
}
