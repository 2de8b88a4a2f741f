//! Compressor construction and the finalize sequence.

use std::io::{Seek, SeekFrom, Write};

use log::{debug, info};

use crate::codec::CodecRegistry;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::format::header::StartHeader;
use crate::lifecycle::LifecycleState;
use crate::progress::{NoProgress, ProgressReporter};
use crate::Result;

use super::{Compressor, WriteOptions, WriteResult};

impl<'r, W: Write + Seek> Compressor<'r, W> {
    /// Starts an archive at the sink's current position.
    ///
    /// A zeroed prologue is written immediately and patched by
    /// [`finalize`](Self::finalize).
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be written.
    pub fn new(mut sink: W, registry: &'r CodecRegistry, options: WriteOptions) -> Result<Self> {
        let archive_start = sink.stream_position()?;
        sink.write_all(&[0u8; SIGNATURE_HEADER_SIZE as usize])?;

        Ok(Self {
            sink,
            registry,
            options,
            state: LifecycleState::Open,
            entries: Vec::new(),
            archive_start,
        })
    }

    /// Compresses every registered entry and writes the headers.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry source cannot be read, the method has no
    /// codec, or the sink fails. The compressor is closed after a failure.
    pub fn finalize(&mut self) -> Result<WriteResult> {
        self.finalize_with_progress(&mut NoProgress)
    }

    /// Like [`finalize`](Self::finalize), reporting progress after every entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) if the reporter
    /// returns `false`, plus everything [`finalize`](Self::finalize) returns.
    pub fn finalize_with_progress(
        &mut self,
        progress: &mut dyn ProgressReporter,
    ) -> Result<WriteResult> {
        self.state.ensure_open("finalize")?;

        match self.write_archive(progress) {
            Ok(result) => {
                self.state = LifecycleState::Finalized;
                info!(
                    "archive finalized: {} files, {} directories, {} -> {} bytes",
                    result.entries_written,
                    result.directories_written,
                    result.total_size,
                    result.compressed_size
                );
                Ok(result)
            }
            Err(err) => {
                self.entries.clear();
                self.state = LifecycleState::Closed;
                Err(err)
            }
        }
    }

    fn write_archive(&mut self, progress: &mut dyn ProgressReporter) -> Result<WriteResult> {
        let pending = std::mem::take(&mut self.entries);
        let (entries, main_streams, mut result) = self.compress_entries(pending, progress)?;

        let header_start = self.sink.stream_position()?;
        let block = self.encode_header(&entries, main_streams)?;
        let header_pos = self.sink.stream_position()?;
        self.sink.write_all(&block)?;

        result.header_size = self.sink.stream_position()? - header_start;
        let offset = header_pos - self.archive_start - SIGNATURE_HEADER_SIZE;
        self.write_signature_header(&StartHeader::for_header(offset, &block))?;

        self.sink.flush()?;
        Ok(result)
    }

    /// Patches the prologue and returns the sink to the end of the archive.
    fn write_signature_header(&mut self, start_header: &StartHeader) -> Result<()> {
        let end = self.sink.stream_position()?;
        self.sink.seek(SeekFrom::Start(self.archive_start))?;
        self.sink.write_all(&start_header.to_bytes())?;
        self.sink.seek(SeekFrom::Start(end))?;
        debug!(
            "start header: next header at +{:#x}, {} bytes",
            start_header.next_header_offset, start_header.next_header_size
        );
        Ok(())
    }
}
