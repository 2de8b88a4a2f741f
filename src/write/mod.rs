//! Archive writing.
//!
//! A [`Compressor`] only records entries as they are added; no data is read
//! until [`Compressor::finalize`], which compresses everything in one
//! sequential pass, writes the header after the packed data and finally
//! patches the 32-byte prologue at the start of the archive.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use sevenz_container::codec::CodecRegistry;
//! use sevenz_container::write::{Compressor, WriteOptions};
//!
//! let registry = CodecRegistry::default();
//! let mut compressor =
//!     Compressor::new(Cursor::new(Vec::new()), &registry, WriteOptions::default()).unwrap();
//! compressor.add_bytes("hello.txt", b"Hello, World!".to_vec(), None).unwrap();
//! compressor.add_empty_directory("docs").unwrap();
//!
//! let result = compressor.finalize().unwrap();
//! assert_eq!(result.entries_written, 1);
//! assert_eq!(result.directories_written, 1);
//! ```

mod compression;
mod entry_input;
mod header_encode;
pub(crate) mod options;
mod writer_init;

pub use options::{Method, WriteOptions, WriteResult};

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::PathBuf;

use crate::codec::CodecRegistry;
use crate::format::files::ArchiveEntry;
use crate::lifecycle::LifecycleState;

/// Where an entry's data comes from at finalize time.
pub(crate) enum EntrySource {
    /// A file on disk, opened when its turn comes.
    File(PathBuf),
    /// A caller-supplied reader.
    Reader(Box<dyn Read>),
    /// An in-memory buffer.
    Bytes(Vec<u8>),
}

impl EntrySource {
    pub(crate) fn open(self) -> io::Result<Box<dyn Read>> {
        Ok(match self {
            EntrySource::File(path) => Box::new(BufReader::new(File::open(path)?)),
            EntrySource::Reader(reader) => reader,
            EntrySource::Bytes(bytes) => Box::new(Cursor::new(bytes)),
        })
    }
}

impl std::fmt::Debug for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntrySource::File(path) => f.debug_tuple("File").field(path).finish(),
            EntrySource::Reader(_) => f.write_str("Reader"),
            EntrySource::Bytes(bytes) => write!(f, "Bytes({})", bytes.len()),
        }
    }
}

/// An entry registered but not yet written.
#[derive(Debug)]
pub(crate) struct PendingEntry {
    /// Entry metadata; `size` holds the expected size until finalize.
    entry: ArchiveEntry,
    /// Data source, `None` for entries without a data stream.
    source: Option<EntrySource>,
}

/// Creates an archive on a seekable sink.
///
/// The codec registry is borrowed for the compressor's lifetime; one registry
/// can serve any number of compressors.
pub struct Compressor<'r, W> {
    sink: W,
    registry: &'r CodecRegistry,
    options: WriteOptions,
    state: LifecycleState,
    entries: Vec<PendingEntry>,
    /// Sink position of the prologue.
    archive_start: u64,
}

impl<W> Compressor<'_, W> {
    /// Returns the options in use.
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Iterates over the registered entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().map(|p| &p.entry)
    }

    /// Abandons the archive. Registered entries are dropped and every later
    /// operation fails with [`Error::InvalidState`](crate::Error::InvalidState).
    /// Closing twice is a no-op.
    pub fn close(&mut self) {
        self.entries.clear();
        self.state = LifecycleState::Closed;
    }

    /// Returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W> std::fmt::Debug for Compressor<'_, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn compressor(registry: &CodecRegistry) -> Compressor<'_, Cursor<Vec<u8>>> {
        Compressor::new(Cursor::new(Vec::new()), registry, WriteOptions::default()).unwrap()
    }

    #[test]
    fn test_new_writes_placeholder() {
        let registry = CodecRegistry::default();
        let compressor = compressor(&registry);
        assert_eq!(compressor.state(), LifecycleState::Open);
        assert_eq!(compressor.into_inner().into_inner(), vec![0u8; 32]);
    }

    #[test]
    fn test_close_rejects_further_use() {
        let registry = CodecRegistry::default();
        let mut compressor = compressor(&registry);
        compressor.add_bytes("a.txt", b"a".to_vec(), None).unwrap();
        compressor.close();
        compressor.close();

        assert_eq!(compressor.entries().count(), 0);
        assert!(matches!(
            compressor.add_bytes("b.txt", b"b".to_vec(), None),
            Err(Error::InvalidState { state: "closed", .. })
        ));
        assert!(matches!(
            compressor.finalize(),
            Err(Error::InvalidState { state: "closed", .. })
        ));
    }

    #[test]
    fn test_finalize_twice_is_rejected() {
        let registry = CodecRegistry::default();
        let mut compressor = compressor(&registry);
        compressor.add_bytes("a.txt", b"abc".to_vec(), None).unwrap();
        compressor.finalize().unwrap();
        assert_eq!(compressor.state(), LifecycleState::Finalized);
        assert!(matches!(
            compressor.finalize(),
            Err(Error::InvalidState { state: "finalized", .. })
        ));
        assert!(compressor.add_empty_directory("d").is_err());
    }

    #[test]
    fn test_entry_source_debug() {
        assert_eq!(format!("{:?}", EntrySource::Bytes(vec![1, 2])), "Bytes(2)");
        let reader = EntrySource::Reader(Box::new(io::empty()));
        assert_eq!(format!("{reader:?}"), "Reader");
    }
}
