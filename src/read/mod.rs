//! Archive reading.
//!
//! An [`Extractor`] parses the header when it is opened, decoding an encoded
//! header first when the archive has one. Entries are then listed from
//! memory; extraction decodes whole folders in ascending order and cuts each
//! one back into its entries.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use sevenz_container::codec::CodecRegistry;
//! use sevenz_container::read::{ExtractOptions, Extractor};
//! use sevenz_container::write::{Compressor, WriteOptions};
//!
//! let registry = CodecRegistry::default();
//! let mut compressor =
//!     Compressor::new(Cursor::new(Vec::new()), &registry, WriteOptions::default()).unwrap();
//! compressor.add_bytes("greeting.txt", b"Hello!".to_vec(), None).unwrap();
//! compressor.finalize().unwrap();
//!
//! let mut archive = compressor.into_inner();
//! archive.set_position(0);
//! let mut extractor = Extractor::open(archive, &registry, ExtractOptions::default()).unwrap();
//!
//! let mut out = Vec::new();
//! extractor.extract_name("greeting.txt", &mut out).unwrap();
//! assert_eq!(out, b"Hello!");
//! ```

mod archive_open;
mod archive_query;
mod decompression;
mod extraction;
mod options;
mod path_safety;

pub use options::{ExtractOptions, Selection};

use std::cell::RefCell;
use std::rc::Rc;

use crate::codec::CodecRegistry;
use crate::format::files::ArchiveEntry;
use crate::format::parser::Header;
use crate::lifecycle::LifecycleState;

use decompression::PackLayout;

/// Reads an archive from a seekable source.
///
/// The codec registry is borrowed for the extractor's lifetime.
pub struct Extractor<'r, R> {
    source: Rc<RefCell<R>>,
    registry: &'r CodecRegistry,
    options: ExtractOptions,
    state: LifecycleState,
    header: Header,
    entries: Vec<ArchiveEntry>,
    /// Container positions of the main packed streams.
    layout: PackLayout,
    /// Entry indices of every folder, in sub-stream order.
    folder_entries: Vec<Vec<usize>>,
}

impl<R> std::fmt::Debug for Extractor<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .field("folders", &self.folder_entries.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
