//! # sevenz-container
//!
//! Reading and writing of 7z-style archive containers.
//!
//! The crate covers the container itself: the 32-byte prologue, the
//! property-tagged header (optionally compressed into an encoded header), the
//! coder graphs that describe how packed streams become entry data, and the
//! CRC checks on every layer. Compression methods are plugged in through a
//! [`CodecRegistry`]; Copy, LZMA, LZMA2, Deflate and BZip2 are built in
//! behind cargo features.
//!
//! ## Creating an Archive
//!
//! ```rust,no_run
//! use sevenz_container::{CodecRegistry, Compressor, Method, Result, WriteOptions};
//!
//! fn main() -> Result<()> {
//!     let registry = CodecRegistry::default();
//!     let options = WriteOptions::new().method(Method::Lzma2).solid(true);
//!     let file = std::fs::File::create("backup.7z")?;
//!
//!     let mut compressor = Compressor::new(file, &registry, options)?;
//!     compressor.add_directory("./documents", Some("documents"), true)?;
//!     compressor.add_bytes("README.txt", b"nightly backup".to_vec(), None)?;
//!
//!     let result = compressor.finalize()?;
//!     println!(
//!         "wrote {} entries, {} -> {} bytes",
//!         result.entries_written, result.total_size, result.compressed_size
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Extracting an Archive
//!
//! ```rust,no_run
//! use sevenz_container::{CodecRegistry, ExtractOptions, Extractor, Result};
//!
//! fn main() -> Result<()> {
//!     let registry = CodecRegistry::default();
//!     let mut extractor =
//!         Extractor::open_path("backup.7z", &registry, ExtractOptions::new().skip_existing(true))?;
//!
//!     for entry in extractor.entries() {
//!         println!("{}: {} bytes", entry.name, entry.size);
//!     }
//!     extractor.extract_all_to("./restore")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result<T>`]. Damaged archives surface as
//! [`Error::InvalidFormat`], [`Error::CorruptHeader`] or one of the CRC
//! variants; [`Error::is_format_error`] groups them.
//!
//! ```rust
//! use std::io::Cursor;
//! use sevenz_container::{CodecRegistry, Error, ExtractOptions, Extractor};
//!
//! let registry = CodecRegistry::default();
//! let err = Extractor::open(Cursor::new(b"not an archive".to_vec()), &registry, ExtractOptions::default())
//!     .unwrap_err();
//! assert!(matches!(err, Error::InvalidFormat(_)));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod archive_path;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod progress;
pub mod read;
pub mod stream;
pub mod timestamp;
pub mod write;

pub use archive_path::ArchivePath;
pub use error::{Error, Result};
pub use timestamp::Timestamp;

pub use codec::CodecRegistry;
pub use format::files::ArchiveEntry;
pub use format::streams::ResourceLimits;
pub use lifecycle::LifecycleState;

pub use read::{ExtractOptions, Extractor, Selection};
pub use write::{Compressor, Method, WriteOptions, WriteResult};

pub use progress::{
    ClosureProgress, NoProgress, ProgressReporter, ProgressUpdate, StatisticsProgress, progress_fn,
};
