//! Error types for archive container operations.
//!
//! This module provides the [`Error`] enum which represents all failure modes
//! of the container engine, along with a convenient [`Result<T>`] type alias.
//!
//! # Error Families
//!
//! | Family | Variants | Typical Cause |
//! |--------|----------|---------------|
//! | Format | [`InvalidFormat`][Error::InvalidFormat], [`CorruptHeader`][Error::CorruptHeader], [`CrcMismatch`][Error::CrcMismatch], [`FolderCrcMismatch`][Error::FolderCrcMismatch] | Bad signature, damaged header, malformed coder graph |
//! | Codec | [`UnsupportedMethod`][Error::UnsupportedMethod], [`UnsupportedFeature`][Error::UnsupportedFeature] | Coder id absent from the registry |
//! | Streams | [`StreamBoundary`][Error::StreamBoundary] | Reading or writing past a declared size |
//! | Extraction | [`FileConflict`][Error::FileConflict], [`PathTraversal`][Error::PathTraversal] | Destination conflicts and unsafe names |
//! | Lifecycle | [`InvalidState`][Error::InvalidState], [`Cancelled`][Error::Cancelled] | Calls on a finalized or closed handle |
//!
//! Every error is fatal to the call that raised it. Nothing is retried
//! internally.
//!
//! ```rust
//! use sevenz_container::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     if error.is_format_error() {
//!         "the archive is damaged or not an archive"
//!     } else if error.is_unsupported() {
//!         "the archive needs a codec this build lacks"
//!     } else {
//!         "something else went wrong"
//!     }
//! }
//! ```

use std::io;

/// Formats an entry as `index` or `index (name)` for error messages.
fn entry_label(index: usize, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{index} ({name})"),
        None => index.to_string(),
    }
}

/// The main error type for container operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on the container or on a file system path.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// The container is not recognized or its structure is malformed.
    ///
    /// Raised for a bad signature, an unexpected or unknown property tag and
    /// a malformed coder graph (zero or several primary outputs, an output
    /// bound twice, an input with neither binding nor packed stream).
    #[error("Invalid 7z format: {0}")]
    InvalidFormat(String),

    /// The header bytes are damaged or truncated.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// Offset within the header block where parsing stopped.
        offset: u64,
        /// What was wrong.
        reason: String,
    },

    /// A coder references a method id that the codec registry does not know.
    #[error("Unsupported method: {method_id:#x}")]
    UnsupportedMethod {
        /// The method id, read as a big-endian integer.
        method_id: u64,
    },

    /// The archive uses a format feature this engine does not implement.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// Short description of the feature.
        feature: &'static str,
    },

    /// A stream ended early or a write went past its declared size.
    #[error("Stream boundary violated: {0}")]
    StreamBoundary(String),

    /// The destination file exists and neither overwrite nor skip was requested.
    #[error("Destination already exists: {path}")]
    FileConflict {
        /// The conflicting destination path.
        path: String,
    },

    /// A folder needs a credential and none was supplied.
    #[error("password required for encrypted archive")]
    PasswordRequired,

    /// A compressor or extractor was used outside its open state.
    #[error("Cannot {operation}: archive handle is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The lifecycle state the handle was in.
        state: &'static str,
    },

    /// The progress reporter asked to stop compression.
    #[error("Operation cancelled")]
    Cancelled,

    /// The decoded content of an entry does not match its stored digest.
    #[error(
        "CRC mismatch for entry {}: expected {expected:#x}, got {actual:#x}",
        entry_label(*entry_index, entry_name.as_deref())
    )]
    CrcMismatch {
        /// Index of the damaged entry.
        entry_index: usize,
        /// Name of the damaged entry, when known.
        entry_name: Option<String>,
        /// CRC stored in the header.
        expected: u32,
        /// CRC of the decoded bytes.
        actual: u32,
    },

    /// The decoded output of a whole folder does not match the folder digest.
    #[error("CRC mismatch for folder {folder_index}: expected {expected:#x}, got {actual:#x}")]
    FolderCrcMismatch {
        /// Index of the damaged folder.
        folder_index: usize,
        /// CRC stored in the folder record.
        expected: u32,
        /// CRC of the folder's decoded output.
        actual: u32,
    },

    /// An entry name would escape the extraction directory.
    #[error("Path traversal detected in entry {entry_index}: {path}")]
    PathTraversal {
        /// Index of the offending entry.
        entry_index: usize,
        /// The name as stored in the archive.
        path: String,
    },

    /// A configured resource limit was exceeded while parsing.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// An archive path is invalid.
    #[error("Invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// No entry with the given name exists.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// An entry index is outside the entry list.
    #[error("Entry index {index} out of range (archive has {count} entries)")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of entries.
        count: usize,
    },
}

impl Error {
    /// Shorthand for [`Error::CorruptHeader`].
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns `true` for the format error family: a bad or damaged container.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::CorruptHeader { .. }
                | Error::CrcMismatch { .. }
                | Error::FolderCrcMismatch { .. }
        )
    }

    /// Returns `true` when the archive is valid but needs something this build lacks.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedMethod { .. } | Error::UnsupportedFeature { .. }
        )
    }
}

/// Converts I/O errors, recovering crate errors that stream adapters tunnelled
/// through `io::Error`.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let tunnelled = err.get_ref().is_some_and(|inner| inner.is::<Error>());
        if !tunnelled {
            return Error::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::other(other)),
            None => Error::Io(io::Error::other("empty I/O error")),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            other => io::Error::other(other),
        }
    }
}

/// A specialized Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_tunnelled_error_is_recovered() {
        let io_err: io::Error = Error::StreamBoundary("window exhausted".into()).into();
        let err: Error = io_err.into();
        assert!(matches!(err, Error::StreamBoundary(_)));
    }

    #[test]
    fn test_io_variant_is_unwrapped() {
        let original = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let io_err: io::Error = Error::Io(original).into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_invalid_format() {
        let err = Error::InvalidFormat("bad signature".into());
        assert_eq!(err.to_string(), "Invalid 7z format: bad signature");
        assert!(err.is_format_error());
    }

    #[test]
    fn test_corrupt_header() {
        let err = Error::corrupt_header(0x100, "CRC mismatch");
        assert_eq!(err.to_string(), "Corrupt header at offset 0x100: CRC mismatch");
        assert!(err.is_format_error());
    }

    #[test]
    fn test_crc_mismatch_display() {
        let err = Error::CrcMismatch {
            entry_index: 5,
            entry_name: Some("test.txt".into()),
            expected: 0x12345678,
            actual: 0xDEADBEEF,
        };
        assert_eq!(
            err.to_string(),
            "CRC mismatch for entry 5 (test.txt): expected 0x12345678, got 0xdeadbeef"
        );
    }

    #[test]
    fn test_invalid_state() {
        let err = Error::InvalidState {
            operation: "add a file",
            state: "finalized",
        };
        assert_eq!(
            err.to_string(),
            "Cannot add a file: archive handle is finalized"
        );
        assert!(!err.is_format_error());
    }

    #[test]
    fn test_unsupported() {
        let err = Error::UnsupportedMethod { method_id: 0x030101 };
        assert_eq!(err.to_string(), "Unsupported method: 0x30101");
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_file_conflict() {
        let err = Error::FileConflict {
            path: "out/a.txt".into(),
        };
        assert!(err.to_string().contains("out/a.txt"));
    }
}
