//! Write options and configuration for archive creation.

use crate::codec::method;

/// Compression method used for every folder of a new archive.
///
/// A method whose codec feature is disabled is still selectable; finalizing
/// with it fails with [`Error::UnsupportedMethod`](crate::Error::UnsupportedMethod).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Method {
    /// Store without compression.
    Copy,
    /// LZMA.
    Lzma,
    /// LZMA2.
    Lzma2,
    /// Deflate.
    Deflate,
    /// BZip2.
    Bzip2,
}

impl Method {
    /// Returns the method ID bytes written into coder records.
    pub fn method_id(self) -> &'static [u8] {
        match self {
            Method::Copy => method::COPY,
            Method::Lzma => method::LZMA,
            Method::Lzma2 => method::LZMA2,
            Method::Deflate => method::DEFLATE,
            Method::Bzip2 => method::BZIP2,
        }
    }
}

impl Default for Method {
    /// LZMA when the `lzma` feature is enabled, otherwise Copy.
    fn default() -> Self {
        if cfg!(feature = "lzma") {
            Method::Lzma
        } else {
            Method::Copy
        }
    }
}

/// Options for creating an archive.
///
/// # Example
///
/// ```rust
/// use sevenz_container::write::{Method, WriteOptions};
///
/// let options = WriteOptions::new()
///     .method(Method::Copy)
///     .solid(false)
///     .compress_header(false);
/// assert_eq!(options.level, 6);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Compression method.
    pub method: Method,
    /// Compression level (0-9).
    pub level: u32,
    /// Concatenate all file data into a single folder.
    pub solid: bool,
    /// Compress the header into an encoded header.
    pub compress_header: bool,
    /// Keep directory structure when registering directories; otherwise
    /// every file is stored under its bare file name.
    pub preserve_directory_structure: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            method: Method::default(),
            level: 6,
            solid: true,
            compress_header: true,
            preserve_directory_structure: true,
        }
    }
}

impl WriteOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the compression level, clamping values above 9.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Enables or disables solid compression.
    pub fn solid(mut self, solid: bool) -> Self {
        self.solid = solid;
        self
    }

    /// Enables or disables header compression.
    pub fn compress_header(mut self, compress: bool) -> Self {
        self.compress_header = compress;
        self
    }

    /// Enables or disables directory structure preservation.
    pub fn preserve_directory_structure(mut self, preserve: bool) -> Self {
        self.preserve_directory_structure = preserve;
        self
    }
}

/// Statistics about a finalized archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Number of file entries written, including empty files.
    pub entries_written: usize,
    /// Number of directory entries written.
    pub directories_written: usize,
    /// Total uncompressed bytes.
    pub total_size: u64,
    /// Total packed bytes of file data.
    pub compressed_size: u64,
    /// Number of folders written for file data.
    pub folders_written: usize,
    /// Size of the header block as stored.
    pub header_size: u64,
}

impl WriteResult {
    /// Returns the compression ratio (compressed / uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.total_size as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WriteOptions::default();
        assert!(options.solid);
        assert!(options.compress_header);
        assert!(options.preserve_directory_structure);
        #[cfg(feature = "lzma")]
        assert_eq!(options.method, Method::Lzma);
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(WriteOptions::new().level(42).level, 9);
    }

    #[test]
    fn test_method_ids() {
        assert_eq!(Method::Copy.method_id(), &[0x00]);
        assert_eq!(Method::Lzma.method_id(), &[0x03, 0x01, 0x01]);
        assert_eq!(Method::Bzip2.method_id(), method::BZIP2);
    }

    #[test]
    fn test_compression_ratio() {
        let result = WriteResult {
            total_size: 100,
            compressed_size: 25,
            ..Default::default()
        };
        assert_eq!(result.compression_ratio(), 0.25);
        assert_eq!(WriteResult::default().compression_ratio(), 1.0);
    }
}
