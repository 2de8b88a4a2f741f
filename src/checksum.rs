//! CRC-32 engine and digest-tracking stream filters.
//!
//! Every CRC in the container is the reflected CRC-32 (polynomial
//! `0xEDB88320`, initial state and final XOR `0xFFFFFFFF`): per-stream
//! digests in the header, the start-header CRC and the header CRC.
//!
//! ```rust
//! use sevenz_container::checksum::Crc32;
//!
//! let mut crc = Crc32::new();
//! crc.update(b"1234");
//! crc.update(b"56789");
//! assert_eq!(crc.value(), 0xCBF4_3926);
//! assert_eq!(Crc32::compute(b"123456789"), crc.value());
//! ```

use std::fmt;
use std::io::{self, Read, Write};

/// Incremental CRC-32.
///
/// [`value`](Self::value) does not consume the state, so a running digest
/// can be sampled and then extended.
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crc32({:#010x})", self.value())
    }
}

impl Crc32 {
    /// Starts an empty digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// CRC of one buffer.
    pub fn compute(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }

    /// Feeds more bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Returns the CRC of all bytes fed so far.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// Size and CRC-32 of a stream that has been fully observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamDigest {
    /// Number of bytes observed.
    pub size: u64,
    /// CRC-32 over those bytes.
    pub crc: u32,
}

/// Running size and CRC shared by both filters.
#[derive(Debug, Clone, Default)]
struct Tally {
    crc: Crc32,
    size: u64,
}

impl Tally {
    fn observe(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.size += data.len() as u64;
    }

    fn digest(&self) -> StreamDigest {
        StreamDigest {
            size: self.size,
            crc: self.crc.value(),
        }
    }
}

/// Passes writes through to `inner` and digests the bytes it accepted.
///
/// ```rust
/// use sevenz_container::checksum::Crc32Writer;
/// use std::io::Write;
///
/// let mut writer = Crc32Writer::new(Vec::new());
/// writer.write_all(b"123456789").unwrap();
/// assert_eq!(writer.crc(), 0xCBF4_3926);
/// assert_eq!(writer.into_inner(), b"123456789");
/// ```
#[derive(Debug)]
pub struct Crc32Writer<W> {
    inner: W,
    tally: Tally,
}

impl<W> Crc32Writer<W> {
    /// Wraps `inner` with an empty digest.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            tally: Tally::default(),
        }
    }

    /// CRC of the bytes written so far.
    pub fn crc(&self) -> u32 {
        self.tally.crc.value()
    }

    /// Number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.tally.size
    }

    /// Size and CRC of the bytes written so far.
    pub fn digest(&self) -> StreamDigest {
        self.tally.digest()
    }

    /// Unwraps the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let accepted = self.inner.write(buf)?;
        self.tally.observe(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Passes reads through from `inner` and digests the bytes delivered.
#[derive(Debug)]
pub struct Crc32Reader<R> {
    inner: R,
    tally: Tally,
}

impl<R> Crc32Reader<R> {
    /// Wraps `inner` with an empty digest.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            tally: Tally::default(),
        }
    }

    /// CRC of the bytes read so far.
    pub fn crc(&self) -> u32 {
        self.tally.crc.value()
    }

    /// Number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.tally.size
    }

    /// Size and CRC of the bytes read so far.
    pub fn digest(&self) -> StreamDigest {
        self.tally.digest()
    }

    /// Unwraps the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.tally.observe(&buf[..n]);
        Ok(n)
    }
}
