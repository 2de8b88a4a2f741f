//! BZip2 codec backed by the `bzip2` crate.

use std::io::{self, Read, Write};

use bzip2::Compression;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;

use super::{Codec, Decoder, Encoder, method, single_input};
use crate::Result;

/// BZip2 decoder.
pub struct Bzip2Decoder<R> {
    inner: BzDecoder<R>,
}

impl<R: Read> Bzip2Decoder<R> {
    /// Creates a BZip2 decoder.
    pub fn new(input: R) -> Self {
        Self {
            inner: BzDecoder::new(input),
        }
    }
}

impl<R: Read> Read for Bzip2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for Bzip2Decoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::BZIP2
    }
}

/// BZip2 encoder.
pub struct Bzip2Encoder<W: Write> {
    inner: BzEncoder<W>,
}

impl<W: Write> Bzip2Encoder<W> {
    /// Creates an encoder; the level is clamped to the 1-9 block size range.
    pub fn new(output: W, level: u32) -> Self {
        Self {
            inner: BzEncoder::new(output, Compression::new(level.clamp(1, 9))),
        }
    }
}

impl<W: Write> Write for Bzip2Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Encoder for Bzip2Encoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::BZIP2
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}

/// The BZip2 method.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn method_id(&self) -> &'static [u8] {
        method::BZIP2
    }

    fn name(&self) -> &'static str {
        "BZip2"
    }

    fn decoder<'a>(
        &self,
        inputs: Vec<Box<dyn Read + 'a>>,
        _properties: &[u8],
        _unpack_size: u64,
        _password: Option<&str>,
    ) -> Result<Box<dyn Decoder + 'a>> {
        let input = single_input(inputs, self.name())?;
        Ok(Box::new(Bzip2Decoder::new(input)))
    }

    fn encoder<'a>(
        &self,
        output: Box<dyn Write + 'a>,
        level: u32,
    ) -> Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(Bzip2Encoder::new(output, level)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bzip2_roundtrip() {
        let data = b"Hello, World! This is a test of BZip2 compression.".repeat(4);

        let mut compressed = Vec::new();
        let mut encoder = Bzip2Codec.encoder(Box::new(&mut compressed), 0).unwrap();
        encoder.write_all(&data).unwrap();
        encoder.finish().unwrap();
        assert_eq!(&compressed[..3], b"BZh");

        let mut decoder = Bzip2Decoder::new(Cursor::new(compressed));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
