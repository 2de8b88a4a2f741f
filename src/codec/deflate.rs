//! Deflate codec backed by `flate2`.

use std::io::{self, BufRead, BufReader, Read, Write};

use flate2::Compression;
use flate2::bufread::DeflateDecoder as FlateDecoder;
use flate2::write::DeflateEncoder as FlateEncoder;

use super::{Codec, Decoder, Encoder, method, single_input};
use crate::Result;

/// Deflate decoder.
pub struct DeflateDecoder<R> {
    inner: FlateDecoder<R>,
}

impl<R: BufRead> DeflateDecoder<R> {
    /// Creates a raw Deflate decoder.
    pub fn new(input: R) -> Self {
        Self {
            inner: FlateDecoder::new(input),
        }
    }
}

impl<R: BufRead> Read for DeflateDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: BufRead> Decoder for DeflateDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::DEFLATE
    }
}

/// Deflate encoder.
pub struct DeflateEncoder<W: Write> {
    inner: FlateEncoder<W>,
}

impl<W: Write> DeflateEncoder<W> {
    /// Creates an encoder at the given level (0-9).
    pub fn new(output: W, level: u32) -> Self {
        Self {
            inner: FlateEncoder::new(output, Compression::new(level.min(9))),
        }
    }
}

impl<W: Write> Write for DeflateEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Encoder for DeflateEncoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::DEFLATE
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}

/// The Deflate method.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeflateCodec;

impl Codec for DeflateCodec {
    fn method_id(&self) -> &'static [u8] {
        method::DEFLATE
    }

    fn name(&self) -> &'static str {
        "Deflate"
    }

    fn decoder<'a>(
        &self,
        inputs: Vec<Box<dyn Read + 'a>>,
        _properties: &[u8],
        _unpack_size: u64,
        _password: Option<&str>,
    ) -> Result<Box<dyn Decoder + 'a>> {
        let input = single_input(inputs, self.name())?;
        Ok(Box::new(DeflateDecoder::new(BufReader::new(input))))
    }

    fn encoder<'a>(
        &self,
        output: Box<dyn Write + 'a>,
        level: u32,
    ) -> Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(DeflateEncoder::new(output, level)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_deflate_roundtrip() {
        let data = b"Hello, World! This is a test of Deflate compression.".repeat(8);

        let mut compressed = Vec::new();
        let mut encoder = DeflateCodec.encoder(Box::new(&mut compressed), 6).unwrap();
        encoder.write_all(&data).unwrap();
        encoder.finish().unwrap();
        assert!(compressed.len() < data.len());

        let mut decoder = DeflateDecoder::new(BufReader::new(Cursor::new(compressed)));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(decoder.method_id(), method::DEFLATE);
    }

    #[test]
    fn test_deflate_garbage_fails() {
        let mut decoder = DeflateDecoder::new(BufReader::new(Cursor::new(vec![0xFF; 16])));
        let mut out = Vec::new();
        assert!(decoder.read_to_end(&mut out).is_err());
    }
}
