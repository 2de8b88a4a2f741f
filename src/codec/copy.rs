//! Copy codec (no compression).

use std::io::{self, Read, Write};

use super::{Codec, Decoder, Encoder, method, single_input};
use crate::Result;

/// A decoder that passes at most `size` bytes through unchanged.
pub struct CopyDecoder<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> CopyDecoder<R> {
    /// Creates a copy decoder yielding at most `size` bytes of `inner`.
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read> Read for CopyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let max_read = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_read])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl<R: Read> Decoder for CopyDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::COPY
    }
}

/// An encoder that writes data through unchanged.
pub struct CopyEncoder<W> {
    inner: W,
}

impl<W: Write> CopyEncoder<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CopyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Encoder for CopyEncoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::COPY
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The Copy method.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyCodec;

impl Codec for CopyCodec {
    fn method_id(&self) -> &'static [u8] {
        method::COPY
    }

    fn name(&self) -> &'static str {
        "Copy"
    }

    fn decoder<'a>(
        &self,
        inputs: Vec<Box<dyn Read + 'a>>,
        _properties: &[u8],
        unpack_size: u64,
        _password: Option<&str>,
    ) -> Result<Box<dyn Decoder + 'a>> {
        let input = single_input(inputs, self.name())?;
        Ok(Box::new(CopyDecoder::new(input, unpack_size)))
    }

    fn encoder<'a>(
        &self,
        output: Box<dyn Write + 'a>,
        _level: u32,
    ) -> Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(CopyEncoder::new(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_copy_partial_read() {
        let mut decoder = CopyDecoder::new(Cursor::new(b"Hello, World!".to_vec()), 5);
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert_eq!(output, b"Hello");
        assert_eq!(decoder.method_id(), method::COPY);
    }

    #[test]
    fn test_copy_short_input() {
        let mut decoder = CopyDecoder::new(Cursor::new(b"abc".to_vec()), 10);
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert_eq!(output, b"abc");
    }

    #[test]
    fn test_copy_encoder() {
        let mut out = Vec::new();
        let mut encoder = CopyCodec.encoder(Box::new(&mut out), 9).unwrap();
        encoder.write_all(b"payload").unwrap();
        assert!(encoder.properties().is_none());
        encoder.finish().unwrap();
        assert_eq!(out, b"payload");
    }
}
