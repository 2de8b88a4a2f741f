//! LZMA and LZMA2 codecs backed by `lzma-rust2`.

use std::io::{self, Read, Write};

use crate::{Error, Result};

use super::{Codec, Decoder, Encoder, invalid_data, method, single_input};

/// LZMA decoder.
pub struct LzmaDecoder<R> {
    inner: lzma_rust2::LzmaReader<R>,
}

impl<R> std::fmt::Debug for LzmaDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzmaDecoder").finish_non_exhaustive()
    }
}

impl<R: Read> LzmaDecoder<R> {
    /// Creates a raw LZMA decoder.
    ///
    /// `properties` is the 5-byte blob: the lc/lp/pb byte followed by the
    /// little-endian dictionary size.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties are malformed.
    pub fn new(input: R, properties: &[u8], uncompressed_size: u64) -> Result<Self> {
        let &[props_byte, d0, d1, d2, d3, ..] = properties else {
            return Err(Error::InvalidFormat(
                "LZMA properties too short (need 5 bytes)".into(),
            ));
        };
        let dict_size = u32::from_le_bytes([d0, d1, d2, d3]);

        let reader = lzma_rust2::LzmaReader::new_with_props(
            input,
            uncompressed_size,
            props_byte,
            dict_size,
            None,
        )
        .map_err(invalid_data)?;
        Ok(Self { inner: reader })
    }
}

impl<R: Read> Read for LzmaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for LzmaDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA
    }
}

/// LZMA2 decoder.
pub struct Lzma2Decoder<R> {
    inner: lzma_rust2::Lzma2Reader<R>,
}

impl<R> std::fmt::Debug for Lzma2Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lzma2Decoder").finish_non_exhaustive()
    }
}

impl<R: Read> Lzma2Decoder<R> {
    /// Creates an LZMA2 decoder from the 1-byte dictionary property.
    pub fn new(input: R, properties: &[u8]) -> Result<Self> {
        let &[prop, ..] = properties else {
            return Err(Error::InvalidFormat("LZMA2 properties missing".into()));
        };
        let dict_size = decode_lzma2_dict_size(prop)?;
        Ok(Self {
            inner: lzma_rust2::Lzma2Reader::new(input, dict_size, None),
        })
    }
}

impl<R: Read> Read for Lzma2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for Lzma2Decoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA2
    }
}

/// Decodes the LZMA2 dictionary size property (0..=40).
fn decode_lzma2_dict_size(prop: u8) -> Result<u32> {
    match prop {
        40 => Ok(u32::MAX),
        0..40 => {
            let base_log = u32::from(prop) / 2 + 12;
            Ok(if prop % 2 == 0 {
                1u32 << base_log
            } else {
                3u32 << (base_log - 1)
            })
        }
        _ => Err(Error::InvalidFormat(format!(
            "invalid LZMA2 dictionary size property: {prop}"
        ))),
    }
}

/// Returns the smallest LZMA2 dictionary property covering `dict_size`.
pub fn encode_lzma2_dict_size(dict_size: u32) -> u8 {
    (0..40u8)
        .find(|&prop| decode_lzma2_dict_size(prop).is_ok_and(|size| size >= dict_size))
        .unwrap_or(40)
}

fn lzma_options(level: u32) -> lzma_rust2::LzmaOptions {
    lzma_rust2::LzmaOptions::with_preset(level.min(9))
}

/// LZMA encoder writing a raw stream with an end marker.
pub struct LzmaEncoder<W: Write> {
    inner: lzma_rust2::LzmaWriter<W>,
    properties: Vec<u8>,
}

impl<W: Write> LzmaEncoder<W> {
    /// Creates an encoder at the given preset level.
    pub fn new(output: W, level: u32) -> Result<Self> {
        let opts = lzma_options(level);
        let mut properties = vec![opts.get_props()];
        properties.extend_from_slice(&opts.dict_size.to_le_bytes());

        let inner =
            lzma_rust2::LzmaWriter::new_no_header(output, &opts, true).map_err(invalid_data)?;
        Ok(Self { inner, properties })
    }
}

impl<W: Write> Write for LzmaEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Encoder for LzmaEncoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA
    }

    fn properties(&self) -> Option<Vec<u8>> {
        Some(self.properties.clone())
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.inner
            .finish()
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(())
    }
}

/// LZMA2 encoder.
pub struct Lzma2Encoder<W: Write> {
    inner: lzma_rust2::Lzma2Writer<W>,
    dict_prop: u8,
}

impl<W: Write> Lzma2Encoder<W> {
    /// Creates an encoder at the given preset level.
    pub fn new(output: W, level: u32) -> Self {
        let opts = lzma_rust2::Lzma2Options::with_preset(level.min(9));
        let dict_prop = encode_lzma2_dict_size(opts.lzma_options.dict_size);
        Self {
            inner: lzma_rust2::Lzma2Writer::new(output, opts),
            dict_prop,
        }
    }
}

impl<W: Write> Write for Lzma2Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Encoder for Lzma2Encoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA2
    }

    fn properties(&self) -> Option<Vec<u8>> {
        Some(vec![self.dict_prop])
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.inner
            .finish()
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(())
    }
}

/// The LZMA method.
#[derive(Debug, Clone, Copy, Default)]
pub struct LzmaCodec;

impl Codec for LzmaCodec {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA
    }

    fn name(&self) -> &'static str {
        "LZMA"
    }

    fn decoder<'a>(
        &self,
        inputs: Vec<Box<dyn Read + 'a>>,
        properties: &[u8],
        unpack_size: u64,
        _password: Option<&str>,
    ) -> Result<Box<dyn Decoder + 'a>> {
        let input = single_input(inputs, self.name())?;
        Ok(Box::new(LzmaDecoder::new(input, properties, unpack_size)?))
    }

    fn encoder<'a>(
        &self,
        output: Box<dyn Write + 'a>,
        level: u32,
    ) -> Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(LzmaEncoder::new(output, level)?))
    }
}

/// The LZMA2 method.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lzma2Codec;

impl Codec for Lzma2Codec {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA2
    }

    fn name(&self) -> &'static str {
        "LZMA2"
    }

    fn decoder<'a>(
        &self,
        inputs: Vec<Box<dyn Read + 'a>>,
        properties: &[u8],
        _unpack_size: u64,
        _password: Option<&str>,
    ) -> Result<Box<dyn Decoder + 'a>> {
        let input = single_input(inputs, self.name())?;
        Ok(Box::new(Lzma2Decoder::new(input, properties)?))
    }

    fn encoder<'a>(
        &self,
        output: Box<dyn Write + 'a>,
        level: u32,
    ) -> Result<Box<dyn Encoder + 'a>> {
        Ok(Box::new(Lzma2Encoder::new(output, level)))
    }
}
