//! Codec capability layer.
//!
//! A [`Codec`] turns a set of input streams plus a properties blob into a
//! decoded stream, and wraps an output stream into an [`Encoder`]. Codecs are
//! looked up by method ID in a [`CodecRegistry`], an immutable value built
//! once and passed by reference to whatever needs it.
//!
//! ```rust
//! use sevenz_container::codec::{CodecRegistry, method};
//!
//! let registry = CodecRegistry::default();
//! assert!(registry.supports(method::COPY));
//!
//! let empty = CodecRegistry::new();
//! assert!(!empty.supports(method::COPY));
//! ```

#[cfg(feature = "lzma")]
pub mod lzma;

#[cfg(feature = "deflate")]
pub mod deflate;

#[cfg(feature = "bzip2")]
pub mod bzip2;

mod copy;
pub mod graph;

use std::fmt;
use std::io::{self, Read, Write};

use log::debug;

use crate::format::streams::Coder;
use crate::{Error, Result};

pub use copy::{CopyCodec, CopyDecoder, CopyEncoder};
pub use graph::CoderGraph;

#[cfg(feature = "lzma")]
pub use lzma::{Lzma2Codec, LzmaCodec};

#[cfg(feature = "deflate")]
pub use deflate::DeflateCodec;

#[cfg(feature = "bzip2")]
pub use bzip2::Bzip2Codec;

/// A decoder that reads compressed data and produces uncompressed output.
pub trait Decoder: Read {
    /// Returns the method ID for this decoder.
    fn method_id(&self) -> &'static [u8];
}

/// An encoder that takes uncompressed data and produces compressed output.
pub trait Encoder: Write {
    /// Returns the method ID for this encoder.
    fn method_id(&self) -> &'static [u8];

    /// Returns the properties blob to store with the coder.
    fn properties(&self) -> Option<Vec<u8>> {
        None
    }

    /// Finishes encoding and flushes any remaining data.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// One coding method.
pub trait Codec {
    /// Returns the method ID this codec handles.
    fn method_id(&self) -> &'static [u8];

    /// Returns a human-readable name.
    fn name(&self) -> &'static str;

    /// Returns `true` if decoding needs a password.
    fn requires_password(&self) -> bool {
        false
    }

    /// Builds a decoder over `inputs`, one per coder input stream.
    ///
    /// `unpack_size` is the declared size of the coder's output.
    fn decoder<'a>(
        &self,
        inputs: Vec<Box<dyn Read + 'a>>,
        properties: &[u8],
        unpack_size: u64,
        password: Option<&str>,
    ) -> Result<Box<dyn Decoder + 'a>>;

    /// Wraps `output` in an encoder at the given level (0-9).
    fn encoder<'a>(&self, output: Box<dyn Write + 'a>, level: u32)
    -> Result<Box<dyn Encoder + 'a>>;
}

/// Supplies a password when an encrypted coder is encountered.
pub trait PasswordProvider {
    /// Returns the password, or `None` if none is available.
    fn password(&self) -> Option<String>;
}

impl PasswordProvider for String {
    fn password(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl<F: Fn() -> Option<String>> PasswordProvider for F {
    fn password(&self) -> Option<String> {
        self()
    }
}

/// Method IDs for the coding methods known to this crate.
pub mod method {
    /// Copy (no compression).
    pub const COPY: &[u8] = &[0x00];
    /// LZMA compression.
    pub const LZMA: &[u8] = &[0x03, 0x01, 0x01];
    /// LZMA2 compression.
    pub const LZMA2: &[u8] = &[0x21];
    /// Deflate compression.
    pub const DEFLATE: &[u8] = &[0x04, 0x01, 0x08];
    /// BZip2 compression.
    pub const BZIP2: &[u8] = &[0x04, 0x02, 0x02];
    /// BCJ2 (4-stream x86) filter.
    pub const BCJ2: &[u8] = &[0x03, 0x03, 0x01, 0x1B];
    /// AES-256 encryption.
    pub const AES: &[u8] = &[0x06, 0xF1, 0x07, 0x01];

    /// Returns a human-readable name for a method ID.
    pub fn name(id: &[u8]) -> &'static str {
        match id {
            COPY => "Copy",
            LZMA => "LZMA",
            LZMA2 => "LZMA2",
            DEFLATE => "Deflate",
            BZIP2 => "BZip2",
            BCJ2 => "BCJ2",
            AES => "AES-256",
            _ => "Unknown",
        }
    }
}

/// Method IDs looked up to codec implementations.
pub struct CodecRegistry {
    codecs: Vec<Box<dyn Codec>>,
}

impl CodecRegistry {
    /// Creates a registry with no codecs.
    pub fn new() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Adds a codec, replacing any codec with the same method ID.
    pub fn register(mut self, codec: impl Codec + 'static) -> Self {
        self.codecs.retain(|c| c.method_id() != codec.method_id());
        self.codecs.push(Box::new(codec));
        self
    }

    /// Returns the codec for a method ID.
    pub fn get(&self, method_id: &[u8]) -> Option<&dyn Codec> {
        self.codecs
            .iter()
            .find(|c| c.method_id() == method_id)
            .map(|c| c.as_ref())
    }

    /// Returns `true` if a codec for the method ID is registered.
    pub fn supports(&self, method_id: &[u8]) -> bool {
        self.get(method_id).is_some()
    }

    /// Builds the decoder for one coder.
    ///
    /// # Errors
    ///
    /// - [`Error::PasswordRequired`] for encrypted coders with no password
    /// - [`Error::UnsupportedMethod`] for method IDs without a codec
    /// - [`Error::InvalidFormat`] if the input count does not match the coder
    pub fn decoder<'a>(
        &self,
        coder: &Coder,
        inputs: Vec<Box<dyn Read + 'a>>,
        unpack_size: u64,
        password: Option<&dyn PasswordProvider>,
    ) -> Result<Box<dyn Read + 'a>> {
        let lookup_password = || password.and_then(|p| p.password());

        let Some(codec) = self.get(&coder.method_id) else {
            if coder.method_id == method::AES && lookup_password().is_none() {
                return Err(Error::PasswordRequired);
            }
            return Err(Error::UnsupportedMethod {
                method_id: coder.method_id_u64(),
            });
        };

        let password = if codec.requires_password() {
            Some(lookup_password().ok_or(Error::PasswordRequired)?)
        } else {
            None
        };

        if inputs.len() as u64 != coder.num_in_streams {
            return Err(Error::InvalidFormat(format!(
                "{} coder declares {} inputs but {} were wired",
                codec.name(),
                coder.num_in_streams,
                inputs.len()
            )));
        }

        let decoder =
            codec.decoder(inputs, coder.properties(), unpack_size, password.as_deref())?;
        debug!(
            "{} decoder (method {:02x?}) for {} bytes",
            codec.name(),
            decoder.method_id(),
            unpack_size
        );
        Ok(Box::new(decoder))
    }

    /// Builds an encoder for a method ID.
    pub fn encoder<'a>(
        &self,
        method_id: &[u8],
        output: Box<dyn Write + 'a>,
        level: u32,
    ) -> Result<Box<dyn Encoder + 'a>> {
        let codec = self.get(method_id).ok_or_else(|| Error::UnsupportedMethod {
            method_id: method_id_u64(method_id),
        })?;
        codec.encoder(output, level.min(9))
    }
}

impl Default for CodecRegistry {
    /// Registers every built-in codec enabled at compile time.
    fn default() -> Self {
        let registry = Self::new().register(CopyCodec);
        #[cfg(feature = "lzma")]
        let registry = registry.register(LzmaCodec).register(Lzma2Codec);
        #[cfg(feature = "deflate")]
        let registry = registry.register(DeflateCodec);
        #[cfg(feature = "bzip2")]
        let registry = registry.register(Bzip2Codec);
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name()))
            .finish()
    }
}

fn method_id_u64(method_id: &[u8]) -> u64 {
    method_id
        .iter()
        .take(8)
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Unwraps the only input of a single-input codec.
pub(crate) fn single_input<'a>(
    mut inputs: Vec<Box<dyn Read + 'a>>,
    name: &str,
) -> Result<Box<dyn Read + 'a>> {
    match (inputs.pop(), inputs.is_empty()) {
        (Some(input), true) => Ok(input),
        _ => Err(Error::InvalidFormat(format!(
            "{name} takes exactly one input stream"
        ))),
    }
}

/// Maps a codec library error into an I/O error of kind `InvalidData`.
pub(crate) fn invalid_data(err: impl fmt::Display) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
