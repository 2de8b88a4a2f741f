//! Streams info structures: pack info, folders and sub-stream splits.
//!
//! These structures describe where the packed streams live in the container,
//! how each folder's coders turn them back into raw bytes, and how a folder's
//! output is divided between logical files.

use std::io::Write;

use log::warn;

use crate::{Error, Result};

use super::reader::{read_all_or_bits, read_bytes, read_u8, read_u32_le, read_variable_u64};
use super::writer::{write_all_or_bits, write_u8, write_u32_le, write_variable_u64};
use super::{HeaderCursor, PropertyId, read_property_id, remaining, unexpected_property};

/// Maximum number of coders accepted in one folder.
pub const MAX_CODERS_PER_FOLDER: usize = 64;

/// Maximum number of input or output streams accepted for one coder.
pub const MAX_CODER_STREAMS: u64 = 64;

/// Limits applied while parsing untrusted headers.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum number of entries, folders, pack streams or sub-streams.
    pub max_entries: usize,
    /// Maximum size of the (decoded) header in bytes.
    pub max_header_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_entries: 1_000_000,
            max_header_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ResourceLimits {
    /// Creates the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates limits that accept anything addressable.
    pub fn unlimited() -> Self {
        Self {
            max_entries: usize::MAX,
            max_header_bytes: u64::MAX,
        }
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Sets the maximum header size.
    pub fn max_header_bytes(mut self, max: u64) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Checks a declared element count and converts it to `usize`.
    pub(crate) fn check_count(&self, what: &str, count: u64) -> Result<usize> {
        match usize::try_from(count) {
            Ok(n) if n <= self.max_entries => Ok(n),
            _ => Err(Error::ResourceLimitExceeded(format!(
                "too many {what}: {count} (limit {})",
                self.max_entries
            ))),
        }
    }
}

/// Reads a sparse digest list for `count` streams.
///
/// A presence vector comes first; only the defined CRCs follow, in stream order.
pub fn read_digests(r: &mut HeaderCursor<'_>, count: usize) -> Result<Vec<Option<u32>>> {
    let defined = read_all_or_bits(r, count)?;
    defined
        .into_iter()
        .map(|has_crc| {
            if has_crc {
                Ok(Some(read_u32_le(r)?))
            } else {
                Ok(None)
            }
        })
        .collect()
}

/// Writes a sparse digest list.
pub fn write_digests<W: Write>(w: &mut W, digests: &[Option<u32>]) -> Result<()> {
    let defined: Vec<bool> = digests.iter().map(Option::is_some).collect();
    write_all_or_bits(w, &defined)?;
    for crc in digests.iter().flatten() {
        write_u32_le(w, *crc)?;
    }
    Ok(())
}

fn write_id<W: Write>(w: &mut W, id: PropertyId) -> Result<()> {
    write_u8(w, id.as_u8())?;
    Ok(())
}

/// Pack stream information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackInfo {
    /// Position of the first packed stream, relative to the end of the prologue.
    pub pack_pos: u64,
    /// Size of each packed stream.
    pub pack_sizes: Vec<u64>,
    /// Optional CRC of each packed stream.
    pub pack_digests: Vec<Option<u32>>,
}

impl PackInfo {
    /// Parses PackInfo; the reader is positioned after the tag.
    pub fn parse(r: &mut HeaderCursor<'_>, limits: &ResourceLimits) -> Result<Self> {
        let pack_pos = read_variable_u64(r)?;
        let num_streams = limits.check_count("pack streams", read_variable_u64(r)?)?;

        let mut pack_sizes = vec![0; num_streams];
        let mut pack_digests = vec![None; num_streams];

        loop {
            let offset = r.position();
            match read_property_id(r)? {
                PropertyId::End => break,
                PropertyId::Size => {
                    for size in pack_sizes.iter_mut() {
                        *size = read_variable_u64(r)?;
                    }
                }
                PropertyId::Crc => pack_digests = read_digests(r, num_streams)?,
                other => return Err(unexpected_property(offset, other, "pack info")),
            }
        }

        Ok(Self {
            pack_pos,
            pack_sizes,
            pack_digests,
        })
    }

    /// Writes PackInfo including its tag.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_id(w, PropertyId::PackInfo)?;
        write_variable_u64(w, self.pack_pos)?;
        write_variable_u64(w, self.pack_sizes.len() as u64)?;

        write_id(w, PropertyId::Size)?;
        for &size in &self.pack_sizes {
            write_variable_u64(w, size)?;
        }

        if self.pack_digests.iter().any(Option::is_some) {
            write_id(w, PropertyId::Crc)?;
            write_digests(w, &self.pack_digests)?;
        }

        write_id(w, PropertyId::End)
    }

    /// Returns the number of pack streams.
    pub fn num_streams(&self) -> usize {
        self.pack_sizes.len()
    }

    /// Returns the total packed size.
    pub fn total_packed_size(&self) -> u64 {
        self.pack_sizes.iter().sum()
    }
}

/// A coder descriptor: one compression, filter or encryption stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coder {
    /// Method ID bytes (variable length, typically 1-4 bytes).
    pub method_id: Vec<u8>,
    /// Number of input streams.
    pub num_in_streams: u64,
    /// Number of output streams.
    pub num_out_streams: u64,
    /// Optional coder properties (e.g., LZMA dictionary size).
    pub properties: Option<Vec<u8>>,
}

impl Coder {
    const ID_SIZE_MASK: u8 = 0x0F;
    const COMPLEX: u8 = 0x10;
    const HAS_PROPERTIES: u8 = 0x20;
    const RESERVED: u8 = 0xC0;

    /// Creates a one-input, one-output coder.
    pub fn simple(method_id: &[u8], properties: Option<Vec<u8>>) -> Self {
        Self {
            method_id: method_id.to_vec(),
            num_in_streams: 1,
            num_out_streams: 1,
            properties,
        }
    }

    /// Returns `true` if the coder has exactly one input and one output.
    pub fn is_simple(&self) -> bool {
        self.num_in_streams == 1 && self.num_out_streams == 1
    }

    /// Returns the method ID as a u64 for display and comparisons.
    pub fn method_id_u64(&self) -> u64 {
        self.method_id
            .iter()
            .take(8)
            .fold(0u64, |acc, &byte| (acc << 8) | byte as u64)
    }

    /// Returns the properties blob, or an empty slice.
    pub fn properties(&self) -> &[u8] {
        self.properties.as_deref().unwrap_or(&[])
    }

    fn parse(r: &mut HeaderCursor<'_>) -> Result<Self> {
        let offset = r.position();
        let flags = read_u8(r)?;
        if flags & Self::RESERVED != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "alternative coder methods",
            });
        }

        let method_id = read_bytes(r, (flags & Self::ID_SIZE_MASK) as usize)?;

        let (num_in_streams, num_out_streams) = if flags & Self::COMPLEX != 0 {
            (read_variable_u64(r)?, read_variable_u64(r)?)
        } else {
            (1, 1)
        };
        if num_in_streams > MAX_CODER_STREAMS || num_out_streams > MAX_CODER_STREAMS {
            return Err(Error::corrupt_header(offset, "coder stream count too large"));
        }

        let properties = if flags & Self::HAS_PROPERTIES != 0 {
            let size = read_variable_u64(r)?;
            if size > remaining(r) {
                return Err(Error::corrupt_header(offset, "coder properties exceed header"));
            }
            Some(read_bytes(r, size as usize)?)
        } else {
            None
        };

        Ok(Self {
            method_id,
            num_in_streams,
            num_out_streams,
            properties,
        })
    }

    fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut flags = self.method_id.len() as u8 & Self::ID_SIZE_MASK;
        if !self.is_simple() {
            flags |= Self::COMPLEX;
        }
        if self.properties.is_some() {
            flags |= Self::HAS_PROPERTIES;
        }
        write_u8(w, flags)?;
        w.write_all(&self.method_id)?;

        if !self.is_simple() {
            write_variable_u64(w, self.num_in_streams)?;
            write_variable_u64(w, self.num_out_streams)?;
        }
        if let Some(props) = &self.properties {
            write_variable_u64(w, props.len() as u64)?;
            w.write_all(props)?;
        }
        Ok(())
    }
}

/// A binding pair wiring one coder's output into another coder's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPair {
    /// Folder-wide index of the consuming input stream.
    pub in_index: u64,
    /// Folder-wide index of the producing output stream.
    pub out_index: u64,
}

/// A folder: one compression unit.
///
/// Holds an ordered coder list, the bind pairs wiring coders together, and
/// the input ids fed directly by packed streams. Exactly one output stream is
/// left unbound; that is the folder's primary output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// List of coders in this folder.
    pub coders: Vec<Coder>,
    /// Binding pairs connecting coder streams.
    pub bind_pairs: Vec<BindPair>,
    /// Input stream ids fed by packed streams, in pack stream order.
    pub packed_streams: Vec<u64>,
    /// Unpacked size of every output stream, indexed by output id.
    pub unpack_sizes: Vec<u64>,
    /// Optional CRC of the primary output.
    pub unpack_crc: Option<u32>,
}

impl Folder {
    /// Creates a folder from its wiring, validating the coder graph.
    ///
    /// Unpack sizes and CRC are filled in once the folder has been encoded.
    pub fn new(coders: Vec<Coder>, bind_pairs: Vec<BindPair>, packed_streams: Vec<u64>) -> Result<Self> {
        let folder = Self {
            coders,
            bind_pairs,
            packed_streams,
            unpack_sizes: Vec::new(),
            unpack_crc: None,
        };
        folder.validate()?;
        Ok(folder)
    }

    /// Creates a folder holding a single simple coder fed by one packed stream.
    pub fn single(coder: Coder) -> Self {
        Self {
            coders: vec![coder],
            bind_pairs: Vec::new(),
            packed_streams: vec![0],
            unpack_sizes: Vec::new(),
            unpack_crc: None,
        }
    }

    fn parse(r: &mut HeaderCursor<'_>, limits: &ResourceLimits) -> Result<Self> {
        let offset = r.position();
        let num_coders = read_variable_u64(r)?;
        if num_coders == 0 || num_coders > MAX_CODERS_PER_FOLDER as u64 {
            return Err(Error::corrupt_header(
                offset,
                format!("invalid coder count in folder: {num_coders}"),
            ));
        }

        let coders = (0..num_coders)
            .map(|_| Coder::parse(r))
            .collect::<Result<Vec<_>>>()?;

        let total_in: u64 = coders.iter().map(|c| c.num_in_streams).sum();
        let total_out: u64 = coders.iter().map(|c| c.num_out_streams).sum();
        if total_out == 0 {
            return Err(Error::corrupt_header(offset, "folder has no output streams"));
        }

        let num_bind_pairs = total_out - 1;
        let mut bind_pairs = Vec::with_capacity(num_bind_pairs as usize);
        for _ in 0..num_bind_pairs {
            bind_pairs.push(BindPair {
                in_index: read_variable_u64(r)?,
                out_index: read_variable_u64(r)?,
            });
        }

        let num_packed = total_in.checked_sub(num_bind_pairs).ok_or_else(|| {
            Error::corrupt_header(offset, "folder has more bind pairs than inputs")
        })?;

        let packed_streams = if num_packed == 1 {
            // A single packed stream feeds the one input no bind pair names.
            (0..total_in)
                .find(|&input| !bind_pairs.iter().any(|bp| bp.in_index == input))
                .into_iter()
                .collect()
        } else {
            let num_packed = limits.check_count("packed streams", num_packed)?;
            (0..num_packed)
                .map(|_| read_variable_u64(r))
                .collect::<std::io::Result<Vec<_>>>()?
        };

        let folder = Self {
            coders,
            bind_pairs,
            packed_streams,
            unpack_sizes: Vec::new(),
            unpack_crc: None,
        };
        folder.validate()?;
        Ok(folder)
    }

    fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_variable_u64(w, self.coders.len() as u64)?;
        for coder in &self.coders {
            coder.write(w)?;
        }
        for bp in &self.bind_pairs {
            write_variable_u64(w, bp.in_index)?;
            write_variable_u64(w, bp.out_index)?;
        }
        if self.packed_streams.len() > 1 {
            for &index in &self.packed_streams {
                write_variable_u64(w, index)?;
            }
        }
        Ok(())
    }

    /// Checks the structural invariants of the coder graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when the bind pair or packed stream
    /// counts disagree with the coder stream counts, an index is out of range,
    /// an input or output is wired twice, or the folder does not have exactly
    /// one primary output.
    pub fn validate(&self) -> Result<()> {
        if self.coders.is_empty() || self.coders.len() > MAX_CODERS_PER_FOLDER {
            return Err(Error::InvalidFormat(format!(
                "invalid coder count in folder: {}",
                self.coders.len()
            )));
        }

        let total_in = self.total_in_streams();
        let total_out = self.total_out_streams();
        if total_out == 0 || self.bind_pairs.len() as u64 != total_out - 1 {
            return Err(Error::InvalidFormat(format!(
                "folder declares {} bind pairs for {} output streams",
                self.bind_pairs.len(),
                total_out
            )));
        }
        if self.packed_streams.len() as u64 + self.bind_pairs.len() as u64 != total_in {
            return Err(Error::InvalidFormat(format!(
                "folder has {} packed streams and {} bind pairs for {} input streams",
                self.packed_streams.len(),
                self.bind_pairs.len(),
                total_in
            )));
        }

        let mut inputs_bound = vec![false; total_in as usize];
        let mut outputs_bound = vec![false; total_out as usize];
        for (i, bp) in self.bind_pairs.iter().enumerate() {
            if bp.in_index >= total_in || bp.out_index >= total_out {
                return Err(Error::InvalidFormat(format!(
                    "bind pair {i} ({} <- {}) out of range",
                    bp.in_index, bp.out_index
                )));
            }
            if std::mem::replace(&mut outputs_bound[bp.out_index as usize], true) {
                return Err(Error::InvalidFormat(format!(
                    "output stream {} is bound more than once",
                    bp.out_index
                )));
            }
            if std::mem::replace(&mut inputs_bound[bp.in_index as usize], true) {
                return Err(Error::InvalidFormat(format!(
                    "input stream {} is bound more than once",
                    bp.in_index
                )));
            }
        }

        for &input in &self.packed_streams {
            if input >= total_in || std::mem::replace(&mut inputs_bound[input as usize], true) {
                return Err(Error::InvalidFormat(format!(
                    "packed stream input {input} is out of range or already bound"
                )));
            }
        }

        self.primary_output().map(|_| ())
    }

    /// Returns the id of the one output stream that no bind pair consumes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if zero or several outputs are unbound.
    pub fn primary_output(&self) -> Result<u64> {
        let mut unbound = (0..self.total_out_streams())
            .filter(|&out| self.find_bind_pair_for_out_stream(out).is_none());
        match (unbound.next(), unbound.next()) {
            (Some(out), None) => Ok(out),
            (None, _) => Err(Error::InvalidFormat(
                "folder has no primary output stream".into(),
            )),
            (Some(_), Some(_)) => Err(Error::InvalidFormat(
                "folder has more than one primary output stream".into(),
            )),
        }
    }

    /// Returns the unpacked size of the primary output.
    pub fn unpack_size(&self) -> Result<u64> {
        let primary = self.primary_output()?;
        self.unpack_sizes
            .get(primary as usize)
            .copied()
            .ok_or_else(|| Error::InvalidFormat("folder has no unpack size".into()))
    }

    /// Returns the total number of input streams across all coders.
    pub fn total_in_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_in_streams).sum()
    }

    /// Returns the total number of output streams.
    pub fn total_out_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_out_streams).sum()
    }

    /// Finds the bind pair whose input is the given stream id.
    pub fn find_bind_pair_for_in_stream(&self, in_stream_idx: u64) -> Option<&BindPair> {
        self.bind_pairs
            .iter()
            .find(|bp| bp.in_index == in_stream_idx)
    }

    /// Finds the bind pair whose output is the given stream id.
    pub fn find_bind_pair_for_out_stream(&self, out_stream_idx: u64) -> Option<&BindPair> {
        self.bind_pairs
            .iter()
            .find(|bp| bp.out_index == out_stream_idx)
    }

    /// Returns the position within the folder's packed streams that feeds the
    /// given input id.
    pub fn find_packed_stream_index(&self, in_stream_idx: u64) -> Option<usize> {
        self.packed_streams
            .iter()
            .position(|&ps| ps == in_stream_idx)
    }
}

/// Unpack info: the folder list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackInfo {
    /// List of folders.
    pub folders: Vec<Folder>,
}

impl UnpackInfo {
    /// Parses UnpackInfo; the reader is positioned after the tag.
    pub fn parse(r: &mut HeaderCursor<'_>, limits: &ResourceLimits) -> Result<Self> {
        expect_property(r, PropertyId::Folder, "unpack info")?;
        let num_folders = limits.check_count("folders", read_variable_u64(r)?)?;

        if read_u8(r)? != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "external folder definitions",
            });
        }

        let mut folders = (0..num_folders)
            .map(|_| Folder::parse(r, limits))
            .collect::<Result<Vec<_>>>()?;

        expect_property(r, PropertyId::CodersUnpackSize, "unpack info")?;
        for folder in &mut folders {
            folder.unpack_sizes = (0..folder.total_out_streams())
                .map(|_| read_variable_u64(r))
                .collect::<std::io::Result<Vec<_>>>()?;
        }

        loop {
            let offset = r.position();
            match read_property_id(r)? {
                PropertyId::End => break,
                PropertyId::Crc => {
                    let digests = read_digests(r, folders.len())?;
                    for (folder, crc) in folders.iter_mut().zip(digests) {
                        folder.unpack_crc = crc;
                    }
                }
                other => return Err(unexpected_property(offset, other, "unpack info")),
            }
        }

        Ok(Self { folders })
    }

    /// Writes UnpackInfo including its tag.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_id(w, PropertyId::UnpackInfo)?;
        write_id(w, PropertyId::Folder)?;
        write_variable_u64(w, self.folders.len() as u64)?;
        write_u8(w, 0)?;
        for folder in &self.folders {
            folder.write(w)?;
        }

        write_id(w, PropertyId::CodersUnpackSize)?;
        for (index, folder) in self.folders.iter().enumerate() {
            if folder.unpack_sizes.len() as u64 != folder.total_out_streams() {
                return Err(Error::InvalidFormat(format!(
                    "folder {index} has {} unpack sizes for {} output streams",
                    folder.unpack_sizes.len(),
                    folder.total_out_streams()
                )));
            }
            for &size in &folder.unpack_sizes {
                write_variable_u64(w, size)?;
            }
        }

        let digests: Vec<Option<u32>> = self.folders.iter().map(|f| f.unpack_crc).collect();
        if digests.iter().any(Option::is_some) {
            write_id(w, PropertyId::Crc)?;
            write_digests(w, &digests)?;
        }

        write_id(w, PropertyId::End)
    }
}

/// How folders split into logical output streams.
///
/// `unpack_sizes` and `digests` hold one element per sub-stream, folder by
/// folder. Digests of single-stream folders that carry a folder CRC reuse it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubStreamsInfo {
    /// Number of sub-streams in each folder.
    pub num_unpack_streams: Vec<u64>,
    /// Size of every sub-stream.
    pub unpack_sizes: Vec<u64>,
    /// Optional CRC of every sub-stream.
    pub digests: Vec<Option<u32>>,
}

impl SubStreamsInfo {
    /// Derives the split implied when a header carries no SubStreamsInfo:
    /// one stream per folder.
    pub fn one_per_folder(folders: &[Folder]) -> Result<Self> {
        Ok(Self {
            num_unpack_streams: vec![1; folders.len()],
            unpack_sizes: folders
                .iter()
                .map(Folder::unpack_size)
                .collect::<Result<Vec<_>>>()?,
            digests: folders.iter().map(|f| f.unpack_crc).collect(),
        })
    }

    /// Parses SubStreamsInfo; the reader is positioned after the tag.
    pub fn parse(
        r: &mut HeaderCursor<'_>,
        folders: &[Folder],
        limits: &ResourceLimits,
    ) -> Result<Self> {
        let mut num_unpack_streams = vec![1u64; folders.len()];

        let mut offset = r.position();
        let mut id = read_property_id(r)?;

        if id == PropertyId::NumUnpackStream {
            for count in num_unpack_streams.iter_mut() {
                *count = read_variable_u64(r)?;
            }
            offset = r.position();
            id = read_property_id(r)?;
        }

        let total: u64 = num_unpack_streams
            .iter()
            .try_fold(0u64, |acc, &n| acc.checked_add(n))
            .ok_or_else(|| Error::corrupt_header(offset, "sub-stream count overflow"))?;
        let total = limits.check_count("sub-streams", total)?;

        let mut unpack_sizes = Vec::with_capacity(total);
        let read_sizes = id == PropertyId::Size;
        for (folder, &count) in folders.iter().zip(&num_unpack_streams) {
            if count == 0 {
                continue;
            }
            let folder_size = folder.unpack_size()?;
            if !read_sizes && count > 1 {
                return Err(Error::corrupt_header(
                    offset,
                    "folder with several sub-streams has no sizes",
                ));
            }

            let mut sum = 0u64;
            if read_sizes {
                for _ in 1..count {
                    let size = read_variable_u64(r)?;
                    sum = sum
                        .checked_add(size)
                        .filter(|&s| s <= folder_size)
                        .ok_or_else(|| {
                            Error::corrupt_header(offset, "sub-stream sizes exceed folder size")
                        })?;
                    unpack_sizes.push(size);
                }
            }
            unpack_sizes.push(folder_size - sum);
        }
        if read_sizes {
            offset = r.position();
            id = read_property_id(r)?;
        }

        let needs_digest = |folder: &Folder, count: u64| count != 1 || folder.unpack_crc.is_none();
        let num_digests: usize = folders
            .iter()
            .zip(&num_unpack_streams)
            .filter(|(f, n)| needs_digest(f, **n))
            .map(|(_, &n)| n as usize)
            .sum();

        let mut stored = if id == PropertyId::Crc {
            let stored = read_digests(r, num_digests)?;
            offset = r.position();
            id = read_property_id(r)?;
            stored
        } else {
            vec![None; num_digests]
        }
        .into_iter();

        let mut digests = Vec::with_capacity(total);
        for (folder, &count) in folders.iter().zip(&num_unpack_streams) {
            if needs_digest(folder, count) {
                digests.extend(stored.by_ref().take(count as usize));
            } else {
                digests.push(folder.unpack_crc);
            }
        }

        if id != PropertyId::End {
            return Err(unexpected_property(offset, id, "sub-streams info"));
        }

        Ok(Self {
            num_unpack_streams,
            unpack_sizes,
            digests,
        })
    }

    /// Writes SubStreamsInfo including its tag.
    pub fn write<W: Write>(&self, w: &mut W, folders: &[Folder]) -> Result<()> {
        write_id(w, PropertyId::SubStreamsInfo)?;

        if self.num_unpack_streams.iter().any(|&n| n != 1) {
            write_id(w, PropertyId::NumUnpackStream)?;
            for &count in &self.num_unpack_streams {
                write_variable_u64(w, count)?;
            }
        }

        if self.num_unpack_streams.iter().any(|&n| n > 1) {
            write_id(w, PropertyId::Size)?;
            let mut sizes = self.unpack_sizes.iter();
            for &count in &self.num_unpack_streams {
                let folder_sizes: Vec<u64> =
                    sizes.by_ref().take(count as usize).copied().collect();
                // The last size of each folder is implied by the folder size.
                for &size in folder_sizes.iter().take(folder_sizes.len().saturating_sub(1)) {
                    write_variable_u64(w, size)?;
                }
            }
        }

        let mut stored = Vec::new();
        let mut digests = self.digests.iter();
        for (folder, &count) in folders.iter().zip(&self.num_unpack_streams) {
            let folder_digests = digests.by_ref().take(count as usize);
            if count != 1 || folder.unpack_crc.is_none() {
                stored.extend(folder_digests.copied());
            } else {
                folder_digests.for_each(drop);
            }
        }
        if stored.iter().any(Option::is_some) {
            write_id(w, PropertyId::Crc)?;
            write_digests(w, &stored)?;
        }

        write_id(w, PropertyId::End)
    }

    /// Returns the total number of sub-streams.
    pub fn total_streams(&self) -> u64 {
        self.num_unpack_streams.iter().sum()
    }
}

/// PackInfo, UnpackInfo and SubStreamsInfo together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamsInfo {
    /// Packed stream locations.
    pub pack_info: Option<PackInfo>,
    /// Folders.
    pub unpack_info: Option<UnpackInfo>,
    /// Sub-stream split of each folder.
    pub substreams_info: Option<SubStreamsInfo>,
}

impl StreamsInfo {
    /// Parses StreamsInfo; the reader is positioned after the tag.
    pub fn parse(r: &mut HeaderCursor<'_>, limits: &ResourceLimits) -> Result<Self> {
        let mut info = Self::default();

        loop {
            let offset = r.position();
            match read_property_id(r)? {
                PropertyId::End => break,
                PropertyId::PackInfo => info.pack_info = Some(PackInfo::parse(r, limits)?),
                PropertyId::UnpackInfo => info.unpack_info = Some(UnpackInfo::parse(r, limits)?),
                PropertyId::SubStreamsInfo => {
                    if info.unpack_info.is_none() {
                        warn!("sub-streams info at offset {offset:#x} precedes unpack info");
                    }
                    let folders = info.folders();
                    info.substreams_info = Some(SubStreamsInfo::parse(r, folders, limits)?);
                }
                other => return Err(unexpected_property(offset, other, "streams info")),
            }
        }

        Ok(info)
    }

    /// Writes StreamsInfo without a leading tag; the caller picks the tag.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        if let Some(pack_info) = &self.pack_info {
            pack_info.write(w)?;
        }
        if let Some(unpack_info) = &self.unpack_info {
            unpack_info.write(w)?;
        }
        if let Some(substreams) = &self.substreams_info {
            substreams.write(w, self.folders())?;
        }
        write_id(w, PropertyId::End)
    }

    /// Returns the folder list, empty when there is no UnpackInfo.
    pub fn folders(&self) -> &[Folder] {
        self.unpack_info
            .as_ref()
            .map(|u| u.folders.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the effective sub-stream split, deriving the default one when
    /// the header carries none.
    pub fn substreams(&self) -> Result<SubStreamsInfo> {
        match &self.substreams_info {
            Some(info) => Ok(info.clone()),
            None => SubStreamsInfo::one_per_folder(self.folders()),
        }
    }
}

fn expect_property(r: &mut HeaderCursor<'_>, expected: PropertyId, context: &str) -> Result<()> {
    let offset = r.position();
    let id = read_property_id(r)?;
    if id != expected {
        return Err(unexpected_property(offset, id, context));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_variable(buf: &mut Vec<u8>, value: u64) {
        write_variable_u64(buf, value).unwrap();
    }

    fn lzma_coder() -> Coder {
        Coder::simple(&[0x03, 0x01, 0x01], Some(vec![0x5D, 0, 0, 1, 0]))
    }

    fn folder_with_size(size: u64, crc: Option<u32>) -> Folder {
        let mut folder = Folder::single(lzma_coder());
        folder.unpack_sizes = vec![size];
        folder.unpack_crc = crc;
        folder
    }

    #[test]
    fn test_pack_info_basic() {
        let mut data = Vec::new();
        write_variable(&mut data, 0); // pack_pos
        write_variable(&mut data, 2); // num_pack_streams
        data.push(PropertyId::Size.as_u8());
        write_variable(&mut data, 100);
        write_variable(&mut data, 200);
        data.push(PropertyId::End.as_u8());

        let info = PackInfo::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default())
            .unwrap();
        assert_eq!(info.pack_sizes, vec![100, 200]);
        assert_eq!(info.pack_digests, vec![None, None]);
        assert_eq!(info.total_packed_size(), 300);
    }

    #[test]
    fn test_pack_info_partial_crcs() {
        let info = PackInfo {
            pack_pos: 10,
            pack_sizes: vec![5, 6, 7],
            pack_digests: vec![Some(0xAABBCCDD), None, Some(1)],
        };
        let mut data = Vec::new();
        info.write(&mut data).unwrap();

        // Skip the leading PackInfo tag.
        let parsed =
            PackInfo::parse(&mut Cursor::new(&data[1..]), &ResourceLimits::default()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_pack_info_resource_limit() {
        let mut data = Vec::new();
        write_variable(&mut data, 0);
        write_variable(&mut data, 1000);
        let limits = ResourceLimits::default().max_entries(10);
        let err = PackInfo::parse(&mut Cursor::new(&data[..]), &limits).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_pack_info_rejects_foreign_tag() {
        let mut data = Vec::new();
        write_variable(&mut data, 0);
        write_variable(&mut data, 1);
        data.push(PropertyId::Name.as_u8());
        let err = PackInfo::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default())
            .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_digests_sparse_storage() {
        let mut data = Vec::new();
        write_digests(&mut data, &[None, Some(0x11223344), None]).unwrap();
        // marker 0, bitmask 010xxxxx, one CRC
        assert_eq!(data, vec![0, 0b0100_0000, 0x44, 0x33, 0x22, 0x11]);

        let digests = read_digests(&mut Cursor::new(&data[..]), 3).unwrap();
        assert_eq!(digests, vec![None, Some(0x11223344), None]);
    }

    #[test]
    fn test_coder_method_id_u64() {
        assert_eq!(lzma_coder().method_id_u64(), 0x030101);
        assert_eq!(Coder::simple(&[0x21], None).method_id_u64(), 0x21);
    }

    #[test]
    fn test_coder_flags() {
        let mut data = Vec::new();
        lzma_coder().write(&mut data).unwrap();
        assert_eq!(data[0], 0x23);
        assert_eq!(&data[1..4], &[0x03, 0x01, 0x01]);

        let complex = Coder {
            method_id: vec![0x03, 0x03, 0x01, 0x1B],
            num_in_streams: 4,
            num_out_streams: 1,
            properties: None,
        };
        let mut data = Vec::new();
        complex.write(&mut data).unwrap();
        assert_eq!(data[0], 0x14);
        let parsed = Coder::parse(&mut Cursor::new(&data[..])).unwrap();
        assert_eq!(parsed, complex);
    }

    #[test]
    fn test_unpack_info_roundtrip() {
        let info = UnpackInfo {
            folders: vec![folder_with_size(1000, Some(0xDEADBEEF)), folder_with_size(5, None)],
        };
        let mut data = Vec::new();
        info.write(&mut data).unwrap();
        assert_eq!(data[0], PropertyId::UnpackInfo.as_u8());

        let parsed =
            UnpackInfo::parse(&mut Cursor::new(&data[1..]), &ResourceLimits::default()).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.folders[0].unpack_size().unwrap(), 1000);
    }

    #[test]
    fn test_unpack_info_requires_folder_tag() {
        let data = [PropertyId::CodersUnpackSize.as_u8()];
        let err = UnpackInfo::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default())
            .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_unpack_info_write_needs_size_per_output() {
        let info = UnpackInfo {
            folders: vec![Folder::single(lzma_coder())],
        };
        let err = info.write(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)), "{err:?}");
    }

    #[test]
    fn test_folder_packed_stream_count_is_limited() {
        let coder = Coder {
            method_id: vec![0x03, 0x03, 0x01, 0x1B],
            num_in_streams: 4,
            num_out_streams: 1,
            properties: None,
        };
        let folder = Folder::new(vec![coder], Vec::new(), vec![0, 1, 2, 3]).unwrap();
        let mut data = Vec::new();
        folder.write(&mut data).unwrap();

        let limits = ResourceLimits::default().max_entries(2);
        let err = Folder::parse(&mut Cursor::new(&data[..]), &limits).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)), "{err:?}");

        let parsed = Folder::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default()).unwrap();
        assert_eq!(parsed.packed_streams, [0, 1, 2, 3]);
    }

    fn two_coder_folder() -> Folder {
        // coder 0: filter (in 0, out 0); coder 1: codec (in 1, out 1)
        // codec output 1 feeds filter input 0; packed stream feeds input 1.
        Folder::new(
            vec![Coder::simple(&[0x03], Some(vec![0])), lzma_coder()],
            vec![BindPair {
                in_index: 0,
                out_index: 1,
            }],
            vec![1],
        )
        .unwrap()
    }

    #[test]
    fn test_folder_primary_output() {
        let mut folder = two_coder_folder();
        assert_eq!(folder.primary_output().unwrap(), 0);
        folder.unpack_sizes = vec![100, 100];
        assert_eq!(folder.unpack_size().unwrap(), 100);
        assert_eq!(folder.find_packed_stream_index(1), Some(0));
        assert_eq!(folder.find_bind_pair_for_in_stream(0).unwrap().out_index, 1);
    }

    #[test]
    fn test_folder_primary_output_is_not_the_last_size() {
        let mut folder = Folder::new(
            vec![lzma_coder(), Coder::simple(&[0x03], Some(vec![0]))],
            vec![BindPair {
                in_index: 1,
                out_index: 0,
            }],
            vec![0],
        )
        .unwrap();
        folder.unpack_sizes = vec![50, 70];
        assert_eq!(folder.primary_output().unwrap(), 1);
        assert_eq!(folder.unpack_size().unwrap(), 70);
    }

    #[test]
    fn test_folder_with_two_unbound_outputs_is_rejected() {
        // Three outputs, two bind pairs both naming output 0.
        let coder = || Coder::simple(&[0x00], None);
        let err = Folder::new(
            vec![coder(), coder(), coder()],
            vec![
                BindPair {
                    in_index: 1,
                    out_index: 0,
                },
                BindPair {
                    in_index: 2,
                    out_index: 0,
                },
            ],
            vec![0],
        )
        .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_folder_with_no_unbound_output_is_rejected() {
        let folder = Folder {
            coders: vec![Coder::simple(&[0x00], None)],
            bind_pairs: vec![BindPair {
                in_index: 0,
                out_index: 0,
            }],
            packed_streams: vec![],
            unpack_sizes: vec![],
            unpack_crc: None,
        };
        assert!(folder.primary_output().unwrap_err().is_format_error());
        assert!(folder.validate().unwrap_err().is_format_error());
    }

    #[test]
    fn test_folder_parse_infers_single_packed_stream() {
        let folder = two_coder_folder();
        let mut data = Vec::new();
        folder.write(&mut data).unwrap();
        let parsed = Folder::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default()).unwrap();
        assert_eq!(parsed.packed_streams, vec![1]);
        assert_eq!(parsed, folder);
    }

    #[test]
    fn test_substreams_single_file_per_folder() {
        let folders = vec![folder_with_size(1000, Some(0x12345678))];
        let data = [PropertyId::End.as_u8()];
        let info = SubStreamsInfo::parse(
            &mut Cursor::new(&data[..]),
            &folders,
            &ResourceLimits::default(),
        )
        .unwrap();
        assert_eq!(info.num_unpack_streams, vec![1]);
        assert_eq!(info.unpack_sizes, vec![1000]);
        assert_eq!(info.digests, vec![Some(0x12345678)]);
    }

    #[test]
    fn test_substreams_multiple_files() {
        let folders = vec![folder_with_size(100, None), folder_with_size(7, Some(9))];
        let info = SubStreamsInfo {
            num_unpack_streams: vec![3, 1],
            unpack_sizes: vec![10, 20, 70, 7],
            digests: vec![Some(1), Some(2), Some(3), Some(9)],
        };
        let mut data = Vec::new();
        info.write(&mut data, &folders).unwrap();

        let parsed = SubStreamsInfo::parse(
            &mut Cursor::new(&data[1..]),
            &folders,
            &ResourceLimits::default(),
        )
        .unwrap();
        assert_eq!(parsed, info);

        let sizes_sum: u64 = parsed.unpack_sizes[..3].iter().sum();
        assert_eq!(sizes_sum, folders[0].unpack_size().unwrap());
    }

    #[test]
    fn test_substreams_sizes_exceeding_folder_rejected() {
        let folders = vec![folder_with_size(10, None)];
        let mut data = vec![PropertyId::NumUnpackStream.as_u8()];
        write_variable(&mut data, 2);
        data.push(PropertyId::Size.as_u8());
        write_variable(&mut data, 11);
        data.push(PropertyId::End.as_u8());

        let err = SubStreamsInfo::parse(
            &mut Cursor::new(&data[..]),
            &folders,
            &ResourceLimits::default(),
        )
        .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_substreams_empty_folder() {
        let folders = vec![folder_with_size(0, None)];
        let mut data = vec![PropertyId::NumUnpackStream.as_u8()];
        write_variable(&mut data, 0);
        data.push(PropertyId::End.as_u8());
        let info = SubStreamsInfo::parse(
            &mut Cursor::new(&data[..]),
            &folders,
            &ResourceLimits::default(),
        )
        .unwrap();
        assert_eq!(info.total_streams(), 0);
        assert!(info.unpack_sizes.is_empty());
        assert!(info.digests.is_empty());
    }

    #[test]
    fn test_streams_info_roundtrip() {
        let folders = vec![folder_with_size(30, None)];
        let info = StreamsInfo {
            pack_info: Some(PackInfo {
                pack_pos: 0,
                pack_sizes: vec![25],
                pack_digests: vec![Some(42)],
            }),
            unpack_info: Some(UnpackInfo {
                folders: folders.clone(),
            }),
            substreams_info: Some(SubStreamsInfo {
                num_unpack_streams: vec![2],
                unpack_sizes: vec![10, 20],
                digests: vec![Some(1), None],
            }),
        };
        let mut data = Vec::new();
        info.write(&mut data).unwrap();

        let parsed = StreamsInfo::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default())
            .unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_streams_info_default_substreams() {
        let info = StreamsInfo {
            pack_info: None,
            unpack_info: Some(UnpackInfo {
                folders: vec![folder_with_size(4, Some(7)), folder_with_size(6, None)],
            }),
            substreams_info: None,
        };
        let derived = info.substreams().unwrap();
        assert_eq!(derived.unpack_sizes, vec![4, 6]);
        assert_eq!(derived.digests, vec![Some(7), None]);
    }
}
