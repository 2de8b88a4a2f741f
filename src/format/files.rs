//! Files info: per-entry property tables and the entry overlay.
//!
//! FilesInfo is a list of size-prefixed property tables. Each table applies
//! either to every entry or, for [`FileProperty::EmptyFile`] and
//! [`FileProperty::Anti`], only to the entries already flagged as empty
//! streams.

use std::io::Write;

use crate::timestamp::Timestamp;
use crate::{Error, Result};

use super::reader::{
    count_true, read_all_or_bits, read_bool_vector, read_u8, read_u32_le, read_u64_le,
    read_variable_u64,
};
use super::streams::{ResourceLimits, StreamsInfo};
use super::writer::{
    write_all_or_bits, write_bool_vector, write_u8, write_u32_le, write_u64_le,
    write_variable_u64,
};
use super::{HeaderCursor, PropertyId, read_property_id, unexpected_property};

/// Upper bound on the length of one UTF-16 name, in code units.
const MAX_UTF16_STRING_LENGTH: usize = 32768;

/// A single entry in the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash-separated path within the archive.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC-32 of the uncompressed data.
    pub crc: Option<u32>,
    /// Last modification time.
    pub modified: Option<Timestamp>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// Last access time.
    pub accessed: Option<Timestamp>,
    /// Windows attribute bits; Unix mode in the high 16 bits when
    /// [`attributes::UNIX_EXTENSION`](super::attributes::UNIX_EXTENSION) is set.
    pub attributes: Option<u32>,
    /// The entry has no data stream.
    pub is_empty: bool,
    /// The entry is a directory.
    pub is_directory: bool,
    /// The entry is a deletion marker (anti-item).
    pub is_deleted: bool,
    /// Logical unpack-stream index, set for entries that carry data.
    pub stream_index: Option<usize>,
    /// Folder holding the entry's data.
    pub folder_index: Option<usize>,
    /// Position of the entry's sub-stream within its folder.
    pub index_in_folder: Option<usize>,
}

impl ArchiveEntry {
    /// Returns `true` for entries that carry a data stream.
    pub fn has_stream(&self) -> bool {
        !self.is_empty
    }

    /// Returns `true` for regular files, including zero-length ones.
    pub fn is_file(&self) -> bool {
        !self.is_directory && !self.is_deleted
    }
}

/// Which of the three entry times a [`FileProperty::Times`] table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKind {
    /// Creation time.
    Created,
    /// Last access time.
    Accessed,
    /// Last modification time.
    Modified,
}

impl TimeKind {
    fn property_id(self) -> PropertyId {
        match self {
            TimeKind::Created => PropertyId::CTime,
            TimeKind::Accessed => PropertyId::ATime,
            TimeKind::Modified => PropertyId::MTime,
        }
    }
}

/// One property table of FilesInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileProperty {
    /// One bit per entry: the entry has no data stream.
    EmptyStream(Vec<bool>),
    /// One bit per empty entry: the entry is a zero-length file rather than
    /// a directory.
    EmptyFile(Vec<bool>),
    /// One bit per empty entry: the entry is a deletion marker.
    Anti(Vec<bool>),
    /// One name per entry.
    Names(Vec<String>),
    /// One optional FILETIME per entry.
    Times {
        /// Which time the table holds.
        kind: TimeKind,
        /// Raw FILETIME values.
        times: Vec<Option<u64>>,
    },
    /// One optional attribute word per entry.
    Attributes(Vec<Option<u32>>),
    /// Alignment padding of the given length.
    Dummy(usize),
}

impl FileProperty {
    /// Returns the tag byte this table is stored under.
    pub fn property_id(&self) -> PropertyId {
        match self {
            FileProperty::EmptyStream(_) => PropertyId::EmptyStream,
            FileProperty::EmptyFile(_) => PropertyId::EmptyFile,
            FileProperty::Anti(_) => PropertyId::Anti,
            FileProperty::Names(_) => PropertyId::Name,
            FileProperty::Times { kind, .. } => kind.property_id(),
            FileProperty::Attributes(_) => PropertyId::WinAttributes,
            FileProperty::Dummy(_) => PropertyId::Dummy,
        }
    }

    /// Decodes one table body.
    ///
    /// `num_empty` is the number of entries flagged by an earlier
    /// EmptyStream table.
    fn parse(
        id: PropertyId,
        body: &[u8],
        num_files: usize,
        num_empty: usize,
        offset: u64,
    ) -> Result<Self> {
        let r = &mut HeaderCursor::new(body);
        let property = match id {
            PropertyId::EmptyStream => FileProperty::EmptyStream(read_bool_vector(r, num_files)?),
            PropertyId::EmptyFile => FileProperty::EmptyFile(read_bool_vector(r, num_empty)?),
            PropertyId::Anti => FileProperty::Anti(read_bool_vector(r, num_empty)?),
            PropertyId::Name => {
                expect_inline(r, "external file names")?;
                let names = (0..num_files)
                    .map(|_| read_utf16le_string(r))
                    .collect::<Result<Vec<_>>>()?;
                FileProperty::Names(names)
            }
            PropertyId::CTime | PropertyId::ATime | PropertyId::MTime => {
                let kind = match id {
                    PropertyId::CTime => TimeKind::Created,
                    PropertyId::ATime => TimeKind::Accessed,
                    _ => TimeKind::Modified,
                };
                let times = read_optional_table(r, num_files, "external timestamps", |r| {
                    read_u64_le(r)
                })?;
                FileProperty::Times { kind, times }
            }
            PropertyId::WinAttributes => FileProperty::Attributes(read_optional_table(
                r,
                num_files,
                "external attributes",
                |r| read_u32_le(r),
            )?),
            PropertyId::Dummy => FileProperty::Dummy(body.len()),
            other => return Err(unexpected_property(offset, other, "files info")),
        };
        Ok(property)
    }

    /// Writes the tag, the body size and the body.
    fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut body = Vec::new();
        match self {
            FileProperty::EmptyStream(bits)
            | FileProperty::EmptyFile(bits)
            | FileProperty::Anti(bits) => write_bool_vector(&mut body, bits)?,
            FileProperty::Names(names) => {
                write_u8(&mut body, 0)?;
                for name in names {
                    for unit in name.encode_utf16() {
                        body.extend_from_slice(&unit.to_le_bytes());
                    }
                    body.extend_from_slice(&[0, 0]);
                }
            }
            FileProperty::Times { times, .. } => {
                write_optional_table(&mut body, times, |w, t| write_u64_le(w, *t))?
            }
            FileProperty::Attributes(attrs) => {
                write_optional_table(&mut body, attrs, |w, a| write_u32_le(w, *a))?
            }
            FileProperty::Dummy(len) => body.resize(*len, 0),
        }

        write_u8(w, self.property_id().as_u8())?;
        write_variable_u64(w, body.len() as u64)?;
        w.write_all(&body)?;
        Ok(())
    }
}

fn expect_inline(r: &mut HeaderCursor<'_>, feature: &'static str) -> Result<()> {
    if read_u8(r)? != 0 {
        return Err(Error::UnsupportedFeature { feature });
    }
    Ok(())
}

fn read_optional_table<T>(
    r: &mut HeaderCursor<'_>,
    count: usize,
    external_feature: &'static str,
    mut read_value: impl FnMut(&mut HeaderCursor<'_>) -> std::io::Result<T>,
) -> Result<Vec<Option<T>>> {
    let defined = read_all_or_bits(r, count)?;
    expect_inline(r, external_feature)?;
    defined
        .into_iter()
        .map(|has_value| Ok(if has_value { Some(read_value(r)?) } else { None }))
        .collect()
}

fn write_optional_table<T>(
    w: &mut Vec<u8>,
    values: &[Option<T>],
    mut write_value: impl FnMut(&mut Vec<u8>, &T) -> std::io::Result<()>,
) -> Result<()> {
    let defined: Vec<bool> = values.iter().map(Option::is_some).collect();
    write_all_or_bits(w, &defined)?;
    write_u8(w, 0)?;
    for value in values.iter().flatten() {
        write_value(w, value)?;
    }
    Ok(())
}

/// Reads a UTF-16LE null-terminated string.
fn read_utf16le_string(r: &mut HeaderCursor<'_>) -> Result<String> {
    let mut units = Vec::new();
    loop {
        let offset = r.position();
        let mut buf = [0u8; 2];
        std::io::Read::read_exact(r, &mut buf)
            .map_err(|_| Error::corrupt_header(offset, "unterminated file name"))?;
        let unit = u16::from_le_bytes(buf);
        if unit == 0 {
            break;
        }
        if units.len() >= MAX_UTF16_STRING_LENGTH {
            return Err(Error::ResourceLimitExceeded(format!(
                "file name exceeds {MAX_UTF16_STRING_LENGTH} code units"
            )));
        }
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| Error::InvalidFormat("invalid UTF-16 file name".into()))
}

/// Files info from the archive header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesInfo {
    /// Number of entries.
    pub num_files: usize,
    /// Property tables in stored order.
    pub properties: Vec<FileProperty>,
}

impl FilesInfo {
    /// Parses FilesInfo; the reader is positioned after the tag.
    pub fn parse(r: &mut HeaderCursor<'_>, limits: &ResourceLimits) -> Result<Self> {
        let num_files = limits.check_count("entries", read_variable_u64(r)?)?;
        let mut properties = Vec::new();
        let mut num_empty = 0;

        loop {
            let offset = r.position();
            let id = read_property_id(r)?;
            if id == PropertyId::End {
                break;
            }
            let size = read_variable_u64(r)?;
            let body = take_body(r, size, offset)?;

            let property = FileProperty::parse(id, body, num_files, num_empty, offset)?;
            if let FileProperty::EmptyStream(bits) = &property {
                num_empty = count_true(bits);
            }
            properties.push(property);
        }

        Ok(Self {
            num_files,
            properties,
        })
    }

    /// Writes FilesInfo including its tag.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u8(w, PropertyId::FilesInfo.as_u8())?;
        write_variable_u64(w, self.num_files as u64)?;
        for property in &self.properties {
            property.write(w)?;
        }
        write_u8(w, PropertyId::End.as_u8())?;
        Ok(())
    }

    /// Returns the number of entries flagged by the EmptyStream table.
    pub fn num_empty(&self) -> usize {
        self.properties
            .iter()
            .find_map(|p| match p {
                FileProperty::EmptyStream(bits) => Some(count_true(bits)),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Builds the property tables describing `entries`.
    ///
    /// Tables whose every value would be absent or false are omitted; the
    /// name table is always present.
    pub fn from_entries(entries: &[ArchiveEntry]) -> Self {
        let mut properties = Vec::new();

        let empty_stream: Vec<bool> = entries.iter().map(|e| e.is_empty).collect();
        if empty_stream.contains(&true) {
            let empties: Vec<&ArchiveEntry> = entries.iter().filter(|e| e.is_empty).collect();
            properties.push(FileProperty::EmptyStream(empty_stream));

            let empty_file: Vec<bool> = empties.iter().map(|e| !e.is_directory).collect();
            if empty_file.contains(&true) {
                properties.push(FileProperty::EmptyFile(empty_file));
            }
            let anti: Vec<bool> = empties.iter().map(|e| e.is_deleted).collect();
            if anti.contains(&true) {
                properties.push(FileProperty::Anti(anti));
            }
        }

        properties.push(FileProperty::Names(
            entries.iter().map(|e| e.name.clone()).collect(),
        ));

        let time_tables = [
            (TimeKind::Created, entries.iter().map(|e| e.created).collect::<Vec<_>>()),
            (TimeKind::Accessed, entries.iter().map(|e| e.accessed).collect()),
            (TimeKind::Modified, entries.iter().map(|e| e.modified).collect()),
        ];
        for (kind, times) in time_tables {
            if times.iter().any(Option::is_some) {
                properties.push(FileProperty::Times {
                    kind,
                    times: times.iter().map(|t| t.map(|t| t.as_filetime())).collect(),
                });
            }
        }

        let attributes: Vec<Option<u32>> = entries.iter().map(|e| e.attributes).collect();
        if attributes.iter().any(Option::is_some) {
            properties.push(FileProperty::Attributes(attributes));
        }

        Self {
            num_files: entries.len(),
            properties,
        }
    }

    /// Overlays the property tables and the stream layout into entries.
    ///
    /// Sub-streams are assigned, folder by folder, to the entries that carry
    /// data, in entry order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when a table has the wrong length, or
    /// when the number of sub-streams and data-carrying entries disagree.
    pub fn to_entries(&self, streams: Option<&StreamsInfo>) -> Result<Vec<ArchiveEntry>> {
        let mut entries = vec![ArchiveEntry::default(); self.num_files];
        let table_len_error =
            |id: PropertyId| Error::InvalidFormat(format!("{id:?} table has the wrong length"));

        let mut empty_indices: Vec<usize> = Vec::new();
        for property in &self.properties {
            match property {
                FileProperty::EmptyStream(bits) => {
                    empty_indices.clear();
                    for (i, (entry, &empty)) in entries.iter_mut().zip(bits).enumerate() {
                        entry.is_empty = empty;
                        entry.is_directory = empty;
                        if empty {
                            empty_indices.push(i);
                        }
                    }
                }
                FileProperty::EmptyFile(bits) | FileProperty::Anti(bits) => {
                    if bits.len() != empty_indices.len() {
                        return Err(table_len_error(property.property_id()));
                    }
                    for (&i, &bit) in empty_indices.iter().zip(bits) {
                        if matches!(property, FileProperty::EmptyFile(_)) {
                            entries[i].is_directory = !bit;
                        } else {
                            entries[i].is_deleted = bit;
                        }
                    }
                }
                FileProperty::Names(names) => {
                    if names.len() != entries.len() {
                        return Err(table_len_error(PropertyId::Name));
                    }
                    for (entry, name) in entries.iter_mut().zip(names) {
                        entry.name = name.clone();
                    }
                }
                FileProperty::Times { kind, times } => {
                    for (entry, time) in entries.iter_mut().zip(times) {
                        let time = time.map(Timestamp::from_filetime);
                        match kind {
                            TimeKind::Created => entry.created = time,
                            TimeKind::Accessed => entry.accessed = time,
                            TimeKind::Modified => entry.modified = time,
                        }
                    }
                }
                FileProperty::Attributes(attrs) => {
                    for (entry, attr) in entries.iter_mut().zip(attrs) {
                        entry.attributes = *attr;
                    }
                }
                FileProperty::Dummy(_) => {}
            }
        }

        let Some(streams) = streams else {
            if let Some(entry) = entries.iter().find(|e| e.has_stream()) {
                return Err(Error::InvalidFormat(format!(
                    "entry '{}' has data but the archive has no streams",
                    entry.name
                )));
            }
            return Ok(entries);
        };

        let substreams = streams.substreams()?;
        let mut sizes = substreams.unpack_sizes.iter().zip(&substreams.digests);
        let mut data_entries = entries.iter_mut().filter(|e| e.has_stream());
        let mut stream_index = 0;

        for (folder_index, &count) in substreams.num_unpack_streams.iter().enumerate() {
            for index_in_folder in 0..count as usize {
                let (&size, &crc) = sizes.next().ok_or_else(|| {
                    Error::InvalidFormat("sub-stream table shorter than its counts".into())
                })?;
                let entry = data_entries.next().ok_or_else(|| {
                    Error::InvalidFormat("more data streams than non-empty entries".into())
                })?;
                entry.size = size;
                entry.crc = crc;
                entry.stream_index = Some(stream_index);
                entry.folder_index = Some(folder_index);
                entry.index_in_folder = Some(index_in_folder);
                stream_index += 1;
            }
        }

        if let Some(entry) = data_entries.next() {
            return Err(Error::InvalidFormat(format!(
                "entry '{}' has no data stream",
                entry.name
            )));
        }

        Ok(entries)
    }
}

fn take_body<'a>(r: &mut HeaderCursor<'a>, size: u64, offset: u64) -> Result<&'a [u8]> {
    let data: &'a [u8] = *r.get_ref();
    let start = r.position() as usize;
    let end = usize::try_from(size)
        .ok()
        .and_then(|size| start.checked_add(size))
        .filter(|&end| end <= data.len())
        .ok_or_else(|| Error::corrupt_header(offset, "property size exceeds header"))?;
    r.set_position(end as u64);
    Ok(&data[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::streams::{Coder, Folder, SubStreamsInfo, UnpackInfo};
    use std::io::Cursor;

    fn roundtrip(info: &FilesInfo) -> FilesInfo {
        let mut data = Vec::new();
        info.write(&mut data).unwrap();
        assert_eq!(data[0], PropertyId::FilesInfo.as_u8());
        FilesInfo::parse(&mut Cursor::new(&data[1..]), &ResourceLimits::default()).unwrap()
    }

    fn file(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.into(),
            ..Default::default()
        }
    }

    fn directory(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.into(),
            is_empty: true,
            is_directory: true,
            ..Default::default()
        }
    }

    fn one_folder_streams(sizes: Vec<u64>, digests: Vec<Option<u32>>) -> StreamsInfo {
        let mut folder = Folder::single(Coder::simple(&[0x00], None));
        folder.unpack_sizes = vec![sizes.iter().sum()];
        StreamsInfo {
            pack_info: None,
            unpack_info: Some(UnpackInfo {
                folders: vec![folder],
            }),
            substreams_info: Some(SubStreamsInfo {
                num_unpack_streams: vec![sizes.len() as u64],
                unpack_sizes: sizes,
                digests,
            }),
        }
    }

    #[test]
    fn test_utf16le_unicode_name() {
        let info = FilesInfo {
            num_files: 2,
            properties: vec![FileProperty::Names(vec!["日本語.txt".into(), "a/b".into()])],
        };
        assert_eq!(roundtrip(&info), info);
    }

    #[test]
    fn test_from_entries_tables() {
        let mut empty_file = file("empty.txt");
        empty_file.is_empty = true;
        let mut deleted = file("gone.txt");
        deleted.is_empty = true;
        deleted.is_deleted = true;
        let mut with_time = file("data.bin");
        with_time.modified = Some(Timestamp::from_filetime(132_000_000_000_000_000));

        let entries = vec![directory("dir"), empty_file, with_time, deleted];
        let info = FilesInfo::from_entries(&entries);
        assert_eq!(info.num_empty(), 3);

        let ids: Vec<PropertyId> = info.properties.iter().map(|p| p.property_id()).collect();
        assert_eq!(
            ids,
            vec![
                PropertyId::EmptyStream,
                PropertyId::EmptyFile,
                PropertyId::Anti,
                PropertyId::Name,
                PropertyId::MTime
            ]
        );
        assert_eq!(info.properties[1], FileProperty::EmptyFile(vec![false, true, true]));
        assert_eq!(roundtrip(&info), info);
    }

    #[test]
    fn test_overlay_flags() {
        let mut empty_file = file("empty.txt");
        empty_file.is_empty = true;
        let entries = vec![directory("dir"), empty_file];
        let info = FilesInfo::from_entries(&entries);

        let overlaid = roundtrip(&info).to_entries(None).unwrap();
        assert!(overlaid[0].is_directory && overlaid[0].is_empty);
        assert!(!overlaid[1].is_directory && overlaid[1].is_empty);
        assert!(overlaid[1].is_file());
        assert_eq!(overlaid[1].stream_index, None);
    }

    #[test]
    fn test_overlay_assigns_streams_to_non_empty_entries() {
        let entries = vec![file("a"), directory("d"), file("b"), file("c")];
        let info = FilesInfo::from_entries(&entries);
        let streams = one_folder_streams(vec![0, 5, 7], vec![Some(1), Some(2), None]);

        let overlaid = info.to_entries(Some(&streams)).unwrap();
        assert_eq!(overlaid[0].stream_index, Some(0));
        assert_eq!(overlaid[1].stream_index, None);
        assert_eq!(overlaid[2].size, 5);
        assert_eq!(overlaid[2].crc, Some(2));
        assert_eq!(overlaid[3].index_in_folder, Some(2));
        assert_eq!(overlaid[3].folder_index, Some(0));
        assert_eq!(overlaid[3].crc, None);
    }

    #[test]
    fn test_overlay_more_streams_than_entries() {
        let info = FilesInfo::from_entries(&[file("only")]);
        let streams = one_folder_streams(vec![1, 2], vec![None, None]);
        assert!(info.to_entries(Some(&streams)).unwrap_err().is_format_error());
    }

    #[test]
    fn test_overlay_missing_streams() {
        let info = FilesInfo::from_entries(&[file("a"), file("b")]);
        let streams = one_folder_streams(vec![1], vec![None]);
        assert!(info.to_entries(Some(&streams)).is_err());
    }

    #[test]
    fn test_unknown_file_property_fails() {
        let mut data = Vec::new();
        write_variable_u64(&mut data, 1).unwrap();
        data.push(PropertyId::Comment.as_u8());
        write_variable_u64(&mut data, 0).unwrap();
        data.push(PropertyId::End.as_u8());

        let err = FilesInfo::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default())
            .unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { offset: 1, .. }));
    }

    #[test]
    fn test_dummy_is_skipped() {
        let info = FilesInfo {
            num_files: 1,
            properties: vec![
                FileProperty::Dummy(3),
                FileProperty::Names(vec!["x".into()]),
            ],
        };
        let parsed = roundtrip(&info);
        assert_eq!(parsed, info);
        assert!(parsed.to_entries(None).unwrap_err().is_format_error());
    }

    #[test]
    fn test_property_size_beyond_header() {
        let mut data = Vec::new();
        write_variable_u64(&mut data, 1).unwrap();
        data.push(PropertyId::Name.as_u8());
        write_variable_u64(&mut data, 100).unwrap();
        let err = FilesInfo::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default())
            .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_external_names_unsupported() {
        let mut data = Vec::new();
        write_variable_u64(&mut data, 1).unwrap();
        data.push(PropertyId::Name.as_u8());
        write_variable_u64(&mut data, 2).unwrap();
        data.extend_from_slice(&[1, 0]);
        let err = FilesInfo::parse(&mut Cursor::new(&data[..]), &ResourceLimits::default())
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_attributes_and_times_sparse() {
        let info = FilesInfo {
            num_files: 3,
            properties: vec![
                FileProperty::Attributes(vec![Some(0x20), None, Some(0x8000_0020)]),
                FileProperty::Times {
                    kind: TimeKind::Created,
                    times: vec![None, Some(42), None],
                },
            ],
        };
        assert_eq!(roundtrip(&info), info);
    }
}
