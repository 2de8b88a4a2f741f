//! Entry registration.
//!
//! These methods only record entries; data is read at finalize time.

use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use log::debug;
use walkdir::WalkDir;

use crate::format::attributes;
use crate::format::files::ArchiveEntry;
use crate::{ArchivePath, Error, Result, Timestamp};

use super::{Compressor, EntrySource, PendingEntry};

impl<W: Write + Seek> Compressor<'_, W> {
    /// Registers a file from disk.
    ///
    /// The entry is named `name`, or the file's own name when `None`.
    /// Backslashes become `/` and leading separators are dropped. `modified`
    /// overrides the file's own modification time.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file does not exist or is not a regular file
    /// - [`Error::InvalidArchivePath`] if the name is not a valid entry name
    /// - [`Error::InvalidState`] if the compressor is not open
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        name: Option<&str>,
        modified: Option<Timestamp>,
    ) -> Result<()> {
        self.state.ensure_open("add a file")?;

        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a file", path.display()),
            )));
        }

        let name = match name {
            Some(name) => ArchivePath::normalize(name)?,
            None => {
                let file_name = path.file_name().ok_or_else(|| {
                    Error::InvalidArchivePath(format!("'{}' has no file name", path.display()))
                })?;
                ArchivePath::normalize(&file_name.to_string_lossy())?
            }
        };

        self.push_file(name, &metadata, path, modified);
        Ok(())
    }

    /// Registers data read from `reader` at finalize time.
    ///
    /// `size_hint` is used for progress totals; a hint of `Some(0)` registers
    /// an empty file without a data stream. The stored size is the number of
    /// bytes actually read.
    pub fn add_reader(
        &mut self,
        name: &str,
        reader: impl Read + 'static,
        size_hint: Option<u64>,
        modified: Option<Timestamp>,
    ) -> Result<()> {
        self.state.ensure_open("add a reader")?;
        let name = ArchivePath::normalize(name)?;

        let size = size_hint.unwrap_or(0);
        let empty = size_hint == Some(0);
        self.entries.push(PendingEntry {
            entry: ArchiveEntry {
                name: name.as_str().to_string(),
                size,
                modified,
                is_empty: empty,
                ..Default::default()
            },
            source: (!empty).then(|| EntrySource::Reader(Box::new(reader))),
        });
        Ok(())
    }

    /// Registers an in-memory buffer.
    pub fn add_bytes(
        &mut self,
        name: &str,
        data: impl Into<Vec<u8>>,
        modified: Option<Timestamp>,
    ) -> Result<()> {
        self.state.ensure_open("add bytes")?;
        let name = ArchivePath::normalize(name)?;

        let data = data.into();
        let empty = data.is_empty();
        self.entries.push(PendingEntry {
            entry: ArchiveEntry {
                name: name.as_str().to_string(),
                size: data.len() as u64,
                modified,
                is_empty: empty,
                ..Default::default()
            },
            source: (!empty).then_some(EntrySource::Bytes(data)),
        });
        Ok(())
    }

    /// Registers every file under `dir`.
    ///
    /// Entries are named relative to `dir` and placed under `archive_dir`
    /// when given. With directory structure preservation on and `recursive`
    /// set, the subdirectories themselves are registered too; with it off,
    /// files keep only their bare name. The root directory itself is never
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is not a directory or cannot be walked.
    pub fn add_directory(
        &mut self,
        dir: impl AsRef<Path>,
        archive_dir: Option<&str>,
        recursive: bool,
    ) -> Result<()> {
        self.state.ensure_open("add a directory")?;

        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("input directory '{}' does not exist", dir.display()),
            )));
        }

        let prefix = archive_dir
            .map(|d| d.replace('\\', "/").trim_matches('/').trim().to_string())
            .filter(|d| !d.is_empty());
        let preserve = self.options.preserve_directory_structure;

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();

        let mut added = 0usize;
        for item in walker {
            let item = item.map_err(|e| Error::Io(io::Error::other(e)))?;
            let relative = item.path().strip_prefix(dir).map_err(|_| {
                Error::InvalidArchivePath(format!("'{}' escapes its root", item.path().display()))
            })?;

            let relative = if preserve {
                ArchivePath::from_relative_path(relative)?
            } else {
                ArchivePath::normalize(&item.file_name().to_string_lossy())?
            };
            let name = match &prefix {
                Some(prefix) => ArchivePath::normalize(&format!("{prefix}/{relative}"))?,
                None => relative,
            };

            let metadata = item.metadata().map_err(|e| Error::Io(io::Error::other(e)))?;
            if metadata.is_dir() {
                if preserve && recursive {
                    self.push_directory(name, &metadata);
                    added += 1;
                }
            } else if metadata.is_file() {
                self.push_file(name, &metadata, item.path(), None);
                added += 1;
            } else {
                debug!("skipping special file '{}'", item.path().display());
            }
        }

        debug!("registered {added} entries from '{}'", dir.display());
        Ok(())
    }

    /// Registers a directory entry with no disk counterpart.
    pub fn add_empty_directory(&mut self, name: &str) -> Result<()> {
        self.state.ensure_open("add a directory")?;
        let name = ArchivePath::normalize(name)?;
        self.entries.push(PendingEntry {
            entry: ArchiveEntry {
                name: name.as_str().to_string(),
                attributes: Some(attributes::DIRECTORY),
                is_empty: true,
                is_directory: true,
                ..Default::default()
            },
            source: None,
        });
        Ok(())
    }

    /// Registers a deletion marker for `name`.
    ///
    /// Extracting the archive over a directory removes the file of that name.
    pub fn add_anti(&mut self, name: &str) -> Result<()> {
        self.state.ensure_open("add an anti-item")?;
        let name = ArchivePath::normalize(name)?;
        self.entries.push(PendingEntry {
            entry: ArchiveEntry {
                name: name.as_str().to_string(),
                is_empty: true,
                is_deleted: true,
                ..Default::default()
            },
            source: None,
        });
        Ok(())
    }

    fn push_file(
        &mut self,
        name: ArchivePath,
        metadata: &fs::Metadata,
        path: &Path,
        modified: Option<Timestamp>,
    ) {
        let size = metadata.len();
        self.entries.push(PendingEntry {
            entry: ArchiveEntry {
                name: name.as_str().to_string(),
                size,
                modified: modified.or_else(|| modified_time(metadata)),
                attributes: Some(attributes_from_metadata(metadata)),
                is_empty: size == 0,
                ..Default::default()
            },
            source: (size > 0).then(|| EntrySource::File(path.to_path_buf())),
        });
    }

    fn push_directory(&mut self, name: ArchivePath, metadata: &fs::Metadata) {
        self.entries.push(PendingEntry {
            entry: ArchiveEntry {
                name: name.as_str().to_string(),
                modified: modified_time(metadata),
                attributes: Some(attributes_from_metadata(metadata)),
                is_empty: true,
                is_directory: true,
                ..Default::default()
            },
            source: None,
        });
    }
}

fn modified_time(metadata: &fs::Metadata) -> Option<Timestamp> {
    metadata.modified().ok().and_then(Timestamp::from_system_time)
}

/// Windows attribute bits, plus the Unix mode in the high 16 bits on Unix.
fn attributes_from_metadata(metadata: &fs::Metadata) -> u32 {
    let mut attrs = if metadata.is_dir() {
        attributes::DIRECTORY
    } else {
        attributes::ARCHIVE
    };
    if metadata.permissions().readonly() {
        attrs |= attributes::READONLY;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        attrs |= attributes::UNIX_EXTENSION | ((metadata.permissions().mode() & 0xFFFF) << 16);
    }

    attrs
}
