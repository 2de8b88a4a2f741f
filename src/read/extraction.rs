//! Entry extraction to caller sinks and to the file system.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use log::{debug, info, trace, warn};

use crate::format::files::ArchiveEntry;
use crate::progress::{NoProgress, ProgressReporter};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

use super::decompression::ExtractProgress;
use super::path_safety::destination_path;
use super::{Extractor, Selection};

impl<R: Read + Seek> Extractor<'_, R> {
    /// Extracts the selected file entries through caller-supplied sinks.
    ///
    /// For every selected regular file, `open` is called when its first byte
    /// is ready and `close` receives the sink back once the entry's data has
    /// been written and its CRC verified. Zero-length files get an `open`
    /// and a `close` with no bytes in between. Directories and deletion
    /// markers are not passed to the callbacks.
    ///
    /// Unselected entries that share a folder with selected ones are still
    /// decoded, then discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::IndexOutOfRange`] if the selection names a missing entry
    /// - [`Error::CrcMismatch`] / [`Error::FolderCrcMismatch`] for damaged data
    /// - [`Error::StreamBoundary`] if a folder decodes short
    /// - any error returned by `open` or `close`
    pub fn extract_many<W, O, C>(&mut self, selection: &Selection, open: O, close: C) -> Result<()>
    where
        W: Write,
        O: FnMut(usize, &ArchiveEntry) -> Result<W>,
        C: FnMut(usize, &ArchiveEntry, W) -> Result<()>,
    {
        self.extract_many_with_progress(selection, open, close, &mut NoProgress)
    }

    /// Like [`extract_many`](Self::extract_many), reporting progress after
    /// every decoded entry. The reporter's return value is ignored.
    pub fn extract_many_with_progress<W, O, C>(
        &mut self,
        selection: &Selection,
        mut open: O,
        mut close: C,
        progress: &mut dyn ProgressReporter,
    ) -> Result<()>
    where
        W: Write,
        O: FnMut(usize, &ArchiveEntry) -> Result<W>,
        C: FnMut(usize, &ArchiveEntry, W) -> Result<()>,
    {
        self.state.ensure_open("extract")?;
        if let Some(index) = selection.max_index().filter(|&i| i >= self.entries.len()) {
            return Err(Error::IndexOutOfRange {
                index,
                count: self.entries.len(),
            });
        }

        let folders: BTreeSet<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(index, entry)| entry.has_stream() && selection.contains(*index))
            .filter_map(|(_, entry)| entry.folder_index)
            .collect();

        let total_bytes = folders
            .iter()
            .filter_map(|&f| self.folder_entries.get(f))
            .flatten()
            .map(|&i| self.entries[i].size)
            .sum();
        let mut progress = ExtractProgress::new(progress, total_bytes);

        for (index, entry) in self.entries.iter().enumerate() {
            if entry.is_file() && !entry.has_stream() && selection.contains(index) {
                let sink = open(index, entry)?;
                progress.entry_done(index, 0, true);
                close(index, entry, sink)?;
            }
        }

        // Compressed progress counts every folder before the current one,
        // decoded or not.
        for (folder_index, folder) in self.header.folders().iter().enumerate() {
            if folders.contains(&folder_index) {
                self.decode_folder(folder_index, selection, &mut open, &mut close, &mut progress)?;
            } else {
                trace!("folder {folder_index} has no selected entries");
            }
            progress.packed_bytes += self.layout.packed_size(folder, folder_index);
        }
        Ok(())
    }

    /// Extracts every file entry through sinks from `open`, flushing each
    /// sink when its entry is complete.
    pub fn extract_all<W, O>(&mut self, open: O) -> Result<()>
    where
        W: Write,
        O: FnMut(usize, &ArchiveEntry) -> Result<W>,
    {
        self.extract_many(&Selection::All, open, |_, _, mut sink: W| {
            sink.flush().map_err(Error::from)
        })
    }

    /// Writes the data of the entry at `index` to `sink` and returns its size.
    ///
    /// Entries without data write nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] for a missing entry, plus everything
    /// [`extract_many`](Self::extract_many) returns.
    pub fn extract_index<W: Write>(&mut self, index: usize, sink: &mut W) -> Result<u64> {
        let entry = self.entry(index)?;
        if !entry.has_stream() {
            if !entry.is_file() {
                warn!("entry {index} ('{}') has no data to extract", entry.name);
            }
            return Ok(0);
        }
        let size = entry.size;

        let mut slot = Some(sink);
        self.extract_many(
            &Selection::indices([index]),
            |_, _| {
                slot.take()
                    .ok_or_else(|| Error::StreamBoundary("entry opened twice".into()))
            },
            |_, _, sink: &mut W| sink.flush().map_err(Error::from),
        )?;
        Ok(size)
    }

    /// Writes the data of the first entry named `name` to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no entry has that name, plus
    /// everything [`extract_index`](Self::extract_index) returns.
    pub fn extract_name<W: Write>(&mut self, name: &str, sink: &mut W) -> Result<u64> {
        self.state.ensure_open("extract")?;
        let index = self
            .find(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        self.extract_index(index, sink)
    }

    /// Extracts the whole archive under `dir`.
    ///
    /// Directories are created first, deletion markers remove existing files
    /// when allowed, and existing files are overwritten, skipped or reported
    /// according to the options. Modification times are restored.
    ///
    /// # Errors
    ///
    /// - [`Error::PathTraversal`] if an entry name would escape `dir`
    /// - [`Error::FileConflict`] for an existing file when neither overwrite
    ///   nor skip is enabled; nothing is decoded in that case
    /// - any error from decoding or from the file system
    pub fn extract_all_to(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        self.extract_many_to_with_progress(&Selection::All, dir, &mut NoProgress)
    }

    /// Like [`extract_all_to`](Self::extract_all_to), reporting progress.
    pub fn extract_all_to_with_progress(
        &mut self,
        dir: impl AsRef<Path>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<()> {
        self.extract_many_to_with_progress(&Selection::All, dir, progress)
    }

    /// Extracts the entry at `index` under `dir`, with the same conflict
    /// handling as [`extract_all_to`](Self::extract_all_to).
    pub fn extract_index_to(&mut self, index: usize, dir: impl AsRef<Path>) -> Result<()> {
        self.extract_many_to(&Selection::indices([index]), dir)
    }

    /// Extracts the first entry named `name` under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no entry has that name, plus
    /// everything [`extract_all_to`](Self::extract_all_to) returns.
    pub fn extract_name_to(&mut self, name: &str, dir: impl AsRef<Path>) -> Result<()> {
        self.state.ensure_open("extract")?;
        let index = self
            .find(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        self.extract_index_to(index, dir)
    }

    /// Extracts the selected entries under `dir`.
    ///
    /// Only selected directories are created and only selected deletion
    /// markers are applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the selection names a missing
    /// entry, plus everything [`extract_all_to`](Self::extract_all_to) returns.
    pub fn extract_many_to(&mut self, selection: &Selection, dir: impl AsRef<Path>) -> Result<()> {
        self.extract_many_to_with_progress(selection, dir, &mut NoProgress)
    }

    /// Like [`extract_many_to`](Self::extract_many_to), reporting progress.
    pub fn extract_many_to_with_progress(
        &mut self,
        selection: &Selection,
        dir: impl AsRef<Path>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<()> {
        self.state.ensure_open("extract")?;
        if let Some(index) = selection.max_index().filter(|&i| i >= self.entries.len()) {
            return Err(Error::IndexOutOfRange {
                index,
                count: self.entries.len(),
            });
        }
        let dest = dir.as_ref();
        fs::create_dir_all(dest)?;

        let targets = self.prepare_destination(dest, selection)?;
        let files = Selection::indices(targets.keys().copied());

        self.extract_many_with_progress(
            &files,
            |index, _| {
                let path = targets.get(&index).ok_or_else(|| {
                    Error::InvalidFormat(format!("entry {index} has no destination"))
                })?;
                Ok(BufWriter::new(File::create(path)?))
            },
            |index, entry, writer: BufWriter<File>| {
                writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
                if let Some(path) = targets.get(&index) {
                    apply_mtime(path, entry.modified);
                }
                Ok(())
            },
            progress,
        )?;

        info!("extracted {} files to '{}'", targets.len(), dest.display());
        Ok(())
    }

    /// Handles the selected directories and deletion markers and resolves
    /// the path of every selected file that should be written.
    fn prepare_destination(
        &self,
        dest: &Path,
        selection: &Selection,
    ) -> Result<BTreeMap<usize, PathBuf>> {
        let preserve = self.options.preserve_directory_structure;
        let mut targets = BTreeMap::new();

        for (index, entry) in self.entries.iter().enumerate() {
            if !selection.contains(index) {
                continue;
            }
            let path = destination_path(dest, index, &entry.name, preserve)?;

            if entry.is_deleted {
                if self.options.allow_deletions && path.is_file() {
                    debug!("deleting '{}'", path.display());
                    fs::remove_file(&path)?;
                }
            } else if entry.is_directory {
                if !preserve {
                    debug!("directory '{}' ignored without structure", entry.name);
                } else if !path.is_dir() {
                    fs::create_dir_all(&path)?;
                    apply_mtime(&path, entry.modified);
                }
            } else {
                if path.exists() {
                    if self.options.overwrite_existing {
                        debug!("overwriting '{}'", path.display());
                    } else if self.options.skip_existing {
                        warn!("'{}' already exists, skipping", path.display());
                        continue;
                    } else {
                        return Err(Error::FileConflict {
                            path: path.display().to_string(),
                        });
                    }
                }
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                targets.insert(index, path);
            }
        }
        Ok(targets)
    }
}

fn apply_mtime(path: &Path, modified: Option<Timestamp>) {
    let Some(modified) = modified else {
        return;
    };
    let mtime = FileTime::from_system_time(modified.as_system_time());
    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        warn!(
            "Failed to set modification time on '{}': {}",
            path.display(),
            e
        );
    }
}
