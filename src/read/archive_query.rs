//! Entry listing and lookup.

use crate::format::files::ArchiveEntry;
use crate::format::parser::Header;
use crate::lifecycle::LifecycleState;
use crate::{Error, Result};

use super::Extractor;

impl<R> Extractor<'_, R> {
    /// Returns every entry in header order. Empty once the extractor is closed.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Returns the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] for an index past the last entry,
    /// or [`Error::InvalidState`] once closed.
    pub fn entry(&self, index: usize) -> Result<&ArchiveEntry> {
        self.state.ensure_open("look up an entry")?;
        self.entries.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.entries.len(),
        })
    }

    /// Returns the index of the first entry named `name`.
    ///
    /// Backslashes in `name` match `/` in entry names.
    pub fn find(&self, name: &str) -> Option<usize> {
        let name = name.replace('\\', "/");
        self.entries.iter().position(|e| e.name == name)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Releases the archive. Every later operation fails with
    /// [`Error::InvalidState`]; closing twice is a no-op.
    pub fn close(&mut self) {
        self.entries.clear();
        self.folder_entries.clear();
        self.state = LifecycleState::Closed;
    }
}
