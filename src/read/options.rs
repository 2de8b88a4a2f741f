//! Extraction options and entry selection.

use std::collections::BTreeSet;

use crate::codec::PasswordProvider;
use crate::format::streams::ResourceLimits;

/// Options for opening and extracting an archive.
///
/// # Example
///
/// ```rust
/// use sevenz_container::read::ExtractOptions;
///
/// let options = ExtractOptions::new()
///     .skip_existing(true)
///     .preserve_directory_structure(false);
/// assert!(!options.overwrite_existing);
/// ```
#[derive(Clone)]
pub struct ExtractOptions {
    /// Replace files that already exist at the destination.
    pub overwrite_existing: bool,
    /// Leave existing files alone instead of failing with
    /// [`Error::FileConflict`](crate::Error::FileConflict). Ignored when
    /// `overwrite_existing` is set.
    pub skip_existing: bool,
    /// Let deletion markers remove files from the destination.
    pub allow_deletions: bool,
    /// Recreate entry directories; otherwise every file lands directly in
    /// the destination under its bare file name.
    pub preserve_directory_structure: bool,
    /// Password offered to encrypted coders.
    pub password: Option<String>,
    /// Limits for parsing the header.
    pub limits: ResourceLimits,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite_existing: false,
            skip_existing: false,
            allow_deletions: false,
            preserve_directory_structure: true,
            password: None,
            limits: ResourceLimits::default(),
        }
    }
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("overwrite_existing", &self.overwrite_existing)
            .field("skip_existing", &self.skip_existing)
            .field("allow_deletions", &self.allow_deletions)
            .field("preserve_directory_structure", &self.preserve_directory_structure)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("limits", &self.limits)
            .finish()
    }
}

impl ExtractOptions {
    /// Creates extraction options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether existing files are overwritten.
    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    /// Sets whether existing files are skipped.
    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Sets whether deletion markers may remove files.
    pub fn allow_deletions(mut self, allow: bool) -> Self {
        self.allow_deletions = allow;
        self
    }

    /// Sets whether entry directories are recreated.
    pub fn preserve_directory_structure(mut self, preserve: bool) -> Self {
        self.preserve_directory_structure = preserve;
        self
    }

    /// Sets the password for encrypted archives.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the header parsing limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub(crate) fn password_provider(&self) -> Option<&dyn PasswordProvider> {
        self.password.as_ref().map(|p| p as &dyn PasswordProvider)
    }
}

/// Which entries an extraction touches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every entry.
    #[default]
    All,
    /// Only the entries at these indices.
    OnlyIndices(BTreeSet<usize>),
}

impl Selection {
    /// Selects the given indices.
    pub fn indices(indices: impl IntoIterator<Item = usize>) -> Self {
        Selection::OnlyIndices(indices.into_iter().collect())
    }

    /// Returns `true` if the entry at `index` is selected.
    pub fn contains(&self, index: usize) -> bool {
        match self {
            Selection::All => true,
            Selection::OnlyIndices(indices) => indices.contains(&index),
        }
    }

    /// Returns the largest selected index, if the selection is explicit.
    pub(crate) fn max_index(&self) -> Option<usize> {
        match self {
            Selection::All => None,
            Selection::OnlyIndices(indices) => indices.last().copied(),
        }
    }
}
