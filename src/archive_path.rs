//! Validated entry names.

use crate::{Error, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Upper bound on the byte length of an entry name.
const MAX_PATH_LENGTH: usize = 32768;

/// A relative, `/`-separated entry name that cannot escape its extraction root.
///
/// A valid name:
/// - is non-empty and contains no NUL byte
/// - is not absolute and has no trailing separator
/// - has no empty, `.` or `..` segments (`\` also counts as a separator)
///
/// ```
/// use sevenz_container::ArchivePath;
///
/// let path = ArchivePath::new("dir/file.txt").unwrap();
/// assert_eq!(path.file_name(), "file.txt");
///
/// assert!(ArchivePath::new("../secret").is_err());
/// assert!(ArchivePath::new("/etc/passwd").is_err());
/// assert!(ArchivePath::new("a\\..\\b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Validates `s` as an entry name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] describing the first rule broken.
    pub fn new(s: &str) -> Result<Self> {
        validate(s)?;
        Ok(Self(s.to_string()))
    }

    /// Builds an entry name from user input, converting `\` to `/` and
    /// stripping leading `/`, `./` and trailing `/` before validating.
    pub fn normalize(s: &str) -> Result<Self> {
        let mut name = s.replace('\\', "/");
        loop {
            if let Some(rest) = name.strip_prefix("./") {
                name = rest.to_string();
            } else if let Some(rest) = name.strip_prefix('/') {
                name = rest.to_string();
            } else {
                break;
            }
        }
        let name = name.trim_end_matches('/');
        Self::new(name)
    }

    /// Builds an entry name from a path relative to some root directory.
    pub fn from_relative_path(path: &Path) -> Result<Self> {
        let segments = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(Ok(s.to_string_lossy().into_owned())),
                Component::CurDir => None,
                _ => Some(Err(Error::InvalidArchivePath(format!(
                    "'{}' is not a plain relative path",
                    path.display()
                )))),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(&segments.join("/"))
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns the enclosing directory name, if any.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rfind('/')
            .map(|pos| Self(self.0[..pos].to_string()))
    }

    /// Iterates over the segments.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Joins the name onto `root` one segment at a time.
    pub fn to_path_under(&self, root: &Path) -> PathBuf {
        self.components().fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }
}

fn validate(s: &str) -> Result<()> {
    let reject = |reason: &str| Err(Error::InvalidArchivePath(reason.to_string()));

    if s.is_empty() {
        return reject("empty path");
    }
    if s.contains('\0') {
        return reject("contains NUL byte");
    }
    if s.len() > MAX_PATH_LENGTH {
        return reject("path too long");
    }
    if s.starts_with('/') || s.starts_with('\\') || has_drive_prefix(s) {
        return reject("absolute path not allowed");
    }
    if s.ends_with('/') {
        return reject("trailing slash not allowed");
    }

    for segment in s.split(['/', '\\']) {
        match segment {
            "" => return reject("empty segment"),
            "." => return reject("'.' segment not allowed"),
            ".." => return reject("'..' segment not allowed"),
            _ => {}
        }
    }
    Ok(())
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
