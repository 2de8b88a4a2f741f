//! Mapping entry names onto the extraction directory.

use std::path::{Path, PathBuf};

use crate::{ArchivePath, Error, Result};

/// Returns the path entry `entry_index` extracts to under `dest`.
///
/// Names are checked with the same rules as [`ArchivePath`]: absolute
/// names, drive prefixes and `..` segments are rejected. Backslashes count as
/// separators. With `preserve` off, only the last segment is kept.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] for names that could escape `dest`.
pub(crate) fn destination_path(
    dest: &Path,
    entry_index: usize,
    name: &str,
    preserve: bool,
) -> Result<PathBuf> {
    let path = ArchivePath::new(&name.replace('\\', "/")).map_err(|_| Error::PathTraversal {
        entry_index,
        path: name.to_string(),
    })?;

    Ok(if preserve {
        path.to_path_under(dest)
    } else {
        dest.join(path.file_name())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_names() {
        let dest = Path::new("/out");
        assert_eq!(
            destination_path(dest, 0, "a\\b/c.txt", true).unwrap(),
            Path::new("/out/a/b/c.txt")
        );
        assert_eq!(
            destination_path(dest, 0, "a/b/c.txt", false).unwrap(),
            Path::new("/out/c.txt")
        );
    }

    #[test]
    fn test_escaping_names_are_rejected() {
        let dest = Path::new("/out");
        for name in ["../evil", "a/../../evil", "/etc/passwd", "C:\\evil", "a\\..\\..\\b", ""] {
            let err = destination_path(dest, 7, name, true).unwrap_err();
            assert!(
                matches!(err, Error::PathTraversal { entry_index: 7, .. }),
                "{name}"
            );
        }
    }
}
