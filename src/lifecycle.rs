//! Lifecycle of compressor and extractor handles.

use crate::{Error, Result};

/// The state of a [`Compressor`](crate::Compressor) or
/// [`Extractor`](crate::Extractor).
///
/// Handles start `Open`. A compressor moves to `Finalized` once its archive
/// has been written; either handle moves to `Closed` when closed. Every public
/// operation other than `close` requires `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Accepting operations.
    #[default]
    Open,
    /// The archive has been written; no further changes are possible.
    Finalized,
    /// The handle has been closed.
    Closed,
}

impl LifecycleState {
    /// Returns a lowercase name for messages.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Open => "open",
            LifecycleState::Finalized => "finalized",
            LifecycleState::Closed => "closed",
        }
    }

    /// Fails with [`Error::InvalidState`] unless the state is `Open`.
    pub(crate) fn ensure_open(self, operation: &'static str) -> Result<()> {
        match self {
            LifecycleState::Open => Ok(()),
            other => Err(Error::InvalidState {
                operation,
                state: other.as_str(),
            }),
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_open_is_accepted() {
        assert!(LifecycleState::Open.ensure_open("list entries").is_ok());

        let err = LifecycleState::Finalized.ensure_open("add a file").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                operation: "add a file",
                state: "finalized"
            }
        ));
        assert!(LifecycleState::Closed.ensure_open("extract").is_err());
    }
}
