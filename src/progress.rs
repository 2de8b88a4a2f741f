//! Progress reporting for compression and extraction.
//!
//! Both directions report through a [`ProgressReporter`], which receives a
//! [`ProgressUpdate`] each time an entry's bytes have been processed. During
//! compression, returning `false` aborts [`finalize`] with
//! [`Error::Cancelled`]. During extraction the return value is ignored.
//!
//! [`finalize`]: crate::Compressor::finalize
//! [`Error::Cancelled`]: crate::Error::Cancelled
//!
//! # Example
//!
//! ```rust
//! use sevenz_container::progress::{ProgressReporter, ProgressUpdate, progress_fn};
//!
//! let mut seen = 0u64;
//! let mut reporter = progress_fn(|update: &ProgressUpdate| {
//!     seen = update.processed_bytes;
//!     update.processed_bytes < 1024
//! });
//!
//! let update = ProgressUpdate {
//!     included: true,
//!     entry_index: 0,
//!     entry_bytes: 10,
//!     processed_bytes: 10,
//!     total_bytes: 100,
//!     packed_bytes: 4,
//! };
//! assert!(reporter.on_progress(&update));
//! drop(reporter);
//! assert_eq!(seen, 10);
//! ```

/// One progress notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Whether the entry was requested by the caller. Entries decoded only to
    /// get past them in a solid folder report `false`.
    pub included: bool,
    /// Index of the entry the bytes belong to.
    pub entry_index: usize,
    /// Size of that entry.
    pub entry_bytes: u64,
    /// Uncompressed bytes processed so far, across the whole operation.
    pub processed_bytes: u64,
    /// Total uncompressed bytes the operation will process.
    pub total_bytes: u64,
    /// Compressed bytes produced or consumed so far.
    pub packed_bytes: u64,
}

impl ProgressUpdate {
    /// Returns the completed fraction in percent.
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            self.processed_bytes as f64 / self.total_bytes as f64 * 100.0
        }
    }
}

/// Receives progress notifications.
pub trait ProgressReporter {
    /// Called once before any entry is processed.
    fn on_total(&mut self, total_bytes: u64) {
        let _ = total_bytes;
    }

    /// Called after each entry's bytes have been processed.
    ///
    /// Returns `true` to continue or `false` to request cancellation.
    fn on_progress(&mut self, update: &ProgressUpdate) -> bool {
        let _ = update;
        true
    }
}

/// A progress reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// A progress reporter that collects every update it receives.
#[derive(Debug, Default, Clone)]
pub struct StatisticsProgress {
    /// The announced total.
    pub total_bytes: u64,
    /// Every update, in arrival order.
    pub updates: Vec<ProgressUpdate>,
}

impl StatisticsProgress {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recent update.
    pub fn last(&self) -> Option<&ProgressUpdate> {
        self.updates.last()
    }
}

impl ProgressReporter for StatisticsProgress {
    fn on_total(&mut self, total_bytes: u64) {
        self.total_bytes = total_bytes;
    }

    fn on_progress(&mut self, update: &ProgressUpdate) -> bool {
        self.updates.push(*update);
        true
    }
}

/// A progress reporter that calls a closure.
pub struct ClosureProgress<F> {
    callback: F,
}

impl<F> ClosureProgress<F>
where
    F: FnMut(&ProgressUpdate) -> bool,
{
    /// Creates a progress reporter from a closure.
    ///
    /// The closure returns `true` to continue or `false` to cancel.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgress<F>
where
    F: FnMut(&ProgressUpdate) -> bool,
{
    fn on_progress(&mut self, update: &ProgressUpdate) -> bool {
        (self.callback)(update)
    }
}

impl<F> std::fmt::Debug for ClosureProgress<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureProgress").finish_non_exhaustive()
    }
}

/// Creates a closure-based progress reporter.
pub fn progress_fn<F>(f: F) -> ClosureProgress<F>
where
    F: FnMut(&ProgressUpdate) -> bool,
{
    ClosureProgress::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress_continues() {
        let mut reporter = NoProgress;
        reporter.on_total(10);
        assert!(reporter.on_progress(&ProgressUpdate::default()));
    }

    #[test]
    fn test_statistics_progress() {
        let mut reporter = StatisticsProgress::new();
        reporter.on_total(200);
        for i in 1..=2u64 {
            reporter.on_progress(&ProgressUpdate {
                included: true,
                entry_index: i as usize,
                entry_bytes: 100,
                processed_bytes: i * 100,
                total_bytes: 200,
                packed_bytes: i * 10,
            });
        }
        assert_eq!(reporter.total_bytes, 200);
        assert_eq!(reporter.updates.len(), 2);
        assert_eq!(reporter.last().unwrap().percentage(), 100.0);
    }

    #[test]
    fn test_closure_progress_can_cancel() {
        let mut calls = 0;
        let mut reporter = progress_fn(|_: &ProgressUpdate| {
            calls += 1;
            calls < 2
        });
        assert!(reporter.on_progress(&ProgressUpdate::default()));
        assert!(!reporter.on_progress(&ProgressUpdate::default()));
    }

    #[test]
    fn test_percentage_of_empty_total() {
        assert_eq!(ProgressUpdate::default().percentage(), 100.0);
    }
}
