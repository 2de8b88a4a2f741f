//! FILETIME timestamps.
//!
//! Entry times are stored as 64-bit counts of 100-nanosecond intervals since
//! 1601-01-01 UTC. [`Timestamp`] keeps that raw value and converts to
//! [`SystemTime`] when files are written to disk.
//!
//! ```rust
//! use sevenz_container::Timestamp;
//! use std::time::SystemTime;
//!
//! let ts = Timestamp::from_filetime(116444736000000000);
//! assert_eq!(ts.as_unix_secs(), 0);
//! assert_eq!(ts.as_system_time(), SystemTime::UNIX_EPOCH);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// FILETIME value of the Unix epoch.
pub const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// A file time with 100-nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Wraps a raw FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Converts a [`SystemTime`], truncating to 100ns.
    ///
    /// Returns `None` for times outside the FILETIME range.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let filetime = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => FILETIME_UNIX_DIFF.checked_add(intervals(after)?)?,
            Err(before) => FILETIME_UNIX_DIFF.checked_sub(intervals(before.duration())?)?,
        };
        Some(Self::from_filetime(filetime))
    }

    /// Current time.
    pub fn now() -> Option<Self> {
        Self::from_system_time(SystemTime::now())
    }

    /// Returns the raw FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Returns whole seconds relative to the Unix epoch, rounding toward
    /// negative infinity.
    pub fn as_unix_secs(&self) -> i64 {
        let secs = |intervals: u64| (intervals / INTERVALS_PER_SECOND) as i64;
        if self.filetime >= FILETIME_UNIX_DIFF {
            secs(self.filetime - FILETIME_UNIX_DIFF)
        } else {
            -secs(FILETIME_UNIX_DIFF - self.filetime + INTERVALS_PER_SECOND - 1)
        }
    }

    /// Converts to a [`SystemTime`] without losing precision.
    pub fn as_system_time(&self) -> SystemTime {
        let to_duration = |intervals: u64| {
            Duration::new(
                intervals / INTERVALS_PER_SECOND,
                ((intervals % INTERVALS_PER_SECOND) * 100) as u32,
            )
        };
        if self.filetime >= FILETIME_UNIX_DIFF {
            UNIX_EPOCH + to_duration(self.filetime - FILETIME_UNIX_DIFF)
        } else {
            UNIX_EPOCH - to_duration(FILETIME_UNIX_DIFF - self.filetime)
        }
    }
}

fn intervals(duration: Duration) -> Option<u64> {
    duration
        .as_secs()
        .checked_mul(INTERVALS_PER_SECOND)?
        .checked_add(u64::from(duration.subsec_nanos()) / 100)
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}
