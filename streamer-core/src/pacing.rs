//! Pacing arithmetic for replays.
//!
//! A replay maps stream time onto wall time through an [`Epoch`]: the instant
//! the epoch started and the stream timestamp seen at that instant. A record
//! with timestamp `ts` is due at
//!
//! ```text
//! epoch.wall + (ts - epoch.timestamp) * TIMESCALE seconds
//! ```
//!
//! When a timestamp goes backwards (the device rebooted or its counter
//! wrapped) the old epoch is useless, so [`ReplayCursor::advance`] starts a
//! new one at the current instant and the record is due immediately.
//!
//! Nothing here sleeps or reads clocks; callers pass `now` in.

use std::time::{Duration, Instant};

use crate::timestamp::Timestamp;

/// Seconds per timestamp unit. Recordings store microseconds.
pub const TIMESCALE: f64 = 1e-6;

/// Pacing baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epoch {
    pub wall: Instant,
    pub timestamp: Timestamp,
}

impl Epoch {
    pub fn new(wall: Instant, timestamp: Timestamp) -> Self {
        Self { wall, timestamp }
    }

    /// How long after the epoch start a record with `timestamp` is due.
    ///
    /// Timestamps before the epoch are due at once; absurdly distant ones
    /// saturate to `Duration::MAX`.
    pub fn offset(&self, timestamp: &Timestamp) -> Duration {
        let seconds = timestamp.units_since(&self.timestamp) * TIMESCALE;
        if seconds <= 0.0 {
            return Duration::ZERO;
        }
        // Round to whole nanoseconds so 1e-6 scaling noise does not leak out
        let nanos = (seconds * 1e9).round();
        if nanos >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Instant at which a record with `timestamp` is due, or `None` if that
    /// lies beyond what `Instant` can represent.
    pub fn due(&self, timestamp: &Timestamp) -> Option<Instant> {
        self.wall.checked_add(self.offset(timestamp))
    }
}

/// Result of feeding the next timestamp to a cursor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    /// Timestamp did not go backwards; the epoch is unchanged
    InOrder,
    /// Timestamp went backwards; a new epoch was started
    Reset { previous: Timestamp },
}

/// Per-stream replay position
#[derive(Debug, Clone)]
pub struct ReplayCursor {
    file_offset: u64,
    last_timestamp: Timestamp,
    epoch: Epoch,
    resets: u32,
}

impl ReplayCursor {
    /// Start a cursor from the first decoded record.
    ///
    /// `file_offset` is the position just after that record.
    pub fn prime(first: Timestamp, now: Instant, file_offset: u64) -> Self {
        Self {
            file_offset,
            last_timestamp: first,
            epoch: Epoch::new(now, first),
            resets: 0,
        }
    }

    /// Account for the next record, `record_len` bytes long, whose timestamp
    /// is `timestamp`.
    pub fn advance(&mut self, timestamp: Timestamp, now: Instant, record_len: u64) -> Advance {
        self.file_offset += record_len;
        let previous = self.last_timestamp;
        self.last_timestamp = timestamp;

        if timestamp < previous {
            self.epoch = Epoch::new(now, timestamp);
            self.resets += 1;
            Advance::Reset { previous }
        } else {
            Advance::InOrder
        }
    }

    /// When the most recent record is due
    pub fn due(&self) -> Option<Instant> {
        self.epoch.due(&self.last_timestamp)
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Number of epoch resets so far
    pub fn resets(&self) -> u32 {
        self.resets
    }
}
