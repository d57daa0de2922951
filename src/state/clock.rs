//! Per-model version clock.

use chrono::{DateTime, Utc};
use entwatch_proto::VersionStamp;

/// Produces sequence numbers for one model, paired with wall-clock time.
///
/// Sequence numbers start at 0 and increase by exactly one per `tick`.
/// Timestamps never go backwards even if the system clock does, so records
/// in a changelog are ordered by both `seq` and `timestamp`.
#[derive(Debug)]
pub struct VersionClock {
    seq: u64,
    last: DateTime<Utc>,
}

impl VersionClock {
    /// Create a clock at sequence 0.
    pub fn new() -> Self {
        Self {
            seq: 0,
            last: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Current sequence number (the seq of the latest mutation).
    pub fn current_seq(&self) -> u64 {
        self.seq
    }

    /// Advance to the next sequence number and stamp it.
    pub fn tick(&mut self) -> VersionStamp {
        self.seq += 1;
        let now = self.now();
        VersionStamp::new(self.seq, now)
    }

    /// Stamp the current sequence number without advancing it.
    pub fn stamp(&mut self) -> VersionStamp {
        let now = self.now();
        VersionStamp::new(self.seq, now)
    }

    /// Wall-clock now, clamped so it never precedes a previous reading.
    pub fn now(&mut self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    fn observe(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.last {
            self.last = now;
        }
        self.last
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}
