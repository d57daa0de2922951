//! Per-model changelog.
//!
//! An append-only, time-pruned log of [`ChangeRecord`]s, oldest first.
//! Retained records always form a contiguous run of sequence numbers ending
//! at the model's current seq; pruning only ever drops from the front.

use crate::state::clock::VersionClock;
use chrono::{DateTime, Utc};
use entwatch_proto::{ChangeKind, ChangeRecord, VersionStamp};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

/// Which records a delta replay returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaScope {
    /// Only records for the subscribed key.
    #[default]
    Key,
    /// Every retained record of the model; clients filter.
    Model,
}

/// Ordered change records for one model plus its version clock.
#[derive(Debug)]
pub struct Changelog {
    clock: VersionClock,
    records: VecDeque<ChangeRecord>,
    retention: Duration,
}

impl Changelog {
    /// Create an empty changelog with the given retention window.
    pub fn new(retention: Duration) -> Self {
        Self {
            clock: VersionClock::new(),
            records: VecDeque::new(),
            retention,
        }
    }

    /// Seq of the latest mutation, including pruned ones.
    pub fn current_seq(&self) -> u64 {
        self.clock.current_seq()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Seq of the oldest retained record.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.records.front().map(|r| r.seq)
    }

    /// Stamp the current seq at the current time.
    pub fn stamp(&mut self) -> VersionStamp {
        self.clock.stamp()
    }

    /// Record one mutation and prune expired records.
    ///
    /// The appended record itself is never pruned here, even with a zero
    /// retention window.
    pub fn append(
        &mut self,
        kind: ChangeKind,
        key: impl Into<String>,
        payload: Option<Value>,
    ) -> ChangeRecord {
        let stamp = self.clock.tick();
        let record = ChangeRecord {
            seq: stamp.seq,
            timestamp: stamp.timestamp,
            key: key.into(),
            kind,
            payload,
        };
        self.records.push_back(record.clone());
        self.prune_at(stamp.timestamp, true);
        record
    }

    /// Drop every record older than the retention window. Returns the count.
    pub fn prune(&mut self) -> usize {
        let now = self.clock.now();
        self.prune_at(now, false)
    }

    fn prune_at(&mut self, now: DateTime<Utc>, keep_newest: bool) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
        else {
            return 0;
        };

        let floor = usize::from(keep_newest);
        let mut removed = 0;
        while self.records.len() > floor {
            match self.records.front() {
                Some(front) if front.timestamp < cutoff => {
                    self.records.pop_front();
                    removed += 1;
                }
                _ => break,
            }
        }
        removed
    }

    /// Whether every record in `(last_seq, current_seq]` is still retained.
    pub fn can_replay_from(&self, last_seq: u64) -> bool {
        if last_seq >= self.current_seq() {
            return true;
        }
        match self.oldest_seq() {
            Some(oldest) => oldest <= last_seq + 1,
            None => false,
        }
    }

    /// Retained records with `seq > last_seq`, ascending.
    ///
    /// With [`DeltaScope::Key`] only records for `key` are returned.
    pub fn changes_since(&self, last_seq: u64, key: &str, scope: DeltaScope) -> Vec<ChangeRecord> {
        self.records
            .iter()
            .skip_while(|r| r.seq <= last_seq)
            .filter(|r| scope == DeltaScope::Model || r.key == key)
            .cloned()
            .collect()
    }
}
