use std::collections::BTreeMap;
use std::time::Duration;

use crate::bucket::{BucketAccum, SealedBucket};
use crate::event::MetricEvent;
use crate::report::Report;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Routes metric events into fixed-window buckets and seals them as their
/// windows pass.
///
/// The collector is single-consumer by design: the run loop owns it and
/// feeds it the drained event stream, so no locking is needed. Events are
/// routed by their own timestamp, not by arrival order — an event drained
/// late still lands in the window it logically belongs to. A window stays
/// open for one extra interval after it ends so ordinary stragglers are
/// attributed correctly; anything arriving after its window sealed is kept
/// aside as a late fragment and folded into the final report.
#[derive(Debug)]
pub struct Collector {
    interval: Duration,
    open: BTreeMap<u64, BucketAccum>,
    late: BTreeMap<u64, BucketAccum>,
    sealed: Vec<SealedBucket>,
    /// All windows strictly below this index have been sealed.
    sealed_through: u64,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

impl Collector {
    pub fn new(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            tracing::warn!(
                "flush interval must be positive; falling back to {:?}",
                DEFAULT_FLUSH_INTERVAL
            );
            DEFAULT_FLUSH_INTERVAL
        } else {
            interval
        };

        Self {
            interval,
            open: BTreeMap::new(),
            late: BTreeMap::new(),
            sealed: Vec::new(),
            sealed_through: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn window_of(&self, at: Duration) -> u64 {
        (at.as_nanos() / self.interval.as_nanos().max(1)) as u64
    }

    pub fn record(&mut self, ev: MetricEvent) {
        let window = self.window_of(ev.at);

        if window < self.sealed_through {
            tracing::debug!(window, at = ?ev.at, "metric event arrived after its window sealed");
            self.late
                .entry(window)
                .or_insert_with(|| BucketAccum::new(window))
                .record(&ev);
            return;
        }

        self.open
            .entry(window)
            .or_insert_with(|| BucketAccum::new(window))
            .record(&ev);
    }

    /// Seal every window that ended at least one full interval before
    /// `now` and return the sealed buckets, oldest first. Windows that saw
    /// no events produce no bucket.
    pub fn seal_due(&mut self, now: Duration) -> Vec<SealedBucket> {
        let current = self.window_of(now);
        let due_through = current.saturating_sub(1);
        if due_through <= self.sealed_through {
            return Vec::new();
        }

        let mut out = Vec::new();
        while let Some(entry) = self.open.first_entry() {
            if *entry.key() >= due_through {
                break;
            }
            out.push(entry.remove().seal(self.interval));
        }

        self.sealed_through = due_through;
        self.sealed.extend(out.iter().cloned());
        out
    }

    /// Seal everything still open, fold late fragments into their logical
    /// windows, and assemble the final report.
    pub fn finish(mut self) -> Report {
        for (_, accum) in std::mem::take(&mut self.open) {
            self.sealed.push(accum.seal(self.interval));
        }
        for (_, accum) in std::mem::take(&mut self.late) {
            self.sealed.push(accum.seal(self.interval));
        }

        Report::from_buckets(self.interval, self.sealed)
    }
}
