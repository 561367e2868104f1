use std::collections::BTreeMap;
use std::time::Duration;

use ahash::AHashMap;
use hdrhistogram::Histogram;

use crate::event::{MetricEvent, MetricEventKind, names};
use crate::hist::{HistogramSummary, new_histogram, summarize};

/// The bucket currently accumulating events for one time window.
#[derive(Debug)]
pub(crate) struct BucketAccum {
    window: u64,
    first_at: Option<Duration>,
    last_at: Option<Duration>,
    counters: AHashMap<String, u64>,
    rates: AHashMap<String, u64>,
    hists: AHashMap<String, Histogram<u64>>,
}

impl BucketAccum {
    pub(crate) fn new(window: u64) -> Self {
        Self {
            window,
            first_at: None,
            last_at: None,
            counters: AHashMap::new(),
            rates: AHashMap::new(),
            hists: AHashMap::new(),
        }
    }

    fn touch(&mut self, at: Duration) {
        self.first_at = Some(self.first_at.map_or(at, |cur| cur.min(at)));
        self.last_at = Some(self.last_at.map_or(at, |cur| cur.max(at)));
    }

    fn add_counter(&mut self, name: &str, delta: u64) {
        self.counters
            .entry(name.to_string())
            .and_modify(|cur| *cur = cur.saturating_add(delta))
            .or_insert(delta);
    }

    fn observe(&mut self, name: &str, value: u64) {
        if value == 0 {
            return;
        }
        let h = self
            .hists
            .entry(name.to_string())
            .or_insert_with(new_histogram);
        if let Err(err) = h.record(value) {
            tracing::warn!(name, value, "dropping out-of-range histogram sample: {err}");
        }
    }

    pub(crate) fn record(&mut self, ev: &MetricEvent) {
        self.touch(ev.at);

        match &ev.kind {
            MetricEventKind::Counter { name, delta } => self.add_counter(name, *delta),
            MetricEventKind::Histogram { name, value } => self.observe(name, *value),
            MetricEventKind::Rate { name } => {
                self.rates
                    .entry(name.clone())
                    .and_modify(|cur| *cur = cur.saturating_add(1))
                    .or_insert(1);
            }
            MetricEventKind::Request => self.add_counter(names::REQUESTS, 1),
            MetricEventKind::Response { latency, code, .. } => {
                self.add_counter(names::RESPONSES, 1);
                self.add_counter(&format!("{}{code}", names::CODE_PREFIX), 1);
                self.observe(names::RESPONSE_TIME, latency.as_micros() as u64);
            }
            MetricEventKind::Error { code } => {
                self.add_counter(&format!("{}{code}", names::ERROR_PREFIX), 1);
            }
        }
    }

    pub(crate) fn seal(self, window_len: Duration) -> SealedBucket {
        SealedBucket {
            window: self.window,
            window_len,
            first_at: self.first_at,
            last_at: self.last_at,
            counters: self.counters.into_iter().collect(),
            rates: self.rates.into_iter().collect(),
            hists: self.hists.into_iter().collect(),
        }
    }
}

/// An immutable aggregation of all events that fell into one fixed
/// wall-clock window. Sealed buckets are handed to periodic reporters and
/// folded into the final [`Report`](crate::Report); they are never mutated
/// after sealing — combining two produces a new bucket.
#[derive(Debug, Clone)]
pub struct SealedBucket {
    window: u64,
    window_len: Duration,
    first_at: Option<Duration>,
    last_at: Option<Duration>,
    counters: BTreeMap<String, u64>,
    rates: BTreeMap<String, u64>,
    hists: BTreeMap<String, Histogram<u64>>,
}

impl SealedBucket {
    /// Index of this bucket's window (offset from run start / window length).
    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn window_len(&self) -> Duration {
        self.window_len
    }

    /// Offset of the window's start from run start.
    pub fn start(&self) -> Duration {
        let nanos = (self.window_len.as_nanos() as u64).saturating_mul(self.window);
        Duration::from_nanos(nanos)
    }

    pub fn first_at(&self) -> Option<Duration> {
        self.first_at
    }

    pub fn last_at(&self) -> Option<Duration> {
        self.last_at
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn rate_hits(&self, name: &str) -> u64 {
        self.rates.get(name).copied().unwrap_or(0)
    }

    pub fn rates(&self) -> impl Iterator<Item = (&str, u64)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Occurrences per second over this bucket's window.
    pub fn rate_per_sec(&self, name: &str) -> f64 {
        let secs = self.window_len.as_secs_f64().max(1e-9);
        self.rate_hits(name) as f64 / secs
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSummary> {
        self.hists.get(name).map(summarize)
    }

    pub fn histogram_names(&self) -> impl Iterator<Item = &str> {
        self.hists.keys().map(String::as_str)
    }

    pub(crate) fn raw_histogram(&self, name: &str) -> Option<&Histogram<u64>> {
        self.hists.get(name)
    }

    /// Fold another fragment of the same window into this one. Counter and
    /// rate sums plus histogram `add` keep the operation associative and
    /// commutative.
    pub(crate) fn combine(mut self, other: SealedBucket) -> SealedBucket {
        debug_assert_eq!(self.window, other.window);

        self.first_at = match (self.first_at, other.first_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_at = match (self.last_at, other.last_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        for (name, v) in other.counters {
            self.counters
                .entry(name)
                .and_modify(|cur| *cur = cur.saturating_add(v))
                .or_insert(v);
        }
        for (name, v) in other.rates {
            self.rates
                .entry(name)
                .and_modify(|cur| *cur = cur.saturating_add(v))
                .or_insert(v);
        }
        for (name, h) in other.hists {
            match self.hists.entry(name) {
                std::collections::btree_map::Entry::Occupied(mut e) => {
                    if let Err(err) = e.get_mut().add(&h) {
                        tracing::warn!("dropping unmergeable histogram fragment: {err}");
                    }
                }
                std::collections::btree_map::Entry::Vacant(e) => {
                    e.insert(h);
                }
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(at_ms: u64, kind: MetricEventKind) -> MetricEvent {
        MetricEvent::new(Duration::from_millis(at_ms), kind)
    }

    #[test]
    fn record_maps_event_kinds_to_canonical_names() {
        let mut b = BucketAccum::new(0);
        b.record(&ev(10, MetricEventKind::Request));
        b.record(&ev(
            25,
            MetricEventKind::Response {
                latency: Duration::from_millis(3),
                code: 200,
                vu_id: 1,
            },
        ));
        b.record(&ev(
            30,
            MetricEventKind::Error {
                code: "timeout".to_string(),
            },
        ));
        b.record(&ev(
            40,
            MetricEventKind::Counter {
                name: "vusers.created".to_string(),
                delta: 2,
            },
        ));
        b.record(&ev(
            50,
            MetricEventKind::Rate {
                name: "polls".to_string(),
            },
        ));

        let sealed = b.seal(Duration::from_secs(10));
        assert_eq!(sealed.counter(names::REQUESTS), 1);
        assert_eq!(sealed.counter(names::RESPONSES), 1);
        assert_eq!(sealed.counter("codes.200"), 1);
        assert_eq!(sealed.counter("errors.timeout"), 1);
        assert_eq!(sealed.counter("vusers.created"), 2);
        assert_eq!(sealed.rate_hits("polls"), 1);
        assert_eq!(sealed.first_at(), Some(Duration::from_millis(10)));
        assert_eq!(sealed.last_at(), Some(Duration::from_millis(50)));

        let latency = match sealed.histogram(names::RESPONSE_TIME) {
            Some(s) => s,
            None => panic!("expected latency histogram"),
        };
        assert_eq!(latency.count, 1);
        assert_eq!(latency.max, Some(3000.0));
    }

    #[test]
    fn combine_sums_counters_and_merges_histograms() {
        let mut a = BucketAccum::new(3);
        a.record(&ev(30_100, MetricEventKind::Request));
        a.record(&ev(
            30_200,
            MetricEventKind::Histogram {
                name: "lag".to_string(),
                value: 10,
            },
        ));

        let mut b = BucketAccum::new(3);
        b.record(&ev(31_000, MetricEventKind::Request));
        b.record(&ev(
            31_500,
            MetricEventKind::Histogram {
                name: "lag".to_string(),
                value: 30,
            },
        ));

        let len = Duration::from_secs(10);
        let merged = a.seal(len).combine(b.seal(len));

        assert_eq!(merged.counter(names::REQUESTS), 2);
        let lag = match merged.histogram("lag") {
            Some(s) => s,
            None => panic!("expected lag histogram"),
        };
        assert_eq!(lag.count, 2);
        assert_eq!(lag.min, Some(10.0));
        assert_eq!(lag.max, Some(30.0));
        assert_eq!(merged.first_at(), Some(Duration::from_millis(30_100)));
        assert_eq!(merged.last_at(), Some(Duration::from_millis(31_500)));
    }

    #[test]
    fn zero_histogram_samples_are_dropped() {
        let mut b = BucketAccum::new(0);
        b.record(&ev(
            5,
            MetricEventKind::Histogram {
                name: "lag".to_string(),
                value: 0,
            },
        ));
        let sealed = b.seal(Duration::from_secs(10));
        assert!(sealed.histogram("lag").is_none());
    }
}
