use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::bucket::SealedBucket;
use crate::event::{MetricKind, names};
use crate::hist::{HistogramSummary, new_histogram, summarize};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("flush interval mismatch: {ours:?} vs {theirs:?}")]
    WindowLenMismatch { ours: Duration, theirs: Duration },
}

/// The union of all sealed buckets for a run (or a fragment of one).
///
/// Reports from independent runs or workers merge losslessly: counters and
/// rate hits sum, histograms combine as full distributions, and derived
/// rates are recomputed from the merged totals. Merge order and batching
/// never change the final numbers.
#[derive(Debug, Clone)]
pub struct Report {
    window_len: Duration,
    buckets: Vec<SealedBucket>,
}

impl Report {
    pub fn empty(window_len: Duration) -> Self {
        Self {
            window_len,
            buckets: Vec::new(),
        }
    }

    /// Folds buckets sharing a window index into one and orders the rest.
    pub(crate) fn from_buckets(
        window_len: Duration,
        buckets: impl IntoIterator<Item = SealedBucket>,
    ) -> Self {
        let mut by_window: BTreeMap<u64, SealedBucket> = BTreeMap::new();
        for bucket in buckets {
            match by_window.remove(&bucket.window()) {
                Some(existing) => {
                    let window = bucket.window();
                    by_window.insert(window, existing.combine(bucket));
                }
                None => {
                    by_window.insert(bucket.window(), bucket);
                }
            }
        }

        Self {
            window_len,
            buckets: by_window.into_values().collect(),
        }
    }

    pub fn window_len(&self) -> Duration {
        self.window_len
    }

    /// Sealed buckets, ordered by window, one per window that saw events.
    pub fn buckets(&self) -> &[SealedBucket] {
        &self.buckets
    }

    /// Wall-clock span covered by this report: earliest window start to
    /// latest window end.
    pub fn elapsed(&self) -> Duration {
        let (Some(first), Some(last)) = (self.buckets.first(), self.buckets.last()) else {
            return Duration::ZERO;
        };
        let span_windows = last.window() - first.window() + 1;
        let nanos = (self.window_len.as_nanos() as u64).saturating_mul(span_windows);
        Duration::from_nanos(nanos)
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.buckets
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.counter(name)))
    }

    pub fn counters(&self) -> BTreeMap<String, u64> {
        let mut out: BTreeMap<String, u64> = BTreeMap::new();
        for bucket in &self.buckets {
            for (name, v) in bucket.counters() {
                out.entry(name.to_string())
                    .and_modify(|cur| *cur = cur.saturating_add(v))
                    .or_insert(v);
            }
        }
        out
    }

    pub fn rate_hits(&self, name: &str) -> u64 {
        self.buckets
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.rate_hits(name)))
    }

    /// Derived occurrences per second: total hits over total elapsed time,
    /// never an average of per-bucket rates.
    pub fn rate_per_sec(&self, name: &str) -> f64 {
        let secs = self.elapsed().as_secs_f64().max(1e-9);
        self.rate_hits(name) as f64 / secs
    }

    /// Requests per second derived the same way as named rates.
    pub fn requests_per_sec(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64().max(1e-9);
        self.counter(names::REQUESTS) as f64 / secs
    }

    /// Distribution-combined summary of one named histogram across every
    /// bucket.
    pub fn histogram(&self, name: &str) -> Option<HistogramSummary> {
        let mut merged: Option<Histogram<u64>> = None;
        for bucket in &self.buckets {
            let Some(h) = bucket.raw_histogram(name) else {
                continue;
            };
            let acc = merged.get_or_insert_with(new_histogram);
            if let Err(err) = acc.add(h) {
                tracing::warn!(name, "dropping unmergeable histogram fragment: {err}");
            }
        }
        merged.as_ref().map(summarize)
    }

    /// Error-code breakdown (the `errors.*` counters, prefix stripped).
    pub fn error_codes(&self) -> BTreeMap<String, u64> {
        self.counters()
            .into_iter()
            .filter_map(|(name, v)| {
                name.strip_prefix(names::ERROR_PREFIX)
                    .map(|code| (code.to_string(), v))
            })
            .collect()
    }

    /// Every metric name seen in this report, with its kind.
    pub fn metrics(&self) -> Vec<(String, MetricKind)> {
        let mut out: BTreeMap<String, MetricKind> = BTreeMap::new();
        for bucket in &self.buckets {
            for (name, _) in bucket.counters() {
                out.insert(name.to_string(), MetricKind::Counter);
            }
            for (name, _) in bucket.rates() {
                out.insert(name.to_string(), MetricKind::Rate);
            }
            for name in bucket.histogram_names() {
                out.insert(name.to_string(), MetricKind::Histogram);
            }
        }
        out.into_iter().collect()
    }

    /// Lossless merge with a report from another run fragment or worker.
    pub fn merge(self, other: Report) -> Result<Report, MergeError> {
        if self.window_len != other.window_len {
            return Err(MergeError::WindowLenMismatch {
                ours: self.window_len,
                theirs: other.window_len,
            });
        }

        let window_len = self.window_len;
        Ok(Report::from_buckets(
            window_len,
            self.buckets.into_iter().chain(other.buckets),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Collector;
    use crate::event::{MetricEvent, MetricEventKind};

    fn report_with(events: &[(u64, MetricEventKind)]) -> Report {
        let mut c = Collector::new(Duration::from_secs(10));
        for (at_ms, kind) in events {
            c.record(MetricEvent::new(Duration::from_millis(*at_ms), kind.clone()));
        }
        c.finish()
    }

    fn counter(name: &str, delta: u64) -> MetricEventKind {
        MetricEventKind::Counter {
            name: name.to_string(),
            delta,
        }
    }

    fn sample(name: &str, value: u64) -> MetricEventKind {
        MetricEventKind::Histogram {
            name: name.to_string(),
            value,
        }
    }

    fn assert_reports_equal(a: &Report, b: &Report) {
        assert_eq!(a.counters(), b.counters());
        assert_eq!(a.elapsed(), b.elapsed());
        assert_eq!(a.histogram("lag"), b.histogram("lag"));
        let ra = a.rate_per_sec("polls");
        let rb = b.rate_per_sec("polls");
        assert!((ra - rb).abs() < 1e-9, "rates differ: {ra} vs {rb}");
    }

    #[test]
    fn merge_is_associative_and_commutative() {
        let a = report_with(&[
            (1_000, counter("requests", 3)),
            (2_000, sample("lag", 10)),
            (2_500, MetricEventKind::Rate { name: "polls".to_string() }),
        ]);
        let b = report_with(&[
            (11_000, counter("requests", 2)),
            (12_000, sample("lag", 50)),
        ]);
        let c = report_with(&[
            (1_500, counter("requests", 1)),
            (21_000, sample("lag", 90)),
            (21_500, MetricEventKind::Rate { name: "polls".to_string() }),
        ]);

        let merge = |x: Report, y: Report| match x.merge(y) {
            Ok(r) => r,
            Err(err) => panic!("merge failed: {err}"),
        };

        // ((a + b) + c) vs (a + (b + c)) vs ((c + a) + b)
        let left = merge(merge(a.clone(), b.clone()), c.clone());
        let right = merge(a.clone(), merge(b.clone(), c.clone()));
        let shuffled = merge(merge(c, a), b);

        assert_reports_equal(&left, &right);
        assert_reports_equal(&left, &shuffled);
        assert_eq!(left.counter("requests"), 6);
    }

    #[test]
    fn merged_rates_are_recomputed_not_averaged() {
        // Bucket 0: 10 hits over 10s (1/s). Bucket 1: 0 hits.
        let mut events = Vec::new();
        for i in 0..10u64 {
            events.push((i * 100, MetricEventKind::Rate { name: "polls".to_string() }));
        }
        let a = report_with(&events);
        let b = report_with(&[(15_000, counter("requests", 1))]);

        let merged = match a.merge(b) {
            Ok(r) => r,
            Err(err) => panic!("merge failed: {err}"),
        };

        // 10 hits over 20s of coverage: 0.5/s. An average of per-bucket
        // rates (1.0 and 0.0 over unequal activity) would not be stable
        // under re-bucketing.
        assert_eq!(merged.rate_hits("polls"), 10);
        assert!((merged.rate_per_sec("polls") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn merge_rejects_interval_mismatch() {
        let a = Report::empty(Duration::from_secs(10));
        let b = Report::empty(Duration::from_secs(5));
        match a.merge(b) {
            Ok(_) => panic!("expected interval mismatch"),
            Err(err) => assert!(matches!(err, MergeError::WindowLenMismatch { .. })),
        }
    }

    #[test]
    fn error_codes_strip_prefix() {
        let report = report_with(&[
            (100, MetricEventKind::Error { code: "timeout".to_string() }),
            (200, MetricEventKind::Error { code: "timeout".to_string() }),
            (300, MetricEventKind::Error { code: "refused".to_string() }),
        ]);

        let codes = report.error_codes();
        assert_eq!(codes.get("timeout"), Some(&2));
        assert_eq!(codes.get("refused"), Some(&1));
    }

    #[test]
    fn empty_report_has_zero_elapsed_and_rates() {
        let report = Report::empty(Duration::from_secs(10));
        assert_eq!(report.elapsed(), Duration::ZERO);
        assert_eq!(report.counter("requests"), 0);
        assert_eq!(report.rate_per_sec("polls"), 0.0);
        assert!(report.histogram("lag").is_none());
    }
}
