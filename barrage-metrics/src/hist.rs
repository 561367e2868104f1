use hdrhistogram::Histogram;

/// Quantile summary of one named histogram over a bucket or a whole run.
///
/// Values are in the unit the samples were recorded in (microseconds for
/// the built-in latency metric).
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub mean: Option<f64>,
    pub count: u64,
}

pub(crate) fn new_histogram() -> Histogram<u64> {
    // Upper bound: 1 hour in microseconds, 3 significant figures.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn summarize(h: &Histogram<u64>) -> HistogramSummary {
    let count = h.len();
    let map_val = |v| v as f64;

    HistogramSummary {
        min: (count > 0).then(|| map_val(h.min())),
        max: (count > 0).then(|| map_val(h.max())),
        median: (count > 0).then(|| map_val(h.value_at_quantile(0.50))),
        p95: (count > 0).then(|| map_val(h.value_at_quantile(0.95))),
        p99: (count > 0).then(|| map_val(h.value_at_quantile(0.99))),
        mean: (count > 0).then(|| h.mean()),
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_empty_has_no_stats() {
        let h = new_histogram();
        let s = summarize(&h);
        assert_eq!(s.count, 0);
        assert!(s.min.is_none());
        assert!(s.max.is_none());
        assert!(s.median.is_none());
        assert!(s.p95.is_none());
        assert!(s.mean.is_none());
    }

    #[test]
    fn summarize_non_empty_has_stats() {
        let mut h = new_histogram();
        let _ = h.record(10);
        let _ = h.record(20);
        let _ = h.record(30);

        let s = summarize(&h);
        assert_eq!(s.count, 3);
        assert_eq!(s.min, Some(10.0));
        assert_eq!(s.max, Some(30.0));
        assert!(s.median.is_some());
        assert!(s.p95.is_some());
        assert!(s.mean.is_some());
    }
}
