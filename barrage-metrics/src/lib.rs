mod bucket;
mod collector;
mod event;
mod hist;
mod report;

pub use bucket::SealedBucket;
pub use collector::{Collector, DEFAULT_FLUSH_INTERVAL};
pub use event::{MetricEvent, MetricEventKind, MetricKind, names};
pub use hist::HistogramSummary;
pub use report::{MergeError, Report};
