use std::time::Duration;

/// Canonical metric names emitted by the engine and its adapters.
///
/// Protocol adapters are free to add their own names on top; these are the
/// ones the collector derives from the built-in event kinds.
pub mod names {
    pub const REQUESTS: &str = "requests";
    pub const RESPONSES: &str = "responses";
    pub const RESPONSE_TIME: &str = "response_time";
    pub const CODE_PREFIX: &str = "codes.";
    pub const ERROR_PREFIX: &str = "errors.";
    pub const VUSERS_CREATED: &str = "vusers.created";
    pub const VUSERS_COMPLETED: &str = "vusers.completed";
    pub const VUSERS_FAILED: &str = "vusers.failed";
    pub const VUSER_SESSION_LENGTH: &str = "vusers.session_length";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Rate,
    Histogram,
}

/// One discrete measurement, stamped with its offset from run start.
///
/// Events are produced by VUs and engine adapters and consumed exactly once
/// by the collector. The timestamp decides which bucket the event belongs
/// to, independently of when it is drained off the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    pub at: Duration,
    pub kind: MetricEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricEventKind {
    Counter { name: String, delta: u64 },
    /// Raw histogram sample. Latency-style values are recorded in
    /// microseconds by convention.
    Histogram { name: String, value: u64 },
    /// One occurrence of a per-second rate metric.
    Rate { name: String },
    /// A request is about to be issued.
    Request,
    /// A request completed with a protocol status code.
    Response {
        latency: Duration,
        code: u16,
        vu_id: u64,
    },
    /// A request or step failed with a short error code.
    Error { code: String },
}

impl MetricEvent {
    pub fn new(at: Duration, kind: MetricEventKind) -> Self {
        Self { at, kind }
    }
}
