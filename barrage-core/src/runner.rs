mod arrivals;
mod compile;
mod engine;
mod error;
mod events;
mod hooks;
mod run;
mod schedule;
mod vu;

pub use arrivals::ArrivalMode;
pub use compile::{CompiledScenario, compile};
pub use engine::Engine;
pub use error::{Error, Result, StepError};
pub use events::{EventBus, LifecycleEvent, RunClock};
pub use hooks::{HookFn, HookFuture, Hooks, PredicateFn};
pub use run::{BucketFn, DEFAULT_GRACE, RunOptions, run_test};
pub use vu::{StopSignal, VuContext};

pub use barrage_metrics::{
    HistogramSummary, MetricEvent, MetricEventKind, Report, SealedBucket, names,
};
