use std::collections::HashMap;
use std::time::Duration;

use crate::runner::ArrivalMode;

/// A parsed test script, handed over by the embedding tool. Script loading
/// and schema validation happen upstream; the engine treats the plan as
/// immutable once a run starts.
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    /// Opaque target descriptor, forwarded to the engine adapter.
    pub target: String,
    pub phases: Vec<PhaseSpec>,
    pub scenarios: Vec<ScenarioSpec>,
}

/// One time-bounded segment of the arrival schedule.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub index: usize,
    /// Operator-facing label for logs.
    pub name: Option<String>,
    pub duration: Duration,
    pub kind: PhaseKind,
    pub mode: ArrivalMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// No arrivals for the phase's duration.
    Pause,
    /// `count` arrivals spread evenly over the duration.
    FixedCount { count: u64 },
    /// `rate` arrivals per second for the duration. Rate 0 degrades to a
    /// pause.
    ConstantRate { rate: u64 },
    /// Rate steps from `from` up to `to` across the duration.
    Ramp { from: u64, to: u64 },
}

/// A named flow of steps executed by every VU of this scenario.
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    /// Relative likelihood of an arrival picking this scenario.
    pub weight: u32,
    pub flow: Vec<Step>,
}

impl ScenarioSpec {
    pub fn new(name: impl Into<String>, flow: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            weight: 1,
            flow,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    /// Delegated to the engine adapter over the VU's open session.
    Request(RequestSpec),
    /// Suspend without side effects; `jitter` bounds a uniform offset
    /// around `duration`.
    Think { duration: Duration, jitter: Duration },
    Loop { over: LoopOver, body: Vec<Step> },
    /// Invoke a user-registered hook by name.
    Function(String),
    /// Render a template against the VU's variables and log it.
    Log(String),
}

#[derive(Debug, Clone)]
pub enum LoopOver {
    Count(u64),
    /// One iteration per value, exposed to the body as `loop_value`.
    Values(Vec<String>),
    /// Re-evaluated before each iteration; named predicate from the hook
    /// registry.
    Predicate(String),
}

/// Engine-specific request payload. The engine adapter interprets the
/// fields; the core only threads it through and renders templates in the
/// values against the VU's variables.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    pub name: String,
    pub payload: HashMap<String, String>,
}

impl RequestSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: HashMap::new(),
        }
    }
}
