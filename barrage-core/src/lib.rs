mod config;
mod jitter;
mod payload;
mod template;

pub mod runner;

pub use config::{LoopOver, PhaseKind, PhaseSpec, RequestSpec, ScenarioSpec, Step, TestPlan};
pub use jitter::apply_jitter;
pub use payload::{Payload, PayloadMode, PayloadReader};
pub use template::render;
