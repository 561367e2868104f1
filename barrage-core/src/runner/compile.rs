use std::sync::Arc;
use std::time::Duration;

use crate::config::{LoopOver, RequestSpec, ScenarioSpec, Step};

use super::hooks::{HookFn, Hooks, PredicateFn};

/// One scenario's executable pipeline: compiled once, shared unmodified
/// across every VU instance of the scenario. All per-VU state lives in
/// `VuContext`, never here.
#[derive(Clone)]
pub struct CompiledScenario {
    name: Arc<str>,
    weight: u32,
    steps: Arc<[CompiledStep]>,
}

impl CompiledScenario {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub(crate) fn weight(&self) -> u32 {
        self.weight
    }

    pub(crate) fn steps(&self) -> &[CompiledStep] {
        &self.steps
    }
}

impl std::fmt::Debug for CompiledScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScenario")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[derive(Clone)]
pub(crate) enum CompiledStep {
    Request(Arc<RequestSpec>),
    Think {
        duration: Duration,
        jitter: Duration,
    },
    Loop {
        over: CompiledLoop,
        body: Arc<[CompiledStep]>,
    },
    Function {
        name: Arc<str>,
        hook: Option<HookFn>,
    },
    Log(Arc<str>),
}

#[derive(Clone)]
pub(crate) enum CompiledLoop {
    Count(u64),
    Values(Arc<[String]>),
    Predicate {
        name: Arc<str>,
        predicate: Option<PredicateFn>,
    },
}

/// Resolve a declarative flow into its executable form. Hook lookups
/// happen here, once; a missing hook compiles to a no-op that reports an
/// error event at execution time (non-fatal, per the error policy).
pub fn compile(spec: &ScenarioSpec, hooks: &Hooks) -> CompiledScenario {
    CompiledScenario {
        name: Arc::from(spec.name.as_str()),
        weight: spec.weight.max(1),
        steps: compile_steps(&spec.flow, hooks),
    }
}

fn compile_steps(steps: &[Step], hooks: &Hooks) -> Arc<[CompiledStep]> {
    steps
        .iter()
        .map(|step| match step {
            Step::Request(spec) => CompiledStep::Request(Arc::new(spec.clone())),
            Step::Think { duration, jitter } => CompiledStep::Think {
                duration: *duration,
                jitter: *jitter,
            },
            Step::Loop { over, body } => CompiledStep::Loop {
                over: match over {
                    LoopOver::Count(n) => CompiledLoop::Count(*n),
                    LoopOver::Values(values) => {
                        CompiledLoop::Values(values.clone().into())
                    }
                    LoopOver::Predicate(name) => {
                        let predicate = hooks.get_predicate(name);
                        if predicate.is_none() {
                            tracing::warn!(predicate = %name, "predicate not registered");
                        }
                        CompiledLoop::Predicate {
                            name: Arc::from(name.as_str()),
                            predicate,
                        }
                    }
                },
                body: compile_steps(body, hooks),
            },
            Step::Function(name) => {
                let hook = hooks.get_function(name);
                if hook.is_none() {
                    tracing::warn!(function = %name, "hook not registered");
                }
                CompiledStep::Function {
                    name: Arc::from(name.as_str()),
                    hook,
                }
            }
            Step::Log(template) => CompiledStep::Log(Arc::from(template.as_str())),
        })
        .collect()
}
