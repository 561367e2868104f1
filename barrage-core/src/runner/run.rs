use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use barrage_metrics::{Collector, DEFAULT_FLUSH_INTERVAL, Report, SealedBucket, names};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::TestPlan;
use crate::jitter::apply_jitter;
use crate::payload::PayloadReader;
use crate::template::render;

use super::compile::{CompiledLoop, CompiledScenario, CompiledStep, compile};
use super::engine::Engine;
use super::error::{Error, Result, StepError};
use super::events::{EventBus, RunClock};
use super::hooks::Hooks;
use super::schedule::PhaseScheduler;
use super::vu::{StopSignal, VuContext};

pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

const LOOP_INDEX_VAR: &str = "loop_index";
const LOOP_VALUE_VAR: &str = "loop_value";
const MISSING_HOOK_CODE: &str = "hook.missing";

/// Callback receiving each sealed bucket as its window closes (periodic
/// reporters, live dashboards).
pub type BucketFn = Arc<dyn Fn(SealedBucket) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Bucket window length for the metrics collector.
    pub flush_interval: Duration,
    /// How long a stop waits for in-flight VUs before abandoning them.
    pub grace: Duration,
    /// Seed for arrival sampling, jitter, and scenario picking. `None`
    /// draws a fresh one.
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            grace: DEFAULT_GRACE,
            seed: None,
        }
    }
}

/// Run a full test: drive the phase schedule, spawn one VU per arrival,
/// and aggregate everything the VUs and the engine emit into the final
/// report.
///
/// Arrivals are never blocked by in-flight VUs; the schedule stays on time
/// regardless of downstream latency, so the number of concurrent VUs is
/// unbounded by design. Large loads are split across independent engine
/// instances and their reports merged.
pub async fn run_test<E: Engine>(
    plan: TestPlan,
    engine: Arc<E>,
    hooks: Arc<Hooks>,
    payload: Option<Arc<PayloadReader>>,
    options: RunOptions,
    stop: &StopSignal,
    on_bucket: Option<BucketFn>,
) -> Result<Report> {
    if plan.scenarios.is_empty() {
        return Err(Error::EmptyPlan);
    }

    let seed = options.seed.unwrap_or_else(|| rand::thread_rng().r#gen());
    let clock = Arc::new(RunClock::start());
    let (bus, metrics_rx) = EventBus::new(clock.clone());

    let compiled: Vec<CompiledScenario> =
        plan.scenarios.iter().map(|s| compile(s, &hooks)).collect();
    let total_weight: u64 = compiled.iter().map(|c| c.weight() as u64).sum();

    // Collector task: drains the metric stream, seals buckets as their
    // windows pass, assembles the final report once the bus closes.
    let collector_handle = {
        let clock = clock.clone();
        let flush_interval = options.flush_interval;
        tokio::spawn(async move {
            let mut collector = Collector::new(flush_interval);
            let mut rx = metrics_rx;
            let mut flush = tokio::time::interval(collector.interval());
            flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    ev = rx.recv() => match ev {
                        Some(ev) => collector.record(ev),
                        None => break,
                    },
                    _ = flush.tick() => {
                        for bucket in collector.seal_due(clock.offset()) {
                            if let Some(cb) = &on_bucket {
                                cb(bucket);
                            }
                        }
                    }
                }
            }

            collector.finish()
        })
    };

    // Scheduler task: owns the tick sender; dropping it ends the arrival
    // loop below.
    let (ticks_tx, mut ticks_rx) = mpsc::unbounded_channel();
    let scheduler = PhaseScheduler::new(
        plan.phases.clone(),
        bus.clone(),
        ticks_tx,
        stop.subscribe(),
        StdRng::seed_from_u64(seed),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    let mut pick_rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut stop_rx = stop.subscribe();
    let mut vu_handles: Vec<JoinHandle<()>> = Vec::new();
    let mut next_vu_id: u64 = 1;
    let mut stopped = *stop_rx.borrow();

    while !stopped {
        tokio::select! {
            tick = ticks_rx.recv() => match tick {
                Some(()) => {
                    let scenario = pick_scenario(&compiled, total_weight, &mut pick_rng);
                    let mut ctx = VuContext::new(next_vu_id, scenario.name_arc(), seed);
                    next_vu_id = next_vu_id.saturating_add(1);

                    if let Some(payload) = &payload {
                        payload.seed(&mut ctx.vars, &mut ctx.rng);
                    }

                    bus.counter(names::VUSERS_CREATED, 1);

                    let engine = engine.clone();
                    let scenario = scenario.clone();
                    let bus = bus.clone();
                    vu_handles.push(tokio::spawn(run_vu(engine, scenario, ctx, bus)));
                }
                None => break,
            },
            res = stop_rx.changed() => {
                if res.is_err() || *stop_rx.borrow() {
                    stopped = true;
                }
            }
        }
    }

    drop(ticks_rx);
    if let Err(err) = scheduler_handle.await {
        tracing::warn!("scheduler task failed: {err}");
    }

    if stopped {
        // Bounded grace for in-flight VUs, then abandon them.
        if tokio::time::timeout(options.grace, drain_vus(&mut vu_handles, &bus))
            .await
            .is_err()
        {
            tracing::debug!(abandoned = vu_handles.len(), "grace period elapsed");
            for h in &vu_handles {
                h.abort();
            }
            for h in vu_handles.drain(..) {
                let _ = h.await;
            }
        }
    } else {
        drain_vus(&mut vu_handles, &bus).await;
    }

    drop(bus);
    Ok(collector_handle.await?)
}

/// Await every VU task, converting panics into failed-VU accounting.
async fn drain_vus(handles: &mut Vec<JoinHandle<()>>, bus: &EventBus) {
    while let Some(h) = handles.last_mut() {
        if let Err(err) = h.await
            && err.is_panic()
        {
            bus.error("vu.panic");
            bus.counter(names::VUSERS_FAILED, 1);
        }
        handles.pop();
    }
}

fn pick_scenario<'a>(
    compiled: &'a [CompiledScenario],
    total_weight: u64,
    rng: &mut StdRng,
) -> &'a CompiledScenario {
    if let [only] = compiled {
        return only;
    }

    let mut remaining = rng.gen_range(0..total_weight.max(1));
    for scenario in compiled {
        let w = scenario.weight() as u64;
        if remaining < w {
            return scenario;
        }
        remaining -= w;
    }

    match compiled.last() {
        Some(last) => last,
        None => unreachable!("run_test rejects empty plans"),
    }
}

/// One VU: engine setup, the compiled pipeline, teardown. Failures stay
/// local — they become metric events and this task's return, never an
/// error the scheduler or sibling VUs see.
async fn run_vu<E: Engine>(
    engine: Arc<E>,
    scenario: CompiledScenario,
    mut ctx: VuContext,
    bus: EventBus,
) {
    let started = bus.offset();

    let mut session = match engine.open(&mut ctx).await {
        Ok(session) => session,
        Err(err) => {
            tracing::debug!(vu = ctx.vu_id, "session setup failed: {err}");
            bus.error(&err.code);
            bus.counter(names::VUSERS_FAILED, 1);
            return;
        }
    };

    let result = run_steps(scenario.steps(), engine.as_ref(), &mut session, &mut ctx, &bus).await;

    // Teardown happens exactly once, on both paths; `close` consumes the
    // session.
    engine.close(session).await;

    match result {
        Ok(()) => {
            bus.counter(names::VUSERS_COMPLETED, 1);
            let session_us = bus.offset().saturating_sub(started).as_micros() as u64;
            bus.histogram(names::VUSER_SESSION_LENGTH, session_us);
        }
        Err(err) => {
            tracing::debug!(vu = ctx.vu_id, "vu failed: {err}");
            bus.counter(names::VUSERS_FAILED, 1);
        }
    }
}

/// Explicit fold over the compiled step list: strictly sequential, abort
/// on the first error, remaining steps skipped. Boxed so loops can
/// recurse.
fn run_steps<'a, E: Engine>(
    steps: &'a [CompiledStep],
    engine: &'a E,
    session: &'a mut E::Session,
    ctx: &'a mut VuContext,
    bus: &'a EventBus,
) -> Pin<Box<dyn Future<Output = std::result::Result<(), StepError>> + Send + 'a>> {
    Box::pin(async move {
        for step in steps {
            match step {
                CompiledStep::Think { duration, jitter } => {
                    let pause = apply_jitter(*duration, *jitter, &mut ctx.rng);
                    tokio::time::sleep(pause).await;
                }
                CompiledStep::Log(template) => {
                    tracing::info!(vu = ctx.vu_id, "{}", render(template, &ctx.vars));
                }
                CompiledStep::Function { name, hook } => match hook {
                    Some(hook) => {
                        if let Err(err) = hook(ctx, bus).await {
                            bus.error(&err.code);
                            return Err(err);
                        }
                    }
                    None => {
                        tracing::debug!(vu = ctx.vu_id, function = %name, "skipping unregistered hook");
                        bus.error(MISSING_HOOK_CODE);
                    }
                },
                CompiledStep::Request(spec) => {
                    ctx.pending_requests = ctx.pending_requests.saturating_add(1);
                    let result = engine.request(session, spec, ctx, bus).await;
                    ctx.pending_requests = ctx.pending_requests.saturating_sub(1);
                    result?;
                    ctx.success_count = ctx.success_count.saturating_add(1);
                }
                CompiledStep::Loop { over, body } => match over {
                    CompiledLoop::Count(count) => {
                        for i in 0..*count {
                            ctx.set_var(LOOP_INDEX_VAR, i.to_string());
                            run_steps(body, engine, session, ctx, bus).await?;
                        }
                    }
                    CompiledLoop::Values(values) => {
                        for (i, value) in values.iter().enumerate() {
                            ctx.set_var(LOOP_INDEX_VAR, i.to_string());
                            ctx.set_var(LOOP_VALUE_VAR, value.clone());
                            run_steps(body, engine, session, ctx, bus).await?;
                        }
                    }
                    CompiledLoop::Predicate { name, predicate } => match predicate {
                        Some(predicate) => {
                            let mut i: u64 = 0;
                            while predicate(ctx) {
                                ctx.set_var(LOOP_INDEX_VAR, i.to_string());
                                run_steps(body, engine, session, ctx, bus).await?;
                                i = i.saturating_add(1);
                            }
                        }
                        None => {
                            tracing::debug!(vu = ctx.vu_id, predicate = %name, "skipping loop with unregistered predicate");
                            bus.error(MISSING_HOOK_CODE);
                        }
                    },
                },
            }
        }

        Ok(())
    })
}
