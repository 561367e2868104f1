use std::time::Duration;

use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::{PhaseKind, PhaseSpec};

use super::arrivals::{ArrivalMode, ArrivalProcess};
use super::events::{EventBus, LifecycleEvent};

/// State machine over the ordered phase list. One phase is active at a
/// time; each emits `PhaseStarted`/`PhaseCompleted` around it, `Arrival`
/// per generated tick, and `Done` once the list is exhausted.
///
/// Malformed phase specs are fail-open: logged and skipped without
/// consuming their duration, and the run continues.
#[derive(Debug)]
pub(crate) struct PhaseScheduler {
    phases: Vec<PhaseSpec>,
    bus: EventBus,
    ticks: mpsc::UnboundedSender<()>,
    stop: watch::Receiver<bool>,
    rng: StdRng,
}

impl PhaseScheduler {
    pub(crate) fn new(
        phases: Vec<PhaseSpec>,
        bus: EventBus,
        ticks: mpsc::UnboundedSender<()>,
        stop: watch::Receiver<bool>,
        rng: StdRng,
    ) -> Self {
        Self {
            phases,
            bus,
            ticks,
            stop,
            rng,
        }
    }

    pub(crate) async fn run(mut self) {
        let phases = std::mem::take(&mut self.phases);
        for phase in &phases {
            if *self.stop.borrow() {
                break;
            }

            tracing::debug!(index = phase.index, name = ?phase.name, "phase started");
            self.bus.lifecycle(LifecycleEvent::PhaseStarted { index: phase.index });
            self.run_phase(phase).await;
            tracing::debug!(index = phase.index, "phase completed");
            self.bus
                .lifecycle(LifecycleEvent::PhaseCompleted { index: phase.index });
        }

        self.bus.lifecycle(LifecycleEvent::Done);
        // Dropping `self.ticks` here ends the arrival loop downstream.
    }

    async fn run_phase(&mut self, phase: &PhaseSpec) {
        match phase.kind {
            PhaseKind::Pause => {
                self.hold_until(Instant::now() + phase.duration).await;
            }
            PhaseKind::FixedCount { count } => {
                if count == 0 || phase.duration.is_zero() {
                    tracing::warn!(index = phase.index, "skipping malformed fixed-count phase");
                    return;
                }

                let interval =
                    Duration::from_nanos((phase.duration.as_nanos() / count as u128).max(1) as u64);
                let deadline = Instant::now() + phase.duration;
                self.drive(
                    ArrivalProcess::Uniform { interval },
                    deadline,
                    Some(count),
                )
                .await;
                self.hold_until(deadline).await;
            }
            PhaseKind::ConstantRate { rate } => {
                let deadline = Instant::now() + phase.duration;
                if rate == 0 {
                    tracing::debug!(index = phase.index, "rate 0 degrades to a pause");
                    self.hold_until(deadline).await;
                    return;
                }

                let gap = Duration::from_secs(1).div_f64(rate as f64);
                let process = match phase.mode {
                    ArrivalMode::Uniform => ArrivalProcess::Uniform { interval: gap },
                    ArrivalMode::Poisson => ArrivalProcess::Poisson { mean: gap },
                };
                self.drive(process, deadline, None).await;
                self.hold_until(deadline).await;
            }
            PhaseKind::Ramp { from, to } => {
                if to < from || phase.duration.is_zero() {
                    tracing::warn!(index = phase.index, "skipping malformed ramp phase");
                    return;
                }

                // Rate steps by 1; the inter-arrival interval is recomputed
                // only at these boundaries, off the monotonic clock.
                let steps = to - from + 1;
                let hold = Duration::from_nanos(
                    (phase.duration.as_nanos() / steps as u128).max(1) as u64,
                );

                let mut boundary = Instant::now();
                for rate in from..=to {
                    if *self.stop.borrow() {
                        return;
                    }

                    boundary += hold;
                    if rate == 0 {
                        self.hold_until(boundary).await;
                        continue;
                    }

                    let interval = Duration::from_secs(1).div_f64(rate as f64);
                    self.drive(ArrivalProcess::Uniform { interval }, boundary, None)
                        .await;
                    self.hold_until(boundary).await;
                }
            }
        }
    }

    async fn drive(&mut self, process: ArrivalProcess, deadline: Instant, limit: Option<u64>) {
        process
            .drive(
                deadline,
                limit,
                &self.bus,
                &self.ticks,
                &mut self.stop,
                &mut self.rng,
            )
            .await;
    }

    async fn hold_until(&mut self, deadline: Instant) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                res = self.stop.changed() => {
                    if res.is_err() || *self.stop.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::events::RunClock;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn phase(index: usize, duration: Duration, kind: PhaseKind) -> PhaseSpec {
        PhaseSpec {
            index,
            name: None,
            duration,
            kind,
            mode: ArrivalMode::Uniform,
        }
    }

    struct Run {
        ticks: mpsc::UnboundedReceiver<()>,
        lifecycle: tokio::sync::broadcast::Receiver<LifecycleEvent>,
        _stop: watch::Sender<bool>,
    }

    async fn run_phases(phases: Vec<PhaseSpec>) -> Run {
        let clock = Arc::new(RunClock::start());
        let (bus, _metrics_rx) = EventBus::new(clock);
        let lifecycle = bus.subscribe();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let scheduler = PhaseScheduler::new(
            phases,
            bus,
            ticks_tx,
            stop_rx,
            StdRng::seed_from_u64(11),
        );
        let handle = tokio::spawn(scheduler.run());
        if let Err(err) = handle.await {
            panic!("scheduler task failed: {err}");
        }

        Run {
            ticks: ticks_rx,
            lifecycle,
            _stop: stop_tx,
        }
    }

    fn drain_ticks(run: &mut Run) -> u64 {
        let mut n = 0;
        while run.ticks.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_count_emits_exactly_n_arrivals() {
        let mut run = run_phases(vec![phase(
            0,
            Duration::from_secs(2),
            PhaseKind::FixedCount { count: 20 },
        )])
        .await;
        assert_eq!(drain_ticks(&mut run), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_rate_zero_degrades_to_pause() {
        let mut run = run_phases(vec![phase(
            0,
            Duration::from_secs(5),
            PhaseKind::ConstantRate { rate: 0 },
        )])
        .await;
        assert_eq!(drain_ticks(&mut run), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poisson_constant_rate_approximates_target() {
        let mut p = phase(
            0,
            Duration::from_secs(60),
            PhaseKind::ConstantRate { rate: 10 },
        );
        p.mode = ArrivalMode::Poisson;

        let mut run = run_phases(vec![p]).await;
        let ticks = drain_ticks(&mut run);

        // 600 expected; Poisson noise at n=600 is ~±4%, leave headroom.
        assert!(
            (480..=720).contains(&ticks),
            "expected ~600 poisson arrivals, got {ticks}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_total_tracks_stepped_rate_integral() {
        let mut run = run_phases(vec![phase(
            0,
            Duration::from_secs(10),
            PhaseKind::Ramp { from: 1, to: 5 },
        )])
        .await;
        let ticks = drain_ticks(&mut run);

        // 2s at each of 1..=5 arrivals/s: 30 total, ±10%.
        assert!(
            (27..=33).contains(&ticks),
            "expected ~30 ramp arrivals, got {ticks}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_phase_is_skipped_and_later_phases_run() {
        let mut run = run_phases(vec![
            phase(
                0,
                Duration::from_secs(3600),
                PhaseKind::FixedCount { count: 0 },
            ),
            phase(
                1,
                Duration::from_secs(3600),
                PhaseKind::Ramp { from: 5, to: 1 },
            ),
            phase(2, Duration::from_secs(1), PhaseKind::FixedCount { count: 4 }),
        ])
        .await;
        assert_eq!(drain_ticks(&mut run), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_events_bracket_each_phase_in_order() {
        let mut run = run_phases(vec![
            phase(0, Duration::from_millis(10), PhaseKind::Pause),
            phase(
                1,
                Duration::from_millis(100),
                PhaseKind::FixedCount { count: 1 },
            ),
        ])
        .await;

        let mut seen = Vec::new();
        while let Ok(ev) = run.lifecycle.try_recv() {
            seen.push(ev);
        }

        assert_eq!(
            seen,
            vec![
                LifecycleEvent::PhaseStarted { index: 0 },
                LifecycleEvent::PhaseCompleted { index: 0 },
                LifecycleEvent::PhaseStarted { index: 1 },
                LifecycleEvent::Arrival,
                LifecycleEvent::PhaseCompleted { index: 1 },
                LifecycleEvent::Done,
            ]
        );
    }
}
