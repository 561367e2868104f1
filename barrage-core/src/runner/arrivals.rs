use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::events::{EventBus, LifecycleEvent};

/// Inter-arrival distribution for rate-driven phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ArrivalMode {
    Uniform,
    Poisson,
}

/// One Poisson inter-arrival gap: `-ln(U) * mean`, `U` uniform in (0, 1].
pub(crate) fn poisson_gap(mean: Duration, rng: &mut impl Rng) -> Duration {
    // `gen::<f64>()` is in [0, 1); flip it so ln is defined.
    let u = 1.0 - rng.r#gen::<f64>();
    mean.mul_f64(-u.ln())
}

/// A primitive arrival emitter: fires ticks until its deadline, its tick
/// limit, or a stop signal, whichever comes first.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ArrivalProcess {
    Uniform { interval: Duration },
    Poisson { mean: Duration },
}

impl ArrivalProcess {
    /// Drive the process, sending a tick per arrival and mirroring each on
    /// the lifecycle bus. Deadlines advance monotonically (`next += gap`)
    /// so scheduling drift does not accumulate. Returns the emitted count.
    pub(crate) async fn drive(
        self,
        deadline: Instant,
        limit: Option<u64>,
        bus: &EventBus,
        ticks: &mpsc::UnboundedSender<()>,
        stop: &mut watch::Receiver<bool>,
        rng: &mut StdRng,
    ) -> u64 {
        let mut emitted = 0u64;
        let mut next = Instant::now();

        loop {
            if *stop.borrow() {
                return emitted;
            }
            if limit.is_some_and(|l| emitted >= l) {
                return emitted;
            }

            let gap = match self {
                ArrivalProcess::Uniform { interval } => interval,
                ArrivalProcess::Poisson { mean } => poisson_gap(mean, rng),
            };
            if gap.is_zero() {
                tracing::warn!("arrival gap is zero; ending this phase's generator");
                return emitted;
            }

            next += gap;
            if next > deadline {
                return emitted;
            }

            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(next) => break,
                    res = stop.changed() => {
                        if res.is_err() || *stop.borrow() {
                            return emitted;
                        }
                    }
                }
            }

            if ticks.send(()).is_err() {
                // Consumer is gone; nothing left to arrive for.
                return emitted;
            }
            bus.lifecycle(LifecycleEvent::Arrival);
            emitted = emitted.saturating_add(1);
        }
    }
}
