use std::sync::Arc;
use std::time::Duration;

use barrage_metrics::{MetricEvent, MetricEventKind};
use tokio::sync::{broadcast, mpsc};

/// Monotonic run clock. All metric events are stamped with an offset from
/// run start, which is what the collector buckets on.
#[derive(Debug)]
pub struct RunClock {
    started: tokio::time::Instant,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            started: tokio::time::Instant::now(),
        }
    }

    pub fn offset(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    PhaseStarted { index: usize },
    PhaseCompleted { index: usize },
    Arrival,
    Done,
}

/// Shared event bus: a single-consumer metric stream feeding the
/// collector, plus a broadcast side for lifecycle observers (reporters,
/// orchestration). Cloned into every VU and the scheduler; the metric
/// stream closes when the last clone drops.
#[derive(Debug, Clone)]
pub struct EventBus {
    clock: Arc<RunClock>,
    metrics: mpsc::UnboundedSender<MetricEvent>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(clock: Arc<RunClock>) -> (Self, mpsc::UnboundedReceiver<MetricEvent>) {
        let (metrics, rx) = mpsc::unbounded_channel();
        let (lifecycle, _) = broadcast::channel(256);
        (
            Self {
                clock,
                metrics,
                lifecycle,
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    pub fn offset(&self) -> Duration {
        self.clock.offset()
    }

    pub fn emit(&self, kind: MetricEventKind) {
        // The collector dropping its receiver means the run is over;
        // nothing useful to do with the event then.
        let _ = self
            .metrics
            .send(MetricEvent::new(self.clock.offset(), kind));
    }

    pub fn counter(&self, name: &str, delta: u64) {
        self.emit(MetricEventKind::Counter {
            name: name.to_string(),
            delta,
        });
    }

    pub fn histogram(&self, name: &str, value: u64) {
        self.emit(MetricEventKind::Histogram {
            name: name.to_string(),
            value,
        });
    }

    pub fn rate(&self, name: &str) {
        self.emit(MetricEventKind::Rate {
            name: name.to_string(),
        });
    }

    pub fn request(&self) {
        self.emit(MetricEventKind::Request);
    }

    pub fn response(&self, latency: Duration, code: u16, vu_id: u64) {
        self.emit(MetricEventKind::Response {
            latency,
            code,
            vu_id,
        });
    }

    pub fn error(&self, code: &str) {
        self.emit(MetricEventKind::Error {
            code: code.to_string(),
        });
    }

    pub(crate) fn lifecycle(&self, ev: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.lifecycle.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitted_events_carry_a_timestamp_and_reach_the_consumer() {
        let clock = Arc::new(RunClock::start());
        let (bus, mut rx) = EventBus::new(clock);

        bus.counter("vusers.created", 1);
        bus.request();

        let first = match rx.recv().await {
            Some(ev) => ev,
            None => panic!("expected an event"),
        };
        match first.kind {
            MetricEventKind::Counter { ref name, delta } => {
                assert_eq!(name, "vusers.created");
                assert_eq!(delta, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let second = match rx.recv().await {
            Some(ev) => ev,
            None => panic!("expected an event"),
        };
        assert_eq!(second.kind, MetricEventKind::Request);
        assert!(second.at >= first.at);
    }

    #[tokio::test]
    async fn lifecycle_broadcast_reaches_subscribers() {
        let clock = Arc::new(RunClock::start());
        let (bus, _rx) = EventBus::new(clock);

        let mut sub = bus.subscribe();
        bus.lifecycle(LifecycleEvent::Done);

        match sub.recv().await {
            Ok(ev) => assert_eq!(ev, LifecycleEvent::Done),
            Err(err) => panic!("broadcast recv failed: {err}"),
        }
    }
}
