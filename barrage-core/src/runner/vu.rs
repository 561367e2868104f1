use std::collections::HashMap;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;

/// Per-VU mutable state, threaded through every step of one session.
/// Never shared with or read by another VU; protocol-specific handles live
/// in the engine's `Session`, alongside.
#[derive(Debug)]
pub struct VuContext {
    pub vu_id: u64,
    pub scenario: Arc<str>,
    pub vars: HashMap<String, String>,
    pub success_count: u64,
    pub pending_requests: u64,
    /// Per-VU randomness (jitter, user hooks); derived from the run seed
    /// so runs are reproducible.
    pub rng: StdRng,
}

impl VuContext {
    pub(crate) fn new(vu_id: u64, scenario: Arc<str>, seed: u64) -> Self {
        Self {
            vu_id,
            scenario,
            vars: HashMap::new(),
            success_count: 0,
            pending_requests: 0,
            rng: StdRng::seed_from_u64(seed.wrapping_add(vu_id)),
        }
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

/// Cooperative cancellation for a run. Triggering abandons the schedule
/// and all in-flight VUs within the run's grace period.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        // `send_replace` updates the value even with no receivers yet, so
        // a trigger ahead of the run is not lost.
        let _ = self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
