use std::time::Duration;

use rand::Rng;

/// Offset `base` by a uniform draw from `[-jitter, +jitter]`, clamped at
/// zero. A zero jitter returns `base` unchanged.
pub fn apply_jitter(base: Duration, jitter: Duration, rng: &mut impl Rng) -> Duration {
    if jitter.is_zero() {
        return base;
    }

    let bound = jitter.as_secs_f64();
    let offset = rng.gen_range(-bound..=bound);
    let total = base.as_secs_f64() + offset;
    if total <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(total)
}
