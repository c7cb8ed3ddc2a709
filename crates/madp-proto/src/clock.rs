use std::sync::OnceLock;
use std::time::Instant;

static CLOCK_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed since the first call in this process.
///
/// Wire timestamps are only ever echoed back to the peer that wrote them, so
/// a process-local monotonic origin is sufficient and keeps RTT samples
/// non-negative under wall-clock adjustments.
pub fn monotonic_secs() -> f64 {
    CLOCK_ORIGIN.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let a = monotonic_secs();
        let b = monotonic_secs();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}
