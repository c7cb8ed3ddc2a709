use std::time::Duration;

// Smoothing factor for the RTT estimate (EWMA alpha).
const RTT_ALPHA: f64 = 0.125;
// Smoothing factor for the RTT deviation (EWMA beta).
const RTT_BETA: f64 = 0.25;
// The retransmission timeout never exceeds this, regardless of samples.
const MAX_RTO_SECS: f64 = 2.0;
// Estimate and timeout before the first sample.
const INITIAL_RTO_SECS: f64 = 1.0;

/// Adaptive retransmission-timeout estimator over smoothed RTT and deviation.
///
/// Seconds as `f64` throughout, matching the wire timestamps the samples are
/// derived from.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    est_rtt: f64,
    dev_rtt: f64,
    rto: f64,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            est_rtt: INITIAL_RTO_SECS,
            dev_rtt: 0.0,
            rto: INITIAL_RTO_SECS,
        }
    }

    /// Folds one round-trip sample into the estimate and returns the updated
    /// timeout.
    pub fn on_sample(&mut self, sample_secs: f64) -> f64 {
        let sample = sample_secs.max(0.0);
        self.est_rtt = (1.0 - RTT_ALPHA) * self.est_rtt + RTT_ALPHA * sample;
        self.dev_rtt = (1.0 - RTT_BETA) * self.dev_rtt + RTT_BETA * (sample - self.est_rtt).abs();
        self.rto = (self.est_rtt + 4.0 * self.dev_rtt).min(MAX_RTO_SECS);
        self.rto
    }

    pub fn rto_secs(&self) -> f64 {
        self.rto
    }

    pub fn rto(&self) -> Duration {
        Duration::from_secs_f64(self.rto)
    }

    pub fn est_rtt_secs(&self) -> f64 {
        self.est_rtt
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_second() {
        let rtt = RttEstimator::new();
        assert_eq!(rtt.rto_secs(), 1.0);
        assert_eq!(rtt.est_rtt_secs(), 1.0);
    }

    #[test]
    fn sample_pulls_estimate_toward_itself() {
        let mut rtt = RttEstimator::new();
        rtt.on_sample(0.2);
        // est = 0.875 * 1.0 + 0.125 * 0.2
        assert!((rtt.est_rtt_secs() - 0.9).abs() < 1e-9);
        for _ in 0..200 {
            rtt.on_sample(0.2);
        }
        assert!((rtt.est_rtt_secs() - 0.2).abs() < 0.01);
        // With a steady RTT the deviation decays and the RTO converges.
        assert!(rtt.rto_secs() < 0.3);
    }

    #[test]
    fn rto_is_capped_at_two_seconds() {
        let mut rtt = RttEstimator::new();
        for _ in 0..10 {
            rtt.on_sample(30.0);
        }
        assert_eq!(rtt.rto_secs(), 2.0);
    }

    #[test]
    fn negative_samples_are_clamped() {
        let mut rtt = RttEstimator::new();
        let rto = rtt.on_sample(-5.0);
        assert!(rto > 0.0);
        assert!(rtt.est_rtt_secs() >= 0.0);
    }
}
