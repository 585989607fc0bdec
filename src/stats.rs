//! Per-cycle measurement results.
//!
//! One measurement cycle yields a [`TestResult`]: the loss fraction derived
//! from the prober's sent-count heuristic plus mean/max/min/stddev of the
//! matched delays in milliseconds.

use std::fmt;

/// Statistics for one completed measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TestResult {
    /// Fraction of pings considered lost. May be slightly negative when the
    /// responder's pruning makes the sent-count heuristic under-count.
    pub loss: f64,
    /// Mean delay in milliseconds.
    pub avg_ms: f64,
    /// Maximum delay in milliseconds.
    pub max_ms: f64,
    /// Minimum delay in milliseconds.
    pub min_ms: f64,
    /// Population standard deviation of the delays, 0.0 for a single sample.
    pub stddev_ms: f64,
}

impl TestResult {
    /// Derives a result from the estimated sent count and the matched delays.
    ///
    /// Returns `None` when `sent_count` is zero or no delays matched; the
    /// caller surfaces that as an insufficient-data failure rather than
    /// dividing by zero.
    #[must_use]
    pub fn from_delays(sent_count: usize, delays: &[u16]) -> Option<TestResult> {
        if sent_count == 0 || delays.is_empty() {
            return None;
        }

        let n = delays.len() as f64;
        let sum: f64 = delays.iter().map(|&d| f64::from(d)).sum();
        let mean = sum / n;

        let variance = delays
            .iter()
            .map(|&d| {
                let diff = f64::from(d) - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;
        let stddev_ms = if delays.len() < 2 { 0.0 } else { variance.sqrt() };

        // unwraps are safe: delays is non-empty
        let max_ms = f64::from(*delays.iter().max().unwrap());
        let min_ms = f64::from(*delays.iter().min().unwrap());

        let loss = (sent_count as f64 - n) / sent_count as f64;

        Some(TestResult {
            loss,
            avg_ms: mean,
            max_ms,
            min_ms,
            stddev_ms,
        })
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "loss {:.1}%, avg {:.1}ms, max {:.1}ms, min {:.1}ms, stddev {:.1}ms",
            self.loss * 100.0,
            self.avg_ms,
            self.max_ms,
            self.min_ms,
            self.stddev_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sent_yields_none() {
        assert!(TestResult::from_delays(0, &[1, 2, 3]).is_none());
    }

    #[test]
    fn zero_matched_yields_none() {
        assert!(TestResult::from_delays(5, &[]).is_none());
    }

    #[test]
    fn single_sample_has_zero_stddev() {
        let r = TestResult::from_delays(1, &[12]).unwrap();
        assert_eq!(r.loss, 0.0);
        assert_eq!(r.avg_ms, 12.0);
        assert_eq!(r.max_ms, 12.0);
        assert_eq!(r.min_ms, 12.0);
        assert_eq!(r.stddev_ms, 0.0);
    }

    #[test]
    fn aggregates_over_samples() {
        let r = TestResult::from_delays(5, &[10, 20, 30, 40]).unwrap();
        assert!((r.loss - 0.2).abs() < 1e-9);
        assert!((r.avg_ms - 25.0).abs() < 1e-9);
        assert_eq!(r.max_ms, 40.0);
        assert_eq!(r.min_ms, 10.0);
        // population stddev of 10,20,30,40 around 25: sqrt(125)
        assert!((r.stddev_ms - 125f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn loss_can_go_negative() {
        // The sent-count heuristic can undercount when the responder pruned
        // older records before the stat request arrived.
        let r = TestResult::from_delays(3, &[5, 5, 5, 5]).unwrap();
        assert!(r.loss < 0.0);
    }

    #[test]
    fn serializes_to_json() {
        let r = TestResult::from_delays(5, &[10, 20]).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"loss\""));
        assert!(json.contains("\"avg_ms\""));
    }

    #[test]
    fn display_is_human_readable() {
        let r = TestResult::from_delays(5, &[10, 20, 30, 40, 50]).unwrap();
        let s = r.to_string();
        assert!(s.contains("loss 0.0%"));
        assert!(s.contains("avg 30.0ms"));
    }
}
