use std::collections::VecDeque;

use crate::Timestamp;

const WINDOW: usize = 10;

/// Receive rate over a sliding window of the most recent inter-arrival deltas.
#[derive(Clone, Debug, Default)]
pub struct RateEstimator {
    last: Option<Timestamp>,
    deltas: VecDeque<f64>,
    hz: f64,
}

impl RateEstimator {
    pub fn update(&mut self, timestamp: Timestamp) {
        let Some(last) = self.last.replace(timestamp) else {
            return;
        };
        if self.deltas.len() == WINDOW {
            self.deltas.pop_front();
        }
        self.deltas.push_back(timestamp.secs_since(last));
        let sum: f64 = self.deltas.iter().sum();
        if sum > 0.0 {
            self.hz = self.deltas.len() as f64 / sum;
        }
    }

    pub fn hz(&self) -> f64 {
        self.hz
    }

    pub fn last(&self) -> Option<Timestamp> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_update_only_records() {
        let mut rate = RateEstimator::default();
        rate.update(Timestamp::from_secs_f64(3.0));
        assert_eq!(rate.hz(), 0.0);
        assert_eq!(rate.last(), Some(Timestamp::from_secs_f64(3.0)));
    }

    #[test]
    fn test_window_holds_last_ten_deltas() {
        let mut rate = RateEstimator::default();
        // five slow deltas followed by ten fast ones
        let mut t = 0.0;
        rate.update(Timestamp::from_secs_f64(t));
        for _ in 0..5 {
            t += 1.0;
            rate.update(Timestamp::from_secs_f64(t));
        }
        assert_relative_eq!(rate.hz(), 1.0);
        for _ in 0..10 {
            t += 0.02;
            rate.update(Timestamp::from_secs_f64(t));
        }
        assert_relative_eq!(rate.hz(), 50.0, epsilon = 1e-6);
    }

    #[test]
    fn test_partial_window() {
        let mut rate = RateEstimator::default();
        for t in [0.0, 0.1, 0.3, 0.6] {
            rate.update(Timestamp::from_secs_f64(t));
        }
        assert_relative_eq!(rate.hz(), 3.0 / 0.6, epsilon = 1e-9);
    }
}
