// ============================================================
// Layer 3 — Token Metric History
// ============================================================
// Per-token accumulator carried across epochs. One instance per
// token for the whole training run; it is only ever replaced by
// the value the metrics strategy returns for the current epoch.
//
// Invariant: total_epochs == correctness_history.len()
//
// Counts only grow and sequences only extend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetricHistory {
    /// Label index predicted in the previous epoch (`None` before the first epoch)
    pub last_prediction:        Option<usize>,
    pub total_epochs:           u32,
    pub last_confidence_sum:    f64,
    pub last_sq_difference_sum: f64,
    pub last_correctness_sum:   f64,
    /// Epoch at which the prediction last changed
    pub last_iteration:         u32,
    /// How often each label index has been predicted so far
    pub prediction_history:     Vec<u32>,
    /// One flag per epoch: was the prediction equal to the observed label
    pub correctness_history:    Vec<bool>,
}

impl TokenMetricHistory {
    pub fn new(label_set_size: usize) -> Self {
        Self {
            last_prediction:        None,
            total_epochs:           0,
            last_confidence_sum:    0.0,
            last_sq_difference_sum: 0.0,
            last_correctness_sum:   0.0,
            last_iteration:         0,
            prediction_history:     vec![0; label_set_size],
            correctness_history:    Vec::new(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total_epochs as usize == self.correctness_history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_history() {
        let h = TokenMetricHistory::new(5);
        assert_eq!(h.prediction_history, vec![0; 5]);
        assert!(h.last_prediction.is_none());
        assert!(h.is_consistent());
    }
}
