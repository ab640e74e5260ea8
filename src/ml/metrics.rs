// ============================================================
// Layer 5 — Training-Dynamics Metrics (standard strategy)
// ============================================================
// Per token and per epoch, from the class scores of the final
// classifier layer, the observed label y and the token history:
//
//   p        = softmax(scores)          ŷ = argmax p
//   n        = history.total_epochs + 1
//
//   msp           p[ŷ]
//   BvSB          p[ŷ] - second largest p
//   confidence    (Σ p[y]) / n
//   variability   sqrt( Σ (p[y] - confidence_e)² / n )
//                 confidence_e is the running mean at the epoch
//                 the term was added, not the final mean
//   correctness   (Σ [ŷ == y]) / n
//   iter_norm     epoch of last prediction change / n
//   pehist        entropy of the prediction-count histogram,
//                 divided by ln(|labels|)
//   mild_f        epochs spent in runs of correct predictions
//   mild_m        epochs spent in runs of wrong predictions
//   mild          mild_m - mild_f
//   entropy       -Σ p ln p
//   cross_entropy -ln p[y]
//
// ln(0) terms contribute 0; no metric may come out NaN.
//
// Reference: Swayamdipta et al. (2020) Dataset Cartography
//            Toneva et al. (2019) An Empirical Study of Example
//            Forgetting during Deep Neural Network Learning

use anyhow::{bail, ensure, Result};

use crate::domain::history::TokenMetricHistory;
use crate::domain::metrics::{Metric, TokenMetrics};
use crate::domain::traits::{MetricsStrategy, MetricsUpdate};

// ─── Numeric helpers ──────────────────────────────────────────────────────────
/// Numerically stable softmax, computed in f64.
pub fn softmax(scores: &[f32]) -> Vec<f64> {
    let max = scores.iter().fold(f64::NEG_INFINITY, |m, &s| m.max(s as f64));
    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Largest and second largest value.
fn top_two(values: &[f64]) -> (f64, f64) {
    let mut first = f64::NEG_INFINITY;
    let mut second = f64::NEG_INFINITY;
    for &v in values {
        if v > first {
            second = first;
            first = v;
        } else if v > second {
            second = v;
        }
    }
    (first, if second.is_finite() { second } else { 0.0 })
}

/// Shannon entropy in nats; zero-probability entries contribute nothing.
pub fn entropy(distribution: &[f64]) -> f64 {
    let h: f64 = distribution
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum();
    clamp_nan(-h)
}

/// NaN → 0.0, and -0.0 → 0.0.
fn clamp_nan(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x + 0.0 }
}

/// Epochs spent in runs of correct predictions.
pub fn mild_f(flags: &[bool]) -> usize {
    flags.split(|&correct| !correct).map(<[bool]>::len).sum()
}

/// Epochs spent in runs of wrong predictions.
pub fn mild_m(flags: &[bool]) -> usize {
    flags.split(|&correct| correct).map(<[bool]>::len).sum()
}

// ─── StandardMetrics ──────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct StandardMetrics {
    label_set_size: usize,
    /// ln(|labels|): entropy of the uniform distribution, normaliser of pehist
    max_certainty:  f64,
}

impl StandardMetrics {
    pub fn new(label_set_size: usize) -> Self {
        Self {
            label_set_size,
            max_certainty: -(1.0 / label_set_size as f64).ln(),
        }
    }

    pub fn label_set_size(&self) -> usize {
        self.label_set_size
    }

    /// Metrics for one score vector. The returned history replaces the token's
    /// stored history once the epoch row has been written.
    pub fn calculate(
        &self,
        scores:   &[f32],
        observed: usize,
        history:  &TokenMetricHistory,
    ) -> Result<MetricsUpdate> {
        ensure!(
            scores.len() == self.label_set_size,
            "score vector has {} entries, label set has {}",
            scores.len(),
            self.label_set_size
        );
        ensure!(observed < self.label_set_size, "observed label {observed} out of range");
        ensure!(
            history.prediction_history.len() == self.label_set_size,
            "prediction history has {} entries, label set has {}",
            history.prediction_history.len(),
            self.label_set_size
        );
        ensure!(
            history.is_consistent(),
            "history has {} epochs but {} correctness flags",
            history.total_epochs,
            history.correctness_history.len()
        );

        let p = softmax(scores);
        let prediction = argmax(&p);
        let p_true = p[observed];
        let (p_first, p_second) = top_two(&p);
        let correct = prediction == observed;

        let total_epochs = history.total_epochs + 1;
        let n = total_epochs as f64;

        // confidence / variability / correctness
        let confidence_sum = history.last_confidence_sum + p_true;
        let confidence = confidence_sum / n;
        let sq_difference_sum = history.last_sq_difference_sum + (p_true - confidence).powi(2);
        let variability = (sq_difference_sum / n).sqrt();
        let correctness_sum = history.last_correctness_sum + if correct { 1.0 } else { 0.0 };
        let correctness = correctness_sum / n;

        // iteration learned
        let last_iteration = if history.last_prediction != Some(prediction) {
            total_epochs
        } else {
            history.last_iteration
        };
        let iter_norm = last_iteration as f64 / n;

        // entropy of the prediction history
        let mut prediction_history = history.prediction_history.clone();
        prediction_history[prediction] += 1;
        let frequencies: Vec<f64> = prediction_history.iter().map(|&c| c as f64 / n).collect();
        let pehist = clamp_nan(entropy(&frequencies) / self.max_certainty);

        // memorization / forgetting
        let mut correctness_history = history.correctness_history.clone();
        correctness_history.push(correct);
        let mild_f = mild_f(&correctness_history);
        let mild_m = mild_m(&correctness_history);

        let cross_entropy = if p_true > 0.0 { clamp_nan(-p_true.ln()) } else { 0.0 };

        let metrics = TokenMetrics {
            confidence,
            variability,
            correctness,
            msp: p_first,
            bvsb: p_first - p_second,
            cross_entropy,
            entropy: entropy(&p),
            iter_norm,
            pehist,
            mild_m,
            mild_f,
            mild: mild_m as i64 - mild_f as i64,
            layer: None,
        };

        for metric in Metric::BASE {
            if let Some(v) = metrics.get(metric) {
                if v.is_nan() {
                    bail!("metric {metric} is NaN (scores: {scores:?})");
                }
            }
        }

        let history = TokenMetricHistory {
            last_prediction: Some(prediction),
            total_epochs,
            last_confidence_sum: confidence_sum,
            last_sq_difference_sum: sq_difference_sum,
            last_correctness_sum: correctness_sum,
            last_iteration,
            prediction_history,
            correctness_history,
        };

        Ok(MetricsUpdate { prediction, metrics, history })
    }
}

impl MetricsStrategy for StandardMetrics {
    fn metric_names(&self) -> Vec<Metric> {
        Metric::BASE.to_vec()
    }

    fn compute(
        &self,
        layer_scores: &[Vec<f32>],
        observed:     usize,
        history:      &TokenMetricHistory,
    ) -> Result<MetricsUpdate> {
        match layer_scores.last() {
            Some(scores) => self.calculate(scores, observed, history),
            None => bail!("no score vector for token"),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    /// Scores whose softmax puts `p` on `label` and spreads the rest evenly.
    fn scores_for(p: f64, label: usize, size: usize) -> Vec<f32> {
        let rest = (1.0 - p) / (size - 1) as f64;
        (0..size)
            .map(|i| if i == label { p.ln() as f32 } else { rest.ln() as f32 })
            .collect()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!(close(p.iter().sum::<f64>(), 1.0));
        assert_eq!(argmax(&p), 2);
    }

    #[test]
    fn test_argmax_first_wins_ties() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
    }

    #[test]
    fn test_mild_split_definition() {
        let flags = [true, false, true];
        assert_eq!(mild_f(&flags), 2);
        assert_eq!(mild_m(&flags), 1);

        let all_ones = [true; 5];
        assert_eq!(mild_f(&all_ones), 5);
        assert_eq!(mild_m(&all_ones), 0);

        let all_zeros = [false; 4];
        assert_eq!(mild_f(&all_zeros), 0);
        assert_eq!(mild_m(&all_zeros), 4);
    }

    #[test]
    fn test_mild_after_three_epochs() {
        let calc = StandardMetrics::new(2);
        let mut history = TokenMetricHistory::new(2);
        // observed label 0; predictions 0, 1, 0
        let epochs = [[2.0f32, 0.0], [0.0, 2.0], [2.0, 0.0]];
        let mut last = None;
        for scores in epochs {
            let update = calc.calculate(&scores, 0, &history).unwrap();
            history = update.history;
            last = Some(update.metrics);
        }
        let m = last.unwrap();
        assert_eq!(history.correctness_history, vec![true, false, true]);
        assert_eq!(m.mild_f, 2);
        assert_eq!(m.mild_m, 1);
        assert_eq!(m.mild, -1);
        assert_eq!(m.mild_m as i64 - m.mild_f as i64, m.mild);
    }

    #[test]
    fn test_first_epoch_values() {
        let calc = StandardMetrics::new(4);
        let history = TokenMetricHistory::new(4);
        let update = calc.calculate(&scores_for(0.7, 1, 4), 1, &history).unwrap();
        let m = &update.metrics;

        assert_eq!(update.prediction, 1);
        assert!((m.confidence - 0.7).abs() < 1e-6);
        assert!(close(m.variability, 0.0));
        assert!(close(m.correctness, 1.0));
        assert!((m.msp - 0.7).abs() < 1e-6);
        assert!((m.bvsb - 0.6).abs() < 1e-6);
        assert!(close(m.iter_norm, 1.0));
        assert!(close(m.pehist, 0.0));
        assert!((m.cross_entropy + 0.7f64.ln()).abs() < 1e-6);

        assert_eq!(update.history.total_epochs, 1);
        assert_eq!(update.history.prediction_history, vec![0, 1, 0, 0]);
        assert_eq!(update.history.last_prediction, Some(1));
        assert_eq!(update.history.last_iteration, 1);
    }

    #[test]
    fn test_incremental_matches_replayed_recurrence() {
        let calc = StandardMetrics::new(3);
        let p_true = [0.2, 0.9, 0.35, 0.6, 0.05, 0.8];
        let mut history = TokenMetricHistory::new(3);
        let mut conf_sum = 0.0;
        let mut sq_sum = 0.0;

        for (e, &p) in p_true.iter().enumerate() {
            let update = calc.calculate(&scores_for(p, 0, 3), 0, &history).unwrap();
            history = update.history;

            let n = (e + 1) as f64;
            conf_sum += p;
            let confidence = conf_sum / n;
            sq_sum += (p - confidence).powi(2);
            let variability = (sq_sum / n).sqrt();

            assert!((update.metrics.confidence - confidence).abs() < 1e-6);
            assert!((update.metrics.variability - variability).abs() < 1e-6);
            assert!(history.is_consistent());
            assert_eq!(history.total_epochs as usize, e + 1);
        }
    }

    #[test]
    fn test_iteration_learned_tracks_last_change() {
        let calc = StandardMetrics::new(2);
        let mut history = TokenMetricHistory::new(2);
        let preds = [0usize, 0, 1, 1];
        let mut iter_norms = Vec::new();
        for &pred in &preds {
            let scores = if pred == 0 { [3.0f32, 0.0] } else { [0.0, 3.0] };
            let update = calc.calculate(&scores, 0, &history).unwrap();
            iter_norms.push(update.metrics.iter_norm);
            history = update.history;
        }
        // changes at epoch 1 (from unset) and epoch 3
        assert!(close(iter_norms[0], 1.0));
        assert!(close(iter_norms[1], 0.5));
        assert!(close(iter_norms[2], 1.0));
        assert!(close(iter_norms[3], 0.75));
    }

    #[test]
    fn test_pehist_uniform_history_is_one() {
        let calc = StandardMetrics::new(2);
        let mut history = TokenMetricHistory::new(2);
        let mut pehist = 0.0;
        for scores in [[3.0f32, 0.0], [0.0, 3.0]] {
            let update = calc.calculate(&scores, 0, &history).unwrap();
            pehist = update.metrics.pehist;
            history = update.history;
        }
        assert!(close(pehist, 1.0));
    }

    #[test]
    fn test_zero_probability_yields_finite_values() {
        let calc = StandardMetrics::new(3);
        let history = TokenMetricHistory::new(3);
        // p[2] underflows to exactly 0
        let update = calc.calculate(&[0.0, 0.0, -2000.0], 2, &history).unwrap();
        let m = &update.metrics;
        assert_eq!(m.cross_entropy, 0.0);
        assert!(m.entropy.is_finite());
        assert!((m.entropy - 2f64.ln()).abs() < 1e-9);
        for metric in Metric::BASE {
            assert!(!m.get(metric).unwrap().is_nan());
        }
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let calc = StandardMetrics::new(3);
        let history = TokenMetricHistory::new(3);
        assert!(calc.calculate(&[0.0, 1.0], 0, &history).is_err());
        assert!(calc.calculate(&[0.0, 1.0, 2.0], 3, &history).is_err());

        let mut broken = TokenMetricHistory::new(3);
        broken.total_epochs = 2;
        assert!(calc.calculate(&[0.0, 1.0, 2.0], 0, &broken).is_err());
    }

    #[test]
    fn test_strategy_uses_last_layer() {
        let calc = StandardMetrics::new(2);
        let history = TokenMetricHistory::new(2);
        let layers = vec![vec![5.0f32, 0.0], vec![0.0, 5.0]];
        let update = calc.compute(&layers, 0, &history).unwrap();
        assert_eq!(update.prediction, 1);
        assert!(calc.compute(&[], 0, &history).is_err());
    }
}
