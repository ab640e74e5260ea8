// ============================================================
// Layer 5 — Early-Exit Layer Metrics
// ============================================================
// For a model with one decoder head per block, compares the
// predictions of all heads for one token. With L heads,
// pred[i] = argmax of head i and last = L - 1:
//
//   pd   prediction depth: L minus the length of the run of
//        heads, ending at the last one, that agree with it.
//        The scan starts at the last head itself, not at L - 2,
//        so a token whose heads all agree has pd = 0
//   fl   lowest head predicting the observed label (L if none)
//   tal  heads agreeing with the last head
//   tac  heads predicting the observed label
//   le   entropy of the histogram of head predictions over the
//        full label set
//
// Independent of history: only the current epoch's scores count.
//
// Reference: Baldock et al. (2021) Deep Learning Through the
//            Lens of Example Difficulty

use anyhow::{ensure, Result};

use crate::domain::history::TokenMetricHistory;
use crate::domain::metrics::{LayerMetrics, Metric};
use crate::domain::traits::{MetricsStrategy, MetricsUpdate};
use crate::ml::metrics::{argmax, entropy, softmax, StandardMetrics};

// ─── EarlyExitLayerAnalyzer ───────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct EarlyExitLayerAnalyzer {
    label_set_size: usize,
}

impl EarlyExitLayerAnalyzer {
    pub fn new(label_set_size: usize) -> Self {
        Self { label_set_size }
    }

    /// `layer_probs` holds one softmax distribution per head, shallowest first.
    pub fn analyze(&self, layer_probs: &[Vec<f64>], observed: usize) -> Result<LayerMetrics> {
        ensure!(!layer_probs.is_empty(), "no layer distributions for token");
        ensure!(
            layer_probs.iter().all(|p| p.len() == self.label_set_size),
            "layer distribution size differs from label set size {}",
            self.label_set_size
        );

        let preds: Vec<usize> = layer_probs.iter().map(|p| argmax(p)).collect();
        let layers = preds.len();
        let last = preds[layers - 1];

        let mut prediction_depth = layers;
        let mut depth_final = false;
        let mut first_layer = layers;
        let mut total_agree_w_last = 0;
        let mut total_agree_w_correct = 0;

        for (i, &pred) in preds.iter().enumerate().rev() {
            if pred == observed {
                first_layer = i;
                total_agree_w_correct += 1;
            }
            if pred == last {
                if !depth_final {
                    prediction_depth -= 1;
                }
                total_agree_w_last += 1;
            } else {
                depth_final = true;
            }
        }

        let mut counts = vec![0usize; self.label_set_size];
        for &pred in &preds {
            counts[pred] += 1;
        }
        let frequencies: Vec<f64> = counts.iter().map(|&c| c as f64 / layers as f64).collect();

        Ok(LayerMetrics {
            prediction_depth,
            first_layer,
            total_agree_w_last,
            total_agree_w_correct,
            layer_entropy: entropy(&frequencies),
        })
    }
}

// ─── EarlyExitMetrics ─────────────────────────────────────────────────────────
/// Standard metrics on the last head plus the layer metrics over all heads.
#[derive(Debug, Clone)]
pub struct EarlyExitMetrics {
    standard: StandardMetrics,
    analyzer: EarlyExitLayerAnalyzer,
}

impl EarlyExitMetrics {
    pub fn new(label_set_size: usize) -> Self {
        Self {
            standard: StandardMetrics::new(label_set_size),
            analyzer: EarlyExitLayerAnalyzer::new(label_set_size),
        }
    }
}

impl MetricsStrategy for EarlyExitMetrics {
    fn metric_names(&self) -> Vec<Metric> {
        Metric::BASE.iter().chain(Metric::LAYER.iter()).copied().collect()
    }

    fn compute(
        &self,
        layer_scores: &[Vec<f32>],
        observed:     usize,
        history:      &TokenMetricHistory,
    ) -> Result<MetricsUpdate> {
        let mut update = self.standard.compute(layer_scores, observed, history)?;
        let layer_probs: Vec<Vec<f64>> = layer_scores.iter().map(|s| softmax(s)).collect();
        update.metrics.layer = Some(self.analyzer.analyze(&layer_probs, observed)?);
        Ok(update)
    }
}
