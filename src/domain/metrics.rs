// ============================================================
// Layer 3 — Per-Token Metric Records
// ============================================================
// The closed set of training-dynamics metrics and the record a
// metrics strategy produces for one token in one epoch.
//
// Metric names are the column names used in epoch logs and in
// remediation configs, so their string forms are stable.
//
// Reference: Swayamdipta et al. (2020) Dataset Cartography
//            Toneva et al. (2019) Forgetting Events
//            Baldock et al. (2021) Prediction Depth

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Confidence,
    Variability,
    Correctness,
    Msp,
    BvSB,
    CrossEntropy,
    Entropy,
    IterNorm,
    Pehist,
    MildM,
    MildF,
    Mild,
    PredictionDepth,
    FirstLayer,
    TotalAgreeCorrect,
    TotalAgreeLast,
    LayerEntropy,
}

impl Metric {
    /// Metrics every strategy produces, in log column order.
    pub const BASE: [Metric; 12] = [
        Metric::Confidence,
        Metric::Variability,
        Metric::Correctness,
        Metric::Msp,
        Metric::BvSB,
        Metric::CrossEntropy,
        Metric::Entropy,
        Metric::IterNorm,
        Metric::Pehist,
        Metric::MildM,
        Metric::MildF,
        Metric::Mild,
    ];

    /// Extra metrics of the early-exit strategy, appended after [`Metric::BASE`].
    pub const LAYER: [Metric; 5] = [
        Metric::PredictionDepth,
        Metric::FirstLayer,
        Metric::TotalAgreeCorrect,
        Metric::TotalAgreeLast,
        Metric::LayerEntropy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Confidence        => "confidence",
            Metric::Variability       => "variability",
            Metric::Correctness       => "correctness",
            Metric::Msp               => "msp",
            Metric::BvSB              => "BvSB",
            Metric::CrossEntropy      => "cross_entropy",
            Metric::Entropy           => "entropy",
            Metric::IterNorm          => "iter_norm",
            Metric::Pehist            => "pehist",
            Metric::MildM             => "mild_m",
            Metric::MildF             => "mild_f",
            Metric::Mild              => "mild",
            Metric::PredictionDepth   => "pd",
            Metric::FirstLayer        => "fl",
            Metric::TotalAgreeCorrect => "tac",
            Metric::TotalAgreeLast    => "tal",
            Metric::LayerEntropy      => "le",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let name = s.trim();
        for metric in Metric::BASE.iter().chain(Metric::LAYER.iter()) {
            if metric.as_str() == name {
                return Ok(*metric);
            }
        }
        bail!("unknown metric '{name}'")
    }
}

// ─── LayerMetrics ─────────────────────────────────────────────────────────────
/// Agreement metrics across the exits of a multi-layer classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerMetrics {
    pub prediction_depth:      usize,
    pub first_layer:           usize,
    pub total_agree_w_last:    usize,
    pub total_agree_w_correct: usize,
    pub layer_entropy:         f64,
}

// ─── TokenMetrics ─────────────────────────────────────────────────────────────
/// All metrics computed for one token in one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub confidence:    f64,
    pub variability:   f64,
    pub correctness:   f64,
    pub msp:           f64,
    pub bvsb:          f64,
    pub cross_entropy: f64,
    pub entropy:       f64,
    pub iter_norm:     f64,
    pub pehist:        f64,
    pub mild_m:        usize,
    pub mild_f:        usize,
    pub mild:          i64,
    pub layer:         Option<LayerMetrics>,
}

impl TokenMetrics {
    /// Value of `metric`, or `None` for a layer metric on a standard record.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        let layer = self.layer.as_ref();
        let value = match metric {
            Metric::Confidence        => self.confidence,
            Metric::Variability       => self.variability,
            Metric::Correctness       => self.correctness,
            Metric::Msp               => self.msp,
            Metric::BvSB              => self.bvsb,
            Metric::CrossEntropy      => self.cross_entropy,
            Metric::Entropy           => self.entropy,
            Metric::IterNorm          => self.iter_norm,
            Metric::Pehist            => self.pehist,
            Metric::MildM             => self.mild_m as f64,
            Metric::MildF             => self.mild_f as f64,
            Metric::Mild              => self.mild as f64,
            Metric::PredictionDepth   => layer?.prediction_depth as f64,
            Metric::FirstLayer        => layer?.first_layer as f64,
            Metric::TotalAgreeCorrect => layer?.total_agree_w_correct as f64,
            Metric::TotalAgreeLast    => layer?.total_agree_w_last as f64,
            Metric::LayerEntropy      => layer?.layer_entropy,
        };
        Some(value)
    }
}
