// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between layers:
//
//   CorpusSource     → anything that yields annotated sentences
//                      (ColumnCorpusLoader reads column files)
//   MetricsStrategy  → turns one token's class scores plus its
//                      history into metrics and a new history
//                      (standard and early-exit implementations)
//   Persistable      → state saved next to a training run
//                      (vocabulary, label dictionary)
//
// The trainer owns a Box<dyn MetricsStrategy>; which one is
// chosen by configuration, not by subclassing the model.
//
// Reference: Rust Book §10 (Traits), §17 (Trait Objects)

use anyhow::Result;

use crate::domain::history::TokenMetricHistory;
use crate::domain::metrics::{Metric, TokenMetrics};
use crate::domain::sentence::Sentence;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
pub trait CorpusSource {
    /// Load every sentence, indexed in corpus order.
    fn load_all(&self) -> Result<Vec<Sentence>>;
}

// ─── MetricsStrategy ──────────────────────────────────────────────────────────
/// Result of one token's metric computation for one epoch.
#[derive(Debug, Clone)]
pub struct MetricsUpdate {
    /// Label index predicted by the final layer
    pub prediction: usize,
    pub metrics:    TokenMetrics,
    /// History to store on the token once the epoch row is logged
    pub history:    TokenMetricHistory,
}

pub trait MetricsStrategy {
    /// Metric columns this strategy produces, in log order.
    fn metric_names(&self) -> Vec<Metric>;

    /// `layer_scores` holds one unnormalised score vector per classifier exit,
    /// shallowest first. Standard models pass a single layer.
    fn compute(
        &self,
        layer_scores: &[Vec<f32>],
        observed:     usize,
        history:      &TokenMetricHistory,
    ) -> Result<MetricsUpdate>;
}

// ─── Persistable ──────────────────────────────────────────────────────────────
pub trait Persistable: Sized {
    fn save(&self, path: &str) -> Result<()>;

    fn load(path: &str) -> Result<Self>;
}
