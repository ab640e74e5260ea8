// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model code plus the training-dynamics math that
// consumes its scores.
//
//   model.rs      — the token classifier
//                   • word embeddings
//                   • stacked feed-forward blocks (GELU,
//                     residual, layer normalisation)
//                   • one decoder head per block (early-exit)
//                     or only after the last block
//
//   metrics.rs    — per-token metrics from one score vector and
//                   the token's history (confidence,
//                   variability, entropy, forgetting ...)
//
//   early_exit.rs — agreement metrics across the per-block heads
//
//   trainer.rs    — the training loop; records every token's
//                   metrics once per epoch into the epoch log
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Swayamdipta et al. (2020) Dataset Cartography
//            Baldock et al. (2021) Deep Learning Through the Lens of Example Difficulty

/// Feed-forward token classifier with optional early-exit heads
pub mod model;

/// Training-dynamics metrics for one classifier output
pub mod metrics;

/// Layer agreement metrics for early-exit classifiers
pub mod early_exit;

/// Training loop with per-epoch metric recording
pub mod trainer;
