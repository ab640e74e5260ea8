// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a baseline training run in order:
//
//   Step 1: Load the column corpus        (Layer 4 - data)
//   Step 2: Build label dict + vocabulary (Layer 4 - data)
//   Step 3: Give every token a history    (Layer 3 - domain)
//   Step 4: Save config + dictionaries    (Layer 6 - infra)
//   Step 5: Run the training loop         (Layer 5 - ml)
//
// The run directory ends up holding one epoch log per epoch,
// which the remediation command reads back.
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dictionary::{LabelDictionary, Vocabulary},
    loader::{ColumnCorpusLoader, DEFAULT_DOCUMENT_SEPARATOR},
};
use crate::domain::traits::CorpusSource;
use crate::infra::{checkpoint::CheckpointManager, metrics::EpochSummary};
use crate::ml::model::LayerLossWeighting;
use crate::ml::trainer::{run_training, MetricsMode};

// ─── Training Configuration ──────────────────────────────────────────────────
// Saved as train_config.json so later commands know how the
// epoch logs were produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_file:         String,
    pub output_dir:         String,
    /// `None` keeps separator lines as ordinary sentences
    pub document_separator: Option<String>,
    pub epochs:             u32,
    pub batch_size:         usize,
    pub lr:                 f64,
    pub d_model:            usize,
    pub num_layers:         usize,
    pub dropout:            f64,
    pub max_vocab:          usize,
    pub seed:               u64,
    pub early_exit:         bool,
    pub layer_loss:         LayerLossWeighting,
    pub metrics_mode:       MetricsMode,
    /// Add the MASK label type even if the corpus has none
    pub with_mask:          bool,
    pub save_model:         bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_file:         "data/noisy.train".to_string(),
            output_dir:         "runs/baseline".to_string(),
            document_separator: Some(DEFAULT_DOCUMENT_SEPARATOR.to_string()),
            epochs:             10,
            batch_size:         32,
            lr:                 1e-3,
            d_model:            128,
            num_layers:         4,
            dropout:            0.1,
            max_vocab:          50_000,
            seed:               42,
            early_exit:         false,
            layer_loss:         LayerLossWeighting::Average,
            metrics_mode:       MetricsMode::BatchForward,
            with_mask:          false,
            save_model:         false,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<EpochSummary>> {
        let cfg = &self.config;
        if cfg.epochs == 0 || cfg.batch_size == 0 {
            bail!("epochs and batch_size must be at least 1");
        }
        if cfg.num_layers == 0 {
            bail!("the classifier needs at least one block");
        }

        // ── Step 1: Load the corpus ───────────────────────────────────────────
        let loader = ColumnCorpusLoader::new(&cfg.train_file)
            .with_document_separator(cfg.document_separator.clone());
        let mut corpus = loader.load_all()?;
        if corpus.iter().all(|s| s.is_empty()) {
            bail!("corpus '{}' contains no tokens", cfg.train_file);
        }

        // ── Step 2: Dictionaries ──────────────────────────────────────────────
        let labels = LabelDictionary::from_sentences(&corpus, cfg.with_mask);
        let vocab  = Vocabulary::build(&corpus, cfg.max_vocab);
        tracing::info!("{} labels, {} vocabulary rows", labels.len(), vocab.size());

        // ── Step 3: Histories ─────────────────────────────────────────────────
        for token in corpus.iter_mut().flat_map(|s| s.tokens.iter_mut()) {
            token.ensure_history(labels.len());
        }

        // ── Step 4: Save run metadata ─────────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.output_dir)?;
        ckpt_manager.save_config(cfg)?;
        ckpt_manager.save_dictionaries(&labels, &vocab)?;

        // ── Step 5: Train ─────────────────────────────────────────────────────
        run_training(cfg, &mut corpus, &labels, &vocab, &ckpt_manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::checkpoint::CONFIG_FILE;
    use crate::infra::epoch_log::{EpochLogDir, EpochLogSource};
    use std::fs;

    const CORPUS: &str = "-DOCSTART-\tO\tO\n\n\
                          EU\tB-ORG\tB-ORG\n\
                          rejects\tO\tO\n\
                          German\tB-MISC\tO\n\n\
                          Peter\tB-PER\tB-PER\n\
                          Blackburn\tI-PER\tO\n";

    #[test]
    fn test_execute_writes_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let train_file = dir.path().join("noisy.train");
        fs::write(&train_file, CORPUS).unwrap();
        let run_dir = dir.path().join("run");

        let cfg = TrainConfig {
            train_file: train_file.to_string_lossy().into_owned(),
            output_dir: run_dir.to_string_lossy().into_owned(),
            epochs:     2,
            batch_size: 2,
            d_model:    8,
            num_layers: 1,
            metrics_mode: MetricsMode::EpochEnd,
            ..TrainConfig::default()
        };
        let summaries = TrainUseCase::new(cfg).execute().unwrap();

        assert_eq!(summaries.len(), 2);
        assert!(run_dir.join(CONFIG_FILE).exists());
        assert!(run_dir.join("labels.json").exists());
        assert!(run_dir.join("metrics.csv").exists());

        let log = EpochLogDir::new(&run_dir).epoch_log(2).unwrap();
        assert_eq!(log.records().len(), 5);
        let german = &log.records()[2];
        assert_eq!((german.sent_index, german.token_index), (0, 2));
        assert!(german.noisy_flag);
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let cfg = TrainConfig { epochs: 0, ..TrainConfig::default() };
        assert!(TrainUseCase::new(cfg).execute().is_err());
    }
}
