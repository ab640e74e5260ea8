// ============================================================
// Layer 6 — Run Directory / Checkpoint Manager
// ============================================================
// Everything a training run leaves next to its epoch logs:
//
//   runs/baseline/
//     train_config.json   ← hyperparameters and metrics mode
//     labels.json         ← label dictionary (tag ↔ index)
//     vocab.json          ← word vocabulary
//     metrics.csv         ← per-epoch summary (infra::metrics)
//     epoch_log_1.log     ← per-token metrics (infra::epoch_log)
//     ...
//     model.mpk.gz        ← final weights, only when requested
//
// The remediation command reads train_config.json back to
// check its schedule against what the run actually produced.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack format
//   - Compresses with gzip for smaller file size
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{fs, path::{Path, PathBuf}};

use crate::application::train_use_case::TrainConfig;
use crate::data::dictionary::{LabelDictionary, Vocabulary};
use crate::domain::traits::Persistable;
use crate::ml::model::TaggerModel;

pub const CONFIG_FILE: &str = "train_config.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final weights as {dir}/model.mpk.gz
    pub fn save_model<B: Backend>(&self, model: &TaggerModel<B>) -> Result<PathBuf> {
        // Without extension; the recorder adds it
        let path = self.dir.join("model");
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        tracing::debug!("Saved model weights to '{}'", path.display());
        Ok(path)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// `None` when the directory holds no training config.
    pub fn load_config(&self) -> Result<Option<TrainConfig>> {
        let path = self.dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        let cfg = serde_json::from_str(&json)
            .with_context(|| format!("Invalid training config '{}'", path.display()))?;
        Ok(Some(cfg))
    }

    pub fn save_dictionaries(&self, labels: &LabelDictionary, vocab: &Vocabulary) -> Result<()> {
        labels.save(&self.path_str("labels.json"))?;
        vocab.save(&self.path_str("vocab.json"))?;
        tracing::debug!("Saved {} labels and {} vocabulary rows", labels.len(), vocab.size());
        Ok(())
    }

    fn path_str(&self, file: &str) -> String {
        self.dir.join(file).to_string_lossy().into_owned()
    }
}
