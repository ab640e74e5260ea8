// ============================================================
// Layer 6 — Training Summary Logger
// ============================================================
// Records one summary row per epoch to a CSV file:
//
//   epoch:             the epoch number (1, 2, 3, ...)
//   train_loss:        mean weighted cross entropy over batches
//   observed_accuracy: share of scored tokens predicted as their
//                      observed (possibly noisy) tag
//   clean_accuracy:    share of scored tokens predicted as their
//                      clean tag
//
// On a noisy corpus observed_accuracy keeps rising once the
// model starts memorising the noise, while clean_accuracy
// flattens or drops.
//
// Output file: <epoch_log_dir>/metrics.csv
//
//   epoch,train_loss,observed_accuracy,clean_accuracy
//   1,1.204500,0.712000,0.698000
//   2,0.650100,0.824300,0.801700
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Summary of one training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch:             u32,
    pub train_loss:        f64,
    pub observed_accuracy: f64,
    pub clean_accuracy:    f64,
}

/// Running counts behind an `EpochSummary`.
#[derive(Debug, Default, Clone)]
pub struct EpochTally {
    pub loss_sum:         f64,
    pub batches:          usize,
    pub tokens:           usize,
    pub observed_correct: usize,
    pub clean_correct:    usize,
}

impl EpochTally {
    pub fn add_loss(&mut self, loss: f64) {
        self.loss_sum += loss;
        self.batches  += 1;
    }

    pub fn add_token(&mut self, prediction: usize, observed: usize, clean: usize) {
        self.tokens += 1;
        if prediction == observed {
            self.observed_correct += 1;
        }
        if prediction == clean {
            self.clean_correct += 1;
        }
    }

    pub fn summary(&self, epoch: u32) -> EpochSummary {
        let share = |n: usize| if self.tokens > 0 { n as f64 / self.tokens as f64 } else { 0.0 };
        EpochSummary {
            epoch,
            train_loss: if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN },
            observed_accuracy: share(self.observed_correct),
            clean_accuracy:    share(self.clean_correct),
        }
    }
}

/// Appends epoch summaries to `metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "epoch,train_loss,observed_accuracy,clean_accuracy")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochSummary) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.observed_accuracy, m.clean_accuracy,
        )?;

        tracing::debug!(
            "Logged epoch {} summary: train_loss={:.4}, observed_acc={:.4}",
            m.epoch,
            m.train_loss,
            m.observed_accuracy,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_summary() {
        let mut tally = EpochTally::default();
        tally.add_loss(1.0);
        tally.add_loss(0.5);
        tally.add_token(1, 1, 0);
        tally.add_token(0, 1, 0);
        let s = tally.summary(3);
        assert_eq!(s.epoch, 3);
        assert!((s.train_loss - 0.75).abs() < 1e-12);
        assert!((s.observed_accuracy - 0.5).abs() < 1e-12);
        assert!((s.clean_accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EpochTally::default().summary(1)).unwrap();
        let again = MetricsLogger::new(dir.path()).unwrap();
        again.log(&EpochTally::default().summary(2)).unwrap();

        let content = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,"));
        assert!(lines[2].starts_with("2,"));
    }
}
