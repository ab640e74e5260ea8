// ============================================================
// Layer 2 — CensusUseCase
// ============================================================
// Counts, for every epoch log of a run, how many clean and
// noisy tokens fall into each category, and writes them to
// category_census.tsv in the run directory.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::infra::epoch_log::{EpochLogDir, EpochLogSource};
use crate::infra::report::{write_census, CensusRow};
use crate::remediation::census::category_census;

pub const CENSUS_FILE: &str = "category_census.tsv";

pub struct CensusUseCase {
    logs: EpochLogDir,
}

impl CensusUseCase {
    pub fn new(epoch_log_dir: impl Into<PathBuf>) -> Self {
        Self { logs: EpochLogDir::new(epoch_log_dir) }
    }

    /// Returns the rows written and the TSV path.
    pub fn execute(&self) -> Result<(Vec<CensusRow>, PathBuf)> {
        let epochs = self.logs.available_epochs()?;
        if epochs.is_empty() {
            bail!("no epoch logs found in '{}'", self.logs.dir().display());
        }

        let mut rows = Vec::with_capacity(epochs.len() * 4);
        for epoch in epochs {
            let log = self.logs.epoch_log(epoch)?;
            let census = category_census(epoch, &log);
            for row in &census {
                tracing::debug!(
                    "epoch {} category {}: {} clean, {} noisy",
                    row.epoch, row.category, row.clean, row.noisy
                );
            }
            rows.extend(census);
        }

        let path = self.logs.dir().join(CENSUS_FILE);
        write_census(&path, &rows)?;
        tracing::info!("Category census written to '{}'", path.display());
        Ok((rows, path))
    }
}
