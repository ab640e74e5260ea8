// ============================================================
// Layer 2 — RemediateUseCase
// ============================================================
// Runs one remediation experiment against a finished baseline
// run:
//
//   Step 1: Read + validate the experiment file  (all steps)
//   Step 2: Check the schedule against the run   (epochs, EE)
//   Step 3: Load the corpus, log initial noise   (Layer 4 - data)
//   Step 4: Back up the observed column          (Layer 6 - infra)
//   Step 5: Apply the schedule                   (Layer 3 - remediation)
//   Step 6: Write noise_f1.txt + relabeled file  (Layer 6 - infra)
//   Step 7: Optional copy-back corpus            (Layer 6 - infra)
//
// Nothing is written before the whole schedule has validated.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::loader::{ColumnCorpusLoader, DEFAULT_DOCUMENT_SEPARATOR};
use crate::domain::category::{Category, MASK_TAG};
use crate::domain::metrics::Metric;
use crate::domain::schedule::{CategorySetting, RemediationSchedule};
use crate::domain::sentence::TagColumn;
use crate::domain::traits::CorpusSource;
use crate::infra::{
    bio_writer::{write_bio_file, write_column_corpus},
    checkpoint::{CheckpointManager, CONFIG_FILE},
    epoch_log::EpochLogDir,
    report::{write_noise_report, NoiseReportLine},
};
use crate::remediation::evaluation::{evaluate_columns, EvaluationResult};
use crate::remediation::remediator::{copy_back, init_working_column, Remediator, StepOutcome};

pub const BACKUP_FILE:       &str = "noise_crowd_backup.train";
pub const RELABELED_FILE:    &str = "noise_crowd_relabeled.train";
pub const COPY_BACK_FILE:    &str = "noise_crowd_remediated_observed.train";
pub const NOISE_REPORT_FILE: &str = "noise_f1.txt";

// ─── Experiment file ──────────────────────────────────────────────────────────
/// A separator token, or `false` to keep separator lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeparatorSetting {
    Disabled(bool),
    Token(String),
}

impl SeparatorSetting {
    pub fn token(&self) -> Option<String> {
        match self {
            SeparatorSetting::Token(t) => Some(t.clone()),
            SeparatorSetting::Disabled(_) => None,
        }
    }
}

impl Default for SeparatorSetting {
    fn default() -> Self {
        SeparatorSetting::Token(DEFAULT_DOCUMENT_SEPARATOR.to_string())
    }
}

fn disabled() -> CategorySetting {
    CategorySetting::Disabled(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediateConfig {
    pub train_file:               String,
    pub epoch_log_dir:            String,
    pub output_dir:               String,
    #[serde(default)]
    pub document_separator_token: SeparatorSetting,
    #[serde(default)]
    pub copy_back:                bool,
    #[serde(default = "disabled")]
    pub modify_category1:         CategorySetting,
    #[serde(default = "disabled")]
    pub modify_category2:         CategorySetting,
    #[serde(default = "disabled")]
    pub modify_category3:         CategorySetting,
    #[serde(default = "disabled")]
    pub modify_category4:         CategorySetting,
}

impl RemediateConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read experiment file '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid experiment file '{}'", path.display()))
    }

    /// Validated schedule over the four `modify_categoryN` entries.
    pub fn schedule(&self) -> Result<RemediationSchedule> {
        let settings = [
            &self.modify_category1,
            &self.modify_category2,
            &self.modify_category3,
            &self.modify_category4,
        ];
        let pairs: Vec<(Category, &CategorySetting)> =
            Category::ALL.iter().copied().zip(settings).collect();
        RemediationSchedule::from_settings(&pairs)
    }
}

/// Result of a remediation run.
#[derive(Debug, Clone)]
pub struct RemediationReport {
    /// Observed column against the clean column, before any step
    pub initial:  EvaluationResult,
    pub outcomes: Vec<StepOutcome>,
}

// ─── RemediateUseCase ─────────────────────────────────────────────────────────
pub struct RemediateUseCase {
    config: RemediateConfig,
}

impl RemediateUseCase {
    pub fn new(config: RemediateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<RemediationReport> {
        let cfg = &self.config;

        // ── Step 1 + 2: Validate everything before touching files ─────────────
        let schedule = cfg.schedule()?;
        if schedule.is_empty() {
            tracing::warn!("No modify_categoryN step is enabled; the observed column is kept as is");
        }
        check_against_run(&schedule, Path::new(&cfg.epoch_log_dir))?;
        let masks = schedule.uses_mask();

        // ── Step 3: Corpus + initial noise level ──────────────────────────────
        let loader = ColumnCorpusLoader::new(&cfg.train_file)
            .with_document_separator(cfg.document_separator_token.token());
        let mut corpus = loader.load_all()?;
        let initial = evaluate_columns(&corpus, TagColumn::Clean, TagColumn::Observed);
        tracing::info!("Initial noise F1 (observed vs clean): {:.4}", initial.micro.f1);

        // ── Step 4: Backup ────────────────────────────────────────────────────
        let out_dir = Path::new(&cfg.output_dir);
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Cannot create output directory '{}'", out_dir.display()))?;
        write_bio_file(&corpus, TagColumn::Observed, &out_dir.join(BACKUP_FILE))?;

        // ── Step 5: Apply the schedule ────────────────────────────────────────
        let outcomes = if schedule.is_empty() {
            init_working_column(&mut corpus);
            Vec::new()
        } else {
            Remediator::new(schedule, EpochLogDir::new(&cfg.epoch_log_dir)).run(&mut corpus)?
        };

        // ── Step 6: Reports ───────────────────────────────────────────────────
        let lines: Vec<NoiseReportLine> = outcomes
            .iter()
            .map(|o| NoiseReportLine {
                f1:         o.evaluation.micro.f1,
                changed:    o.counts.changed,
                propagated: o.counts.propagated,
            })
            .collect();
        write_noise_report(&out_dir.join(NOISE_REPORT_FILE), &lines)?;
        write_bio_file(&corpus, TagColumn::New, &out_dir.join(RELABELED_FILE))?;

        // ── Step 7: Copy-back ─────────────────────────────────────────────────
        if cfg.copy_back {
            copy_back(&mut corpus);
            let path = out_dir.join(COPY_BACK_FILE);
            write_column_corpus(&corpus, &path)?;
            tracing::info!("Remediated observed column written to '{}'", path.display());
            if masks {
                tracing::info!("Masked tokens are tagged {} and carry no loss when retrained", MASK_TAG);
            }
        }

        tracing::info!("Remediation outputs written to '{}'", out_dir.display());
        Ok(RemediationReport { initial, outcomes })
    }
}

/// Reject schedules the baseline run cannot serve. A run without
/// train_config.json is accepted; missing logs are reported per step.
fn check_against_run(schedule: &RemediationSchedule, run_dir: &Path) -> Result<()> {
    if !run_dir.is_dir() {
        bail!("epoch log directory '{}' does not exist", run_dir.display());
    }
    let Some(train) = CheckpointManager::new(run_dir)?.load_config()? else {
        tracing::debug!("No {} in '{}'; skipping run checks", CONFIG_FILE, run_dir.display());
        return Ok(());
    };

    if let Some(last) = schedule.last_epoch() {
        if last > train.epochs {
            bail!(
                "schedule needs the log of epoch {last} but the baseline run trained {} epochs",
                train.epochs
            );
        }
    }
    for step in schedule.steps() {
        if Metric::LAYER.contains(&step.metric) && !train.early_exit {
            bail!(
                "category {} uses layer metric '{}' but the baseline run had no early-exit heads",
                step.category,
                step.metric
            );
        }
    }
    Ok(())
}
