// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Files written and read around a run:
//
//   checkpoint.rs — run directory: train_config.json, label
//                   dictionary, vocabulary and (optionally) the
//                   final weights via Burn's CompactRecorder
//
//   epoch_log.rs  — one TSV per epoch with every token's tags,
//                   history and metrics; read back by the
//                   remediation and census commands
//
//   metrics.rs    — metrics.csv, one summary row per epoch
//
//   bio_writer.rs — label columns as BIO corpus files
//
//   report.rs     — noise_f1.txt and the category census TSV
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Run directory: config, dictionaries, model weights
pub mod checkpoint;

/// Per-epoch token logs
pub mod epoch_log;

/// Training summary CSV logger
pub mod metrics;

/// BIO corpus file output
pub mod bio_writer;

/// Remediation and census reports
pub mod report;
