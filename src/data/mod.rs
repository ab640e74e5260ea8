// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a column corpus file and tensor batches:
//
//   column file (text, clean, observed)
//       │
//       ▼
//   ColumnCorpusLoader → Sentences with clean/observed spans
//       │                 (decoded and re-encoded by the BIO codec)
//       ▼
//   LabelDictionary    → BIOES tag ↔ class index
//   Vocabulary         → word ↔ embedding row
//       │
//       ▼
//   TaggingDataset     → implements Burn's Dataset trait
//       │
//       ▼
//   TokenBatcher       → padded tensor batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// BIO/BIOES span codec
pub mod bio;

/// Reads three-column noisy corpus files
pub mod loader;

/// Label dictionary and word vocabulary
pub mod dictionary;

/// Implements Burn's Dataset trait for tagged sentences
pub mod dataset;

/// Implements Burn's Batcher trait to create padded batches
pub mod batcher;
