// ============================================================
// Layer 3 — Label Remediation
// ============================================================
// Turns recorded training dynamics into label changes:
//
//   remediator.rs  — applies a category/threshold schedule to a
//                    corpus working column (mask or relabel)
//   evaluation.rs  — span-aligned P/R/F1 between two columns,
//                    used to measure the noise left after each
//                    step and by the evaluate command
//   census.rs      — clean/noisy token counts per category and
//                    epoch
//
// Reference: Swayamdipta et al. (2020) Dataset Cartography

pub mod remediator;

pub mod evaluation;

pub mod census;
