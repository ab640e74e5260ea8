// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One use case per CLI command. Each one wires the other
// layers together and does no math or printing itself.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Baseline training run that records the epoch logs
pub mod train_use_case;

// Category/threshold remediation experiment
pub mod remediate_use_case;

// Noise level of a corpus file
pub mod evaluate_use_case;

// Clean/noisy counts per category and epoch
pub mod census_use_case;
