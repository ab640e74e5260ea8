// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types that define what the system talks about:
// sentences and their tokens, per-token metric histories and
// records, the four token categories and remediation schedules.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §6 (Enums), §10 (Traits)

// Sentences, tokens, spans and tag columns
pub mod sentence;

// Per-token accumulator carried across epochs
pub mod history;

// Metric names and per-token metric records
pub mod metrics;

// The four (correctness × observed-is-O) token categories
pub mod category;

// Remediation steps and schedules
pub mod schedule;

// Core abstractions (traits) that other layers implement
pub mod traits;
