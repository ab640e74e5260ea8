// ============================================================
// Layer 3 — Category Census
// ============================================================
// How the four categories split into clean and noisy tokens
// over training. Category 2 ("model predicts an entity where
// none is observed") filling up with noisy tokens is what makes
// relabeling it worthwhile.

use crate::domain::category::{classify, Category};
use crate::infra::epoch_log::EpochLog;
use crate::infra::report::CensusRow;

/// One row per category, in category order, for the log of `epoch`.
pub fn category_census(epoch: u32, log: &EpochLog) -> Vec<CensusRow> {
    let mut rows: Vec<CensusRow> = Category::ALL
        .iter()
        .map(|&category| CensusRow { epoch, category, clean: 0, noisy: 0 })
        .collect();

    for record in log.records() {
        if let Some(category) = classify(&record.noisy, &record.predicted) {
            let row = &mut rows[usize::from(category.id() - 1)];
            if record.noisy_flag {
                row.noisy += 1;
            } else {
                row.clean += 1;
            }
        }
    }
    rows
}
