// ============================================================
// Layer 6 — Remediation Reports
// ============================================================
//   noise_f1.txt          one line per remediation step, last
//                         step first:  f1  changed  propagated
//   category_census.tsv   epoch  category  clean  noisy

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::domain::category::Category;

/// Residual noise after one remediation step.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseReportLine {
    /// Micro F1 of the working column against the clean column
    pub f1:         f64,
    pub changed:    usize,
    pub propagated: usize,
}

/// Lines are given in application order and written newest first.
pub fn write_noise_report(path: &Path, lines: &[NoiseReportLine]) -> Result<()> {
    let content: String = lines
        .iter()
        .rev()
        .map(|l| format!("{:.4}\t{}\t{}\n", l.f1, l.changed, l.propagated))
        .collect();
    fs::write(path, content)
        .with_context(|| format!("Cannot write noise report '{}'", path.display()))
}

/// Clean and noisy token counts of one category in one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusRow {
    pub epoch:    u32,
    pub category: Category,
    pub clean:    usize,
    pub noisy:    usize,
}

pub fn write_census(path: &Path, rows: &[CensusRow]) -> Result<()> {
    let mut content = String::from("epoch\tcategory\tclean\tnoisy\n");
    for row in rows {
        content.push_str(&format!("{}\t{}\t{}\t{}\n", row.epoch, row.category.id(), row.clean, row.noisy));
    }
    fs::write(path, content)
        .with_context(|| format!("Cannot write census '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_report_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise_f1.txt");
        let lines = vec![
            NoiseReportLine { f1: 0.5, changed: 10, propagated: 2 },
            NoiseReportLine { f1: 0.75, changed: 4, propagated: 0 },
        ];
        write_noise_report(&path, &lines).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0.7500\t4\t0\n0.5000\t10\t2\n");
    }

    #[test]
    fn test_census_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("census.tsv");
        let rows = vec![CensusRow { epoch: 1, category: Category::DisputedOutside, clean: 3, noisy: 1 }];
        write_census(&path, &rows).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().nth(1), Some("1\t2\t3\t1"));
    }
}
