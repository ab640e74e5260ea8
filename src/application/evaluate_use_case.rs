// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Label-noise level of a corpus file: the observed column
// scored against the clean column span by span.

use anyhow::Result;

use crate::data::loader::ColumnCorpusLoader;
use crate::domain::sentence::TagColumn;
use crate::domain::traits::CorpusSource;
use crate::remediation::evaluation::{evaluate_columns, EvaluationResult};

pub struct EvaluateUseCase {
    corpus_file:        String,
    document_separator: Option<String>,
}

impl EvaluateUseCase {
    pub fn new(corpus_file: impl Into<String>, document_separator: Option<String>) -> Self {
        Self { corpus_file: corpus_file.into(), document_separator }
    }

    pub fn execute(&self) -> Result<EvaluationResult> {
        let corpus = ColumnCorpusLoader::new(&self.corpus_file)
            .with_document_separator(self.document_separator.clone())
            .load_all()?;
        let result = evaluate_columns(&corpus, TagColumn::Clean, TagColumn::Observed);
        tracing::info!(
            "'{}': micro F1 {:.4}, macro F1 {:.4} over {} spans",
            self.corpus_file, result.micro.f1, result.macro_avg.f1, result.keys
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_level_of_corpus_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noisy.train");
        std::fs::write(
            &path,
            "EU\tB-ORG\tB-ORG\nrejects\tO\tO\nGerman\tB-MISC\tO\n\nPeter\tB-PER\tB-PER\n",
        )
        .unwrap();

        let result = EvaluateUseCase::new(path.to_string_lossy(), None).execute().unwrap();
        assert_eq!(result.keys, 3);
        assert_eq!(result.class("MISC").unwrap().false_negatives, 1);
        assert!((result.accuracy - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(EvaluateUseCase::new("/nonexistent/corpus.train", None).execute().is_err());
    }
}
