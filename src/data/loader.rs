// ============================================================
// Layer 4 — Column Corpus Loader
// ============================================================
// Reads a tab-separated three-column corpus file:
//
//   EU        B-ORG   B-ORG
//   rejects   O       O
//   German    B-MISC  O
//   call      O       O
//   <blank line = sentence boundary>
//
// Column 0 is the token text, column 1 the clean (ground truth)
// tag and column 2 the observed (noisy) tag. Tags may be BIO,
// IOB1 or BIOES; they are decoded into spans and re-encoded as
// BIOES token tags so both views of each column agree.
//
// Sentences made only of the document separator token
// (default "-DOCSTART-") are skipped and do not get an index.
//
// Reference: CoNLL-2003 column format
//            Rust Book §9 (Error Handling), §12 (I/O)

use anyhow::{bail, Context, Result};
use std::{fs, path::Path};

use crate::data::bio;
use crate::domain::sentence::{Sentence, TagColumn};
use crate::domain::traits::CorpusSource;

pub const DEFAULT_DOCUMENT_SEPARATOR: &str = "-DOCSTART-";

/// Loads a clean/observed column corpus from one file.
pub struct ColumnCorpusLoader {
    path:               String,
    document_separator: Option<String>,
}

impl ColumnCorpusLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path:               path.into(),
            document_separator: Some(DEFAULT_DOCUMENT_SEPARATOR.to_string()),
        }
    }

    /// `None` keeps separator lines as ordinary tokens.
    pub fn with_document_separator(mut self, separator: Option<String>) -> Self {
        self.document_separator = separator;
        self
    }

    /// Parse corpus text that has already been read into memory.
    pub fn parse(&self, content: &str) -> Result<Vec<Sentence>> {
        let mut sentences = Vec::new();
        let mut rows: Vec<[String; 3]> = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                self.flush(&mut rows, &mut sentences);
                continue;
            }
            let mut fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                fields = line.split_whitespace().collect();
            }
            if fields.len() < 3 {
                bail!(
                    "{}:{}: expected 3 columns (text, clean, observed), found {}",
                    self.path,
                    line_no + 1,
                    fields.len()
                );
            }
            rows.push([
                fields[0].to_string(),
                fields[1].trim().to_string(),
                fields[2].trim().to_string(),
            ]);
        }
        self.flush(&mut rows, &mut sentences);

        Ok(sentences)
    }

    fn flush(&self, rows: &mut Vec<[String; 3]>, sentences: &mut Vec<Sentence>) {
        if rows.is_empty() {
            return;
        }
        let rows = std::mem::take(rows);

        if let Some(sep) = &self.document_separator {
            if rows.len() == 1 && rows[0][0] == *sep {
                return;
            }
        }

        let clean:    Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
        let observed: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();

        let mut sentence = Sentence::new(sentences.len(), rows.iter().map(|r| r[0].clone()));
        sentence.set_spans(TagColumn::Clean, bio::decode(&clean));
        sentence.set_spans(TagColumn::Observed, bio::decode(&observed));
        bio::encode_into(&mut sentence, TagColumn::Clean, TagColumn::Clean);
        bio::encode_into(&mut sentence, TagColumn::Observed, TagColumn::Observed);

        sentences.push(sentence);
    }
}

impl CorpusSource for ColumnCorpusLoader {
    fn load_all(&self) -> Result<Vec<Sentence>> {
        let path = Path::new(&self.path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Cannot read corpus file '{}'", path.display()))?;

        let sentences = self.parse(&content)?;
        let tokens: usize = sentences.iter().map(Sentence::len).sum();
        tracing::info!(
            "Loaded {} sentences ({} tokens) from '{}'",
            sentences.len(),
            tokens,
            self.path
        );
        Ok(sentences)
    }
}
