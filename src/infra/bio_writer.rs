// ============================================================
// Layer 6 — Corpus File Writers
// ============================================================
// Two output layouts, both with a blank line after every
// sentence and IOB1 tags (S- → B-, E- → I- at this boundary):
//
//   BIO file (token, tag):
//     Paris   B-LOC
//     is      O
//
//   Column corpus (token, clean, observed), the layout
//   ColumnCorpusLoader reads, so a remediated corpus can be
//   trained on again:
//     Paris   B-LOC   B-LOC
//
// Tags are always derived from the column's spans.

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::data::bio;
use crate::domain::sentence::{Sentence, TagColumn};

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Two-column BIO file of `column`.
pub fn write_bio_file(sentences: &[Sentence], column: TagColumn, path: &Path) -> Result<()> {
    let mut out = create(path)?;
    for sentence in sentences {
        let tags = bio::rewrite_to_iob1(&bio::encode(sentence, column));
        for (token, tag) in sentence.tokens.iter().zip(&tags) {
            writeln!(out, "{}\t{}", token.text, tag)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    tracing::debug!("Wrote {} column of {} sentences to '{}'", column.as_str(), sentences.len(), path.display());
    Ok(())
}

/// Three-column corpus: token, clean tag, observed tag.
pub fn write_column_corpus(sentences: &[Sentence], path: &Path) -> Result<()> {
    let mut out = create(path)?;
    for sentence in sentences {
        let clean = bio::rewrite_to_iob1(&bio::encode(sentence, TagColumn::Clean));
        let observed = bio::rewrite_to_iob1(&bio::encode(sentence, TagColumn::Observed));
        for ((token, c), o) in sentence.tokens.iter().zip(&clean).zip(&observed) {
            writeln!(out, "{}\t{}\t{}", token.text, c, o)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
