// ============================================================
// Layer 3 — Sentence, Token and Span Domain Types
// ============================================================
// A corpus is an ordered list of Sentences. Each Sentence owns
// its Tokens (order matters: adjacency defines spans) and a set
// of span annotations per tag column.
//
// Every token carries two views of the same annotation:
//   - span view:  Sentence::spans(column)   e.g. [0..2) LOC
//   - token view: Token::tag(column)        e.g. B-LOC, E-LOC
// The BIO codec in the data layer keeps both views consistent.
//
// Tag columns are a closed enum rather than a string-keyed map:
//
//   Observed  → the (possibly noisy) corpus annotation
//   Clean     → ground truth, only used for evaluation
//   Predicted → the model's prediction recorded in an epoch log
//   New       → the working column mutated by remediation
//
// Reference: Rust Book §5 (Structs), §8 (Collections)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::history::TokenMetricHistory;
use crate::domain::metrics::TokenMetrics;

/// The label columns a token or sentence can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagColumn {
    Observed,
    Clean,
    Predicted,
    New,
}

impl TagColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagColumn::Observed  => "observed",
            TagColumn::Clean     => "clean",
            TagColumn::Predicted => "predicted",
            TagColumn::New       => "new",
        }
    }
}

// ─── Span ─────────────────────────────────────────────────────────────────────
/// A contiguous token range `[start, end)` annotated with a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    /// Exclusive end index
    pub end:   usize,
    pub value: String,
    pub score: Option<f64>,
}

impl Span {
    pub fn new(start: usize, end: usize, value: impl Into<String>) -> Self {
        Self { start, end, value: value.into(), score: None }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Token ────────────────────────────────────────────────────────────────────
/// A single token of a sentence.
///
/// The metric history is `None` until [`Token::ensure_history`] is
/// called at corpus-load time.
#[derive(Debug, Clone)]
pub struct Token {
    pub text:  String,
    pub index: usize,

    tags:    BTreeMap<TagColumn, String>,
    history: Option<TokenMetricHistory>,

    /// Metrics computed for this token in the most recent epoch
    pub metrics: Option<TokenMetrics>,

    /// Working metric value loaded from an epoch log by the remediator
    pub metric: Option<f64>,
}

impl Token {
    pub fn new(text: impl Into<String>, index: usize) -> Self {
        Self {
            text: text.into(),
            index,
            tags: BTreeMap::new(),
            history: None,
            metrics: None,
            metric: None,
        }
    }

    /// Token-level tag for `column`; unset columns read as `O`.
    pub fn tag(&self, column: TagColumn) -> &str {
        self.tags.get(&column).map(String::as_str).unwrap_or("O")
    }

    pub fn set_tag(&mut self, column: TagColumn, tag: impl Into<String>) {
        self.tags.insert(column, tag.into());
    }

    /// Unset `column`, so it reads as `O` again.
    pub fn clear_tag(&mut self, column: TagColumn) {
        self.tags.remove(&column);
    }

    pub fn history(&self) -> Option<&TokenMetricHistory> {
        self.history.as_ref()
    }

    /// Create the history for this token if it does not exist yet.
    /// An existing history is never reset.
    pub fn ensure_history(&mut self, label_set_size: usize) {
        if self.history.is_none() {
            self.history = Some(TokenMetricHistory::new(label_set_size));
        }
    }

    /// Replace the stored history with the value produced by this epoch's update.
    pub fn replace_history(&mut self, history: TokenMetricHistory) {
        self.history = Some(history);
    }
}

// ─── Sentence ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct Sentence {
    /// Position of the sentence in its corpus (`sent_index` in epoch logs)
    pub index:  usize,
    pub tokens: Vec<Token>,
    spans:      BTreeMap<TagColumn, Vec<Span>>,
}

impl Sentence {
    pub fn new<S: Into<String>>(index: usize, words: impl IntoIterator<Item = S>) -> Self {
        let tokens = words
            .into_iter()
            .enumerate()
            .map(|(i, w)| Token::new(w, i))
            .collect();
        Self { index, tokens, spans: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn text(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
    }

    pub fn spans(&self, column: TagColumn) -> &[Span] {
        self.spans.get(&column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace all spans of `column`. Spans valued `O` are dropped.
    pub fn set_spans(&mut self, column: TagColumn, spans: Vec<Span>) {
        let spans = spans.into_iter().filter(|s| s.value != "O").collect();
        self.spans.insert(column, spans);
    }

    /// Token-level tags of `column`, in token order.
    pub fn tags(&self, column: TagColumn) -> Vec<String> {
        self.tokens.iter().map(|t| t.tag(column).to_string()).collect()
    }

    /// Write one tag per token into `column`.
    pub fn set_tags<S: AsRef<str>>(&mut self, column: TagColumn, tags: &[S]) {
        for (token, tag) in self.tokens.iter_mut().zip(tags) {
            token.set_tag(column, tag.as_ref());
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_tag_reads_as_outside() {
        let sent = Sentence::new(0, ["Paris", "is", "nice"]);
        assert_eq!(sent.tokens[1].tag(TagColumn::Observed), "O");
    }

    #[test]
    fn test_outside_spans_are_dropped() {
        let mut sent = Sentence::new(0, ["a", "b"]);
        sent.set_spans(
            TagColumn::New,
            vec![Span::new(0, 1, "O"), Span::new(1, 2, "PER")],
        );
        assert_eq!(sent.spans(TagColumn::New).len(), 1);
        assert_eq!(sent.spans(TagColumn::New)[0].value, "PER");
        assert!(sent.spans(TagColumn::Clean).is_empty());
    }

    #[test]
    fn test_ensure_history_does_not_reset() {
        let mut token = Token::new("x", 0);
        token.ensure_history(3);
        let mut h = token.history().cloned().unwrap();
        h.total_epochs = 4;
        h.correctness_history = vec![true; 4];
        token.replace_history(h);
        token.ensure_history(3);
        assert_eq!(token.history().unwrap().total_epochs, 4);
    }
}
