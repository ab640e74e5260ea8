// ============================================================
// Layer 4 — Label Dictionary and Vocabulary
// ============================================================
// Two index maps built once from the training corpus:
//
//   LabelDictionary: BIOES tag ↔ class index
//       O, S-ORG, B-ORG, E-ORG, I-ORG, S-PER, ...
//     Entity types come from both the observed and the clean
//     column so every tag found in an epoch log has an index.
//     With masking enabled the MASK type is added and its tags
//     get a loss weight of 0.
//
//   Vocabulary: word → embedding row
//       0 = [PAD], 1 = [UNK], then words by frequency
//
// Both are saved as JSON next to the run so epoch logs can be
// read back with the same indices.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::bio;
use crate::domain::category::MASK_SUFFIX;
use crate::domain::sentence::{Sentence, TagColumn};
use crate::domain::traits::Persistable;

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

// ─── LabelDictionary ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDictionary {
    items: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LabelDictionary {
    pub fn new(items: Vec<String>) -> Self {
        let index = items.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        Self { items, index }
    }

    /// BIOES dictionary over every entity type in the observed and clean columns.
    pub fn from_sentences(sentences: &[Sentence], with_mask: bool) -> Self {
        let mut types: Vec<String> = Vec::new();
        for sentence in sentences {
            for column in [TagColumn::Observed, TagColumn::Clean] {
                for span in sentence.spans(column) {
                    if !types.contains(&span.value) {
                        types.push(span.value.clone());
                    }
                }
            }
        }
        if with_mask && !types.iter().any(|t| t == MASK_SUFFIX) {
            types.push(MASK_SUFFIX.to_string());
        }

        let mut items = vec!["O".to_string()];
        for ty in &types {
            for prefix in ["S", "B", "E", "I"] {
                items.push(format!("{prefix}-{ty}"));
            }
        }
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_idx(&self, tag: &str) -> Option<usize> {
        self.index.get(tag).copied()
    }

    /// Index of `tag`, or an error naming the unknown tag.
    pub fn idx(&self, tag: &str) -> Result<usize> {
        self.get_idx(tag)
            .with_context(|| format!("tag '{tag}' is not in the label dictionary"))
    }

    pub fn get_item(&self, idx: usize) -> Option<&str> {
        self.items.get(idx).map(String::as_str)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Per-class loss weights: 0 for MASK tags, 1 otherwise.
    pub fn loss_weights(&self) -> Vec<f32> {
        self.items
            .iter()
            .map(|t| match bio::entity_type(t) {
                Some(ty) if ty == MASK_SUFFIX => 0.0,
                _ => 1.0,
            })
            .collect()
    }

    pub fn has_mask(&self) -> bool {
        self.items.iter().any(|t| t.ends_with(MASK_SUFFIX))
    }
}

impl Persistable for LabelDictionary {
    fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Cannot write label dictionary to '{path}'"))
    }

    fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read label dictionary from '{path}'"))?;
        let raw: LabelDictionary = serde_json::from_str(&json)?;
        Ok(Self::new(raw.items))
    }
}

// ─── Vocabulary ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    words: HashMap<String, u32>,
}

impl Vocabulary {
    /// Keep the `max_size - 2` most frequent words (ties broken alphabetically).
    pub fn build(sentences: &[Sentence], max_size: usize) -> Self {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for sentence in sentences {
            for token in &sentence.tokens {
                *freq.entry(token.text.as_str()).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(&str, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(max_size.saturating_sub(2));

        let words = words
            .into_iter()
            .enumerate()
            .map(|(i, (w, _))| (w.to_string(), i as u32 + 2))
            .collect();
        Self { words }
    }

    /// Number of embedding rows, including [PAD] and [UNK].
    pub fn size(&self) -> usize {
        self.words.len() + 2
    }

    pub fn id(&self, word: &str) -> u32 {
        self.words.get(word).copied().unwrap_or(UNK_ID)
    }
}

impl Persistable for Vocabulary {
    fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Cannot write vocabulary to '{path}'"))
    }

    fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read vocabulary from '{path}'"))?;
        Ok(serde_json::from_str(&json)?)
    }
}
