use anyhow::Result;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::dictionary::{LabelDictionary, Vocabulary};
use crate::domain::sentence::{Sentence, TagColumn};

/// One sentence as model input: word ids plus observed and clean class indices.
/// `sentence_index` ties scores back to the corpus sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceSample {
    pub sentence_index: usize,
    pub token_ids:      Vec<u32>,
    pub observed:       Vec<usize>,
    pub clean:          Vec<usize>,
}

impl SentenceSample {
    pub fn from_sentence(
        sentence: &Sentence,
        vocab:    &Vocabulary,
        labels:   &LabelDictionary,
    ) -> Result<Self> {
        let token_ids = sentence.tokens.iter().map(|t| vocab.id(&t.text)).collect();
        let observed = sentence
            .tokens
            .iter()
            .map(|t| labels.idx(t.tag(TagColumn::Observed)))
            .collect::<Result<Vec<_>>>()?;
        let clean = sentence
            .tokens
            .iter()
            .map(|t| labels.idx(t.tag(TagColumn::Clean)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sentence_index: sentence.index, token_ids, observed, clean })
    }

    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

pub struct TaggingDataset {
    samples: Vec<SentenceSample>,
}

impl TaggingDataset {
    pub fn new(samples: Vec<SentenceSample>) -> Self { Self { samples } }

    /// Build samples for every non-empty sentence.
    pub fn from_sentences(
        sentences: &[Sentence],
        vocab:     &Vocabulary,
        labels:    &LabelDictionary,
    ) -> Result<Self> {
        let samples = sentences
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| SentenceSample::from_sentence(s, vocab, labels))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(samples))
    }

    pub fn token_count(&self) -> usize {
        self.samples.iter().map(SentenceSample::len).sum()
    }
}

impl Dataset<SentenceSample> for TaggingDataset {
    fn get(&self, index: usize) -> Option<SentenceSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
