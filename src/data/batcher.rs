// ============================================================
// Layer 4 — Sentence Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<SentenceSample>
// into tensors for one forward pass.
//
// Sentences have different lengths, so each batch is padded to
// its longest sentence:
//
//   token_ids: [batch, max_len]     (PAD_ID after the last token)
//   positions: [n_real]             flat index row * max_len + col
//   targets:   [n_real]             observed class of each real token
//
// The loss and the metrics only ever look at the `positions`
// rows, so padding never reaches either. The host-side copies
// (sentence indices, lengths, observed/clean classes) let the
// trainer map scores back to corpus tokens.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::SentenceSample;
use crate::data::dictionary::PAD_ID;

#[derive(Debug, Clone)]
pub struct TokenBatch<B: Backend> {
    pub token_ids: Tensor<B, 2, Int>,
    pub positions: Tensor<B, 1, Int>,
    pub targets:   Tensor<B, 1, Int>,

    pub sentence_indices: Vec<usize>,
    pub lengths:          Vec<usize>,
    /// Observed class per real token, batch order
    pub observed:         Vec<usize>,
    /// Clean class per real token, batch order
    pub clean:            Vec<usize>,
}

impl<B: Backend> TokenBatch<B> {
    pub fn max_len(&self) -> usize {
        self.lengths.iter().copied().max().unwrap_or(0)
    }

    pub fn real_tokens(&self) -> usize {
        self.lengths.iter().sum()
    }
}

#[derive(Clone, Debug)]
pub struct TokenBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TokenBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SentenceSample, TokenBatch<B>> for TokenBatcher<B> {
    fn batch(&self, items: Vec<SentenceSample>) -> TokenBatch<B> {
        let batch_size = items.len();
        let max_len    = items.iter().map(SentenceSample::len).max().unwrap_or(0).max(1);

        let mut ids       = vec![PAD_ID as i64; batch_size * max_len];
        let mut positions = Vec::new();
        let mut targets   = Vec::new();
        let mut observed  = Vec::new();
        let mut clean     = Vec::new();

        for (row, sample) in items.iter().enumerate() {
            for (col, &id) in sample.token_ids.iter().enumerate() {
                let flat = row * max_len + col;
                ids[flat] = id as i64;
                positions.push(flat as i64);
                targets.push(sample.observed[col] as i64);
            }
            observed.extend_from_slice(&sample.observed);
            clean.extend_from_slice(&sample.clean);
        }

        let n_real = positions.len();
        let token_ids = Tensor::<B, 2, Int>::from_data(
            TensorData::new(ids, [batch_size, max_len]), &self.device,
        );
        let positions = Tensor::<B, 1, Int>::from_data(
            TensorData::new(positions, [n_real]), &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets, [n_real]), &self.device,
        );

        TokenBatch {
            token_ids,
            positions,
            targets,
            sentence_indices: items.iter().map(|s| s.sentence_index).collect(),
            lengths:          items.iter().map(SentenceSample::len).collect(),
            observed,
            clean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn sample(index: usize, ids: Vec<u32>) -> SentenceSample {
        let n = ids.len();
        SentenceSample { sentence_index: index, token_ids: ids, observed: vec![1; n], clean: vec![0; n] }
    }

    #[test]
    fn test_padding_and_positions() {
        let batcher = TokenBatcher::<NdArray>::new(Default::default());
        let batch = batcher.batch(vec![sample(4, vec![5, 6, 7]), sample(9, vec![8])]);

        assert_eq!(batch.token_ids.dims(), [2, 3]);
        assert_eq!(batch.real_tokens(), 4);
        assert_eq!(batch.max_len(), 3);
        assert_eq!(batch.sentence_indices, vec![4, 9]);

        let positions = batch.positions.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        let ids = batch.token_ids.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(ids, vec![5, 6, 7, 8, 0, 0]);
    }
}
