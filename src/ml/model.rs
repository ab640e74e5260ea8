use burn::{
    nn::{
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the per-head losses of an early-exit model are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerLossWeighting {
    /// Plain mean over all heads
    Average,
    /// Head i weighted by i + 1, deeper heads count more
    Weighted,
    /// Only the final head is trained
    LastOnly,
}

impl LayerLossWeighting {
    pub fn weights(&self, heads: usize) -> Vec<f32> {
        match self {
            Self::Average  => vec![1.0; heads],
            Self::Weighted => (1..=heads).map(|i| i as f32).collect(),
            Self::LastOnly => (0..heads).map(|i| if i + 1 == heads { 1.0 } else { 0.0 }).collect(),
        }
    }
}

impl FromStr for LayerLossWeighting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "average"   => Ok(Self::Average),
            "weighted"  => Ok(Self::Weighted),
            "last_only" => Ok(Self::LastOnly),
            other => anyhow::bail!("unknown layer loss weighting '{other}'"),
        }
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct TaggerConfig {
    pub vocab_size: usize,
    pub num_labels: usize,
    pub d_model:    usize,
    pub num_layers: usize,
    #[config(default = 0.1)]
    pub dropout:    f64,
    /// One decoder head per block instead of one after the last block
    #[config(default = false)]
    pub early_exit: bool,
}

impl TaggerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TaggerModel<B> {
        let num_layers = self.num_layers.max(1);
        let embedding = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let blocks = (0..num_layers).map(|_| self.build_block(device)).collect();
        let num_heads = if self.early_exit { num_layers } else { 1 };
        let heads = (0..num_heads)
            .map(|_| LinearConfig::new(self.d_model, self.num_labels).init(device))
            .collect();
        let dropout = DropoutConfig::new(self.dropout).init();
        TaggerModel { embedding, blocks, heads, dropout }
    }

    fn build_block<B: Backend>(&self, device: &B::Device) -> FeedForwardBlock<B> {
        FeedForwardBlock {
            linear:  LinearConfig::new(self.d_model, self.d_model).init(device),
            norm:    LayerNormConfig::new(self.d_model).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct FeedForwardBlock<B: Backend> {
    pub linear:  Linear<B>,
    pub norm:    LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> FeedForwardBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let h = burn::tensor::activation::gelu(self.linear.forward(x.clone()));
        self.norm.forward(x + self.dropout.forward(h))
    }
}

#[derive(Module, Debug)]
pub struct TaggerModel<B: Backend> {
    pub embedding: Embedding<B>,
    pub blocks:    Vec<FeedForwardBlock<B>>,
    /// Decoder heads for the last `heads.len()` blocks, shallowest first
    pub heads:     Vec<Linear<B>>,
    pub dropout:   Dropout,
}

impl<B: Backend> TaggerModel<B> {
    pub fn num_heads(&self) -> usize {
        self.heads.len()
    }

    /// token_ids: [batch, seq_len] → one [batch, seq_len, labels] tensor per head
    pub fn forward(&self, token_ids: Tensor<B, 2, Int>) -> Vec<Tensor<B, 3>> {
        let mut x = self.dropout.forward(self.embedding.forward(token_ids));
        let first_head = self.blocks.len().saturating_sub(self.heads.len());
        let mut outputs = Vec::with_capacity(self.heads.len());
        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if i >= first_head {
                outputs.push(self.heads[i - first_head].forward(x.clone()));
            }
        }
        outputs
    }

    /// Scores of the real tokens only: one [n_real, labels] tensor per head.
    pub fn token_scores(
        &self,
        token_ids: Tensor<B, 2, Int>,
        positions: Tensor<B, 1, Int>,
    ) -> Vec<Tensor<B, 2>> {
        self.forward(token_ids)
            .into_iter()
            .map(|logits| {
                let [batch, seq_len, labels] = logits.dims();
                logits.reshape([batch * seq_len, labels]).select(0, positions.clone())
            })
            .collect()
    }

    /// Weighted cross entropy over the real tokens, combined across heads.
    /// Returns the loss and the per-head token scores it was computed from.
    pub fn forward_loss(
        &self,
        token_ids:     Tensor<B, 2, Int>,
        positions:     Tensor<B, 1, Int>,
        targets:       Tensor<B, 1, Int>,
        class_weights: Option<Vec<f32>>,
        weighting:     LayerLossWeighting,
    ) -> (Tensor<B, 1>, Vec<Tensor<B, 2>>) {
        let scores = self.token_scores(token_ids, positions);
        let device = targets.device();
        let ce = CrossEntropyLossConfig::new()
            .with_weights(class_weights)
            .init(&device);

        let head_weights = weighting.weights(scores.len());
        let total: f32 = head_weights.iter().sum();
        let mut loss = Tensor::<B, 1>::zeros([1], &device);
        for (layer_scores, &w) in scores.iter().zip(&head_weights) {
            if w > 0.0 {
                let layer_loss = ce.forward(layer_scores.clone(), targets.clone());
                loss = loss + layer_loss.mul_scalar(w);
            }
        }
        (loss.div_scalar(total), scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray;

    fn model(early_exit: bool) -> TaggerModel<B> {
        TaggerConfig::new(10, 5, 8, 3)
            .with_early_exit(early_exit)
            .init(&Default::default())
    }

    fn ids() -> Tensor<B, 2, Int> {
        Tensor::from_data(TensorData::new(vec![2i64, 3, 4, 0], [2, 2]), &Default::default())
    }

    #[test]
    fn test_head_count() {
        assert_eq!(model(false).num_heads(), 1);
        assert_eq!(model(true).num_heads(), 3);
    }

    #[test]
    fn test_token_scores_select_real_positions() {
        let m = model(true);
        let positions = Tensor::<B, 1, Int>::from_data(
            TensorData::new(vec![0i64, 1, 2], [3]), &Default::default(),
        );
        let scores = m.token_scores(ids(), positions);
        assert_eq!(scores.len(), 3);
        for s in scores {
            assert_eq!(s.dims(), [3, 5]);
        }
    }

    #[test]
    fn test_loss_is_finite() {
        let m = model(true);
        let device = Default::default();
        let positions = Tensor::<B, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 2], [3]), &device);
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(vec![1i64, 0, 4], [3]), &device);
        let (loss, _) = m.forward_loss(ids(), positions, targets, None, LayerLossWeighting::Weighted);
        let value: f64 = loss.into_scalar().elem::<f64>();
        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn test_layer_weightings() {
        assert_eq!(LayerLossWeighting::Average.weights(3), vec![1.0, 1.0, 1.0]);
        assert_eq!(LayerLossWeighting::Weighted.weights(3), vec![1.0, 2.0, 3.0]);
        assert_eq!(LayerLossWeighting::LastOnly.weights(3), vec![0.0, 0.0, 1.0]);
        assert_eq!("last_only".parse::<LayerLossWeighting>().unwrap(), LayerLossWeighting::LastOnly);
    }
}
