// ============================================================
// Layer 5 — Training Loop with Training-Dynamics Logging
// ============================================================
// Trains the tagger on the observed (noisy) labels and, once per
// epoch, records every token's metrics:
//
//   batch_forward: metrics come from the scores of the training
//                  forward pass, batch by batch, before the
//                  optimiser step
//   epoch_end:     after the epoch, the training set is scored
//                  again with model.valid() (no dropout)
//
// Each token is visited exactly once per epoch. Its old history
// goes into the epoch log row, then the new history replaces it.
//
// Backends:
//   - Training uses MyBackend (Autodiff<NdArray>) for gradients
//   - model.valid() returns the model on MyInnerBackend (NdArray)
//   - The scoring batcher must also use MyInnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{anyhow, bail, ensure, Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, str::FromStr};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{TokenBatch, TokenBatcher},
    dataset::TaggingDataset,
    dictionary::{LabelDictionary, Vocabulary},
};
use crate::domain::metrics::Metric;
use crate::domain::sentence::{Sentence, TagColumn};
use crate::domain::traits::MetricsStrategy;
use crate::infra::{
    checkpoint::CheckpointManager,
    epoch_log::{EpochLogRow, EpochLogWriter},
    metrics::{EpochSummary, EpochTally, MetricsLogger},
};
use crate::ml::early_exit::EarlyExitMetrics;
use crate::ml::metrics::StandardMetrics;
use crate::ml::model::{TaggerConfig, TaggerModel};

type MyBackend      = burn::backend::Autodiff<burn::backend::NdArray>;
type MyInnerBackend = burn::backend::NdArray;

// ─── MetricsMode ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsMode {
    BatchForward,
    EpochEnd,
}

impl FromStr for MetricsMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "batch_forward" => Ok(Self::BatchForward),
            "epoch_end"     => Ok(Self::EpochEnd),
            other => bail!("unknown metrics mode '{other}', expected batch_forward or epoch_end"),
        }
    }
}

// ─── MetricsRecorder ──────────────────────────────────────────────────────────
/// Feeds per-token scores through the metrics strategy and logs the result.
pub struct MetricsRecorder<'a> {
    strategy: Box<dyn MetricsStrategy>,
    labels:   &'a LabelDictionary,
    /// Sentences already recorded in the current epoch
    visited:  HashSet<usize>,
}

impl<'a> MetricsRecorder<'a> {
    pub fn new(strategy: Box<dyn MetricsStrategy>, labels: &'a LabelDictionary) -> Self {
        Self { strategy, labels, visited: HashSet::new() }
    }

    /// Standard or early-exit metrics over `labels`.
    pub fn for_model(early_exit: bool, labels: &'a LabelDictionary) -> Self {
        let strategy: Box<dyn MetricsStrategy> = if early_exit {
            Box::new(EarlyExitMetrics::new(labels.len()))
        } else {
            Box::new(StandardMetrics::new(labels.len()))
        };
        Self::new(strategy, labels)
    }

    pub fn metric_names(&self) -> Vec<Metric> {
        self.strategy.metric_names()
    }

    pub fn start_epoch(&mut self) {
        self.visited.clear();
    }

    pub fn visited(&self) -> usize {
        self.visited.len()
    }

    /// `layer_scores[head]` holds the row-major [n_real, labels] scores of the batch.
    pub fn record_batch<B: Backend>(
        &mut self,
        corpus:       &mut [Sentence],
        batch:        &TokenBatch<B>,
        layer_scores: &[Vec<f32>],
        writer:       &mut EpochLogWriter,
        tally:        &mut EpochTally,
    ) -> Result<()> {
        let width = self.labels.len();
        let n_real = batch.real_tokens();
        ensure!(
            layer_scores.iter().all(|s| s.len() == n_real * width),
            "score matrix does not match {n_real} tokens × {width} labels"
        );

        let mut row = 0;
        for (&sent_index, &len) in batch.sentence_indices.iter().zip(&batch.lengths) {
            ensure!(
                !self.visited.contains(&sent_index),
                "sentence {sent_index} was visited twice in one epoch"
            );
            let sentence = corpus
                .get_mut(sent_index)
                .filter(|s| s.index == sent_index)
                .with_context(|| format!("batch refers to unknown sentence {sent_index}"))?;
            ensure!(sentence.len() == len, "sentence {sent_index} length changed since batching");

            // Every token is computed before any of them is touched.
            let mut updates = Vec::with_capacity(len);
            for (t, token) in sentence.tokens.iter().enumerate() {
                let at = row + t;
                let token_scores: Vec<Vec<f32>> = layer_scores
                    .iter()
                    .map(|s| s[at * width..(at + 1) * width].to_vec())
                    .collect();
                let history = token
                    .history()
                    .with_context(|| format!("token {sent_index}:{t} has no metric history"))?;
                let update = self.strategy.compute(&token_scores, batch.observed[at], history)?;
                let predicted = self
                    .labels
                    .get_item(update.prediction)
                    .with_context(|| format!("prediction {} has no label", update.prediction))?;
                updates.push((update, predicted));
            }

            for (t, (token, (update, predicted))) in sentence.tokens.iter().zip(&updates).enumerate() {
                let at = row + t;
                let history = token
                    .history()
                    .with_context(|| format!("token {sent_index}:{t} has no metric history"))?;
                writer.write_row(&EpochLogRow {
                    text:            &token.text,
                    sent_index,
                    token_index:     t,
                    predicted:       *predicted,
                    noisy:           token.tag(TagColumn::Observed),
                    clean:           token.tag(TagColumn::Clean),
                    last_prediction: history.last_prediction.and_then(|i| self.labels.get_item(i)),
                    history,
                    metrics:         &update.metrics,
                })?;
                tally.add_token(update.prediction, batch.observed[at], batch.clean[at]);
            }
            writer.end_sentence()?;

            for (token, (update, predicted)) in sentence.tokens.iter_mut().zip(updates) {
                token.set_tag(TagColumn::Predicted, predicted);
                token.metrics = Some(update.metrics);
                token.replace_history(update.history);
            }
            self.visited.insert(sent_index);
            row += len;
        }
        writer.flush()
    }
}

/// Copy per-head token scores to the host, one flat vector per head.
fn scores_to_host<B: Backend>(scores: Vec<Tensor<B, 2>>) -> Result<Vec<Vec<f32>>> {
    scores
        .into_iter()
        .map(|t| {
            t.into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("cannot read scores from device: {e:?}"))
        })
        .collect()
}

// ─── Training ─────────────────────────────────────────────────────────────────
pub fn run_training(
    cfg:          &TrainConfig,
    corpus:       &mut [Sentence],
    labels:       &LabelDictionary,
    vocab:        &Vocabulary,
    ckpt_manager: &CheckpointManager,
) -> Result<Vec<EpochSummary>> {
    let device = burn::backend::ndarray::NdArrayDevice::default();
    tracing::info!("Using NdArray device: {:?}", device);
    MyBackend::seed(cfg.seed);
    train_loop(cfg, corpus, labels, vocab, ckpt_manager, device)
}

fn train_loop(
    cfg:          &TrainConfig,
    corpus:       &mut [Sentence],
    labels:       &LabelDictionary,
    vocab:        &Vocabulary,
    ckpt_manager: &CheckpointManager,
    device:       burn::backend::ndarray::NdArrayDevice,
) -> Result<Vec<EpochSummary>> {

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = TaggerConfig::new(vocab.size(), labels.len(), cfg.d_model, cfg.num_layers)
        .with_dropout(cfg.dropout)
        .with_early_exit(cfg.early_exit);
    let mut model: TaggerModel<MyBackend> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {} blocks, {} heads, {} labels",
        cfg.num_layers, model.num_heads(), labels.len()
    );

    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

    // MASK tags carry zero loss weight
    let loss_weights  = labels.loss_weights();
    let class_weights = labels.has_mask().then(|| loss_weights.clone());

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_dataset = TaggingDataset::from_sentences(corpus, vocab, labels)?;
    let token_count   = train_dataset.token_count();
    let train_loader  = DataLoaderBuilder::new(TokenBatcher::<MyBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(train_dataset);

    let score_loader = DataLoaderBuilder::new(TokenBatcher::<MyInnerBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(TaggingDataset::from_sentences(corpus, vocab, labels)?);

    let mut recorder = MetricsRecorder::for_model(cfg.early_exit, labels);
    let metrics_logger = MetricsLogger::new(ckpt_manager.dir())?;
    let expected_sentences = corpus.iter().filter(|s| !s.is_empty()).count();
    let mut summaries = Vec::with_capacity(cfg.epochs as usize);

    tracing::info!(
        "Training on {} sentences / {} tokens, metrics mode {:?}",
        expected_sentences, token_count, cfg.metrics_mode
    );

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let mut writer = EpochLogWriter::create(ckpt_manager.dir(), epoch, recorder.metric_names())?;
        let mut tally = EpochTally::default();
        recorder.start_epoch();

        for batch in train_loader.iter() {
            let trainable = batch.observed.iter().any(|&o| loss_weights[o] > 0.0);
            if !trainable {
                // only masked tokens: nothing to learn, but still one metrics visit
                if cfg.metrics_mode == MetricsMode::BatchForward {
                    let scores = model.token_scores(batch.token_ids.clone(), batch.positions.clone());
                    recorder.record_batch(corpus, &batch, &scores_to_host(scores)?, &mut writer, &mut tally)?;
                }
                continue;
            }

            let (loss, scores) = model.forward_loss(
                batch.token_ids.clone(),
                batch.positions.clone(),
                batch.targets.clone(),
                class_weights.clone(),
                cfg.layer_loss,
            );
            tally.add_loss(loss.clone().into_scalar().elem::<f64>());

            if cfg.metrics_mode == MetricsMode::BatchForward {
                recorder.record_batch(corpus, &batch, &scores_to_host(scores)?, &mut writer, &mut tally)?;
            }

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        if cfg.metrics_mode == MetricsMode::EpochEnd {
            // model.valid() → TaggerModel<MyInnerBackend>, dropout disabled
            let model_valid = model.valid();
            for batch in score_loader.iter() {
                let scores = model_valid.token_scores(batch.token_ids.clone(), batch.positions.clone());
                recorder.record_batch(corpus, &batch, &scores_to_host(scores)?, &mut writer, &mut tally)?;
            }
        }

        if recorder.visited() != expected_sentences {
            tracing::warn!(
                "epoch {}: metrics recorded for {} of {} sentences",
                epoch, recorder.visited(), expected_sentences
            );
        }

        let (log_path, rows) = writer.finish()?;
        let summary = tally.summary(epoch);
        metrics_logger.log(&summary)?;
        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | observed_acc={:.1}% | clean_acc={:.1}% | {} rows → {}",
            epoch, cfg.epochs, summary.train_loss,
            summary.observed_accuracy * 100.0, summary.clean_accuracy * 100.0,
            rows, log_path.display(),
        );
        summaries.push(summary);
    }

    if cfg.save_model {
        let path = ckpt_manager.save_model(&model)?;
        tracing::info!("Model saved to '{}'", path.display());
    }

    tracing::info!("Training complete!");
    Ok(summaries)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;
    use crate::data::bio;
    use crate::data::dataset::SentenceSample;
    use crate::domain::history::TokenMetricHistory;
    use crate::domain::sentence::Span;
    use crate::infra::epoch_log::EpochLogDir;
    use crate::infra::epoch_log::EpochLogSource;

    fn corpus() -> Vec<Sentence> {
        let mut a = Sentence::new(0, ["Paris", "is", "nice"]);
        a.set_spans(TagColumn::Clean, vec![Span::new(0, 1, "LOC")]);
        let mut b = Sentence::new(1, ["Ann", "sings"]);
        b.set_spans(TagColumn::Clean, vec![Span::new(0, 1, "PER")]);
        b.set_spans(TagColumn::Observed, vec![Span::new(0, 1, "PER")]);
        let mut corpus = vec![a, b];
        for s in corpus.iter_mut() {
            bio::encode_into(s, TagColumn::Clean, TagColumn::Clean);
            bio::encode_into(s, TagColumn::Observed, TagColumn::Observed);
        }
        corpus
    }

    fn prepare(corpus: &mut [Sentence]) -> (LabelDictionary, Vocabulary) {
        let labels = LabelDictionary::from_sentences(corpus, false);
        let vocab = Vocabulary::build(corpus, 100);
        for s in corpus.iter_mut() {
            for t in &mut s.tokens {
                t.ensure_history(labels.len());
            }
        }
        (labels, vocab)
    }

    fn batch_of(corpus: &[Sentence], vocab: &Vocabulary, labels: &LabelDictionary) -> TokenBatch<NdArray> {
        let samples = corpus
            .iter()
            .map(|s| SentenceSample::from_sentence(s, vocab, labels).unwrap())
            .collect();
        TokenBatcher::<NdArray>::new(Default::default()).batch(samples)
    }

    /// Uniform scores except a strong vote for `label` on every token.
    fn scores(tokens: usize, width: usize, label: usize) -> Vec<f32> {
        (0..tokens * width).map(|i| if i % width == label { 4.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_record_batch_updates_history_and_logs() {
        let mut corpus = corpus();
        let (labels, vocab) = prepare(&mut corpus);
        let batch = batch_of(&corpus, &vocab, &labels);
        let dir = tempfile::tempdir().unwrap();

        let mut recorder = MetricsRecorder::for_model(false, &labels);
        let mut writer = EpochLogWriter::create(dir.path(), 1, recorder.metric_names()).unwrap();
        let mut tally = EpochTally::default();
        let s = scores(5, labels.len(), 0);
        recorder.record_batch(&mut corpus, &batch, &[s], &mut writer, &mut tally).unwrap();
        writer.finish().unwrap();

        for sentence in &corpus {
            for token in &sentence.tokens {
                let h = token.history().unwrap();
                assert_eq!(h.total_epochs, 1);
                assert!(h.is_consistent());
                assert_eq!(token.tag(TagColumn::Predicted), "O");
            }
        }
        assert_eq!(tally.tokens, 5);
        // "Ann" is observed S-PER but predicted O
        assert_eq!(tally.observed_correct, 4);

        let log = EpochLogDir::new(dir.path()).epoch_log(1).unwrap();
        assert_eq!(log.records().len(), 5);
        assert_eq!(log.records()[3].text, "Ann");
        assert_eq!(log.records()[3].noisy, "S-PER");
    }

    #[test]
    fn test_second_visit_in_same_epoch_is_rejected() {
        let mut corpus = corpus();
        let (labels, vocab) = prepare(&mut corpus);
        let batch = batch_of(&corpus, &vocab, &labels);
        let dir = tempfile::tempdir().unwrap();

        let mut recorder = MetricsRecorder::for_model(false, &labels);
        let mut writer = EpochLogWriter::create(dir.path(), 1, recorder.metric_names()).unwrap();
        let mut tally = EpochTally::default();
        let s = scores(5, labels.len(), 0);
        recorder.record_batch(&mut corpus, &batch, &[s.clone()], &mut writer, &mut tally).unwrap();
        assert!(recorder.record_batch(&mut corpus, &batch, &[s.clone()], &mut writer, &mut tally).is_err());

        // a new epoch may visit again
        recorder.start_epoch();
        recorder.record_batch(&mut corpus, &batch, &[s], &mut writer, &mut tally).unwrap();
        assert_eq!(corpus[0].tokens[0].history().unwrap().total_epochs, 2);
    }

    #[test]
    fn test_failed_sentence_leaves_histories_untouched() {
        let mut corpus = corpus();
        let (labels, vocab) = prepare(&mut corpus);
        let batch = batch_of(&corpus, &vocab, &labels);
        // the last token of "Paris is nice" cannot be computed
        corpus[0].tokens[2].replace_history(TokenMetricHistory::new(labels.len() + 1));
        let dir = tempfile::tempdir().unwrap();

        let mut recorder = MetricsRecorder::for_model(false, &labels);
        let mut writer = EpochLogWriter::create(dir.path(), 1, recorder.metric_names()).unwrap();
        let mut tally = EpochTally::default();
        let s = scores(5, labels.len(), 0);
        assert!(recorder.record_batch(&mut corpus, &batch, &[s], &mut writer, &mut tally).is_err());

        for token in &corpus[0].tokens[..2] {
            assert_eq!(token.history().unwrap().total_epochs, 0);
            assert!(token.metrics.is_none());
        }
        assert_eq!(tally.tokens, 0);
        assert_eq!(recorder.visited(), 0);
    }

    #[test]
    fn test_score_shape_mismatch_is_error() {
        let mut corpus = corpus();
        let (labels, vocab) = prepare(&mut corpus);
        let batch = batch_of(&corpus, &vocab, &labels);
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = MetricsRecorder::for_model(false, &labels);
        let mut writer = EpochLogWriter::create(dir.path(), 1, recorder.metric_names()).unwrap();
        let mut tally = EpochTally::default();
        let short = vec![0.0f32; 3];
        assert!(recorder.record_batch(&mut corpus, &batch, &[short], &mut writer, &mut tally).is_err());
    }

    #[test]
    fn test_metrics_mode_parse() {
        assert_eq!("epoch_end".parse::<MetricsMode>().unwrap(), MetricsMode::EpochEnd);
        assert!("sometimes".parse::<MetricsMode>().is_err());
    }

    #[test]
    fn test_two_epoch_training_run() {
        let mut corpus = corpus();
        let (labels, vocab) = prepare(&mut corpus);
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            output_dir: dir.path().to_string_lossy().into_owned(),
            epochs: 2,
            batch_size: 1,
            d_model: 8,
            num_layers: 2,
            early_exit: true,
            ..TrainConfig::default()
        };
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let summaries = run_training(&cfg, &mut corpus, &labels, &vocab, &ckpt).unwrap();

        assert_eq!(summaries.len(), 2);
        let logs = EpochLogDir::new(dir.path());
        assert_eq!(logs.available_epochs().unwrap(), vec![1, 2]);
        let second = logs.epoch_log(2).unwrap();
        assert_eq!(second.records().len(), 5);
        assert!(second.metric_index(Metric::PredictionDepth).is_ok());
        for token in corpus.iter().flat_map(|s| &s.tokens) {
            assert_eq!(token.history().unwrap().total_epochs, 2);
        }
    }
}
