// ============================================================
// Layer 3 — Remediator
// ============================================================
// Runs a remediation schedule over a corpus snapshot. Steps
// run strictly in trigger-epoch order because each one builds
// on the working tags left by the previous ones.
//
// Per step:
//   1. Load the step's epoch log; write the recorded prediction
//      and the step's metric onto every token.
//   2. Classify each token from (observed tag, prediction);
//      only tokens of the step's category are candidates, and
//      tokens already masked in the working column never are.
//   3. Candidates whose metric crosses the threshold change:
//        mask     working tag := S-MASK
//        relabel  working tag := predicted tag, and the change
//                 carries over to the following tokens while
//                 their observed and predicted tags keep the
//                 relabeled entity type
//   4. Decode the working tags into working spans.
//
// The observed column is never touched; `copy_back` replaces it
// with the working column only when asked to.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::data::bio;
use crate::domain::category::{classify, is_masked, MASK_TAG};
use crate::domain::metrics::Metric;
use crate::domain::schedule::{Action, RemediationSchedule, RemediationStep};
use crate::domain::sentence::{Sentence, TagColumn, Token};
use crate::infra::epoch_log::{EpochLog, EpochLogSource};
use crate::remediation::evaluation::{evaluate_columns, EvaluationResult};

/// Tokens changed by one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounts {
    /// Tokens whose own metric crossed the threshold
    pub changed:    usize,
    /// Tokens relabeled by carrying over a neighbour's change
    pub propagated: usize,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step:       RemediationStep,
    pub counts:     StepCounts,
    /// Working column against the clean column after the step
    pub evaluation: EvaluationResult,
}

pub struct Remediator<L: EpochLogSource> {
    schedule: RemediationSchedule,
    logs:     L,
}

impl<L: EpochLogSource> Remediator<L> {
    pub fn new(schedule: RemediationSchedule, logs: L) -> Self {
        Self { schedule, logs }
    }

    /// Reset the working column to the observed annotation and apply every step.
    pub fn run(&self, corpus: &mut [Sentence]) -> Result<Vec<StepOutcome>> {
        init_working_column(corpus);
        let mut outcomes = Vec::with_capacity(self.schedule.steps().len());

        for step in self.schedule.steps() {
            let log = self
                .logs
                .epoch_log(step.trigger_epoch)
                .with_context(|| format!("remediation step for category {} failed", step.category))?;
            apply_epoch_log(corpus, &log, step.metric)?;

            let counts = apply_step(corpus, step);
            let evaluation = evaluate_columns(corpus, TagColumn::Clean, TagColumn::New);
            info!(
                "epoch {} | category {} | {} {} {} {} | changed={} propagated={} | noise F1={:.4}",
                step.trigger_epoch,
                step.category,
                step.action,
                step.metric,
                step.direction.symbol(),
                step.threshold,
                counts.changed,
                counts.propagated,
                evaluation.micro.f1,
            );
            outcomes.push(StepOutcome { step: step.clone(), counts, evaluation });
        }
        Ok(outcomes)
    }
}

/// Working tags and spans start as a copy of the observed column.
pub fn init_working_column(corpus: &mut [Sentence]) {
    for sentence in corpus.iter_mut() {
        bio::encode_into(sentence, TagColumn::Observed, TagColumn::New);
        let spans = sentence.spans(TagColumn::Observed).to_vec();
        sentence.set_spans(TagColumn::New, spans);
    }
}

/// Copy the recorded prediction and `metric` of every logged token onto the corpus.
/// Tokens absent from the log lose their working metric and prediction and are not remediated.
pub fn apply_epoch_log(corpus: &mut [Sentence], log: &EpochLog, metric: Metric) -> Result<usize> {
    let column = log.metric_index(metric)?;
    let positions: HashMap<usize, usize> =
        corpus.iter().enumerate().map(|(pos, s)| (s.index, pos)).collect();

    for sentence in corpus.iter_mut() {
        for token in &mut sentence.tokens {
            token.metric = None;
            token.clear_tag(TagColumn::Predicted);
        }
    }

    let mut mismatches = 0;
    for record in log.records() {
        let pos = positions.get(&record.sent_index).with_context(|| {
            format!("epoch log '{}' refers to unknown sentence {}", log.origin(), record.sent_index)
        })?;
        let token = corpus[*pos].tokens.get_mut(record.token_index).with_context(|| {
            format!(
                "epoch log '{}' refers to unknown token {} of sentence {}",
                log.origin(),
                record.token_index,
                record.sent_index
            )
        })?;
        if token.tag(TagColumn::Observed) != record.noisy {
            mismatches += 1;
        }
        token.set_tag(TagColumn::Predicted, record.predicted.as_str());
        token.metric = Some(record.values[column]);
    }

    if mismatches > 0 {
        warn!(
            "{} tokens of '{}' have a different observed tag than the corpus",
            mismatches,
            log.origin()
        );
    }
    debug!("Applied {} records of '{}'", log.records().len(), log.origin());
    Ok(log.records().len())
}

/// Apply one step to every sentence and re-derive the working spans.
pub fn apply_step(corpus: &mut [Sentence], step: &RemediationStep) -> StepCounts {
    let mut total = StepCounts::default();
    for sentence in corpus.iter_mut() {
        let counts = match step.action {
            Action::Mask => StepCounts { changed: mask_sentence(sentence, step), propagated: 0 },
            Action::Relabel => relabel_sentence(sentence, step),
        };
        total.changed += counts.changed;
        total.propagated += counts.propagated;
        bio::decode_into(sentence, TagColumn::New, TagColumn::New);
    }
    total
}

/// Whether `token` belongs to the step's category; masked working tags never do.
fn in_category(token: &Token, step: &RemediationStep) -> bool {
    if is_masked(token.tag(TagColumn::New)) {
        return false;
    }
    classify(token.tag(TagColumn::Observed), token.tag(TagColumn::Predicted)) == Some(step.category)
}

fn triggers(token: &Token, step: &RemediationStep) -> bool {
    token
        .metric
        .map(|v| step.direction.triggers(v, step.threshold))
        .unwrap_or(false)
}

fn mask_sentence(sentence: &mut Sentence, step: &RemediationStep) -> usize {
    let mut changed = 0;
    for token in &mut sentence.tokens {
        if in_category(token, step) && triggers(token, step) {
            debug!("mask '{}' ({}:{})", token.text, sentence.index, token.index);
            token.set_tag(TagColumn::New, MASK_TAG);
            changed += 1;
        }
    }
    changed
}

fn relabel_sentence(sentence: &mut Sentence, step: &RemediationStep) -> StepCounts {
    let mut counts = StepCounts::default();
    let mut prev = String::from("O");
    let mut previous_changed = false;

    for token in &mut sentence.tokens {
        let predicted = token.tag(TagColumn::Predicted).to_string();
        if in_category(token, step) {
            if triggers(token, step) {
                debug!("relabel '{}' → {}", token.text, predicted);
                token.set_tag(TagColumn::New, predicted.as_str());
                counts.changed += 1;
                prev = predicted;
                previous_changed = true;
            }
            continue;
        }
        if is_masked(token.tag(TagColumn::New)) {
            previous_changed = false;
            continue;
        }

        let carries = previous_changed
            && bio::entity_type(&prev).is_some_and(|ty| {
                bio::entity_type(token.tag(TagColumn::Observed)) == Some(ty)
                    && bio::entity_type(&predicted) == Some(ty)
            });
        if carries {
            debug!("carry relabel to '{}' → {}", token.text, predicted);
            token.set_tag(TagColumn::New, predicted.as_str());
            counts.propagated += 1;
        } else {
            previous_changed = false;
        }
    }
    counts
}

/// Replace the observed annotation with the working one.
pub fn copy_back(corpus: &mut [Sentence]) {
    for sentence in corpus.iter_mut() {
        let spans = sentence.spans(TagColumn::New).to_vec();
        sentence.set_spans(TagColumn::Observed, spans);
        bio::encode_into(sentence, TagColumn::Observed, TagColumn::Observed);
    }
}
