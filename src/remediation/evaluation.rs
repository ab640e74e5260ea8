// ============================================================
// Layer 3 — Span-Aligned Evaluation
// ============================================================
// Compares two label columns of a corpus span by span:
//
//   1. Every span of either column is keyed by
//      (sentence, start, end).
//   2. Each key gets one gold and one predicted value; a column
//      with no span at that key contributes "O".
//   3. Standard multi-class scores over the aligned pairs:
//        per class  P = tp / predicted, R = tp / gold, F1
//        micro      pooled over all non-O classes
//        macro      mean over all non-O classes
//        accuracy   over all keys, "O" included
//
// "O" never gets a row of its own. With a single class the
// micro average is the macro average.
//
// Reference: scikit-learn classification_report semantics

use std::collections::{BTreeMap, HashMap};

use crate::domain::sentence::{Sentence, TagColumn};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Averages {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub label:           String,
    pub precision:       f64,
    pub recall:          f64,
    pub f1:              f64,
    pub true_positives:  usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Gold occurrences
    pub support:         usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub micro:     Averages,
    pub macro_avg: Averages,
    pub accuracy:  f64,
    /// Non-O classes, most frequent first
    pub per_class: Vec<ClassScores>,
    /// Number of aligned span keys
    pub keys:      usize,
}

impl EvaluationResult {
    /// All-zero result for a comparison without any non-O label.
    pub fn zeros() -> Self {
        Self::default()
    }

    pub fn class(&self, label: &str) -> Option<&ClassScores> {
        self.per_class.iter().find(|c| c.label == label)
    }

    pub fn detailed_report(&self) -> String {
        let mut out = format!(
            "{:>12} {:>9} {:>9} {:>9} {:>9}\n\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for c in &self.per_class {
            out.push_str(&format!(
                "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
                c.label, c.precision, c.recall, c.f1, c.support
            ));
        }
        let support: usize = self.per_class.iter().map(|c| c.support).sum();
        out.push('\n');
        for (name, avg) in [("micro avg", self.micro), ("macro avg", self.macro_avg)] {
            out.push_str(&format!(
                "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}\n",
                name, avg.precision, avg.recall, avg.f1, support
            ));
        }
        out.push_str(&format!("{:>12} {:>29.4} {:>9}\n", "accuracy", self.accuracy, self.keys));
        out
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) }
}

/// Span-aligned comparison of `predicted` against `gold`.
pub fn evaluate_columns(sentences: &[Sentence], gold: TagColumn, predicted: TagColumn) -> EvaluationResult {
    type Key = (usize, usize, usize);
    let mut aligned: BTreeMap<Key, (Option<&str>, Option<&str>)> = BTreeMap::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for (position, sentence) in sentences.iter().enumerate() {
        for (column, is_gold) in [(gold, true), (predicted, false)] {
            for span in sentence.spans(column) {
                let value = span.value.as_str();
                let entry = aligned.entry((position, span.start, span.end)).or_insert((None, None));
                let slot = if is_gold { &mut entry.0 } else { &mut entry.1 };
                // duplicates keep the first value
                if slot.is_none() {
                    *slot = Some(value);
                }
                let count = counts.entry(value).or_insert(0);
                if *count == 0 {
                    first_seen.push(value);
                }
                *count += 1;
            }
        }
    }

    let mut labels: Vec<&str> = first_seen.into_iter().filter(|l| *l != "O").collect();
    if labels.is_empty() {
        tracing::warn!(
            "No {} or {} labels besides O; reporting zero scores",
            gold.as_str(),
            predicted.as_str()
        );
        return EvaluationResult::zeros();
    }
    // stable: equal counts keep first-appearance order
    labels.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let pairs: Vec<(&str, &str)> = aligned
        .values()
        .map(|(g, p)| (g.unwrap_or("O"), p.unwrap_or("O")))
        .collect();

    let per_class: Vec<ClassScores> = labels
        .iter()
        .map(|&label| {
            let tp = pairs.iter().filter(|(g, p)| *g == label && *p == label).count();
            let predicted_n = pairs.iter().filter(|(_, p)| *p == label).count();
            let gold_n = pairs.iter().filter(|(g, _)| *g == label).count();
            let precision = ratio(tp, predicted_n);
            let recall = ratio(tp, gold_n);
            ClassScores {
                label: label.to_string(),
                precision,
                recall,
                f1: f1(precision, recall),
                true_positives: tp,
                false_positives: predicted_n - tp,
                false_negatives: gold_n - tp,
                support: gold_n,
            }
        })
        .collect();

    let n = per_class.len() as f64;
    let macro_avg = Averages {
        precision: per_class.iter().map(|c| c.precision).sum::<f64>() / n,
        recall:    per_class.iter().map(|c| c.recall).sum::<f64>() / n,
        f1:        per_class.iter().map(|c| c.f1).sum::<f64>() / n,
    };

    let micro = if per_class.len() == 1 {
        macro_avg
    } else {
        let tp: usize = per_class.iter().map(|c| c.true_positives).sum();
        let fp: usize = per_class.iter().map(|c| c.false_positives).sum();
        let fn_: usize = per_class.iter().map(|c| c.false_negatives).sum();
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        Averages { precision, recall, f1: f1(precision, recall) }
    };

    let accuracy = ratio(pairs.iter().filter(|(g, p)| g == p).count(), pairs.len());

    EvaluationResult { micro, macro_avg, accuracy, per_class, keys: pairs.len() }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sentence::Span;

    const EPS: f64 = 1e-12;

    fn sentence(gold: Vec<Span>, pred: Vec<Span>) -> Sentence {
        let mut s = Sentence::new(0, ["a", "b", "c", "d", "e"]);
        s.set_spans(TagColumn::Clean, gold);
        s.set_spans(TagColumn::New, pred);
        s
    }

    #[test]
    fn test_identical_columns_score_one() {
        let spans = vec![Span::new(0, 1, "LOC"), Span::new(2, 4, "PER")];
        let s = sentence(spans.clone(), spans);
        let r = evaluate_columns(&[s], TagColumn::Clean, TagColumn::New);
        assert!((r.micro.f1 - 1.0).abs() < EPS);
        assert!((r.macro_avg.f1 - 1.0).abs() < EPS);
        assert!((r.accuracy - 1.0).abs() < EPS);
    }

    #[test]
    fn test_missed_entity_counts_as_false_negative() {
        let s = sentence(vec![Span::new(0, 1, "LOC")], vec![]);
        let r = evaluate_columns(&[s], TagColumn::Clean, TagColumn::New);
        let loc = r.class("LOC").unwrap();
        assert_eq!(loc.false_negatives, 1);
        assert_eq!(loc.recall, 0.0);
        assert_eq!(r.micro.f1, 0.0);
        assert_eq!(r.accuracy, 0.0);
    }

    #[test]
    fn test_boundary_mismatch_makes_two_keys() {
        // gold [0,2) LOC vs predicted [0,1) LOC
        let s = sentence(vec![Span::new(0, 2, "LOC")], vec![Span::new(0, 1, "LOC")]);
        let r = evaluate_columns(&[s], TagColumn::Clean, TagColumn::New);
        assert_eq!(r.keys, 2);
        let loc = r.class("LOC").unwrap();
        assert_eq!(loc.true_positives, 0);
        assert_eq!(loc.false_positives, 1);
        assert_eq!(loc.false_negatives, 1);
    }

    #[test]
    fn test_micro_and_macro_differ_with_two_classes() {
        let gold = vec![Span::new(0, 1, "LOC"), Span::new(1, 2, "LOC"), Span::new(2, 3, "PER")];
        let pred = vec![Span::new(0, 1, "LOC"), Span::new(1, 2, "LOC"), Span::new(2, 3, "LOC")];
        let r = evaluate_columns(&[sentence(gold, pred)], TagColumn::Clean, TagColumn::New);

        // LOC: P 2/3 R 1, PER: P 0 R 0
        let loc = r.class("LOC").unwrap();
        assert!((loc.precision - 2.0 / 3.0).abs() < EPS);
        assert!((loc.recall - 1.0).abs() < EPS);
        assert!((r.macro_avg.f1 - 0.4).abs() < EPS);
        assert!((r.micro.precision - 2.0 / 3.0).abs() < EPS);
        assert!((r.micro.recall - 2.0 / 3.0).abs() < EPS);
        assert_eq!(r.per_class[0].label, "LOC");
    }

    #[test]
    fn test_single_class_micro_equals_macro() {
        let s = sentence(
            vec![Span::new(0, 1, "LOC"), Span::new(3, 4, "LOC")],
            vec![Span::new(0, 1, "LOC")],
        );
        let r = evaluate_columns(&[s], TagColumn::Clean, TagColumn::New);
        assert_eq!(r.micro, r.macro_avg);
    }

    #[test]
    fn test_no_labels_reports_zeros() {
        let s = sentence(vec![], vec![]);
        let r = evaluate_columns(&[s], TagColumn::Clean, TagColumn::New);
        assert_eq!(r, EvaluationResult::zeros());
    }

    #[test]
    fn test_keys_are_per_sentence() {
        let a = sentence(vec![Span::new(0, 1, "LOC")], vec![]);
        let mut b = sentence(vec![], vec![Span::new(0, 1, "LOC")]);
        b.index = 1;
        let r = evaluate_columns(&[a, b], TagColumn::Clean, TagColumn::New);
        assert_eq!(r.keys, 2);
        assert_eq!(r.accuracy, 0.0);
    }
}
