// ============================================================
// Layer 3 — Remediation Schedule
// ============================================================
// A remediation step says: "at epoch E, look at metric M; every
// token of category C whose value lies left/right of threshold T
// gets masked / relabelled".
//
// Steps arrive from a JSON experiment file in their raw form
// (RawStepConfig) and are validated into RemediationSteps before
// any remediation work begins. A schedule is sorted by trigger
// epoch; steps with the same epoch keep declaration order.
//
// Raw form:
//   { "epoch_change": 2, "metric": "confidence", "threshold": "0.4",
//     "direction": "left", "modification": "relabel" }

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::domain::category::Category;
use crate::domain::metrics::Metric;

// ─── Direction ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Trigger when the metric is below the threshold
    Left,
    /// Trigger when the metric is above the threshold
    Right,
}

impl Direction {
    pub fn triggers(&self, value: f64, threshold: f64) -> bool {
        match self {
            Direction::Left  => value < threshold,
            Direction::Right => value > threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Direction::Left  => "<",
            Direction::Right => ">",
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "left"  => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other   => bail!("direction must be 'left' or 'right', got '{other}'"),
        }
    }
}

// ─── Action ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Mask,
    Relabel,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Mask    => f.write_str("mask"),
            Action::Relabel => f.write_str("relabel"),
        }
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "mask"    => Ok(Action::Mask),
            "relabel" => Ok(Action::Relabel),
            other     => bail!("modification must be 'mask' or 'relabel', got '{other}'"),
        }
    }
}

// ─── Raw config values ────────────────────────────────────────────────────────
/// Numbers in experiment files are sometimes written as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    pub fn as_f64(&self) -> anyhow::Result<f64> {
        match self {
            NumberOrString::Number(n) => Ok(*n),
            NumberOrString::Text(s) => s
                .trim()
                .parse::<f64>()
                .with_context(|| format!("'{s}' is not a number")),
        }
    }
}

/// One `modify_categoryN` entry as written in the experiment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStepConfig {
    pub epoch_change: NumberOrString,
    pub metric:       String,
    pub threshold:    NumberOrString,
    pub direction:    String,
    pub modification: String,
    /// Category id; filled from the `modify_categoryN` key when absent
    #[serde(default)]
    pub id:           Option<String>,
}

/// `false` disables remediation for a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategorySetting {
    Disabled(bool),
    Enabled(RawStepConfig),
}

// ─── RemediationStep ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationStep {
    pub trigger_epoch: u32,
    pub metric:        Metric,
    pub threshold:     f64,
    pub direction:     Direction,
    pub action:        Action,
    pub category:      Category,
}

impl RemediationStep {
    /// Validate a raw entry. `default_category` is used when the entry has no `id`.
    pub fn from_raw(raw: &RawStepConfig, default_category: Category) -> anyhow::Result<Self> {
        let category = match &raw.id {
            Some(id) => id.parse::<Category>()?,
            None     => default_category,
        };
        let epoch = raw.epoch_change.as_f64().context("invalid epoch_change")?;
        if epoch < 0.0 || epoch.fract() != 0.0 {
            bail!("epoch_change must be a non-negative integer, got {epoch}");
        }
        let threshold = raw.threshold.as_f64().context("invalid threshold")?;
        if !threshold.is_finite() {
            bail!("threshold must be finite, got {threshold}");
        }
        Ok(Self {
            trigger_epoch: epoch as u32,
            metric:        raw.metric.parse()?,
            threshold,
            direction:     raw.direction.parse()?,
            action:        raw.modification.parse()?,
            category,
        })
    }
}

// ─── RemediationSchedule ──────────────────────────────────────────────────────
#[derive(Debug, Clone, Default)]
pub struct RemediationSchedule {
    steps: Vec<RemediationStep>,
}

impl RemediationSchedule {
    /// Sort steps by trigger epoch. The sort is stable so ties keep their order.
    pub fn new(mut steps: Vec<RemediationStep>) -> Self {
        steps.sort_by_key(|s| s.trigger_epoch);
        Self { steps }
    }

    /// Build a schedule from the four per-category settings, in category order.
    pub fn from_settings(settings: &[(Category, &CategorySetting)]) -> anyhow::Result<Self> {
        let mut steps = Vec::new();
        for (category, setting) in settings {
            match setting {
                CategorySetting::Disabled(false) => {}
                CategorySetting::Disabled(true) => {
                    bail!("modify_category{} must be false or a step object", category.id())
                }
                CategorySetting::Enabled(raw) => {
                    let step = RemediationStep::from_raw(raw, *category)
                        .with_context(|| format!("invalid modify_category{}", category.id()))?;
                    steps.push(step);
                }
            }
        }
        Ok(Self::new(steps))
    }

    pub fn steps(&self) -> &[RemediationStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn uses_mask(&self) -> bool {
        self.steps.iter().any(|s| s.action == Action::Mask)
    }

    /// Epoch of the last step, i.e. how long the baseline run must train.
    pub fn last_epoch(&self) -> Option<u32> {
        self.steps.last().map(|s| s.trigger_epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(epoch: f64, direction: &str, modification: &str) -> RawStepConfig {
        RawStepConfig {
            epoch_change: NumberOrString::Number(epoch),
            metric:       "confidence".into(),
            threshold:    NumberOrString::Text("0.4".into()),
            direction:    direction.into(),
            modification: modification.into(),
            id:           None,
        }
    }

    #[test]
    fn test_direction_is_strict() {
        assert!(Direction::Left.triggers(0.2, 0.5));
        assert!(!Direction::Left.triggers(0.5, 0.5));
        assert!(Direction::Right.triggers(0.6, 0.5));
        assert!(!Direction::Right.triggers(0.5, 0.5));
    }

    #[test]
    fn test_from_raw_parses_string_threshold() {
        let step = RemediationStep::from_raw(&raw(2.0, "left", "relabel"), Category::DisputedOutside)
            .unwrap();
        assert_eq!(step.threshold, 0.4);
        assert_eq!(step.trigger_epoch, 2);
        assert_eq!(step.category, Category::DisputedOutside);
        assert_eq!(step.action, Action::Relabel);
    }

    #[test]
    fn test_malformed_direction_is_rejected() {
        let err = RemediationStep::from_raw(&raw(2.0, "up", "mask"), Category::AgreedOutside)
            .unwrap_err();
        assert!(err.to_string().contains("direction"));
    }

    #[test]
    fn test_unknown_category_id_is_rejected() {
        let mut r = raw(1.0, "left", "mask");
        r.id = Some("7".into());
        assert!(RemediationStep::from_raw(&r, Category::AgreedOutside).is_err());
    }

    #[test]
    fn test_schedule_sorted_with_stable_ties() {
        let a = CategorySetting::Enabled(raw(4.0, "left", "mask"));
        let b = CategorySetting::Enabled(raw(2.0, "left", "relabel"));
        let c = CategorySetting::Disabled(false);
        let d = CategorySetting::Enabled(raw(2.0, "right", "relabel"));
        let schedule = RemediationSchedule::from_settings(&[
            (Category::AgreedOutside, &a),
            (Category::DisputedOutside, &b),
            (Category::AgreedEntity, &c),
            (Category::DisputedEntity, &d),
        ])
        .unwrap();
        let order: Vec<u8> = schedule.steps().iter().map(|s| s.category.id()).collect();
        assert_eq!(order, vec![2, 4, 1]);
        assert!(schedule.uses_mask());
        assert_eq!(schedule.last_epoch(), Some(4));
    }

    #[test]
    fn test_category_setting_true_is_an_error() {
        let on = CategorySetting::Disabled(true);
        assert!(RemediationSchedule::from_settings(&[(Category::AgreedOutside, &on)]).is_err());
    }

    #[test]
    fn test_setting_deserializes_false_or_object() {
        let off: CategorySetting = serde_json::from_str("false").unwrap();
        assert!(matches!(off, CategorySetting::Disabled(false)));
        let on: CategorySetting = serde_json::from_str(
            r#"{"epoch_change": 9, "metric": "variability", "threshold": 0.15,
                "direction": "right", "modification": "mask"}"#,
        )
        .unwrap();
        assert!(matches!(on, CategorySetting::Enabled(_)));
    }
}
