// ============================================================
// Layer 3 — Token Categories
// ============================================================
// Every non-masked token falls into exactly one of four
// categories, defined by two yes/no questions:
//
//                         observed == O    observed != O
//   prediction matches         1                3
//   prediction differs         2                4
//
// A token whose tag ends in MASK has been removed from training
// and never gets a category again.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Suffix of the entity type used to mask a token out of the loss.
pub const MASK_SUFFIX: &str = "MASK";

/// Single-token tag written by the mask action.
pub const MASK_TAG: &str = "S-MASK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// 1: correctly predicted non-entity
    AgreedOutside,
    /// 2: the model predicts an entity where none is observed
    DisputedOutside,
    /// 3: correctly predicted entity tag
    AgreedEntity,
    /// 4: observed entity tag the model disagrees with
    DisputedEntity,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::AgreedOutside,
        Category::DisputedOutside,
        Category::AgreedEntity,
        Category::DisputedEntity,
    ];

    pub fn id(&self) -> u8 {
        match self {
            Category::AgreedOutside   => 1,
            Category::DisputedOutside => 2,
            Category::AgreedEntity    => 3,
            Category::DisputedEntity  => 4,
        }
    }

    pub fn from_id(id: u8) -> anyhow::Result<Self> {
        match id {
            1 => Ok(Category::AgreedOutside),
            2 => Ok(Category::DisputedOutside),
            3 => Ok(Category::AgreedEntity),
            4 => Ok(Category::DisputedEntity),
            other => bail!("unknown category id {other}, expected 1..=4"),
        }
    }

    /// `(prediction_matches_observed, observed_is_outside)`
    pub fn conditions(&self) -> (bool, bool) {
        match self {
            Category::AgreedOutside   => (true, true),
            Category::DisputedOutside => (false, true),
            Category::AgreedEntity    => (true, false),
            Category::DisputedEntity  => (false, false),
        }
    }

    fn from_conditions(matches: bool, is_outside: bool) -> Self {
        match (matches, is_outside) {
            (true, true)   => Category::AgreedOutside,
            (false, true)  => Category::DisputedOutside,
            (true, false)  => Category::AgreedEntity,
            (false, false) => Category::DisputedEntity,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().parse::<u8>() {
            Ok(id) => Category::from_id(id),
            Err(_) => bail!("category id '{s}' is not a number"),
        }
    }
}

pub fn is_masked(tag: &str) -> bool {
    tag.ends_with(MASK_SUFFIX)
}

/// Category of a token given its observed and predicted tags.
/// Returns `None` for masked tokens.
pub fn classify(observed: &str, predicted: &str) -> Option<Category> {
    if is_masked(observed) {
        return None;
    }
    Some(Category::from_conditions(observed == predicted, observed == "O"))
}
