//! Deduction scoring and score write-back merge.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::annotation::ResultEntry;
use crate::extract::{ERRORS_FIELD, selected_labels};
use crate::policy::DeductionPolicy;

/// Control name of the numeric score field.
pub const SCORE_FIELD: &str = "final_score";
/// Object name the score entry points at (the `<Text name="text">` tag).
pub const SCORE_TARGET: &str = "text";
/// Score before any deduction.
pub const MAX_SCORE: u8 = 100;

/// Quality score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `max(0, 100 - sum of deductions)`. Each occurrence of a label deducts,
/// so a label listed twice costs twice.
pub fn compute_score<S: AsRef<str>>(policy: &DeductionPolicy, labels: &[S]) -> Score {
    let total: u32 = labels
        .iter()
        .map(|label| policy.deduction(label.as_ref()))
        .fold(0u32, u32::saturating_add);
    let remaining = u32::from(MAX_SCORE).saturating_sub(total);
    // remaining <= 100
    Score(remaining as u8)
}

/// Return a copy of `result` with every `score_field` entry removed and one
/// fresh numeric score entry appended.
pub fn merge_score(
    result: &[ResultEntry],
    score: Score,
    score_field: &str,
    score_target: &str,
) -> Vec<ResultEntry> {
    let mut merged: Vec<ResultEntry> = result
        .iter()
        .filter(|entry| entry.from_name() != Some(score_field))
        .cloned()
        .collect();
    merged.push(ResultEntry::number(score_field, score_target, score.value()));
    merged
}

/// Field names the scorer reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    pub errors_field: String,
    pub score_field: String,
    pub score_target: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            errors_field: ERRORS_FIELD.to_string(),
            score_field: SCORE_FIELD.to_string(),
            score_target: SCORE_TARGET.to_string(),
        }
    }
}

/// Outcome of scoring one annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub selected: Vec<String>,
    pub score: Score,
    /// Full result list to write back.
    pub result: Vec<ResultEntry>,
}

/// Policy plus field names, shared read-only across deliveries.
#[derive(Debug, Clone)]
pub struct Scorer {
    policy: Arc<DeductionPolicy>,
    fields: FieldNames,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(Arc::new(DeductionPolicy::default()), FieldNames::default())
    }
}

impl Scorer {
    pub fn new(policy: Arc<DeductionPolicy>, fields: FieldNames) -> Self {
        Self { policy, fields }
    }

    pub fn policy(&self) -> &DeductionPolicy {
        &self.policy
    }

    pub fn fields(&self) -> &FieldNames {
        &self.fields
    }

    /// Extract, score and merge in one pass.
    pub fn score(&self, result: &[ResultEntry]) -> Scored {
        let selected = selected_labels(result, &self.fields.errors_field);
        let score = compute_score(&self.policy, &selected);
        let result = merge_score(
            result,
            score,
            &self.fields.score_field,
            &self.fields.score_target,
        );
        Scored {
            selected,
            score,
            result,
        }
    }
}
