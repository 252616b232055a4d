//! Core scoring for Label Studio review annotations: label extraction,
//! deduction policy, score merge, and webhook dispatch.

pub mod annotation;
pub mod dispatch;
pub mod extract;
pub mod policy;
pub mod score;

pub use annotation::{Action, Annotation, Payload, ResultEntry, WebhookEvent};
pub use dispatch::{DispatchOutcome, WriteBack, WriteBackError, dispatch};
pub use extract::{ERRORS_FIELD, selected_labels};
pub use policy::{DeductionPolicy, PolicyError, normalize_label};
pub use score::{
    FieldNames, SCORE_FIELD, SCORE_TARGET, Score, Scored, Scorer, compute_score, merge_score,
};
