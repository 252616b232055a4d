//! Selected-label extraction from an annotation's result list.

use crate::annotation::{Payload, ResultEntry};
use crate::policy::normalize_label;

/// Control name of the error-category multi-choice field.
pub const ERRORS_FIELD: &str = "errors";

/// Collect the normalized labels selected in the `field` multi-choice entries.
///
/// Entries are visited in order. Anything that is not a `choices` entry for
/// `field` is skipped, as are entries with a missing or malformed selection.
/// Duplicates are kept.
pub fn selected_labels(result: &[ResultEntry], field: &str) -> Vec<String> {
    let mut selected = Vec::new();
    for entry in result {
        if entry.from_name() != Some(field) {
            continue;
        }
        if let Payload::Choices(choices) = entry.payload() {
            selected.extend(choices.into_iter().map(normalize_label));
        }
    }
    selected
}
