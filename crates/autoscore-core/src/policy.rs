//! Deduction policy: error category → points taken off the starting score.
//!
//! The policy is built once (the built-in table, or a JSON file loaded at
//! startup) and only read afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use thiserror::Error;
use tracing::debug;

/// Built-in deduction table. Names match the `errors` choice values in the
/// labeling interface.
pub const ERROR_DEDUCTIONS: &[(&str, u32)] = &[
    ("Report Generation / Usability Error", 100),
    ("Financial Accuracy Error", 15),
    ("Business & Moat Understanding Error", 12),
    ("Market & Event Accuracy Error", 12),
    ("Recommendation & Debate Quality Error", 10),
    ("Temporal Accuracy Error", 10),
    ("Source & Evidence Coverage Error", 8),
    ("Instruction Compliance Error", 8),
    ("Internal Consistency Error", 6),
    ("Presentation & Clarity Error", 4),
    ("Language & Professionalism Error", 2),
];

static STANDARD: LazyLock<DeductionPolicy> =
    LazyLock::new(|| DeductionPolicy::from_entries(ERROR_DEDUCTIONS.iter().copied()));

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid policy file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Decode the entity-escaped ampersand the labeling UI may emit.
///
/// `"Business &amp; Moat Understanding Error"` → `"Business & Moat Understanding Error"`
pub fn normalize_label(label: &str) -> String {
    label.replace("&amp;", "&")
}

/// Immutable mapping from category name to a non-negative deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionPolicy {
    deductions: HashMap<String, u32>,
}

impl DeductionPolicy {
    /// The built-in table, shared for the life of the process.
    pub fn standard() -> &'static DeductionPolicy {
        &STANDARD
    }

    /// Build a policy from `(category, points)` pairs. Category names are
    /// normalized; a later duplicate replaces an earlier one.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let deductions = entries
            .into_iter()
            .map(|(name, points)| (normalize_label(name.as_ref()), points))
            .collect();
        Self { deductions }
    }

    /// Load a policy from a JSON object file: `{"Category": points, ...}`.
    ///
    /// Negative or fractional points are rejected by the parser.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let table: HashMap<String, u32> =
            serde_json::from_str(&text).map_err(|source| PolicyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), categories = table.len(), "loaded deduction policy");
        Ok(Self::from_entries(table))
    }

    /// Points for one label; unknown labels cost nothing.
    pub fn deduction(&self, label: &str) -> u32 {
        self.deductions.get(label).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.deductions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deductions.is_empty()
    }

    /// Categories sorted by descending deduction, then name.
    pub fn categories(&self) -> Vec<(&str, u32)> {
        let mut out: Vec<(&str, u32)> = self
            .deductions
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        out
    }
}

impl Default for DeductionPolicy {
    fn default() -> Self {
        Self::standard().clone()
    }
}
