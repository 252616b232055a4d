//! Webhook event dispatch: filter, score, merge, write back.

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::annotation::{ResultEntry, WebhookEvent};
use crate::score::{Score, Scorer};

/// Failure reported by a [`WriteBack`] implementation.
#[derive(Debug, Error)]
pub enum WriteBackError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("platform returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Persists a merged result list on the annotation platform.
#[async_trait]
pub trait WriteBack: Send + Sync {
    async fn write_back(
        &self,
        annotation_id: u64,
        result: &[ResultEntry],
    ) -> Result<(), WriteBackError>;
}

/// What happened to one webhook delivery.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Score computed and written back.
    Scored { annotation_id: u64, score: Score },
    /// Action other than create/update; nothing done.
    Ignored { action: Option<String> },
    /// Malformed event; nothing done.
    Rejected { reason: String },
    /// Scoring succeeded but the write-back did not.
    Failed {
        annotation_id: u64,
        error: WriteBackError,
    },
}

impl DispatchOutcome {
    pub fn missing_id() -> Self {
        Self::Rejected {
            reason: "missing annotation id".to_string(),
        }
    }

    /// HTTP status to answer the platform with.
    pub fn status(&self) -> u16 {
        match self {
            Self::Scored { .. } | Self::Ignored { .. } => 200,
            Self::Rejected { .. } => 400,
            Self::Failed { .. } => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == 200
    }

    /// JSON response body.
    pub fn body(&self) -> Value {
        match self {
            Self::Scored { score, .. } => json!({ "ok": true, "score": score }),
            Self::Ignored { action } => json!({ "ok": true, "ignored": action }),
            Self::Rejected { reason } => json!({ "ok": false, "error": reason }),
            Self::Failed { error, .. } => json!({ "ok": false, "error": error.to_string() }),
        }
    }
}

/// Process one webhook delivery.
///
/// The action is checked before the annotation id, so a non-scoring event
/// with no annotation is still ignored rather than rejected.
pub async fn dispatch<W>(event: &WebhookEvent, scorer: &Scorer, writer: &W) -> DispatchOutcome
where
    W: WriteBack + ?Sized,
{
    let Some(action) = event.scoring_action() else {
        debug!(action = ?event.action, "ignoring webhook event");
        return DispatchOutcome::Ignored {
            action: event.action.clone(),
        };
    };

    let Some(annotation_id) = event.annotation.annotation_id() else {
        warn!(action = action.as_str(), "webhook event without annotation id");
        return DispatchOutcome::missing_id();
    };

    let scored = scorer.score(&event.annotation.result);
    info!(
        annotation_id,
        action = action.as_str(),
        selected = ?scored.selected,
        score = scored.score.value(),
        "annotation scored"
    );

    match writer.write_back(annotation_id, &scored.result).await {
        Ok(()) => DispatchOutcome::Scored {
            annotation_id,
            score: scored.score,
        },
        Err(e) => {
            error!(annotation_id, error = %e, "write-back failed");
            DispatchOutcome::Failed {
                annotation_id,
                error: e,
            }
        }
    }
}
