//! Pipeline error taxonomy.
//!
//! Every stage reports failures through [`PipelineError`]. The variants map
//! onto the three surfaced classes: precondition failures (4xx / refuse to
//! start), validation failures (4xx), and upstream failures (5xx / process
//! exit). Generation is the one stage that is *not* allowed to surface an
//! error to the caller — see [`crate::answer`] for the soft-fail policy.

use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage an upstream failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Embed,
    Store,
    Retrieve,
    Generate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Embed => "embed",
            Stage::Store => "store",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required resource or prior step is missing (missing SSL CA file,
    /// missing API key, querying before any document was indexed).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The caller supplied unusable input (empty query, bad parameter).
    #[error("invalid request: {0}")]
    Validation(String),

    /// A delegated call failed: embedding backend, database, or model API.
    #[error("{stage} stage failed: {message}")]
    Upstream { stage: Stage, message: String },

    /// The source document path does not exist.
    #[error("document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    /// The source document exists but could not be parsed or rendered.
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),
}

impl PipelineError {
    pub fn upstream(stage: Stage, err: impl std::fmt::Display) -> Self {
        PipelineError::Upstream {
            stage,
            message: err.to_string(),
        }
    }

    /// True for errors the caller can fix by changing the request or by
    /// uploading a document first; these map to 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Precondition(_)
                | PipelineError::Validation(_)
                | PipelineError::DocumentNotFound(_)
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_classification() {
        assert!(PipelineError::Validation("empty query".into()).is_client_error());
        assert!(PipelineError::Precondition("no index".into()).is_client_error());
        assert!(PipelineError::DocumentNotFound(PathBuf::from("/missing.pdf")).is_client_error());
        assert!(!PipelineError::upstream(Stage::Embed, "connection refused").is_client_error());
        assert!(!PipelineError::DocumentUnreadable("bad xref".into()).is_client_error());
    }

    #[test]
    fn upstream_message_names_stage() {
        let err = PipelineError::upstream(Stage::Store, "connection refused");
        assert!(err.to_string().contains("store"));
        assert!(err.to_string().contains("connection refused"));
    }
}
