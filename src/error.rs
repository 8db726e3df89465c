//! Pipeline error taxonomy.
//!
//! Stages convert every failure into data: a `PipelineError` is rendered into
//! the append-only `errors` sequence of the workflow state, never thrown
//! across a stage boundary.

use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::domain::StepName;

/// Classified failure reported by a stage.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Farm or season not found. Fatal, no retry.
    #[error("missing record: {0}")]
    MissingRecord(String),

    /// External call exceeded its timeout. Transient.
    #[error("collaborator timeout in {stage}: {detail}")]
    CollaboratorTimeout { stage: StepName, detail: String },

    /// Assessment score below the floor. Fatal, terminal failure.
    #[error("quality rejected: {0}")]
    QualityRejected(String),

    /// Attestation hash and signature disagree. Fatal.
    #[error("signature mismatch for content hash {0}")]
    SignatureMismatch(String),

    /// External mint transaction not confirmed. Eligible for a narrow
    /// stage-local retry, never a full-pipeline retry.
    #[error("mint failure: {0}")]
    MintFailure(String),

    /// Any other stage failure (missing prerequisite state, collaborator
    /// unavailable).
    #[error("{stage} failed: {detail}")]
    Stage { stage: StepName, detail: String },
}

impl PipelineError {
    /// Classify a collaborator error raised during `stage`.
    pub fn from_collaborator(stage: StepName, err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::NotFound(what) => Self::MissingRecord(what),
            CollaboratorError::Timeout(d) => Self::CollaboratorTimeout {
                stage,
                detail: format!("call exceeded {d:?}"),
            },
            CollaboratorError::Unavailable(detail) => Self::Stage { stage, detail },
        }
    }

    /// A stage failure caused by missing prerequisite state.
    pub fn missing_input(stage: StepName, field: &str) -> Self {
        Self::Stage {
            stage,
            detail: format!("required state field '{field}' not present"),
        }
    }

    /// Whether a whole-run retry could plausibly clear this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CollaboratorTimeout { .. } | Self::MintFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn collaborator_errors_classify() {
        let err = PipelineError::from_collaborator(
            StepName::Ingestion,
            CollaboratorError::NotFound("farm F9".into()),
        );
        assert!(matches!(err, PipelineError::MissingRecord(_)));
        assert!(!err.is_transient());

        let err = PipelineError::from_collaborator(
            StepName::RemoteSensing,
            CollaboratorError::Timeout(Duration::from_secs(5)),
        );
        assert!(matches!(err, PipelineError::CollaboratorTimeout { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn display_includes_stage_name() {
        let err = PipelineError::missing_input(StepName::EmissionModeling, "season_data");
        assert!(err.to_string().contains("emission_modeling"));
        assert!(err.to_string().contains("season_data"));
    }
}
