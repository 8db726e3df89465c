//! The seven pipeline stages.
//!
//! Every stage is a pure function of the accumulated state plus its injected
//! collaborators, returning a `StatePatch`. Stages never panic and never
//! throw across the stage boundary: any failure becomes an `errors` entry
//! plus the stage's own name in `current_step`, with the fields it could not
//! produce simply omitted.

pub mod attestation;
pub mod ingestion;
pub mod mint;
pub mod modeling;
pub mod quality;
pub mod report;
pub mod sensing;

use async_trait::async_trait;

use crate::domain::{StatePatch, StepName, WorkflowState};

pub use attestation::AttestationStage;
pub use ingestion::IngestionStage;
pub use mint::MintStage;
pub use modeling::ModelingStage;
pub use quality::QualityStage;
pub use report::ReportStage;
pub use sensing::SensingStage;

/// One processing step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StepName;

    /// Produce this stage's patch. Must not panic; all failure is data.
    async fn execute(&self, state: &WorkflowState) -> StatePatch;
}
