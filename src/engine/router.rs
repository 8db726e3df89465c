//! Router state machine.
//!
//! Transitions follow stage order unconditionally except at `assessed`, the
//! single branch point: the quality score decides whether the run proceeds to
//! reporting, loops back to ingestion, or terminates failed.

use serde::{Deserialize, Serialize};

use crate::domain::{QualityAssessment, Recommendation, StepName};

/// Positions of a run inside the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    Start,
    Ingested,
    Sensed,
    Modeled,
    Assessed,
    Reported,
    Attested,
    Minted,
    Failed,
}

impl RouterState {
    /// The state reached after `step` completes successfully.
    pub fn after(step: StepName) -> Self {
        match step {
            StepName::Ingestion => Self::Ingested,
            StepName::RemoteSensing => Self::Sensed,
            StepName::EmissionModeling => Self::Modeled,
            StepName::QualityAssessment => Self::Assessed,
            StepName::ReportGeneration => Self::Reported,
            StepName::Attestation => Self::Attested,
            StepName::Mint => Self::Minted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Minted | Self::Failed)
    }
}

/// Outcome of the branch at `assessed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Continue to report generation
    Proceed,
    /// Loop back to ingestion
    Retry,
    /// Terminate failed
    Fail,
}

/// The conditional branch following quality assessment.
#[derive(Debug, Clone, Copy)]
pub struct Router {
    /// Score at or above which the run proceeds (default 0.8)
    pub proceed_threshold: f64,
    /// Score at or above which a rejected run may retry (default 0.6)
    pub retry_threshold: f64,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            proceed_threshold: 0.8,
            retry_threshold: 0.6,
        }
    }
}

impl Router {
    pub fn new(proceed_threshold: f64, retry_threshold: f64) -> Self {
        Self {
            proceed_threshold,
            retry_threshold,
        }
    }

    /// Decide the outcome at `assessed`.
    ///
    /// Boundaries are half-open: `score >= proceed` proceeds (with an
    /// approving recommendation), `retry <= score < proceed` retries,
    /// `score < retry` fails. A missing assessment fails outright.
    pub fn decide(&self, assessment: Option<&QualityAssessment>) -> Verdict {
        let Some(qa) = assessment else {
            return Verdict::Fail;
        };

        if qa.score < self.retry_threshold {
            return Verdict::Fail;
        }
        if qa.score >= self.proceed_threshold && qa.recommendation == Recommendation::Approve {
            return Verdict::Proceed;
        }
        Verdict::Retry
    }
}
