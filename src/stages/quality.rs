//! Quality-assessment stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::Stage;
use crate::collaborators::{with_timeout, QaEvaluator};
use crate::domain::{QaBundle, StatePatch, StepName, WorkflowState};
use crate::error::PipelineError;

/// Assembles the assessment bundle and asks the evaluator for a score and
/// recommendation. The only stage whose output feeds the Router.
pub struct QualityStage {
    evaluator: Arc<dyn QaEvaluator>,
    timeout: Duration,
}

impl QualityStage {
    pub fn new(evaluator: Arc<dyn QaEvaluator>, timeout: Duration) -> Self {
        Self { evaluator, timeout }
    }
}

#[async_trait]
impl Stage for QualityStage {
    fn name(&self) -> StepName {
        StepName::QualityAssessment
    }

    async fn execute(&self, state: &WorkflowState) -> StatePatch {
        let Some(season) = state.season_data.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "season_data").to_string(),
            );
        };
        let Some(analysis) = state.remote_sensing_analysis.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "remote_sensing_analysis").to_string(),
            );
        };
        let Some(calculations) = state.emission_calculations.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "emission_calculations").to_string(),
            );
        };

        let bundle = QaBundle {
            season,
            logs: state.farmer_logs.as_deref().unwrap_or_default(),
            observations: state.satellite_data.as_deref().unwrap_or_default(),
            analysis,
            calculations,
        };

        match with_timeout(self.timeout, self.evaluator.assess(bundle)).await {
            Ok(assessment) => {
                debug!(
                    score = assessment.score,
                    recommendation = ?assessment.recommendation,
                    flags = assessment.flags.len(),
                    "Quality assessment complete"
                );
                StatePatch {
                    quality_assessment: Some(assessment),
                    current_step: Some(self.name()),
                    ..Default::default()
                }
            }
            Err(e) => StatePatch::failure(
                self.name(),
                PipelineError::from_collaborator(self.name(), e).to_string(),
            ),
        }
    }
}
