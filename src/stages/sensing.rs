//! Remote-sensing analysis stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Stage;
use crate::collaborators::{with_timeout, NaturalLanguageValidator, RemoteSensingProvider};
use crate::domain::{StatePatch, StepName, WorkflowState};
use crate::error::PipelineError;

/// Fetches satellite observations for the season window and derives the
/// flood/dry event timeline plus a confidence score that the declared method
/// matches what was observed.
///
/// The confidence mapping itself belongs to the sensing provider; this stage
/// only orchestrates the calls. The optional language validator may annotate
/// the analysis but never changes the stage's success or failure.
pub struct SensingStage {
    sensing: Arc<dyn RemoteSensingProvider>,
    validator: Option<Arc<dyn NaturalLanguageValidator>>,
    timeout: Duration,
}

impl SensingStage {
    pub fn new(
        sensing: Arc<dyn RemoteSensingProvider>,
        validator: Option<Arc<dyn NaturalLanguageValidator>>,
        timeout: Duration,
    ) -> Self {
        Self {
            sensing,
            validator,
            timeout,
        }
    }
}

#[async_trait]
impl Stage for SensingStage {
    fn name(&self) -> StepName {
        StepName::RemoteSensing
    }

    async fn execute(&self, state: &WorkflowState) -> StatePatch {
        let Some(farm) = state.farm_data.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "farm_data").to_string(),
            );
        };
        let Some(season) = state.season_data.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "season_data").to_string(),
            );
        };

        let series = match with_timeout(
            self.timeout,
            self.sensing
                .fetch(&farm.id, season.sowing_date, season.harvest_date),
        )
        .await
        {
            Ok(series) => series,
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        };

        let mut analysis = match with_timeout(
            self.timeout,
            self.sensing.analyze(&series, &farm.geometry()),
        )
        .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        };

        debug!(
            observations = series.len(),
            confidence = analysis.confidence,
            dry_downs = analysis.dry_down_count,
            "Sensing analysis complete"
        );

        if let Some(validator) = &self.validator {
            let summary = format!(
                "declared method {}, {} observations, {} dry-down events, confidence {:.2}",
                season.declared_method.as_str(),
                series.len(),
                analysis.dry_down_count,
                analysis.confidence
            );
            match with_timeout(self.timeout, validator.review(&summary)).await {
                Ok(note) => analysis.advisory_note = Some(note.note),
                // Advisory only: a validator failure never fails the stage
                Err(e) => warn!(error = %e, "Language validator unavailable, skipping annotation"),
            }
        }

        StatePatch {
            satellite_data: Some(series),
            remote_sensing_analysis: Some(analysis),
            current_step: Some(self.name()),
            ..Default::default()
        }
    }
}
