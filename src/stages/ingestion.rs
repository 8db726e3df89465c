//! Ingestion stage: resolve farm, season, and farmer logs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::Stage;
use crate::collaborators::{with_timeout, FarmRepository, SeasonRepository};
use crate::domain::{StatePatch, StepName, WorkflowState};
use crate::error::PipelineError;

/// Resolves the farm and season records and the raw farmer-submitted logs.
///
/// Fails if either record is missing; an empty log sequence is not a failure.
pub struct IngestionStage {
    farms: Arc<dyn FarmRepository>,
    seasons: Arc<dyn SeasonRepository>,
    timeout: Duration,
}

impl IngestionStage {
    pub fn new(
        farms: Arc<dyn FarmRepository>,
        seasons: Arc<dyn SeasonRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            farms,
            seasons,
            timeout,
        }
    }
}

#[async_trait]
impl Stage for IngestionStage {
    fn name(&self) -> StepName {
        StepName::Ingestion
    }

    async fn execute(&self, state: &WorkflowState) -> StatePatch {
        let farm = match with_timeout(self.timeout, self.farms.get(&state.farm_id)).await {
            Ok(farm) => farm,
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        };

        let season = match with_timeout(self.timeout, self.seasons.get(&state.season_id)).await {
            Ok(season) => season,
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        };

        let logs =
            match with_timeout(self.timeout, self.seasons.farmer_logs(&state.season_id)).await {
                Ok(logs) => logs,
                Err(e) => {
                    return StatePatch::failure(
                        self.name(),
                        PipelineError::from_collaborator(self.name(), e).to_string(),
                    )
                }
            };

        debug!(
            farm = %farm.id,
            season = %season.id,
            logs = logs.len(),
            "Ingestion resolved records"
        );

        StatePatch {
            farm_data: Some(farm),
            season_data: Some(season),
            farmer_logs: Some(logs),
            current_step: Some(self.name()),
            ..Default::default()
        }
    }
}
