//! Emission modeling stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Stage;
use crate::collaborators::{with_timeout, EmissionModel, NaturalLanguageValidator};
use crate::domain::{EmissionCalculations, StatePatch, StepName, WorkflowState};
use crate::error::PipelineError;

/// Uncertainty widening applied when the advisory review flags a concern.
const ADVISORY_UNCERTAINTY_WIDENING: f64 = 0.05;

/// Computes baseline and project emissions from already-accumulated state via
/// the pluggable model and derives the reduction and its GWP-weighted
/// equivalent.
///
/// This stage never queries satellites or repositories itself. The optional
/// language validator may only widen the uncertainty estimate; it never
/// decides pass or fail.
pub struct ModelingStage {
    model: Arc<dyn EmissionModel>,
    validator: Option<Arc<dyn NaturalLanguageValidator>>,
    timeout: Duration,
}

impl ModelingStage {
    pub fn new(
        model: Arc<dyn EmissionModel>,
        validator: Option<Arc<dyn NaturalLanguageValidator>>,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            validator,
            timeout,
        }
    }
}

#[async_trait]
impl Stage for ModelingStage {
    fn name(&self) -> StepName {
        StepName::EmissionModeling
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
        let Some(analysis) = state.remote_sensing_analysis.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "remote_sensing_analysis").to_string(),
            );
        };

        let baseline = match with_timeout(self.timeout, self.model.baseline(season, farm)).await {
            Ok(estimate) => estimate,
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        };

        let project =
            match with_timeout(self.timeout, self.model.project(season, farm, analysis)).await {
                Ok(estimate) => estimate,
                Err(e) => {
                    return StatePatch::failure(
                        self.name(),
                        PipelineError::from_collaborator(self.name(), e).to_string(),
                    )
                }
            };

        let mut calculations = EmissionCalculations::from_estimates(baseline, project);

        debug!(
            baseline_kg_ch4 = calculations.baseline_kg_ch4,
            project_kg_ch4 = calculations.project_kg_ch4,
            reduction_kg_ch4 = calculations.reduction_kg_ch4,
            "Emission modeling complete"
        );

        if let Some(validator) = &self.validator {
            let summary = format!(
                "baseline {:.3} kg CH4, project {:.3} kg CH4, reduction {:.3} kg CH4 for {} on {:.1} ha",
                calculations.baseline_kg_ch4,
                calculations.project_kg_ch4,
                calculations.reduction_kg_ch4,
                season.declared_method.as_str(),
                farm.area_ha
            );
            match with_timeout(self.timeout, validator.review(&summary)).await {
                Ok(note) if note.concern => {
                    calculations.uncertainty =
                        (calculations.uncertainty + ADVISORY_UNCERTAINTY_WIDENING).min(1.0);
                    debug!(note = %note.note, "Advisory concern widened uncertainty");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Language validator unavailable, keeping model uncertainty"),
            }
        }

        StatePatch {
            emission_calculations: Some(calculations),
            current_step: Some(self.name()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::{FactorEmissionModel, StaticValidator};
    use crate::domain::{Farm, FarmingMethod, RemoteSensingAnalysis, Season, GWP_CH4};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn modeled_state() -> WorkflowState {
        let mut state = WorkflowState::new("F1", "S1");
        state.farm_data = Some(Farm {
            id: "F1".into(),
            name: "Paddy".into(),
            area_ha: 2.0,
            latitude: 22.6,
            longitude: 80.4,
        });
        state.season_data = Some(Season {
            id: "S1".into(),
            farm_id: "F1".into(),
            year: 2025,
            declared_method: FarmingMethod::AlternateWettingDrying,
            sowing_date: date("2025-06-01"),
            transplant_date: date("2025-06-20"),
            harvest_date: date("2025-10-15"),
        });
        state.remote_sensing_analysis = Some(RemoteSensingAnalysis {
            events: Vec::new(),
            confidence: 0.9,
            dry_down_count: 2,
            advisory_note: None,
        });
        state
    }

    fn stage(validator: Option<Arc<dyn NaturalLanguageValidator>>) -> ModelingStage {
        ModelingStage::new(
            Arc::new(FactorEmissionModel::default()),
            validator,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn computes_reduction_from_model() {
        let patch = stage(None).execute(&modeled_state()).await;
        assert!(!patch.is_failure());

        let calc = patch.emission_calculations.as_ref().unwrap();
        assert!((calc.baseline_kg_ch4 - 2.6).abs() < 1e-9);
        assert!((calc.project_kg_ch4 - 1.352).abs() < 1e-9);
        assert!((calc.reduction_kg_ch4 - 1.248).abs() < 1e-9);
        assert!((calc.reduction_kg_co2e - 1.248 * GWP_CH4).abs() < 1e-9);
        assert!((calc.uncertainty - 0.15).abs() < 1e-9);
    }

    #[tokio::test]
    async fn requires_sensing_analysis() {
        let mut state = modeled_state();
        state.remote_sensing_analysis = None;

        let patch = stage(None).execute(&state).await;
        assert!(patch.is_failure());
        assert!(patch.errors[0].contains("remote_sensing_analysis"));
    }

    #[tokio::test]
    async fn advisory_concern_only_widens_uncertainty() {
        let validator: Arc<dyn NaturalLanguageValidator> = Arc::new(StaticValidator {
            note: "reduction seems high for the observed timeline".into(),
            concern: true,
        });

        let patch = stage(Some(validator)).execute(&modeled_state()).await;
        // Still succeeds; the advisory call is never a branch condition
        assert!(!patch.is_failure());
        let calc = patch.emission_calculations.as_ref().unwrap();
        assert!((calc.uncertainty - 0.20).abs() < 1e-9);
        assert!((calc.reduction_kg_ch4 - 1.248).abs() < 1e-9);
    }
}
