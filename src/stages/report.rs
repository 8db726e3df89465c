//! Report-generation stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::Stage;
use crate::collaborators::{with_timeout, ReportStore};
use crate::domain::{MrvReport, StatePatch, StepName, WorkflowState, METHODOLOGY};
use crate::error::PipelineError;

/// Assembles the immutable MRV report from the accumulated state and persists
/// it via the report store. Runs only after the Router's proceed verdict.
pub struct ReportStage {
    reports: Arc<dyn ReportStore>,
    timeout: Duration,
}

impl ReportStage {
    pub fn new(reports: Arc<dyn ReportStore>, timeout: Duration) -> Self {
        Self { reports, timeout }
    }
}

#[async_trait]
impl Stage for ReportStage {
    fn name(&self) -> StepName {
        StepName::ReportGeneration
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
        let Some(assessment) = state.quality_assessment.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "quality_assessment").to_string(),
            );
        };

        let report = MrvReport {
            id: Uuid::new_v4(),
            farm_id: state.farm_id.clone(),
            season_id: state.season_id.clone(),
            generated_at: Utc::now(),
            methodology: METHODOLOGY.to_string(),
            vintage: season.year,
            declared_method: season.declared_method,
            calculations: calculations.clone(),
            sensing_confidence: analysis.confidence,
            quality_score: assessment.score,
        };

        match with_timeout(self.timeout, self.reports.create(&report)).await {
            Ok(report_id) => {
                info!(%report_id, "MRV report persisted");
                StatePatch {
                    mrv_report: Some(report),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::InMemoryReportStore;
    use crate::domain::{
        EmissionCalculations, EmissionEstimate, FarmingMethod, QualityAssessment, Recommendation,
        RemoteSensingAnalysis, Season,
    };
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn reportable_state() -> WorkflowState {
        let mut state = WorkflowState::new("F1", "S1");
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
        state.emission_calculations = Some(EmissionCalculations::from_estimates(
            EmissionEstimate {
                total_kg_ch4: 2.6,
                uncertainty: 0.15,
            },
            EmissionEstimate {
                total_kg_ch4: 1.352,
                uncertainty: 0.15,
            },
        ));
        state.quality_assessment = Some(QualityAssessment {
            score: 0.95,
            recommendation: Recommendation::Approve,
            flags: Vec::new(),
        });
        state
    }

    #[tokio::test]
    async fn assembles_and_persists_report() {
        let store = Arc::new(InMemoryReportStore::new());
        let stage = ReportStage::new(store.clone(), Duration::from_secs(5));

        let patch = stage.execute(&reportable_state()).await;
        assert!(!patch.is_failure());

        let report = patch.mrv_report.as_ref().unwrap();
        assert_eq!(report.methodology, METHODOLOGY);
        assert_eq!(report.vintage, 2025);
        assert_eq!(report.quality_score, 0.95);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn requires_quality_assessment() {
        let mut state = reportable_state();
        state.quality_assessment = None;

        let stage = ReportStage::new(Arc::new(InMemoryReportStore::new()), Duration::from_secs(5));
        let patch = stage.execute(&state).await;

        assert!(patch.is_failure());
        assert!(patch.mrv_report.is_none());
    }
}
