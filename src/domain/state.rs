//! Workflow state and per-stage patches.
//!
//! A `WorkflowState` is created once per (farm, season) run with only the two
//! identifiers populated. Stages never mutate it directly: each stage returns
//! a `StatePatch`, and the merge engine folds the patch into the state with
//! the per-field reducers declared in `engine::merge`.

use serde::{Deserialize, Serialize};

use super::records::{
    Attestation, BlockchainReceipt, EmissionCalculations, Farm, FarmerLog, MrvReport,
    QualityAssessment, RemoteSensingAnalysis, SatelliteObservation, Season,
};

/// Names of the seven pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Ingestion,
    RemoteSensing,
    EmissionModeling,
    QualityAssessment,
    ReportGeneration,
    Attestation,
    Mint,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::RemoteSensing => "remote_sensing",
            Self::EmissionModeling => "emission_modeling",
            Self::QualityAssessment => "quality_assessment",
            Self::ReportGeneration => "report_generation",
            Self::Attestation => "attestation",
            Self::Mint => "mint",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The accumulated state of one verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Immutable run identifiers, set at creation and never patched
    pub farm_id: String,
    pub season_id: String,

    pub farm_data: Option<Farm>,
    pub season_data: Option<Season>,
    pub farmer_logs: Option<Vec<FarmerLog>>,
    /// Replaced wholesale each run, never appended to
    pub satellite_data: Option<Vec<SatelliteObservation>>,
    pub remote_sensing_analysis: Option<RemoteSensingAnalysis>,
    pub emission_calculations: Option<EmissionCalculations>,
    pub quality_assessment: Option<QualityAssessment>,
    pub mrv_report: Option<MrvReport>,
    pub attestation: Option<Attestation>,
    pub blockchain_receipt: Option<BlockchainReceipt>,

    /// Append-only; never cleared within a run
    pub errors: Vec<String>,
    /// The most recently attempted stage, success or failure
    pub current_step: Option<StepName>,
    /// True only after a confirmed mint
    pub is_complete: bool,
}

impl WorkflowState {
    /// Create the initial state for a run.
    pub fn new(farm_id: impl Into<String>, season_id: impl Into<String>) -> Self {
        Self {
            farm_id: farm_id.into(),
            season_id: season_id.into(),
            farm_data: None,
            season_data: None,
            farmer_logs: None,
            satellite_data: None,
            remote_sensing_analysis: None,
            emission_calculations: None,
            quality_assessment: None,
            mrv_report: None,
            attestation: None,
            blockchain_receipt: None,
            errors: Vec::new(),
            current_step: None,
            is_complete: false,
        }
    }

    /// Whether any stage has recorded a failure so far.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The subset of fields a stage proposes to change.
///
/// `None` means "leave the current value alone"; stages omit every field they
/// could not produce. `errors` is the one additive field and `is_complete`
/// the one tri-state boolean.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatePatch {
    pub farm_data: Option<Farm>,
    pub season_data: Option<Season>,
    pub farmer_logs: Option<Vec<FarmerLog>>,
    pub satellite_data: Option<Vec<SatelliteObservation>>,
    pub remote_sensing_analysis: Option<RemoteSensingAnalysis>,
    pub emission_calculations: Option<EmissionCalculations>,
    pub quality_assessment: Option<QualityAssessment>,
    pub mrv_report: Option<MrvReport>,
    pub attestation: Option<Attestation>,
    pub blockchain_receipt: Option<BlockchainReceipt>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub current_step: Option<StepName>,
    pub is_complete: Option<bool>,
}

impl StatePatch {
    /// Field names of this patch, in declaration order. The merge engine
    /// validates its reducer table against this list at construction.
    pub const FIELDS: &'static [&'static str] = &[
        "farm_data",
        "season_data",
        "farmer_logs",
        "satellite_data",
        "remote_sensing_analysis",
        "emission_calculations",
        "quality_assessment",
        "mrv_report",
        "attestation",
        "blockchain_receipt",
        "errors",
        "current_step",
        "is_complete",
    ];

    /// A patch that records a stage attempt with no other changes.
    pub fn attempted(step: StepName) -> Self {
        Self {
            current_step: Some(step),
            ..Self::default()
        }
    }

    /// A patch reporting a stage failure: the error message plus the stage
    /// name, nothing else.
    pub fn failure(step: StepName, message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            current_step: Some(step),
            ..Self::default()
        }
    }

    /// Whether this patch reports a failure.
    pub fn is_failure(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_empty() {
        let state = WorkflowState::new("F1", "S1");
        assert_eq!(state.farm_id, "F1");
        assert_eq!(state.season_id, "S1");
        assert!(state.errors.is_empty());
        assert!(!state.is_complete);
        assert!(state.current_step.is_none());
    }

    #[test]
    fn failure_patch_carries_step_and_error() {
        let patch = StatePatch::failure(StepName::Ingestion, "farm not found");
        assert!(patch.is_failure());
        assert_eq!(patch.current_step, Some(StepName::Ingestion));
        assert_eq!(patch.errors, vec!["farm not found".to_string()]);
        assert!(patch.is_complete.is_none());
    }

    #[test]
    fn step_name_display_matches_serde() {
        let json = serde_json::to_string(&StepName::RemoteSensing).unwrap();
        assert_eq!(json, format!("\"{}\"", StepName::RemoteSensing));
    }
}
