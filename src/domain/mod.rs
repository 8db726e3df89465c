//! Domain types for the MRV pipeline.
//!
//! - Records: farm/season data, analyses, report, attestation, receipt
//! - State: the accumulated `WorkflowState` and per-stage `StatePatch`

pub mod records;
pub mod state;

pub use records::{
    Attestation, BlockchainReceipt, EmissionCalculations, EmissionEstimate, Farm, FarmerLog,
    FarmingMethod, FieldCondition, FieldGeometry, MintRequest, MrvReport, QaBundle,
    QualityAssessment, Recommendation, RemoteSensingAnalysis, SatelliteObservation, Season,
    WaterEvent, GWP_CH4, METHODOLOGY,
};
pub use state::{StatePatch, StepName, WorkflowState};
