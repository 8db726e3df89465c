//! Domain records accumulated by the verification pipeline.
//!
//! These are the payloads carried in `WorkflowState`: farm and season
//! registrations, farmer-submitted logs, satellite observations and their
//! analysis, emission calculations, the MRV report and its attestation, and
//! the mint receipt.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 100-year global warming potential of methane (IPCC AR5).
pub const GWP_CH4: f64 = 28.0;

/// Quantification methodology recorded on every report and mint request.
pub const METHODOLOGY: &str = "IPCC 2019 Refinement";

/// A registered farm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Farm {
    pub id: String,
    pub name: String,
    /// Cultivated area in hectares
    pub area_ha: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl Farm {
    pub fn geometry(&self) -> FieldGeometry {
        FieldGeometry {
            latitude: self.latitude,
            longitude: self.longitude,
            area_ha: self.area_ha,
        }
    }
}

/// Field location and extent, passed to the sensing analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub latitude: f64,
    pub longitude: f64,
    pub area_ha: f64,
}

/// Water-management practice declared for a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmingMethod {
    /// Paddy kept flooded for the whole season
    ContinuousFlood,
    /// Alternate wetting and drying (AWD)
    AlternateWettingDrying,
    /// System of rice intensification
    Intensified,
}

impl FarmingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContinuousFlood => "continuous_flood",
            Self::AlternateWettingDrying => "alternate_wetting_drying",
            Self::Intensified => "intensified",
        }
    }
}

/// One growing season on a farm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub farm_id: String,
    /// Vintage year of any credits minted for this season
    pub year: u32,
    pub declared_method: FarmingMethod,
    pub sowing_date: NaiveDate,
    pub transplant_date: NaiveDate,
    pub harvest_date: NaiveDate,
}

/// A raw activity log submitted by the farmer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmerLog {
    pub logged_at: NaiveDate,
    pub activity: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// A single remote-sensing observation of the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteObservation {
    pub observed_at: NaiveDate,
    /// Normalized surface-moisture index, 0 = dry, 1 = saturated
    pub moisture_index: f64,
}

/// Field condition inferred from observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCondition {
    Flooded,
    Dry,
}

/// A contiguous flood/dry interval in the observed timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterEvent {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub condition: FieldCondition,
}

/// Result of analyzing the observation series against the declared method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSensingAnalysis {
    /// Flood/dry event timeline derived from the observations
    pub events: Vec<WaterEvent>,
    /// How well the declared method matches the observed timeline, in [0, 1]
    pub confidence: f64,
    /// Number of distinct dry-down events observed
    pub dry_down_count: u32,
    /// Advisory annotation from the natural-language validator, if consulted
    #[serde(default)]
    pub advisory_note: Option<String>,
}

/// A single emission estimate from the pluggable model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmissionEstimate {
    pub total_kg_ch4: f64,
    /// Relative uncertainty of the estimate, in [0, 1]
    pub uncertainty: f64,
}

/// Quantified emission outcome for a season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionCalculations {
    pub baseline_kg_ch4: f64,
    pub project_kg_ch4: f64,
    /// baseline − project, clamped at zero
    pub reduction_kg_ch4: f64,
    /// GWP-weighted equivalent of the reduction
    pub reduction_kg_co2e: f64,
    pub uncertainty: f64,
}

impl EmissionCalculations {
    /// Derive the reduction figures from baseline and project estimates.
    pub fn from_estimates(baseline: EmissionEstimate, project: EmissionEstimate) -> Self {
        let reduction = (baseline.total_kg_ch4 - project.total_kg_ch4).max(0.0);
        Self {
            baseline_kg_ch4: baseline.total_kg_ch4,
            project_kg_ch4: project.total_kg_ch4,
            reduction_kg_ch4: reduction,
            reduction_kg_co2e: reduction * GWP_CH4,
            uncertainty: baseline.uncertainty.max(project.uncertainty),
        }
    }
}

/// Verdict attached to a quality assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Review,
    Reject,
}

/// Output of the quality-assessment stage; the only input to the Router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Combined quality score in [0, 1]
    pub score: f64,
    pub recommendation: Recommendation,
    pub flags: Vec<String>,
}

/// Bundle handed to the QA evaluator.
#[derive(Debug, Clone, Copy)]
pub struct QaBundle<'a> {
    pub season: &'a Season,
    pub logs: &'a [FarmerLog],
    pub observations: &'a [SatelliteObservation],
    pub analysis: &'a RemoteSensingAnalysis,
    pub calculations: &'a EmissionCalculations,
}

/// The immutable MRV report assembled after quality assessment passes.
///
/// Core fields are never replaced once the report exists; later stages only
/// annotate the surrounding state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrvReport {
    pub id: Uuid,
    pub farm_id: String,
    pub season_id: String,
    pub generated_at: DateTime<Utc>,
    pub methodology: String,
    pub vintage: u32,
    pub declared_method: FarmingMethod,
    pub calculations: EmissionCalculations,
    pub sensing_confidence: f64,
    pub quality_score: f64,
}

/// Signed content hash proving the report's integrity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    /// SHA-256 of the canonical report bytes, hex encoded
    pub content_hash: String,
    pub signature: String,
    pub signed_at: DateTime<Utc>,
}

/// Request issued to the external minter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintRequest {
    pub farm_id: String,
    pub season_id: String,
    pub quantity_kg_ch4: f64,
    pub quantity_kg_co2e: f64,
    /// Attestation hash tagging the transaction
    pub report_hash: String,
    pub methodology: String,
    pub vintage: u32,
}

/// Confirmed external minting transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainReceipt {
    pub tx_ref: String,
    pub confirmed_block: u64,
    pub quantity_kg_ch4: f64,
    pub minted_at: DateTime<Utc>,
}
