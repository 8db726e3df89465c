//! In-memory collaborator implementations.
//!
//! These back the CLI demo mode and the test suite. The sensing provider and
//! QA evaluator are deterministic, so runs against seeded data are exactly
//! reproducible.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{
    AdvisoryNote, BlockchainMinter, CollabResult, CollaboratorError, ContentStore, EmissionModel,
    FarmRepository, NaturalLanguageValidator, QaEvaluator, RemoteSensingProvider, ReportStore,
    SeasonRepository, SigningService,
};
use crate::domain::{
    BlockchainReceipt, EmissionEstimate, Farm, FarmerLog, FarmingMethod, FieldCondition,
    FieldGeometry, MintRequest, MrvReport, QaBundle, QualityAssessment, Recommendation,
    RemoteSensingAnalysis, SatelliteObservation, Season, WaterEvent,
};

/// Moisture index at or above which an observation counts as flooded.
const FLOOD_MOISTURE_THRESHOLD: f64 = 0.5;

/// Farm registry backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryFarmRepository {
    farms: HashMap<String, Farm>,
}

impl InMemoryFarmRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_farm(mut self, farm: Farm) -> Self {
        self.farms.insert(farm.id.clone(), farm);
        self
    }
}

#[async_trait]
impl FarmRepository for InMemoryFarmRepository {
    async fn get(&self, farm_id: &str) -> CollabResult<Farm> {
        self.farms
            .get(farm_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("farm {farm_id}")))
    }
}

/// Season registry plus farmer logs.
#[derive(Debug, Default)]
pub struct InMemorySeasonRepository {
    seasons: HashMap<String, Season>,
    logs: HashMap<String, Vec<FarmerLog>>,
}

impl InMemorySeasonRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_season(mut self, season: Season) -> Self {
        self.seasons.insert(season.id.clone(), season);
        self
    }

    pub fn with_logs(mut self, season_id: &str, logs: Vec<FarmerLog>) -> Self {
        self.logs.insert(season_id.to_string(), logs);
        self
    }
}

#[async_trait]
impl SeasonRepository for InMemorySeasonRepository {
    async fn get(&self, season_id: &str) -> CollabResult<Season> {
        self.seasons
            .get(season_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("season {season_id}")))
    }

    async fn farmer_logs(&self, season_id: &str) -> CollabResult<Vec<FarmerLog>> {
        Ok(self.logs.get(season_id).cloned().unwrap_or_default())
    }
}

/// Sensing provider seeded with a fixed observation series and confidence.
///
/// `fetch` filters the seeded series to the requested date range; `analyze`
/// derives the flood/dry timeline from the moisture index.
#[derive(Debug)]
pub struct SeededSensingProvider {
    observations: Vec<SatelliteObservation>,
    confidence: f64,
}

impl SeededSensingProvider {
    pub fn new(observations: Vec<SatelliteObservation>, confidence: f64) -> Self {
        Self {
            observations,
            confidence,
        }
    }
}

#[async_trait]
impl RemoteSensingProvider for SeededSensingProvider {
    async fn fetch(
        &self,
        _farm_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CollabResult<Vec<SatelliteObservation>> {
        Ok(self
            .observations
            .iter()
            .filter(|o| o.observed_at >= from && o.observed_at <= to)
            .cloned()
            .collect())
    }

    async fn analyze(
        &self,
        series: &[SatelliteObservation],
        _geometry: &FieldGeometry,
    ) -> CollabResult<RemoteSensingAnalysis> {
        let events = derive_water_events(series);
        let dry_down_count = events
            .iter()
            .filter(|e| e.condition == FieldCondition::Dry)
            .count() as u32;

        Ok(RemoteSensingAnalysis {
            events,
            confidence: self.confidence,
            dry_down_count,
            advisory_note: None,
        })
    }
}

/// Collapse an observation series into contiguous flood/dry intervals.
fn derive_water_events(series: &[SatelliteObservation]) -> Vec<WaterEvent> {
    let mut events: Vec<WaterEvent> = Vec::new();

    for obs in series {
        let condition = if obs.moisture_index >= FLOOD_MOISTURE_THRESHOLD {
            FieldCondition::Flooded
        } else {
            FieldCondition::Dry
        };

        match events.last_mut() {
            Some(last) if last.condition == condition => last.to = obs.observed_at,
            _ => events.push(WaterEvent {
                from: obs.observed_at,
                to: obs.observed_at,
                condition,
            }),
        }
    }

    events
}

/// Area × emission-factor × method-scaling model.
///
/// Baseline assumes continuous flooding; project scales the baseline by the
/// declared method's factor.
#[derive(Debug, Clone)]
pub struct FactorEmissionModel {
    /// Baseline emission factor in kg CH4 per hectare
    pub baseline_factor_kg_ch4_per_ha: f64,
    /// Relative uncertainty attached to every estimate
    pub uncertainty: f64,
}

impl Default for FactorEmissionModel {
    fn default() -> Self {
        Self {
            baseline_factor_kg_ch4_per_ha: 1.3,
            uncertainty: 0.15,
        }
    }
}

impl FactorEmissionModel {
    /// Scaling factor applied to the baseline for a declared method.
    pub fn method_scaling(method: FarmingMethod) -> f64 {
        match method {
            FarmingMethod::ContinuousFlood => 1.0,
            FarmingMethod::AlternateWettingDrying => 0.52,
            FarmingMethod::Intensified => 0.68,
        }
    }
}

#[async_trait]
impl EmissionModel for FactorEmissionModel {
    async fn baseline(&self, _season: &Season, farm: &Farm) -> CollabResult<EmissionEstimate> {
        Ok(EmissionEstimate {
            total_kg_ch4: farm.area_ha * self.baseline_factor_kg_ch4_per_ha,
            uncertainty: self.uncertainty,
        })
    }

    async fn project(
        &self,
        season: &Season,
        farm: &Farm,
        _analysis: &RemoteSensingAnalysis,
    ) -> CollabResult<EmissionEstimate> {
        let baseline = farm.area_ha * self.baseline_factor_kg_ch4_per_ha;
        Ok(EmissionEstimate {
            total_kg_ch4: baseline * Self::method_scaling(season.declared_method),
            uncertainty: self.uncertainty,
        })
    }
}

/// Default QA evaluator combining four equally weighted component checks:
/// data completeness, reduction reasonableness, method/sensing consistency,
/// and temporal consistency of the season dates.
#[derive(Debug, Default)]
pub struct WeightedQaEvaluator;

impl WeightedQaEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn completeness(bundle: &QaBundle<'_>, flags: &mut Vec<String>) -> f64 {
        let mut score = 0.0;
        if !bundle.observations.is_empty() {
            score += 0.5;
        } else {
            flags.push("no satellite observations in season window".to_string());
        }
        if !bundle.logs.is_empty() {
            score += 0.5;
        } else {
            flags.push("no farmer logs submitted".to_string());
        }
        score
    }

    fn reasonableness(bundle: &QaBundle<'_>, flags: &mut Vec<String>) -> f64 {
        let calc = bundle.calculations;
        if calc.baseline_kg_ch4 <= 0.0 {
            flags.push("baseline emission is not positive".to_string());
            return 0.0;
        }
        let fraction = calc.reduction_kg_ch4 / calc.baseline_kg_ch4;
        if (0.0..=0.8).contains(&fraction) {
            1.0
        } else {
            flags.push(format!(
                "reduction fraction {fraction:.2} outside plausible bounds"
            ));
            0.2
        }
    }

    fn method_consistency(bundle: &QaBundle<'_>, flags: &mut Vec<String>) -> f64 {
        let analysis = bundle.analysis;
        let consistent = match bundle.season.declared_method {
            FarmingMethod::ContinuousFlood => analysis.dry_down_count == 0,
            FarmingMethod::AlternateWettingDrying | FarmingMethod::Intensified => {
                analysis.dry_down_count >= 1
            }
        };
        if consistent {
            analysis.confidence
        } else {
            flags.push(format!(
                "declared method {} inconsistent with {} observed dry-downs",
                bundle.season.declared_method.as_str(),
                analysis.dry_down_count
            ));
            0.0
        }
    }

    fn temporal_consistency(bundle: &QaBundle<'_>, flags: &mut Vec<String>) -> f64 {
        let season = bundle.season;
        let ordered =
            season.sowing_date <= season.transplant_date && season.transplant_date <= season.harvest_date;
        let length_days = (season.harvest_date - season.sowing_date).num_days();
        let plausible_length = (60..=240).contains(&length_days);

        if ordered && plausible_length {
            1.0
        } else {
            flags.push(format!(
                "season dates implausible: ordered={ordered}, length={length_days} days"
            ));
            0.0
        }
    }
}

#[async_trait]
impl QaEvaluator for WeightedQaEvaluator {
    async fn assess(&self, bundle: QaBundle<'_>) -> CollabResult<QualityAssessment> {
        let mut flags = Vec::new();

        let score = 0.25 * Self::completeness(&bundle, &mut flags)
            + 0.25 * Self::reasonableness(&bundle, &mut flags)
            + 0.25 * Self::method_consistency(&bundle, &mut flags)
            + 0.25 * Self::temporal_consistency(&bundle, &mut flags);

        let recommendation = if score >= 0.8 {
            Recommendation::Approve
        } else if score >= 0.6 {
            Recommendation::Review
        } else {
            Recommendation::Reject
        };

        Ok(QualityAssessment {
            score,
            recommendation,
            flags,
        })
    }
}

/// Evaluator that always returns the same score, for routing tests.
#[derive(Debug)]
pub struct FixedScoreEvaluator {
    pub score: f64,
}

#[async_trait]
impl QaEvaluator for FixedScoreEvaluator {
    async fn assess(&self, _bundle: QaBundle<'_>) -> CollabResult<QualityAssessment> {
        let recommendation = if self.score >= 0.8 {
            Recommendation::Approve
        } else if self.score >= 0.6 {
            Recommendation::Review
        } else {
            Recommendation::Reject
        };
        Ok(QualityAssessment {
            score: self.score,
            recommendation,
            flags: Vec::new(),
        })
    }
}

/// Report store keeping reports in a map.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: Mutex<HashMap<Uuid, MrvReport>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn create(&self, report: &MrvReport) -> CollabResult<Uuid> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(report.id, report.clone());
        Ok(report.id)
    }
}

/// Content-addressable store keyed by hex SHA-256.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).contains_key(hash)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, bytes: &[u8]) -> CollabResult<String> {
        let hash = hex::encode(Sha256::digest(bytes));
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.clone(), bytes.to_vec());
        Ok(hash)
    }
}

/// Keyed signer: signature = SHA-256 over key and hash. Verification
/// recomputes the same digest.
#[derive(Debug)]
pub struct KeyedSigner {
    key: String,
}

impl KeyedSigner {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn digest(&self, content_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(b":");
        hasher.update(content_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl SigningService for KeyedSigner {
    async fn sign(&self, content_hash: &str) -> CollabResult<String> {
        Ok(self.digest(content_hash))
    }

    async fn verify(&self, content_hash: &str, signature: &str) -> CollabResult<bool> {
        Ok(self.digest(content_hash) == signature)
    }
}

/// Minter that records every request; can be seeded to fail its first N
/// calls for mint-retry tests.
#[derive(Debug, Default)]
pub struct RecordingMinter {
    requests: Mutex<Vec<MintRequest>>,
    fail_remaining: Mutex<u32>,
}

impl RecordingMinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(times: u32) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_remaining: Mutex::new(times),
        }
    }

    /// Number of confirmed mint transactions issued.
    pub fn mint_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn last_request(&self) -> Option<MintRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

#[async_trait]
impl BlockchainMinter for RecordingMinter {
    async fn mint(&self, request: &MintRequest) -> CollabResult<BlockchainReceipt> {
        {
            let mut remaining = self.fail_remaining.lock().unwrap_or_else(PoisonError::into_inner);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CollaboratorError::Unavailable(
                    "mint transaction not confirmed".to_string(),
                ));
            }
        }

        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.push(request.clone());

        let tag = hex::encode(&Sha256::digest(
            format!("{}:{}", request.farm_id, request.season_id).as_bytes(),
        )[..8]);

        Ok(BlockchainReceipt {
            tx_ref: format!("tx-{tag}"),
            confirmed_block: 1_000 + requests.len() as u64,
            quantity_kg_ch4: request.quantity_kg_ch4,
            minted_at: Utc::now(),
        })
    }
}

/// Validator returning a fixed advisory note.
#[derive(Debug)]
pub struct StaticValidator {
    pub note: String,
    pub concern: bool,
}

#[async_trait]
impl NaturalLanguageValidator for StaticValidator {
    async fn review(&self, _summary: &str) -> CollabResult<AdvisoryNote> {
        Ok(AdvisoryNote {
            note: self.note.clone(),
            concern: self.concern,
        })
    }
}
