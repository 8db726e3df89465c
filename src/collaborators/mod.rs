//! Collaborator interfaces for external systems.
//!
//! Every external dependency of the pipeline sits behind one of these async
//! traits and is injected into the orchestrator, so tests and the CLI demo
//! substitute in-memory doubles without touching stage code.

pub mod memory;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    BlockchainReceipt, EmissionEstimate, Farm, FarmerLog, FieldGeometry, MintRequest, MrvReport,
    QaBundle, QualityAssessment, RemoteSensingAnalysis, SatelliteObservation, Season,
};

/// Failures surfaced by a collaborator call.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Unavailable(String),
}

pub type CollabResult<T> = Result<T, CollaboratorError>;

/// Wrap a collaborator call with an explicit timeout. A timeout becomes a
/// `CollaboratorError::Timeout`, reported by the calling stage as data.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> CollabResult<T>
where
    F: Future<Output = CollabResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(limit)),
    }
}

#[async_trait]
pub trait FarmRepository: Send + Sync {
    async fn get(&self, farm_id: &str) -> CollabResult<Farm>;
}

#[async_trait]
pub trait SeasonRepository: Send + Sync {
    async fn get(&self, season_id: &str) -> CollabResult<Season>;

    /// Raw farmer-submitted activity logs for a season. Empty is not an error.
    async fn farmer_logs(&self, season_id: &str) -> CollabResult<Vec<FarmerLog>>;
}

#[async_trait]
pub trait RemoteSensingProvider: Send + Sync {
    async fn fetch(
        &self,
        farm_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CollabResult<Vec<SatelliteObservation>>;

    async fn analyze(
        &self,
        series: &[SatelliteObservation],
        geometry: &FieldGeometry,
    ) -> CollabResult<RemoteSensingAnalysis>;
}

/// Pluggable deterministic emission model.
#[async_trait]
pub trait EmissionModel: Send + Sync {
    async fn baseline(&self, season: &Season, farm: &Farm) -> CollabResult<EmissionEstimate>;

    async fn project(
        &self,
        season: &Season,
        farm: &Farm,
        analysis: &RemoteSensingAnalysis,
    ) -> CollabResult<EmissionEstimate>;
}

#[async_trait]
pub trait QaEvaluator: Send + Sync {
    async fn assess(&self, bundle: QaBundle<'_>) -> CollabResult<QualityAssessment>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create(&self, report: &MrvReport) -> CollabResult<Uuid>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes, returning their content hash (hex SHA-256).
    async fn put(&self, bytes: &[u8]) -> CollabResult<String>;
}

#[async_trait]
pub trait SigningService: Send + Sync {
    async fn sign(&self, content_hash: &str) -> CollabResult<String>;

    async fn verify(&self, content_hash: &str, signature: &str) -> CollabResult<bool>;
}

#[async_trait]
pub trait BlockchainMinter: Send + Sync {
    async fn mint(&self, request: &MintRequest) -> CollabResult<BlockchainReceipt>;
}

/// Advisory annotation from the natural-language validator.
#[derive(Debug, Clone)]
pub struct AdvisoryNote {
    pub note: String,
    /// Whether the prose review flags a concern. Only ever widens
    /// uncertainty; never feeds the router.
    pub concern: bool,
}

/// Optional prose cross-check of numeric conclusions. Advisory only.
#[async_trait]
pub trait NaturalLanguageValidator: Send + Sync {
    async fn review(&self, summary: &str) -> CollabResult<AdvisoryNote>;
}

/// The full injected collaborator set.
#[derive(Clone)]
pub struct Collaborators {
    pub farms: Arc<dyn FarmRepository>,
    pub seasons: Arc<dyn SeasonRepository>,
    pub sensing: Arc<dyn RemoteSensingProvider>,
    pub model: Arc<dyn EmissionModel>,
    pub evaluator: Arc<dyn QaEvaluator>,
    pub reports: Arc<dyn ReportStore>,
    pub content: Arc<dyn ContentStore>,
    pub signer: Arc<dyn SigningService>,
    pub minter: Arc<dyn BlockchainMinter>,
    pub validator: Option<Arc<dyn NaturalLanguageValidator>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_reports_timeout_as_error() {
        let result: CollabResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(CollaboratorError::Timeout(_))));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_success() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(42u32) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
