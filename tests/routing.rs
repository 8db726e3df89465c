//! Router boundary behavior driven through the whole orchestrator.
//!
//! Scores at the half-open boundaries: 0.8 proceeds, 0.79999 retries,
//! 0.6 retries, 0.59999 fails.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mrv::cli::Scenario;
use mrv::collaborators::memory::FixedScoreEvaluator;
use mrv::collaborators::{CollabResult, CollaboratorError, Collaborators, QaEvaluator};
use mrv::domain::{QaBundle, QualityAssessment, Recommendation};
use mrv::engine::RunEventKind;
use mrv::{Orchestrator, WorkflowConfig};
use tempfile::TempDir;

fn collaborators_with_score(score: f64) -> Collaborators {
    let mut collaborators = Scenario::demo().unwrap().collaborators();
    collaborators.evaluator = Arc::new(FixedScoreEvaluator { score });
    collaborators
}

async fn run_with_score(score: f64, max_retries: u32) -> (mrv::WorkflowState, Vec<RunEventKind>) {
    let temp = TempDir::new().unwrap();
    let orchestrator = Orchestrator::new(
        collaborators_with_score(score),
        WorkflowConfig::with_max_retries(max_retries),
    )
    .unwrap()
    .with_ledger_home(temp.path());

    let state = orchestrator.run("F1", "S1").await.unwrap();
    let kinds = orchestrator
        .history("F1", "S1")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    (state, kinds)
}

#[tokio::test]
async fn score_at_proceed_threshold_mints() {
    let (state, _events) = run_with_score(0.8, 0).await;
    assert!(state.is_complete);
    assert!(state.blockchain_receipt.is_some());
}

#[tokio::test]
async fn score_just_below_proceed_retries() {
    let (state, events) = run_with_score(0.79999, 2).await;

    assert!(!state.is_complete);
    let retries = events
        .iter()
        .filter(|k| matches!(k, RunEventKind::RetryScheduled { .. }))
        .count();
    assert_eq!(retries, 2);
    assert!(state.errors.iter().any(|e| e.contains("retry bound exhausted")));
}

#[tokio::test]
async fn score_at_retry_threshold_retries() {
    let (_state, events) = run_with_score(0.6, 1).await;
    assert!(events
        .iter()
        .any(|k| matches!(k, RunEventKind::RetryScheduled { .. })));
}

#[tokio::test]
async fn score_just_below_retry_threshold_fails_immediately() {
    let (state, events) = run_with_score(0.59999, 3).await;

    assert!(!state.is_complete);
    assert!(state.blockchain_receipt.is_none());
    // No retry was ever scheduled
    assert!(!events
        .iter()
        .any(|k| matches!(k, RunEventKind::RetryScheduled { .. })));
    assert!(state.errors.iter().any(|e| e.contains("quality rejected")));
}

/// Evaluator that scores a fixed number of passes, then goes down.
struct FlakyEvaluator {
    score: f64,
    remaining: AtomicU32,
}

#[async_trait]
impl QaEvaluator for FlakyEvaluator {
    async fn assess(&self, _bundle: QaBundle<'_>) -> CollabResult<QualityAssessment> {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 0 {
            return Err(CollaboratorError::Unavailable(
                "assessment service down".to_string(),
            ));
        }
        Ok(QualityAssessment {
            score: self.score,
            recommendation: Recommendation::Review,
            flags: Vec::new(),
        })
    }
}

#[tokio::test]
async fn failed_assessment_terminates_instead_of_routing_on_stale_score() {
    let temp = TempDir::new().unwrap();
    let mut collaborators = Scenario::demo().unwrap().collaborators();
    // Borderline score on the first pass, evaluator error on the retry pass
    collaborators.evaluator = Arc::new(FlakyEvaluator {
        score: 0.7,
        remaining: AtomicU32::new(1),
    });

    let orchestrator = Orchestrator::new(collaborators, WorkflowConfig::with_max_retries(3))
        .unwrap()
        .with_ledger_home(temp.path());

    let state = orchestrator.run("F1", "S1").await.unwrap();
    assert!(!state.is_complete);

    // Exactly one retry for the borderline score; the failed assessment must
    // not be routed on the first pass's score and burn the remaining bound
    let events = orchestrator.history("F1", "S1").await.unwrap();
    let retries = events
        .iter()
        .filter(|e| matches!(e.kind, RunEventKind::RetryScheduled { .. }))
        .count();
    assert_eq!(retries, 1);
    assert!(state
        .errors
        .iter()
        .any(|e| e.contains("quality_assessment failed")));
    assert!(!state
        .errors
        .iter()
        .any(|e| e.contains("retry bound exhausted")));
}

#[tokio::test]
async fn report_stage_only_runs_on_proceed() {
    let (state, _events) = run_with_score(0.7, 0).await;
    // Retry verdict, bound zero: run fails before any report exists
    assert!(state.mrv_report.is_none());
    assert!(state.attestation.is_none());
}
