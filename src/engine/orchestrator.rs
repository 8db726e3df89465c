//! Orchestrator: drives the stage/router loop for one run.
//!
//! The orchestrator owns the workflow state exclusively. Each iteration it
//! invokes the current stage, folds the returned patch through the merge
//! engine, and after quality assessment consults the Router. The run ends
//! at `minted`, at `failed`, or when the retry bound is exhausted (also
//! `failed`). Failures are surfaced in the returned state, never raised.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, instrument, warn};

use super::ledger::{Ledger, RunEvent, RunEventKind};
use super::merge::MergeEngine;
use super::router::{Router, Verdict};
use crate::collaborators::Collaborators;
use crate::config::WorkflowConfig;
use crate::domain::{StatePatch, StepName, WorkflowState};
use crate::stages::{
    AttestationStage, IngestionStage, MintStage, ModelingStage, QualityStage, ReportStage,
    SensingStage, Stage,
};

/// Cooperative cancellation flag, checked between stages only. Once a stage
/// with external mutating calls has started, it runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives the verification pipeline.
pub struct Orchestrator {
    ingestion: IngestionStage,
    sensing: SensingStage,
    modeling: ModelingStage,
    quality: QualityStage,
    report: ReportStage,
    attestation: AttestationStage,
    mint: MintStage,

    merge: MergeEngine,
    router: Router,
    config: WorkflowConfig,
    ledger_home: PathBuf,
    cancel: CancelToken,
}

impl Orchestrator {
    /// Build an orchestrator from injected collaborators and configuration.
    pub fn new(collaborators: Collaborators, config: WorkflowConfig) -> Result<Self> {
        config.validate()?;
        let merge = MergeEngine::new()?;
        let router = Router::new(config.proceed_threshold, config.retry_threshold);
        let timeout = config.collaborator_timeout();

        Ok(Self {
            ingestion: IngestionStage::new(
                collaborators.farms.clone(),
                collaborators.seasons.clone(),
                timeout,
            ),
            sensing: SensingStage::new(
                collaborators.sensing.clone(),
                collaborators.validator.clone(),
                timeout,
            ),
            modeling: ModelingStage::new(
                collaborators.model.clone(),
                collaborators.validator.clone(),
                timeout,
            ),
            quality: QualityStage::new(collaborators.evaluator.clone(), timeout),
            report: ReportStage::new(collaborators.reports.clone(), timeout),
            attestation: AttestationStage::new(
                collaborators.content.clone(),
                collaborators.signer.clone(),
                timeout,
            ),
            mint: MintStage::new(collaborators.minter.clone(), timeout),
            merge,
            router,
            config,
            ledger_home: Ledger::default_home()?,
            cancel: CancelToken::new(),
        })
    }

    /// Override the ledger home (tests point this at a temp directory).
    pub fn with_ledger_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.ledger_home = home.into();
        self
    }

    /// A handle for cancelling this orchestrator's runs between stages.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute the pipeline for one (farm, season) pair.
    ///
    /// Returns the final workflow state, errors included. An `Err` is raised
    /// only for ledger IO problems, never for pipeline failures.
    #[instrument(skip(self), fields(farm = %farm_id, season = %season_id))]
    pub async fn run(&self, farm_id: &str, season_id: &str) -> Result<WorkflowState> {
        let ledger = Ledger::open(&self.ledger_home, farm_id, season_id).await?;
        let mut state = WorkflowState::new(farm_id, season_id);

        // Re-mint guard: a season that already minted is complete as-is.
        if let Some(receipt) = ledger.minted_receipt().await? {
            info!(tx_ref = %receipt.tx_ref, "Season already minted, skipping run");
            state.blockchain_receipt = Some(receipt);
            state.current_step = Some(StepName::Mint);
            state.is_complete = true;
            return Ok(state);
        }

        ledger.append(RunEventKind::RunStarted).await?;
        info!("Starting verification run");

        let mut retries_used = 0u32;

        // Front segment: ingestion through quality assessment, looping on
        // the Router's retry verdict.
        loop {
            let front: [&dyn Stage; 4] =
                [&self.ingestion, &self.sensing, &self.modeling, &self.quality];

            for stage in front {
                if self.cancel.is_cancelled() {
                    return self
                        .fail_run(&ledger, state, format!("run cancelled before {}", stage.name()))
                        .await;
                }

                let (next, failed) = self.execute_and_merge(&ledger, state, stage).await?;
                state = next;

                // A failed quality stage terminates like any other failure;
                // the Router only ever sees an assessment produced this pass,
                // never one left over from an earlier pass.
                if failed {
                    return self
                        .fail_run(&ledger, state, format!("run terminated at {}", stage.name()))
                        .await;
                }
            }

            // The only branch point: quality assessment feeds the Router.
            match self.router.decide(state.quality_assessment.as_ref()) {
                Verdict::Proceed => break,
                Verdict::Retry => {
                    if retries_used >= self.config.max_retries {
                        return self
                            .fail_run(
                                &ledger,
                                state,
                                format!(
                                    "retry bound exhausted after {} re-ingestions",
                                    self.config.max_retries
                                ),
                            )
                            .await;
                    }
                    retries_used += 1;
                    ledger
                        .append(RunEventKind::RetryScheduled {
                            attempt: retries_used,
                        })
                        .await?;
                    warn!(attempt = retries_used, "Quality borderline, retrying from ingestion");
                }
                Verdict::Fail => {
                    let score = state
                        .quality_assessment
                        .as_ref()
                        .map(|qa| qa.score.to_string())
                        .unwrap_or_else(|| "none".to_string());
                    return self
                        .fail_run(&ledger, state, format!("quality rejected: score {score}"))
                        .await;
                }
            }
        }

        // Tail segment: report and attestation, unconditional edges.
        for stage in [&self.report as &dyn Stage, &self.attestation] {
            if self.cancel.is_cancelled() {
                return self
                    .fail_run(&ledger, state, format!("run cancelled before {}", stage.name()))
                    .await;
            }

            let (next, failed) = self.execute_and_merge(&ledger, state, stage).await?;
            state = next;

            if failed {
                return self
                    .fail_run(&ledger, state, format!("run terminated at {}", stage.name()))
                    .await;
            }
        }

        // Mint, with its own narrow stage-local retry. Earlier stages are
        // never re-run from here.
        if self.cancel.is_cancelled() {
            return self
                .fail_run(&ledger, state, "run cancelled before mint".to_string())
                .await;
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let (next, failed) = self.execute_and_merge(&ledger, state, &self.mint).await?;
            state = next;

            if !failed {
                if let Some(receipt) = state.blockchain_receipt.as_ref() {
                    ledger
                        .append(RunEventKind::Minted {
                            tx_ref: receipt.tx_ref.clone(),
                            confirmed_block: receipt.confirmed_block,
                            quantity_kg_ch4: receipt.quantity_kg_ch4,
                        })
                        .await?;
                }
                ledger.append(RunEventKind::RunCompleted).await?;
                info!("Run completed, reduction minted");
                return Ok(state);
            }

            if self.config.mint_retry.should_retry(attempt) {
                let delay = self.config.mint_retry.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "Mint failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            return self
                .fail_run(
                    &ledger,
                    state,
                    format!("mint failed after {attempt} attempts"),
                )
                .await;
        }
    }

    /// Replay the ledger for a season (status inspection).
    pub async fn history(&self, farm_id: &str, season_id: &str) -> Result<Vec<RunEvent>> {
        let ledger = Ledger::open(&self.ledger_home, farm_id, season_id).await?;
        ledger.replay().await
    }

    /// Run one stage, merge its patch, and record the outcome.
    async fn execute_and_merge(
        &self,
        ledger: &Ledger,
        state: WorkflowState,
        stage: &dyn Stage,
    ) -> Result<(WorkflowState, bool)> {
        let patch = stage.execute(&state).await;
        let failed = patch.is_failure();

        let event = if failed {
            RunEventKind::StageFailed {
                stage: stage.name(),
                error: patch.errors.join("; "),
            }
        } else {
            RunEventKind::StageCompleted {
                stage: stage.name(),
            }
        };

        let state = self.merge.apply(state, patch);
        ledger.append(event).await?;

        Ok((state, failed))
    }

    /// Terminate the run as failed: record the reason in state and ledger.
    async fn fail_run(
        &self,
        ledger: &Ledger,
        state: WorkflowState,
        reason: String,
    ) -> Result<WorkflowState> {
        error!(%reason, "Run failed");

        let state = self.merge.apply(
            state,
            StatePatch {
                errors: vec![reason.clone()],
                ..Default::default()
            },
        );
        ledger
            .append(RunEventKind::RunFailed { error: reason })
            .await?;

        Ok(state)
    }
}
