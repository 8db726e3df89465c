//! Blockchain mint stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::Stage;
use crate::collaborators::{with_timeout, BlockchainMinter, CollaboratorError};
use crate::domain::{MintRequest, StatePatch, StepName, WorkflowState, METHODOLOGY};
use crate::error::PipelineError;

/// Issues the external minting transaction for the computed reduction,
/// tagged with the attestation hash. Sets `is_complete` only on confirmed
/// success; an unconfirmed transaction is a `MintFailure`.
pub struct MintStage {
    minter: Arc<dyn BlockchainMinter>,
    timeout: Duration,
}

impl MintStage {
    pub fn new(minter: Arc<dyn BlockchainMinter>, timeout: Duration) -> Self {
        Self { minter, timeout }
    }
}

#[async_trait]
impl Stage for MintStage {
    fn name(&self) -> StepName {
        StepName::Mint
    }

    async fn execute(&self, state: &WorkflowState) -> StatePatch {
        let Some(attestation) = state.attestation.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "attestation").to_string(),
            );
        };
        let Some(calculations) = state.emission_calculations.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "emission_calculations").to_string(),
            );
        };
        let Some(season) = state.season_data.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "season_data").to_string(),
            );
        };

        let request = MintRequest {
            farm_id: state.farm_id.clone(),
            season_id: state.season_id.clone(),
            quantity_kg_ch4: calculations.reduction_kg_ch4,
            quantity_kg_co2e: calculations.reduction_kg_co2e,
            report_hash: attestation.content_hash.clone(),
            methodology: METHODOLOGY.to_string(),
            vintage: season.year,
        };

        match with_timeout(self.timeout, self.minter.mint(&request)).await {
            Ok(receipt) => {
                info!(
                    tx_ref = %receipt.tx_ref,
                    block = receipt.confirmed_block,
                    quantity_kg_ch4 = receipt.quantity_kg_ch4,
                    "Mint confirmed"
                );
                StatePatch {
                    blockchain_receipt: Some(receipt),
                    is_complete: Some(true),
                    current_step: Some(self.name()),
                    ..Default::default()
                }
            }
            Err(CollaboratorError::Unavailable(detail)) => StatePatch::failure(
                self.name(),
                PipelineError::MintFailure(detail).to_string(),
            ),
            Err(e) => StatePatch::failure(
                self.name(),
                PipelineError::from_collaborator(self.name(), e).to_string(),
            ),
        }
    }
}
