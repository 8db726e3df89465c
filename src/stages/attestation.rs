//! Attestation stage: canonicalize, hash, store, sign, verify.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::Stage;
use crate::collaborators::{with_timeout, ContentStore, SigningService};
use crate::domain::{Attestation, MrvReport, StatePatch, StepName, WorkflowState};
use crate::error::PipelineError;

/// Computes a content hash over the canonical report bytes, persists the
/// bytes to content-addressable storage, and signs the hash.
///
/// Canonicalization is this stage's responsibility: the signature must verify
/// against exactly the bytes hashed, so both come from one serialization.
pub struct AttestationStage {
    content: Arc<dyn ContentStore>,
    signer: Arc<dyn SigningService>,
    timeout: Duration,
}

impl AttestationStage {
    pub fn new(
        content: Arc<dyn ContentStore>,
        signer: Arc<dyn SigningService>,
        timeout: Duration,
    ) -> Self {
        Self {
            content,
            signer,
            timeout,
        }
    }
}

/// Canonical report serialization: JSON with the struct's fixed field order.
pub fn canonical_report_bytes(report: &MrvReport) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(report)
}

/// Hex SHA-256 of the canonical report bytes.
pub fn report_content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl Stage for AttestationStage {
    fn name(&self) -> StepName {
        StepName::Attestation
    }

    async fn execute(&self, state: &WorkflowState) -> StatePatch {
        let Some(report) = state.mrv_report.as_ref() else {
            return StatePatch::failure(
                self.name(),
                PipelineError::missing_input(self.name(), "mrv_report").to_string(),
            );
        };

        let bytes = match canonical_report_bytes(report) {
            Ok(bytes) => bytes,
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    format!("attestation failed: cannot serialize report: {e}"),
                )
            }
        };
        let content_hash = report_content_hash(&bytes);

        match with_timeout(self.timeout, self.content.put(&bytes)).await {
            Ok(stored_hash) => {
                if stored_hash != content_hash {
                    // The store may key blobs its own way; the attestation
                    // hash stays the one the signature covers.
                    warn!(%stored_hash, %content_hash, "Content store returned a different hash");
                }
            }
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        }

        let signature = match with_timeout(self.timeout, self.signer.sign(&content_hash)).await {
            Ok(signature) => signature,
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        };

        match with_timeout(self.timeout, self.signer.verify(&content_hash, &signature)).await {
            Ok(true) => {}
            Ok(false) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::SignatureMismatch(content_hash).to_string(),
                )
            }
            Err(e) => {
                return StatePatch::failure(
                    self.name(),
                    PipelineError::from_collaborator(self.name(), e).to_string(),
                )
            }
        }

        debug!(%content_hash, "Report attested");

        StatePatch {
            attestation: Some(Attestation {
                content_hash,
                signature,
                signed_at: Utc::now(),
            }),
            current_step: Some(self.name()),
            ..Default::default()
        }
    }
}
