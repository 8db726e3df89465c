//! mrv - emission-reduction verification pipeline
//!
//! Turns raw farm/season records and remote-sensing observations into a
//! signed, quantified greenhouse-gas emission-reduction report and a record
//! of its issuance.
//!
//! # Architecture
//!
//! Seven stages run in a fixed order over a single accumulating
//! `WorkflowState`. Stages return partial patches; a merge engine with one
//! declared reducer per field folds each patch into the state. After quality
//! assessment a router either proceeds to reporting, loops the run back to
//! ingestion (bounded), or terminates it failed. Every external system sits
//! behind an injected collaborator trait, and every run appends to a durable
//! ledger that guards against double-minting a season.
//!
//! # Modules
//!
//! - `domain`: records and workflow state
//! - `engine`: merge engine, router, ledger, orchestrator
//! - `stages`: the seven stage functions
//! - `collaborators`: external interface traits and in-memory doubles
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the demo scenario end to end
//! mrv run --farm F1 --season S1 --max-retries 3
//!
//! # Inspect the run ledger
//! mrv status --farm F1 --season S1
//! ```

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod stages;

// Re-export main types at crate root for convenience
pub use config::{MintRetryPolicy, WorkflowConfig};
pub use domain::{StatePatch, StepName, WorkflowState};
pub use engine::{CancelToken, Ledger, MergeEngine, Orchestrator, Router, RouterState, Verdict};
pub use error::PipelineError;
