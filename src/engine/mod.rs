//! Orchestration logic.
//!
//! - Merge: per-field reducer table and apply function
//! - Router: the conditional branch after quality assessment
//! - Ledger: append-only run record backing the re-mint guard
//! - Orchestrator: the stage/router loop

pub mod ledger;
pub mod merge;
pub mod orchestrator;
pub mod router;

pub use ledger::{Ledger, RunEvent, RunEventKind};
pub use merge::{FieldRule, MergeEngine, MergeTableError, Strategy, MERGE_RULES};
pub use orchestrator::{CancelToken, Orchestrator};
pub use router::{Router, RouterState, Verdict};
