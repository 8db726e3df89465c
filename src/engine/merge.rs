//! Field-level merge engine.
//!
//! Every workflow field has exactly one declared merge strategy, listed in
//! [`MERGE_RULES`]. `MergeEngine::new` checks the table against the patch
//! field list, so a field added to `StatePatch` without a declared reducer is
//! caught at construction rather than silently merged.
//!
//! Strategies:
//! - `Replace`: `next = patch.field ?? current.field`
//! - `Append`: `next = current.field ++ patch.field` (errors only)
//! - `TriState`: explicit `Some(v)` overrides, `None` leaves the current value

use thiserror::Error;

use crate::domain::{StatePatch, WorkflowState};

/// Merge strategy for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Scalar override-if-present
    Replace,
    /// Concatenation; a later failure never erases an earlier one
    Append,
    /// Tri-state boolean: absent means "do not touch"
    TriState,
}

/// One row of the reducer table.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub strategy: Strategy,
}

const fn rule(field: &'static str, strategy: Strategy) -> FieldRule {
    FieldRule { field, strategy }
}

/// The statically declared reducer table, one rule per patch field.
pub const MERGE_RULES: &[FieldRule] = &[
    rule("farm_data", Strategy::Replace),
    rule("season_data", Strategy::Replace),
    rule("farmer_logs", Strategy::Replace),
    rule("satellite_data", Strategy::Replace),
    rule("remote_sensing_analysis", Strategy::Replace),
    rule("emission_calculations", Strategy::Replace),
    rule("quality_assessment", Strategy::Replace),
    rule("mrv_report", Strategy::Replace),
    rule("attestation", Strategy::Replace),
    rule("blockchain_receipt", Strategy::Replace),
    rule("errors", Strategy::Append),
    rule("current_step", Strategy::Replace),
    rule("is_complete", Strategy::TriState),
];

/// Reducer table problems detected at engine construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeTableError {
    #[error("field '{0}' has no declared merge rule")]
    MissingRule(String),

    #[error("merge rule declared for unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' has more than one merge rule")]
    DuplicateRule(String),
}

/// Applies stage patches to the workflow state.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    _private: (),
}

impl MergeEngine {
    /// Build the engine, validating that [`MERGE_RULES`] covers exactly the
    /// fields of [`StatePatch`].
    pub fn new() -> Result<Self, MergeTableError> {
        for rule in MERGE_RULES {
            if !StatePatch::FIELDS.contains(&rule.field) {
                return Err(MergeTableError::UnknownField(rule.field.to_string()));
            }
            let count = MERGE_RULES.iter().filter(|r| r.field == rule.field).count();
            if count > 1 {
                return Err(MergeTableError::DuplicateRule(rule.field.to_string()));
            }
        }
        for field in StatePatch::FIELDS {
            if !MERGE_RULES.iter().any(|r| r.field == *field) {
                return Err(MergeTableError::MissingRule(field.to_string()));
            }
        }
        Ok(Self { _private: () })
    }

    /// Fold one patch into the state, consuming both.
    ///
    /// Per-field application is associative: folding patches one at a time
    /// yields the same state as any grouped fold.
    pub fn apply(&self, current: WorkflowState, patch: StatePatch) -> WorkflowState {
        let mut next = current;
        let mut patch = patch;

        macro_rules! replace {
            ($($field:ident),+ $(,)?) => {
                $(
                    if patch.$field.is_some() {
                        next.$field = patch.$field.take();
                    }
                )+
            };
        }

        replace!(
            farm_data,
            season_data,
            farmer_logs,
            satellite_data,
            remote_sensing_analysis,
            emission_calculations,
            quality_assessment,
            mrv_report,
            attestation,
            blockchain_receipt,
            current_step,
        );

        next.errors.append(&mut patch.errors);

        if let Some(complete) = patch.is_complete {
            next.is_complete = complete;
        }

        next
    }
}
