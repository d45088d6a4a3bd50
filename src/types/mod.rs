//! Core type definitions: targets, stages and run identifiers.
//!
//! Targets are classified once and never change; everything downstream
//! works from the classified value.

mod run_id;
mod stage;
mod target;

pub use run_id::{RunId, RunIdError};
pub use stage::StageKind;
pub use target::{classify, derive_target_set, Target, TargetKind, TargetSet};
