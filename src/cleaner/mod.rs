//! Secure wiping: plans, pattern generation and the wipe engine

pub mod pattern;
pub mod plan;
pub mod result;
pub mod secure_delete;

pub use self::{
    plan::{PassPattern, PassSpec, WipePlan, PRESET_NAMES},
    result::{Disposition, PassOutcome, VerificationOutcome, WipeFailure, WipeResult, WipeState},
    secure_delete::{ProgressCallback, SecureWipeEngine, WipeProgress, WipeStage, WriteInterceptor},
};
