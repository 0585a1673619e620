use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::rally_state::RallyState;

/// Structural fault inside the rally engine.
///
/// These are never in-distribution outcomes: an empty distribution means the
/// transition table and the probability families disagree, and hitting the
/// iteration cap means a rally failed to reach a terminal state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineFault {
    #[error("no valid transition distribution from state {state}")]
    EmptyDistribution { state: RallyState },

    #[error("rally exceeded {transitions} transitions (last state {state})")]
    IterationCap { state: RallyState, transitions: u32 },
}

impl EngineFault {
    /// State that was current when the fault fired.
    pub fn state(&self) -> RallyState {
        match self {
            EngineFault::EmptyDistribution { state } => *state,
            EngineFault::IterationCap { state, .. } => *state,
        }
    }
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid profile for {team}: {reason}")]
    InvalidProfile { team: String, reason: String },

    #[error("Invalid batch configuration: {0}")]
    InvalidBatch(String),

    #[error("Engine configuration error: {0}")]
    Config(String),

    #[error("Engine fault: {0}")]
    EngineFault(#[from] EngineFault),

    #[error("Batch failed: {failed_trials} trial(s) failed, none completed ({reason})")]
    BatchFailed { failed_trials: u32, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    /// Configuration problems are rejected before any simulation starts.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SimError::InvalidProfile { .. } | SimError::InvalidBatch(_) | SimError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
