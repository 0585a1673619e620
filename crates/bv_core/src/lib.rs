//! # bv_core - Rally-Level Beach Volleyball Simulation Engine
//!
//! Simulates beach volleyball matches one contact at a time with a stochastic
//! rally state machine driven by team statistics, and estimates win
//! probabilities with parallel Monte Carlo batches.
//!
//! ## Features
//! - Rally state machine with 26 states and statistics-driven transition tables
//! - Momentum, pressure and fatigue modifiers, each switchable per batch
//! - Sets to 21 (deciding set to 15) with a two-point margin, best of one or three
//! - Reproducible batches: same seed gives the same result for any worker count
//! - Confidence intervals and a significance flag on every batch
//! - Background jobs with a TTL-bounded status registry

#![allow(dead_code)]
// Simulation entry points take rng, ids, profiles and options together
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::field_reassign_with_default)]

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod simulation;

pub use config::{EngineConfig, ENGINE_CONFIG_PATH_ENV};
pub use error::{EngineFault, Result, SimError};

pub use engine::{
    ActionType, FeatureToggles, MatchOptions, MatchSimulator, PointOutcome, ProbabilityEngine,
    RallyContext, RallyEvent, RallyResult, RallySimulator, RallyState, TeamSide,
};
pub use models::{MatchFormat, MatchResult, Matchup, SetResult, SetType, TeamStatisticsProfile};
pub use simulation::{
    simulate_rally_batch, InMemoryJobRegistry, JobId, JobRegistry, JobState, JobStatus,
    MonteCarloEngine, RallyBatchConfig, RallyBatchSummary, SimulationBatch, SimulationResults,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
