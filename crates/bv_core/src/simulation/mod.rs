//! Batch simulation: Monte Carlo match batches, rally batches, background jobs
//! and the statistics used to report them.

pub mod executor;
pub mod jobs;
pub mod monte_carlo;
pub mod rally_batch;
pub mod stats;

pub use executor::{partition, RayonExecutor, SequentialExecutor, TrialChunk, TrialExecutor};
pub use jobs::{InMemoryJobRegistry, JobId, JobRegistry, JobState, JobStatus};
pub use monte_carlo::{
    trial_rng, EnginePerformance, MonteCarloEngine, SimulationBatch, SimulationLimits,
    SimulationResults,
};
pub use rally_batch::{simulate_rally_batch, RallyBatchConfig, RallyBatchSummary};
pub use stats::{match_statistics, ConfidenceInterval, MatchStatistics};
