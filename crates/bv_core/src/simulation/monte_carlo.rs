//! Monte Carlo orchestrator
//!
//! Runs many independent matches between two profiles and aggregates them
//! into win-probability estimates.
//!
//! Trial `k` always runs on `ChaCha8Rng::seed_from_u64(base)` switched to
//! stream `k`, so every trial has its own disjoint random sequence. Chunking,
//! worker count and completion order therefore never change the aggregate,
//! and a seeded batch is reproducible bit-for-bit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::executor::{partition, RayonExecutor, TrialChunk, TrialExecutor};
use super::jobs::{JobId, JobRegistry};
use super::stats::{self, ConfidenceInterval, BATCH_SIGNIFICANCE_MARGIN};
use crate::config::EngineConfig;
use crate::engine::match_sim::{MatchOptions, MatchSimulator};
use crate::engine::modifiers::FeatureToggles;
use crate::engine::rally::RallySimulator;
use crate::engine::rally_state::TeamSide;
use crate::error::{Result, SimError};
use crate::models::match_result::{MatchFormat, MatchResult};
use crate::models::team::{Matchup, TeamStatisticsProfile};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationLimits {
    pub min_trials: u32,
    pub max_trials: u32,
    pub max_workers: usize,
    /// Worker count when a batch does not ask for one (further capped by the
    /// available parallelism).
    pub default_worker_cap: usize,
}

impl Default for SimulationLimits {
    fn default() -> Self {
        Self { min_trials: 100, max_trials: 100_000, max_workers: 16, default_worker_cap: 8 }
    }
}

impl SimulationLimits {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.min_trials == 0 || self.min_trials > self.max_trials {
            return Err(format!(
                "simulation.min_trials must be in 1..=max_trials (got {} / {})",
                self.min_trials, self.max_trials
            ));
        }
        if self.max_workers == 0 || self.default_worker_cap == 0 {
            return Err("simulation worker caps must be at least 1".to_string());
        }
        Ok(())
    }
}

/// One Monte Carlo request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationBatch {
    pub trials: u32,
    pub team_a: TeamStatisticsProfile,
    pub team_b: TeamStatisticsProfile,
    #[serde(default)]
    pub format: MatchFormat,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub features: FeatureToggles,
    /// Keep every match on the results.
    #[serde(default)]
    pub keep_matches: bool,
}

impl SimulationBatch {
    pub fn new(trials: u32, team_a: TeamStatisticsProfile, team_b: TeamStatisticsProfile) -> Self {
        Self {
            trials,
            team_a,
            team_b,
            format: MatchFormat::default(),
            seed: None,
            workers: None,
            features: FeatureToggles::default(),
            keep_matches: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_format(mut self, format: MatchFormat) -> Self {
        self.format = format;
        self
    }

    /// Validate against the default limits.
    pub fn check(&self) -> Result<()> {
        self.check_with(&SimulationLimits::default())
    }

    pub fn check_with(&self, limits: &SimulationLimits) -> Result<()> {
        if !(limits.min_trials..=limits.max_trials).contains(&self.trials) {
            return Err(SimError::InvalidBatch(format!(
                "trials must be between {} and {} (got {})",
                limits.min_trials, limits.max_trials, self.trials
            )));
        }
        if let Some(workers) = self.workers {
            if !(1..=limits.max_workers).contains(&workers) {
                return Err(SimError::InvalidBatch(format!(
                    "workers must be between 1 and {} (got {workers})",
                    limits.max_workers
                )));
            }
        }
        self.team_a.check("team_a")?;
        self.team_b.check("team_b")
    }

    fn worker_count(&self, limits: &SimulationLimits) -> usize {
        self.workers.unwrap_or_else(|| {
            let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            available.min(limits.default_worker_cap)
        })
    }
}

// ============================================================================
// Per-chunk aggregation
// ============================================================================

/// Partial aggregate of one chunk. Merging is commutative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkReport {
    pub completed: u32,
    pub failed: u32,
    pub team_a_wins: u32,
    pub team_b_wins: u32,
    pub set_distribution: BTreeMap<String, u32>,
    pub total_sets: u64,
    pub total_rallies: u64,
    pub total_contacts: u64,
    pub faulted_rallies: u64,
    pub longest_rally: u32,
    pub shortest_rally: Option<u32>,
    pub matches: Vec<MatchResult>,
    /// Message of the lowest-index failed trial.
    pub first_failure: Option<(u32, String)>,
}

impl ChunkReport {
    fn record(&mut self, result: MatchResult, keep: bool) {
        self.completed += 1;
        match result.winner {
            TeamSide::A => self.team_a_wins += 1,
            TeamSide::B => self.team_b_wins += 1,
        }
        *self.set_distribution.entry(result.outcome_shape()).or_insert(0) += 1;
        self.total_sets += u64::from(result.sets_played());
        self.total_rallies += u64::from(result.total_rallies);
        self.total_contacts += u64::from(result.total_contacts);
        self.faulted_rallies += u64::from(result.faulted_rallies);
        self.longest_rally = self.longest_rally.max(result.longest_rally());
        if result.total_rallies > 0 {
            let shortest = result.shortest_rally();
            self.shortest_rally = Some(self.shortest_rally.map_or(shortest, |s| s.min(shortest)));
        }
        if keep {
            self.matches.push(result);
        }
    }

    fn record_failure(&mut self, trial: u32, message: String) {
        self.failed += 1;
        self.record_first_failure(trial, message);
    }

    pub fn merge(mut self, other: ChunkReport) -> ChunkReport {
        self.completed += other.completed;
        self.failed += other.failed;
        self.team_a_wins += other.team_a_wins;
        self.team_b_wins += other.team_b_wins;
        for (shape, count) in other.set_distribution {
            *self.set_distribution.entry(shape).or_insert(0) += count;
        }
        self.total_sets += other.total_sets;
        self.total_rallies += other.total_rallies;
        self.total_contacts += other.total_contacts;
        self.faulted_rallies += other.faulted_rallies;
        self.longest_rally = self.longest_rally.max(other.longest_rally);
        self.shortest_rally = match (self.shortest_rally, other.shortest_rally) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.matches.extend(other.matches);
        if let Some((trial, message)) = other.first_failure {
            self.record_first_failure(trial, message);
        }
        self
    }

    fn record_first_failure(&mut self, trial: u32, message: String) {
        if self.first_failure.as_ref().map_or(true, |(t, _)| trial < *t) {
            self.first_failure = Some((trial, message));
        }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub trials_requested: u32,
    pub trials_completed: u32,
    pub trials_failed: u32,

    pub team_a_wins: u32,
    pub team_b_wins: u32,
    pub team_a_win_probability: f64,
    pub team_b_win_probability: f64,
    /// 95% interval for team A's win probability.
    pub confidence_interval: ConfidenceInterval,
    /// Worst-case (p = 0.5) margin at the completed trial count.
    pub margin_of_error: f64,
    pub is_significant: bool,

    /// Set score from A's view ("2-0", "2-1", ...) to match count.
    pub set_distribution: BTreeMap<String, u32>,
    pub average_sets_per_match: f64,
    pub average_rallies_per_match: f64,
    pub average_rally_length: f64,
    pub longest_rally: u32,
    pub shortest_rally: u32,
    pub faulted_rallies: u64,

    pub seed: u64,
    pub workers: usize,
    pub executor: String,
    pub elapsed_seconds: f64,
    pub trials_per_second: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<MatchResult>>,
}

impl SimulationResults {
    fn from_report(
        report: ChunkReport,
        requested: u32,
        seed: u64,
        workers: usize,
        executor: &str,
        elapsed_seconds: f64,
        keep_matches: bool,
    ) -> Self {
        let n = report.completed;
        let p = f64::from(report.team_a_wins) / f64::from(n.max(1));
        let margin = stats::worst_case_margin(n);
        let per_match = |total: u64| total as f64 / f64::from(n.max(1));

        let mut matches = report.matches;
        matches.sort_by_key(|m| m.trial);

        Self {
            trials_requested: requested,
            trials_completed: n,
            trials_failed: report.failed,
            team_a_wins: report.team_a_wins,
            team_b_wins: report.team_b_wins,
            team_a_win_probability: p,
            team_b_win_probability: 1.0 - p,
            confidence_interval: stats::confidence_interval(p, n),
            margin_of_error: margin,
            is_significant: margin < BATCH_SIGNIFICANCE_MARGIN,
            set_distribution: report.set_distribution,
            average_sets_per_match: per_match(report.total_sets),
            average_rallies_per_match: per_match(report.total_rallies),
            average_rally_length: if report.total_rallies == 0 {
                0.0
            } else {
                report.total_contacts as f64 / report.total_rallies as f64
            },
            longest_rally: report.longest_rally,
            shortest_rally: report.shortest_rally.unwrap_or(0),
            faulted_rallies: report.faulted_rallies,
            seed,
            workers,
            executor: executor.to_string(),
            elapsed_seconds,
            trials_per_second: if elapsed_seconds > 0.0 {
                f64::from(n) / elapsed_seconds
            } else {
                0.0
            },
            matches: keep_matches.then_some(matches),
        }
    }
}

/// Cumulative throughput of one engine across batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnginePerformance {
    pub batches: u64,
    pub total_trials: u64,
    pub total_seconds: f64,
}

impl EnginePerformance {
    pub fn average_seconds_per_trial(&self) -> f64 {
        if self.total_trials == 0 {
            0.0
        } else {
            self.total_seconds / self.total_trials as f64
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// RNG for trial `trial` of a batch with base seed `base`.
pub fn trial_rng(base: u64, trial: u32) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(base);
    rng.set_stream(u64::from(trial));
    rng
}

pub struct MonteCarloEngine {
    simulator: MatchSimulator,
    limits: SimulationLimits,
    executor: Arc<dyn TrialExecutor>,
    performance: Mutex<EnginePerformance>,
}

impl Default for MonteCarloEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl MonteCarloEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let rally = RallySimulator::new(
            config.probability.clone(),
            config.modifiers.clone(),
            config.rally.clone(),
        );
        Self {
            simulator: MatchSimulator::new(rally, config.composer.clone()),
            limits: config.simulation.clone(),
            executor: Arc::new(RayonExecutor),
            performance: Mutex::new(EnginePerformance::default()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TrialExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn simulator(&self) -> &MatchSimulator {
        &self.simulator
    }

    pub fn limits(&self) -> &SimulationLimits {
        &self.limits
    }

    pub fn performance(&self) -> EnginePerformance {
        *self.performance.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and run a batch to completion.
    pub fn run(&self, batch: &SimulationBatch) -> Result<SimulationResults> {
        batch.check_with(&self.limits)?;

        let seed = batch.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let workers = batch.worker_count(&self.limits);
        let chunks = partition(batch.trials, workers);
        let matchup = Matchup::new(batch.team_a.clone(), batch.team_b.clone());
        let options = MatchOptions {
            toggles: batch.features,
            retain_rallies: false,
            first_server: None,
        };

        info!(
            "monte carlo start: {} trials, {} workers ({}), seed {}",
            batch.trials,
            workers,
            self.executor.name(),
            seed
        );
        let started = Instant::now();

        let run_chunk = |chunk: &TrialChunk| {
            let mut report = ChunkReport::default();
            for trial in chunk.trials.clone() {
                let mut rng = trial_rng(seed, trial);
                match self.simulator.simulate_match(&mut rng, trial, &matchup, batch.format, &options)
                {
                    Ok(result) => report.record(result, batch.keep_matches),
                    Err(e) => {
                        warn!("trial {trial} failed: {e}");
                        report.record_failure(trial, e.to_string());
                    }
                }
            }
            report
        };

        let report = self
            .executor
            .execute(&chunks, &run_chunk)?
            .into_iter()
            .fold(ChunkReport::default(), ChunkReport::merge);
        let elapsed = started.elapsed().as_secs_f64();

        if report.completed == 0 {
            let reason = report
                .first_failure
                .map(|(_, message)| message)
                .unwrap_or_else(|| "no trials ran".to_string());
            return Err(SimError::BatchFailed { failed_trials: report.failed, reason });
        }

        {
            let mut perf = self.performance.lock().unwrap_or_else(PoisonError::into_inner);
            perf.batches += 1;
            perf.total_trials += u64::from(report.completed);
            perf.total_seconds += elapsed;
            debug!(
                "engine totals: {} batches, {} trials, {:.6}s per trial",
                perf.batches,
                perf.total_trials,
                perf.average_seconds_per_trial()
            );
        }

        let results = SimulationResults::from_report(
            report,
            batch.trials,
            seed,
            workers,
            self.executor.name(),
            elapsed,
            batch.keep_matches,
        );
        info!(
            "monte carlo done: A {:.3} [{:.3}, {:.3}] over {} trials in {:.2}s ({:.0} trials/s)",
            results.team_a_win_probability,
            results.confidence_interval.lower,
            results.confidence_interval.upper,
            results.trials_completed,
            results.elapsed_seconds,
            results.trials_per_second
        );
        Ok(results)
    }

    /// Run a batch on a background thread, publishing its status into
    /// `registry`. The batch is validated up front so configuration errors are
    /// returned directly instead of becoming failed jobs.
    ///
    /// Jobs cannot be cancelled once started.
    pub fn spawn_batch(
        self: &Arc<Self>,
        batch: SimulationBatch,
        registry: Arc<dyn JobRegistry>,
    ) -> Result<JobId> {
        batch.check_with(&self.limits)?;

        let id = JobId::from(Uuid::new_v4());
        registry.insert_running(id);

        let engine = Arc::clone(self);
        thread::Builder::new()
            .name(format!("bv-job-{id}"))
            .spawn(move || match engine.run(&batch) {
                Ok(results) => registry.complete(id, results),
                Err(e) => {
                    warn!("job {id} failed: {e}");
                    registry.fail(id, e.to_string());
                }
            })
            .map_err(|e| SimError::Config(format!("failed to spawn job thread: {e}")))?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::executor::SequentialExecutor;

    fn batch(trials: u32, a: f64, b: f64) -> SimulationBatch {
        SimulationBatch::new(
            trials,
            TeamStatisticsProfile::from_skill_level("Team A", a),
            TeamStatisticsProfile::from_skill_level("Team B", b),
        )
    }

    #[test]
    fn test_batch_bounds_are_configuration_errors() {
        let err = batch(99, 0.5, 0.5).check().unwrap_err();
        assert!(err.is_configuration_error());
        assert!(batch(100_001, 0.5, 0.5).check().is_err());
        assert!(batch(100, 0.5, 0.5).with_workers(0).check().is_err());
        assert!(batch(100, 0.5, 0.5).with_workers(17).check().is_err());
        assert!(batch(100, 0.5, 0.5).with_workers(16).check().is_ok());

        let mut bad = batch(100, 0.5, 0.5);
        bad.team_b.dig_percentage = 150.0;
        match bad.check().unwrap_err() {
            SimError::InvalidProfile { team, .. } => assert_eq!(team, "team_b"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_trial_streams_are_distinct() {
        let a: u64 = trial_rng(1, 0).gen();
        let b: u64 = trial_rng(1, 1).gen();
        let again: u64 = trial_rng(1, 0).gen();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }

    #[test]
    fn test_seeded_batch_is_reproducible() {
        let engine = MonteCarloEngine::default();
        let job = batch(200, 0.6, 0.5).with_seed(42).with_workers(4);
        let first = engine.run(&job).unwrap();
        let second = engine.run(&job).unwrap();
        assert_eq!(first.team_a_wins, second.team_a_wins);
        assert_eq!(first.set_distribution, second.set_distribution);
        assert_eq!(first.seed, 42);
    }

    #[test]
    fn test_results_independent_of_workers_and_executor() {
        let parallel = MonteCarloEngine::default();
        let sequential = MonteCarloEngine::default().with_executor(Arc::new(SequentialExecutor));
        let one = parallel.run(&batch(150, 0.55, 0.5).with_seed(7).with_workers(1)).unwrap();
        let many = parallel.run(&batch(150, 0.55, 0.5).with_seed(7).with_workers(5)).unwrap();
        let seq = sequential.run(&batch(150, 0.55, 0.5).with_seed(7).with_workers(3)).unwrap();
        assert_eq!(one.team_a_wins, many.team_a_wins);
        assert_eq!(one.team_a_wins, seq.team_a_wins);
        assert_eq!(one.average_rally_length, seq.average_rally_length);
        assert_eq!(seq.executor, "sequential");
    }

    #[test]
    fn test_results_are_consistent() {
        let engine = MonteCarloEngine::default();
        let mut job = batch(120, 0.6, 0.6).with_seed(3);
        job.keep_matches = true;
        let results = engine.run(&job).unwrap();

        assert_eq!(results.trials_completed + results.trials_failed, 120);
        assert_eq!(results.team_a_wins + results.team_b_wins, results.trials_completed);
        assert!((results.team_a_win_probability + results.team_b_win_probability - 1.0).abs() < 1e-12);
        assert_eq!(results.set_distribution.values().sum::<u32>(), results.trials_completed);
        for shape in results.set_distribution.keys() {
            assert!(["2-0", "2-1", "1-2", "0-2"].contains(&shape.as_str()), "{shape}");
        }
        let matches = results.matches.as_ref().unwrap();
        assert!(matches.windows(2).all(|w| w[0].trial < w[1].trial));
        assert!(results.confidence_interval.contains(results.team_a_win_probability));
        assert!(!results.is_significant);
        assert_eq!(engine.performance().total_trials, 120);
    }

    #[test]
    fn test_performance_accumulates_across_batches() {
        let engine = MonteCarloEngine::default();
        assert_eq!(engine.performance().average_seconds_per_trial(), 0.0);

        engine.run(&batch(100, 0.6, 0.5).with_format(MatchFormat::BestOfOne).with_seed(3)).unwrap();
        engine.run(&batch(150, 0.6, 0.5).with_format(MatchFormat::BestOfOne).with_seed(4)).unwrap();

        let perf = engine.performance();
        assert_eq!(perf.batches, 2);
        assert_eq!(perf.total_trials, 250);
        assert!(perf.total_seconds >= 0.0);
        assert!((perf.average_seconds_per_trial() - perf.total_seconds / 250.0).abs() < 1e-15);
    }

    #[test]
    fn test_unseeded_batch_reports_its_seed() {
        let engine = MonteCarloEngine::default();
        let results = engine.run(&batch(100, 0.5, 0.5).with_format(MatchFormat::BestOfOne)).unwrap();
        let replay = engine
            .run(&batch(100, 0.5, 0.5).with_format(MatchFormat::BestOfOne).with_seed(results.seed))
            .unwrap();
        assert_eq!(results.team_a_wins, replay.team_a_wins);
        for shape in results.set_distribution.keys() {
            assert!(["1-0", "0-1"].contains(&shape.as_str()));
        }
    }

    #[test]
    fn test_batch_with_no_completed_trials_fails() {
        let mut config = EngineConfig::default();
        config.rally.max_transitions = 1;
        config.composer.max_consecutive_faults = 0;
        let engine = MonteCarloEngine::new(&config);

        let mut job = batch(100, 0.5, 0.5).with_seed(1);
        for team in [&mut job.team_a, &mut job.team_b] {
            team.service_ace_percentage = 0.0;
            team.service_error_percentage = 0.0;
        }
        match engine.run(&job).unwrap_err() {
            SimError::BatchFailed { failed_trials, reason } => {
                assert_eq!(failed_trials, 100);
                assert!(reason.contains("rally exceeded"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_chunk_merge_is_order_independent() {
        let mut a = ChunkReport::default();
        a.record_failure(9, "late".into());
        a.completed = 3;
        a.shortest_rally = Some(4);
        let mut b = ChunkReport::default();
        b.record_failure(2, "early".into());
        b.completed = 5;
        b.shortest_rally = Some(2);

        let ab = a.clone().merge(b.clone());
        let ba = b.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.first_failure, Some((2, "early".to_string())));
        assert_eq!(ab.shortest_rally, Some(2));
    }
}
