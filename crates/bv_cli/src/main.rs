//! bv_cli
//!
//! Developer harness for the simulation engine: team profiles in (JSON files
//! or skill levels), pretty JSON out on stdout. Logs go to stderr.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use bv_core::engine::{FeatureToggles, MatchOptions, RallyContext};
use bv_core::simulation::{match_statistics, trial_rng};
use bv_core::{
    EngineConfig, InMemoryJobRegistry, JobRegistry, JobState, MatchFormat, Matchup,
    MonteCarloEngine, RallyBatchConfig, RallySimulator, SimulationBatch, TeamSide,
    TeamStatisticsProfile,
};

#[derive(Parser)]
#[command(name = "bv_cli")]
#[command(about = "Simulate beach volleyball rallies, matches and Monte Carlo batches", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine config file (JSON or YAML); defaults to $BV_ENGINE_CONFIG_PATH
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Monte Carlo batch of matches
    Batch {
        #[command(flatten)]
        teams: TeamArgs,

        /// Number of matches to simulate
        #[arg(long, default_value_t = 1000)]
        trials: u32,

        #[arg(long, value_enum, default_value_t = FormatArg::BestOfThree)]
        format: FormatArg,

        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads (1-16)
        #[arg(long)]
        workers: Option<usize>,

        #[command(flatten)]
        features: FeatureArgs,

        /// Include every match in the output
        #[arg(long, default_value = "false")]
        keep_matches: bool,

        /// Run as a background job and poll its status until it finishes
        #[arg(long, default_value = "false")]
        background: bool,
    },

    /// Play one rally and print its event trace
    Rally {
        #[command(flatten)]
        teams: TeamArgs,

        #[arg(long, value_enum, default_value_t = SideArg::A)]
        server: SideArg,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Play many independent rallies and print a rally-level summary
    Rallies {
        #[command(flatten)]
        teams: TeamArgs,

        #[arg(long, default_value_t = 1000)]
        count: u32,

        #[arg(long, value_enum, default_value_t = SideArg::A)]
        server: SideArg,

        #[arg(long)]
        seed: Option<u64>,

        /// Include every rally with its events
        #[arg(long, default_value = "false")]
        include_rallies: bool,
    },

    /// Play one match, optionally followed by a match-level report
    Match {
        #[command(flatten)]
        teams: TeamArgs,

        #[arg(long, value_enum, default_value_t = FormatArg::BestOfThree)]
        format: FormatArg,

        #[arg(long)]
        seed: Option<u64>,

        /// Also simulate this many matches and report match statistics
        #[arg(long)]
        report: Option<u32>,

        #[command(flatten)]
        features: FeatureArgs,

        /// Keep every rally on the printed match
        #[arg(long, default_value = "false")]
        rallies: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct TeamArgs {
    /// Team A profile (JSON)
    #[arg(long, conflicts_with = "skill_a")]
    team_a: Option<PathBuf>,

    /// Team A skill level (0.1-1.0) when no profile file is given
    #[arg(long, default_value_t = 0.6)]
    skill_a: f64,

    /// Team B profile (JSON)
    #[arg(long, conflicts_with = "skill_b")]
    team_b: Option<PathBuf>,

    /// Team B skill level (0.1-1.0) when no profile file is given
    #[arg(long, default_value_t = 0.6)]
    skill_b: f64,
}

impl TeamArgs {
    fn load(&self) -> Result<(TeamStatisticsProfile, TeamStatisticsProfile)> {
        let team_a = load_profile(self.team_a.as_deref(), "Team A", self.skill_a)?;
        let team_b = load_profile(self.team_b.as_deref(), "Team B", self.skill_b)?;
        team_a.check("team_a")?;
        team_b.check("team_b")?;
        Ok((team_a, team_b))
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct FeatureArgs {
    #[arg(long, default_value = "false")]
    no_momentum: bool,

    #[arg(long, default_value = "false")]
    no_pressure: bool,

    #[arg(long, default_value = "false")]
    no_fatigue: bool,
}

impl From<FeatureArgs> for FeatureToggles {
    fn from(args: FeatureArgs) -> Self {
        FeatureToggles {
            momentum: !args.no_momentum,
            pressure: !args.no_pressure,
            fatigue: !args.no_fatigue,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum FormatArg {
    BestOfOne,
    BestOfThree,
}

impl From<FormatArg> for MatchFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::BestOfOne => MatchFormat::BestOfOne,
            FormatArg::BestOfThree => MatchFormat::BestOfThree,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SideArg {
    A,
    B,
}

impl From<SideArg> for TeamSide {
    fn from(arg: SideArg) -> Self {
        match arg {
            SideArg::A => TeamSide::A,
            SideArg::B => TeamSide::B,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Batch { teams, trials, format, seed, workers, features, keep_matches, background } => {
            let (team_a, team_b) = teams.load()?;
            let mut batch = SimulationBatch::new(trials, team_a, team_b).with_format(format.into());
            batch.seed = seed;
            batch.workers = workers;
            batch.features = features.into();
            batch.keep_matches = keep_matches;

            let engine = Arc::new(MonteCarloEngine::new(&config));
            if background {
                run_background(&engine, batch)?;
            } else {
                let results = engine.run(&batch)?;
                print_json(&results)?;
            }
        }

        Commands::Rally { teams, server, seed } => {
            let (team_a, team_b) = teams.load()?;
            let matchup = Matchup::new(team_a, team_b);
            matchup.check()?;
            let simulator = rally_simulator(&config);
            let mut rng = seeded_rng(seed);
            let result = simulator.simulate_rally(
                &mut rng,
                RallyContext::new(server.into()),
                matchup.profile(TeamSide::A),
                matchup.profile(TeamSide::B),
            );
            print_json(&result)?;
        }

        Commands::Rallies { teams, count, server, seed, include_rallies } => {
            let (team_a, team_b) = teams.load()?;
            let batch = RallyBatchConfig {
                rallies: count,
                team_a,
                team_b,
                first_server: server.into(),
                seed,
                include_rallies,
            };
            let summary =
                bv_core::simulation::rally_batch::simulate_rally_batch_with(&rally_simulator(&config), &batch)?;
            print_json(&summary)?;
        }

        Commands::Match { teams, format, seed, report, features, rallies } => {
            let (team_a, team_b) = teams.load()?;
            let engine = MonteCarloEngine::new(&config);
            let matchup = Matchup::new(team_a, team_b);
            matchup.check()?;
            let options = MatchOptions { toggles: features.into(), retain_rallies: rallies, first_server: None };
            let seed = seed.unwrap_or_else(rand::random);

            let mut rng = trial_rng(seed, 0);
            let played = engine.simulator().simulate_match(&mut rng, 0, &matchup, format.into(), &options)?;

            let report = match report {
                Some(count) => {
                    info!("simulating {count} matches for the report");
                    let summary_options = MatchOptions { retain_rallies: false, ..options };
                    let matches = (0..count)
                        .map(|trial| {
                            let mut rng = trial_rng(seed, trial);
                            engine.simulator().simulate_match(&mut rng, trial, &matchup, format.into(), &summary_options)
                        })
                        .collect::<bv_core::Result<Vec<_>>>()?;
                    match_statistics(&matches)
                }
                None => None,
            };

            print_json(&MatchOutput { seed, result: played, report })?;
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct MatchOutput {
    seed: u64,
    result: bv_core::MatchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<bv_core::simulation::MatchStatistics>,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::global()?.clone(),
    };
    Ok(config)
}

fn load_profile(path: Option<&Path>, name: &str, skill: f64) -> Result<TeamStatisticsProfile> {
    let Some(path) = path else {
        if !(0.1..=1.0).contains(&skill) {
            bail!("skill level for {name} must be between 0.1 and 1.0 (got {skill})");
        }
        return Ok(TeamStatisticsProfile::from_skill_level(name, skill));
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile {}", path.display()))?;
    TeamStatisticsProfile::from_json(&content)
        .with_context(|| format!("invalid profile JSON in {}", path.display()))
}

fn rally_simulator(config: &EngineConfig) -> RallySimulator {
    RallySimulator::new(config.probability.clone(), config.modifiers.clone(), config.rally.clone())
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(rand::random))
}

fn run_background(engine: &Arc<MonteCarloEngine>, batch: SimulationBatch) -> Result<()> {
    let registry = Arc::new(InMemoryJobRegistry::default());
    let id = engine.spawn_batch(batch, registry.clone())?;
    info!("job {id} submitted");

    loop {
        let Some(status) = registry.status(id) else {
            bail!("job {id} disappeared from the registry");
        };
        match &status.state {
            JobState::Running => thread::sleep(Duration::from_millis(100)),
            JobState::Completed { .. } => return print_json(&status),
            JobState::Failed { message } => bail!("job {id} failed: {message}"),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
