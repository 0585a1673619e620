//! Rally batches: many independent single rallies with a rally-level report.

use std::collections::BTreeMap;

use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::engine::rally::{RallyResult, RallySimulator};
use crate::engine::rally_state::{ActionType, TeamSide};
use crate::error::{Result, SimError};
use crate::models::team::TeamStatisticsProfile;

pub const MAX_RALLIES: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RallyBatchConfig {
    pub rallies: u32,
    pub team_a: TeamStatisticsProfile,
    pub team_b: TeamStatisticsProfile,
    #[serde(default = "default_first_server")]
    pub first_server: TeamSide,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Return every rally with its event trace.
    #[serde(default)]
    pub include_rallies: bool,
}

fn default_first_server() -> TeamSide {
    TeamSide::A
}

impl RallyBatchConfig {
    pub fn check(&self) -> Result<()> {
        if !(1..=MAX_RALLIES).contains(&self.rallies) {
            return Err(SimError::InvalidBatch(format!(
                "rallies must be between 1 and {MAX_RALLIES} (got {})",
                self.rallies
            )));
        }
        self.team_a.check("team_a")?;
        self.team_b.check("team_b")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RallyBatchSummary {
    pub total_rallies: u32,
    pub team_a_wins: u32,
    pub team_b_wins: u32,
    pub faulted_rallies: u32,
    pub team_a_win_percentage: f64,
    pub team_b_win_percentage: f64,
    pub average_rally_length: f64,
    /// Mean of each side's per-rally contact effectiveness; `None` when the
    /// side never made a graded contact.
    pub team_a_average_effectiveness: Option<f64>,
    pub team_b_average_effectiveness: Option<f64>,
    pub event_distribution: BTreeMap<ActionType, u32>,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rallies: Option<Vec<RallyResult>>,
}

pub fn simulate_rally_batch(config: &RallyBatchConfig) -> Result<RallyBatchSummary> {
    simulate_rally_batch_with(&RallySimulator::default(), config)
}

pub fn simulate_rally_batch_with(
    simulator: &RallySimulator,
    config: &RallyBatchConfig,
) -> Result<RallyBatchSummary> {
    config.check()?;

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let results = simulator.simulate_rallies(
        &mut rng,
        config.rallies,
        config.first_server,
        &config.team_a,
        &config.team_b,
    );

    let wins = |side| results.iter().filter(|r| r.winner == Some(side)).count() as u32;
    let team_a_wins = wins(TeamSide::A);
    let team_b_wins = wins(TeamSide::B);
    let total = results.len() as u32;
    let percent = |n: u32| f64::from(n) / f64::from(total) * 100.0;

    let mut event_distribution = BTreeMap::new();
    for result in &results {
        for (action, count) in result.event_summary() {
            *event_distribution.entry(action).or_insert(0) += count;
        }
    }
    let contacts: u32 = results.iter().map(|r| r.rally_length).sum();
    let effectiveness = |side| {
        let graded: Vec<f64> = results.iter().filter_map(|r| r.average_effectiveness(side)).collect();
        (!graded.is_empty()).then(|| graded.iter().sum::<f64>() / graded.len() as f64)
    };

    info!(
        "rally batch: {} rallies, A {} / B {} ({} faulted)",
        total,
        team_a_wins,
        team_b_wins,
        total - team_a_wins - team_b_wins
    );

    Ok(RallyBatchSummary {
        total_rallies: total,
        team_a_wins,
        team_b_wins,
        faulted_rallies: total - team_a_wins - team_b_wins,
        team_a_win_percentage: percent(team_a_wins),
        team_b_win_percentage: percent(team_b_wins),
        average_rally_length: f64::from(contacts) / f64::from(total),
        team_a_average_effectiveness: effectiveness(TeamSide::A),
        team_b_average_effectiveness: effectiveness(TeamSide::B),
        event_distribution,
        seed,
        rallies: config.include_rallies.then_some(results),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rallies: u32) -> RallyBatchConfig {
        RallyBatchConfig {
            rallies,
            team_a: TeamStatisticsProfile::from_skill_level("A", 0.7),
            team_b: TeamStatisticsProfile::from_skill_level("B", 0.5),
            first_server: TeamSide::A,
            seed: Some(17),
            include_rallies: false,
        }
    }

    #[test]
    fn test_rally_batch_summary() {
        let summary = simulate_rally_batch(&config(500)).unwrap();
        assert_eq!(summary.total_rallies, 500);
        assert_eq!(summary.team_a_wins + summary.team_b_wins + summary.faulted_rallies, 500);
        assert!((summary.team_a_win_percentage + summary.team_b_win_percentage - 100.0).abs() < 1e-9);
        assert_eq!(summary.event_distribution.get(&ActionType::Serve), Some(&500));
        assert!(summary.average_rally_length >= 1.0);
        assert!(summary.rallies.is_none());
        for side in [summary.team_a_average_effectiveness, summary.team_b_average_effectiveness] {
            let value = side.unwrap();
            assert!((0.0..=1.0).contains(&value), "{value}");
        }
    }

    #[test]
    fn test_average_effectiveness_ignores_ungraded_contacts() {
        let mut cfg = config(200);
        cfg.include_rallies = true;
        let summary = simulate_rally_batch(&cfg).unwrap();
        let rallies = summary.rallies.unwrap();

        let aces: Vec<&RallyResult> = rallies.iter().filter(|r| r.rally_length == 1).collect();
        for rally in aces {
            let serve = rally.events[0].effectiveness;
            assert_eq!(rally.average_effectiveness(rally.serving), serve);
            assert_eq!(rally.average_effectiveness(rally.serving.opponent()), None);
        }

        let long = rallies.iter().find(|r| r.rally_length >= 4).unwrap();
        for side in [TeamSide::A, TeamSide::B] {
            let graded: Vec<f64> = long
                .events
                .iter()
                .filter(|e| e.acting == side)
                .filter_map(|e| e.effectiveness)
                .collect();
            let expected = (!graded.is_empty()).then(|| graded.iter().sum::<f64>() / graded.len() as f64);
            assert_eq!(long.average_effectiveness(side), expected);
        }
    }

    #[test]
    fn test_rally_batch_bounds() {
        assert!(simulate_rally_batch(&config(0)).is_err());
        assert!(simulate_rally_batch(&config(MAX_RALLIES + 1)).is_err());
    }

    #[test]
    fn test_rally_batch_is_seeded() {
        let mut cfg = config(50);
        cfg.include_rallies = true;
        let first = simulate_rally_batch(&cfg).unwrap();
        let second = simulate_rally_batch(&cfg).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.rallies.as_ref().map(Vec::len), Some(50));
    }
}
