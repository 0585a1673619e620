//! Set and match composer
//!
//! Sequences rallies under the scoring rules: side-out serving inside a set,
//! alternating first server between sets, regular sets to 21 and a deciding
//! set to 15 (both win by 2). Contextual modifiers are seeded here before each
//! rally from the live score, the recent winners and accumulated fatigue.

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::RallyContext;
use super::modifiers::{FatigueState, FeatureToggles, MomentumWindow};
use super::rally::RallySimulator;
use super::rally_state::TeamSide;
use crate::error::{EngineFault, Result, SimError};
use crate::models::match_result::{MatchFormat, MatchResult, SetResult, SetType};
use crate::models::team::Matchup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Consecutive faulted rallies tolerated before a set is abandoned.
    pub max_consecutive_faults: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self { max_consecutive_faults: 10 }
    }
}

/// Per-call options for sets and matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    pub toggles: FeatureToggles,
    /// Keep every rally result on the set.
    pub retain_rallies: bool,
    /// Server of set 1; a coin toss when absent.
    pub first_server: Option<TeamSide>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchSimulator {
    rally: RallySimulator,
    config: ComposerConfig,
}

struct LengthSummary {
    total: u32,
    longest: u32,
    shortest: Option<u32>,
}

impl MatchSimulator {
    pub fn new(rally: RallySimulator, config: ComposerConfig) -> Self {
        Self { rally, config }
    }

    pub fn rally_simulator(&self) -> &RallySimulator {
        &self.rally
    }

    /// Play one set to completion.
    ///
    /// A faulted rally awards no point and is replayed by the same server.
    /// More than `max_consecutive_faults` faults in a row abort the set.
    pub fn simulate_set<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        set_number: u32,
        set_type: SetType,
        first_server: TeamSide,
        matchup: &Matchup,
        options: &MatchOptions,
    ) -> Result<SetResult> {
        let rally = self.rally.clone().with_toggles(options.toggles);
        let modifiers = rally.modifiers();
        let toggles = options.toggles;
        let target = set_type.target();

        let (mut score_a, mut score_b) = (0u32, 0u32);
        let mut server = first_server;
        let mut window = MomentumWindow::new(modifiers.momentum_window);
        let mut fatigue = FatigueState::default();
        let mut lengths = LengthSummary { total: 0, longest: 0, shortest: None };
        let mut rallies_played = 0u32;
        let mut faulted_rallies = 0u32;
        let mut consecutive_faults = 0u32;
        let mut retained = options.retain_rallies.then(Vec::new);

        let winner = loop {
            if let Some(winner) = set_type.winner(score_a, score_b) {
                break winner;
            }

            let mut context = RallyContext::new(server).with_score(score_a, score_b, set_number);
            if toggles.momentum {
                context = context.with_momentum(window.momentum(modifiers));
            }
            if toggles.pressure {
                context =
                    context.with_pressure(modifiers.score_pressure(score_a, score_b, target, server));
            }
            if toggles.fatigue {
                context = context.with_fatigue(fatigue.team_a, fatigue.team_b);
            }

            let result = rally.simulate_rally(rng, context, &matchup.team_a, &matchup.team_b);

            match result.winner {
                Some(point_to) => {
                    consecutive_faults = 0;
                    rallies_played += 1;
                    match point_to {
                        TeamSide::A => score_a += 1,
                        TeamSide::B => score_b += 1,
                    }
                    lengths.total += result.rally_length;
                    lengths.longest = lengths.longest.max(result.rally_length);
                    lengths.shortest =
                        Some(lengths.shortest.map_or(result.rally_length, |s| s.min(result.rally_length)));
                    window.push(point_to);
                    fatigue = fatigue.after_rally(&result, modifiers);
                    server = point_to;
                }
                None => {
                    faulted_rallies += 1;
                    consecutive_faults += 1;
                    if consecutive_faults > self.config.max_consecutive_faults {
                        let fault = result
                            .fault
                            .unwrap_or(EngineFault::EmptyDistribution { state: result.final_state });
                        warn!(
                            "set {} abandoned after {} consecutive faulted rallies at {}-{}",
                            set_number, consecutive_faults, score_a, score_b
                        );
                        return Err(SimError::EngineFault(fault));
                    }
                }
            }

            if let Some(rallies) = retained.as_mut() {
                rallies.push(result);
            }
        };

        debug!(
            "set {} ({:?}) won by {} {}-{} in {} rallies",
            set_number, set_type, winner, score_a, score_b, rallies_played
        );

        Ok(SetResult {
            set_number,
            set_type,
            first_server,
            winner,
            score_a,
            score_b,
            rallies_played,
            faulted_rallies,
            total_contacts: lengths.total,
            longest_rally: lengths.longest,
            shortest_rally: lengths.shortest.unwrap_or(0),
            rallies: retained,
        })
    }

    /// Play a full match. `trial` is recorded on the result; all randomness,
    /// including the match id, comes from `rng`.
    pub fn simulate_match<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        trial: u32,
        matchup: &Matchup,
        format: MatchFormat,
        options: &MatchOptions,
    ) -> Result<MatchResult> {
        let id = match_id(rng);
        let first_server = match options.first_server {
            Some(side) => side,
            None if rng.gen::<bool>() => TeamSide::A,
            None => TeamSide::B,
        };

        let to_win = format.sets_to_win();
        let (mut won_a, mut won_b) = (0u32, 0u32);
        let mut sets = Vec::with_capacity(format.max_sets() as usize);
        let mut set_number = 1;

        while won_a < to_win && won_b < to_win {
            let server = if set_number % 2 == 1 { first_server } else { first_server.opponent() };
            let set = self.simulate_set(
                rng,
                set_number,
                format.set_type(set_number),
                server,
                matchup,
                options,
            )?;
            match set.winner {
                TeamSide::A => won_a += 1,
                TeamSide::B => won_b += 1,
            }
            sets.push(set);
            set_number += 1;
        }

        let winner = if won_a >= to_win { TeamSide::A } else { TeamSide::B };
        Ok(MatchResult::from_sets(id, trial, format, first_server, winner, sets))
    }
}

/// Random v4 id drawn from `rng`, so seeded runs reproduce their ids.
pub fn match_id<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::modifiers::ModifierConfig;
    use crate::engine::probability::ProbabilityConfig;
    use crate::engine::rally::RallyConfig;
    use crate::models::team::TeamStatisticsProfile;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn matchup(a: f64, b: f64) -> Matchup {
        Matchup::new(
            TeamStatisticsProfile::from_skill_level("Team A", a),
            TeamStatisticsProfile::from_skill_level("Team B", b),
        )
    }

    #[test]
    fn test_set_ends_at_target_with_margin() {
        let sim = MatchSimulator::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for seed in 0..20u64 {
            let mut rng_set = ChaCha8Rng::seed_from_u64(seed);
            let set = sim
                .simulate_set(&mut rng_set, 1, SetType::Regular, TeamSide::A, &matchup(0.6, 0.6), &MatchOptions::default())
                .unwrap();
            let (hi, lo) = (set.score_a.max(set.score_b), set.score_a.min(set.score_b));
            assert!(hi >= 21 && hi - lo >= 2);
            assert!(hi == 21 || hi - lo == 2, "overtime sets end exactly two clear");
            assert_eq!(set.rallies_played, set.score_a + set.score_b);
        }
        let set = sim
            .simulate_set(&mut rng, 3, SetType::Deciding, TeamSide::B, &matchup(0.6, 0.6), &MatchOptions::default())
            .unwrap();
        let hi = set.score_a.max(set.score_b);
        assert!(hi >= 15 && (hi == 15 || set.score_a.abs_diff(set.score_b) == 2));
    }

    #[test]
    fn test_best_of_one_plays_one_set() {
        let sim = MatchSimulator::default();
        for seed in 0..10u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let result = sim
                .simulate_match(&mut rng, 0, &matchup(0.7, 0.5), MatchFormat::BestOfOne, &MatchOptions::default())
                .unwrap();
            assert_eq!(result.sets.len(), 1);
            assert_eq!(result.sets[0].set_type, SetType::Regular);
        }
    }

    #[test]
    fn test_best_of_three_deciding_set_only_after_split() {
        let sim = MatchSimulator::default();
        for seed in 0..30u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let result = sim
                .simulate_match(&mut rng, seed as u32, &matchup(0.6, 0.6), MatchFormat::BestOfThree, &MatchOptions::default())
                .unwrap();
            assert!(matches!(result.sets.len(), 2 | 3));
            if result.sets.len() == 3 {
                assert_ne!(result.sets[0].winner, result.sets[1].winner);
                assert_eq!(result.sets[2].set_type, SetType::Deciding);
            } else {
                assert_eq!(result.sets[0].winner, result.sets[1].winner);
            }
            assert_eq!(result.trial, seed as u32);
        }
    }

    #[test]
    fn test_first_server_alternates_between_sets() {
        let sim = MatchSimulator::default();
        let options = MatchOptions { first_server: Some(TeamSide::B), ..MatchOptions::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(77);
        let result = sim
            .simulate_match(&mut rng, 0, &matchup(0.6, 0.6), MatchFormat::BestOfThree, &options)
            .unwrap();
        assert_eq!(result.first_server, TeamSide::B);
        assert_eq!(result.sets[0].first_server, TeamSide::B);
        assert_eq!(result.sets[1].first_server, TeamSide::A);
    }

    #[test]
    fn test_rally_winner_serves_next() {
        let sim = MatchSimulator::default();
        let options = MatchOptions { retain_rallies: true, ..MatchOptions::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let set = sim
            .simulate_set(&mut rng, 1, SetType::Regular, TeamSide::A, &matchup(0.6, 0.5), &options)
            .unwrap();
        let rallies = set.rallies.as_ref().unwrap();
        assert_eq!(rallies[0].serving, TeamSide::A);
        for pair in rallies.windows(2) {
            assert_eq!(Some(pair[1].serving), pair[0].winner);
        }
    }

    #[test]
    fn test_same_seed_same_match() {
        let sim = MatchSimulator::default();
        let run = || {
            let mut rng = ChaCha8Rng::seed_from_u64(2024);
            sim.simulate_match(&mut rng, 0, &matchup(0.6, 0.55), MatchFormat::BestOfThree, &MatchOptions::default())
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_persistent_faults_abort_set() {
        let rally = RallySimulator::new(
            ProbabilityConfig::default(),
            ModifierConfig::default(),
            RallyConfig { max_transitions: 1 },
        );
        let sim = MatchSimulator::new(rally, ComposerConfig { max_consecutive_faults: 3 });
        let mut never_ends = TeamStatisticsProfile::from_skill_level("Team", 0.5);
        never_ends.service_ace_percentage = 0.0;
        never_ends.service_error_percentage = 0.0;
        let matchup = Matchup::new(never_ends.clone(), never_ends);

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = sim
            .simulate_set(&mut rng, 1, SetType::Regular, TeamSide::A, &matchup, &MatchOptions::default())
            .unwrap_err();
        assert!(matches!(err, SimError::EngineFault(EngineFault::IterationCap { .. })));
    }
}
