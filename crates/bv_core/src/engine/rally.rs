//! Rally simulator
//!
//! Drives one point from serve-ready to a terminal state by repeatedly asking
//! the probability engine for the next distribution and sampling it. The acting
//! side of every contact comes from the possession rules, so the profile used
//! for each query always belongs to the side actually touching the ball.

use std::collections::BTreeMap;

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::context::RallyContext;
use super::modifiers::{FeatureToggles, ModifierConfig};
use super::possession::{next_acting_side, possession_divergences, PossessionDivergence};
use super::probability::{ProbabilityConfig, ProbabilityEngine};
use super::rally_state::{action_type, effectiveness, ActionType, RallyState, TeamSide};
use crate::error::EngineFault;
use crate::models::team::TeamStatisticsProfile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RallyConfig {
    /// Transitions allowed before a rally is declared faulty.
    pub max_transitions: u32,
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self { max_transitions: 100 }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOutcome {
    TeamAWin,
    TeamBWin,
    /// The rally faulted; no point is awarded.
    Error,
}

impl PointOutcome {
    pub fn for_winner(winner: TeamSide) -> Self {
        match winner {
            TeamSide::A => PointOutcome::TeamAWin,
            TeamSide::B => PointOutcome::TeamBWin,
        }
    }
}

/// One contact in a rally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RallyEvent {
    /// 1-based position in the rally.
    pub sequence: u32,
    pub state: RallyState,
    pub action: ActionType,
    pub acting: TeamSide,
    /// Probability with which `state` was sampled.
    pub probability: f64,
    pub effectiveness: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RallyResult {
    pub winner: Option<TeamSide>,
    pub outcome: PointOutcome,
    pub rally_length: u32,
    pub serving: TeamSide,
    pub events: Vec<RallyEvent>,
    pub final_state: RallyState,
    pub team_a_actions: u32,
    pub team_b_actions: u32,
    /// Product of every sampled transition probability.
    pub path_probability: f64,
    pub final_context: RallyContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<EngineFault>,
}

impl RallyResult {
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Events per action category.
    pub fn event_summary(&self) -> BTreeMap<ActionType, u32> {
        let mut summary = BTreeMap::new();
        for event in &self.events {
            *summary.entry(event.action).or_insert(0) += 1;
        }
        summary
    }

    /// Mean effectiveness of the contacts made by `side`, ignoring contacts
    /// with no quality grade.
    pub fn average_effectiveness(&self, side: TeamSide) -> Option<f64> {
        let graded: Vec<f64> = self
            .events
            .iter()
            .filter(|e| e.acting == side)
            .filter_map(|e| e.effectiveness)
            .collect();
        if graded.is_empty() {
            None
        } else {
            Some(graded.iter().sum::<f64>() / graded.len() as f64)
        }
    }

    pub fn possession_divergences(&self) -> Vec<PossessionDivergence> {
        possession_divergences(&self.events, self.serving)
    }
}

/// Winner implied by the terminal event of a rally.
pub fn resolve_winner(terminal: &RallyEvent, server: TeamSide) -> TeamSide {
    match terminal.state {
        RallyState::ServeAce => server,
        s if s.is_winning_shot() => terminal.acting,
        _ => terminal.acting.opponent(),
    }
}

// ============================================================================
// Simulator
// ============================================================================

struct Trace {
    context: RallyContext,
    events: Vec<RallyEvent>,
    path_probability: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RallySimulator {
    probability: ProbabilityEngine,
    modifiers: ModifierConfig,
    config: RallyConfig,
    toggles: FeatureToggles,
}

impl RallySimulator {
    pub fn new(
        probability: ProbabilityConfig,
        modifiers: ModifierConfig,
        config: RallyConfig,
    ) -> Self {
        Self {
            probability: ProbabilityEngine::new(probability),
            modifiers,
            config,
            toggles: FeatureToggles::default(),
        }
    }

    pub fn with_toggles(mut self, toggles: FeatureToggles) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn toggles(&self) -> FeatureToggles {
        self.toggles
    }

    pub fn modifiers(&self) -> &ModifierConfig {
        &self.modifiers
    }

    /// Play one point from serve-ready.
    ///
    /// `initial` supplies the server, the score and the starting momentum,
    /// pressure and fatigue; its state and length are reset. Engine faults end
    /// the rally with `PointOutcome::Error` and no winner.
    pub fn simulate_rally<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        initial: RallyContext,
        team_a: &TeamStatisticsProfile,
        team_b: &TeamStatisticsProfile,
    ) -> RallyResult {
        let server = initial.serving;
        let mut trace = Trace {
            context: RallyContext {
                current_state: RallyState::ServeReady,
                rally_length: 0,
                ..initial
            },
            events: Vec::new(),
            path_probability: 1.0,
        };

        let fault = self.drive(rng, &mut trace, team_a, team_b).err();
        let winner = match (&fault, trace.events.last()) {
            (None, Some(last)) => Some(resolve_winner(last, server)),
            _ => None,
        };
        let outcome = winner.map_or(PointOutcome::Error, PointOutcome::for_winner);

        if let Some(fault) = &fault {
            warn!("rally faulted after {} transitions: {}", trace.events.len(), fault);
        } else {
            debug!(
                "rally complete: {:?} after {} contacts ({})",
                outcome,
                trace.events.len(),
                trace.context.current_state
            );
        }

        let team_a_actions = trace.events.iter().filter(|e| e.acting == TeamSide::A).count() as u32;
        RallyResult {
            winner,
            outcome,
            rally_length: trace.events.len() as u32,
            serving: server,
            team_a_actions,
            team_b_actions: trace.events.len() as u32 - team_a_actions,
            final_state: trace.context.current_state,
            path_probability: trace.path_probability,
            final_context: trace.context,
            events: trace.events,
            fault,
        }
    }

    fn drive<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        trace: &mut Trace,
        team_a: &TeamStatisticsProfile,
        team_b: &TeamStatisticsProfile,
    ) -> Result<(), EngineFault> {
        let server = trace.context.serving;
        while !trace.context.current_state.is_terminal() {
            let state = trace.context.current_state;
            if trace.events.len() as u32 >= self.config.max_transitions {
                return Err(EngineFault::IterationCap {
                    state,
                    transitions: self.config.max_transitions,
                });
            }

            let acting = next_acting_side(&trace.events, server)
                .ok_or(EngineFault::EmptyDistribution { state })?;
            let (acting_profile, opponent_profile) = match acting {
                TeamSide::A => (team_a, team_b),
                TeamSide::B => (team_b, team_a),
            };

            let distribution = self.probability.distribution(
                state,
                &trace.context,
                acting,
                acting_profile,
                opponent_profile,
            )?;
            let (next, probability) = distribution.sample(rng)?;

            trace.events.push(RallyEvent {
                sequence: trace.events.len() as u32 + 1,
                state: next,
                action: action_type(state, next),
                acting,
                probability,
                effectiveness: effectiveness(next),
            });
            trace.path_probability *= probability;

            let ctx = &trace.context;
            let momentum = if self.toggles.momentum {
                ctx.momentum + self.modifiers.momentum_delta(next, acting)
            } else {
                ctx.momentum
            };
            let pressure = if self.toggles.pressure {
                self.modifiers.rally_pressure(ctx.rally_length + 1, ctx.pressure)
            } else {
                ctx.pressure
            };
            trace.context = ctx.advanced(next, momentum, pressure);
        }
        Ok(())
    }

    /// Play `count` independent rallies from a neutral context, alternating the
    /// server starting with `first_server`.
    pub fn simulate_rallies<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: u32,
        first_server: TeamSide,
        team_a: &TeamStatisticsProfile,
        team_b: &TeamStatisticsProfile,
    ) -> Vec<RallyResult> {
        (0..count)
            .map(|i| {
                let server = if i % 2 == 0 { first_server } else { first_server.opponent() };
                self.simulate_rally(rng, RallyContext::new(server), team_a, team_b)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::modifiers::FatigueState;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn profile(level: f64) -> TeamStatisticsProfile {
        TeamStatisticsProfile::from_skill_level("Team", level)
    }

    fn no_serve_points(level: f64) -> TeamStatisticsProfile {
        let mut p = profile(level);
        p.service_ace_percentage = 0.0;
        p.service_error_percentage = 0.0;
        p
    }

    #[test]
    fn test_rally_terminates_with_winner() {
        let sim = RallySimulator::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let (a, b) = (profile(0.7), profile(0.6));
        for _ in 0..200 {
            let result = sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::A), &a, &b);
            assert!(result.fault.is_none());
            assert!(result.winner.is_some());
            assert!(result.final_state.is_terminal());
            assert_eq!(result.rally_length as usize, result.events.len());
            assert_eq!(result.team_a_actions + result.team_b_actions, result.rally_length);
            assert!(result.possession_divergences().is_empty());
        }
    }

    #[test]
    fn test_same_seed_same_rally() {
        let sim = RallySimulator::default();
        let (a, b) = (profile(0.5), profile(0.5));
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::B), &a, &b)
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn test_certain_ace() {
        let sim = RallySimulator::default();
        let mut server = profile(0.5);
        server.service_ace_percentage = 100.0;
        server.service_error_percentage = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::B), &profile(0.5), &server);
        assert_eq!(result.rally_length, 1);
        assert_eq!(result.final_state, RallyState::ServeAce);
        assert_eq!(result.winner, Some(TeamSide::B));
        assert_eq!(result.outcome, PointOutcome::TeamBWin);
    }

    #[test]
    fn test_reception_error_awards_server() {
        let sim = RallySimulator::default().with_toggles(FeatureToggles::none());
        let server = no_serve_points(0.5);
        let mut receiver = profile(0.5);
        receiver.perfect_pass_percentage = 0.0;
        receiver.good_pass_percentage = 0.0;
        receiver.poor_pass_percentage = 0.0;
        receiver.reception_error_percentage = 100.0;

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let result = sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::A), &server, &receiver);
        assert_eq!(result.final_state, RallyState::ReceptionError);
        assert_eq!(result.events[1].acting, TeamSide::B);
        assert_eq!(result.winner, Some(TeamSide::A));
    }

    #[test]
    fn test_iteration_cap_faults_rally() {
        let sim = RallySimulator::new(
            ProbabilityConfig::default(),
            ModifierConfig::default(),
            RallyConfig { max_transitions: 1 },
        );
        let (a, b) = (no_serve_points(0.5), profile(0.5));
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let result = sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::A), &a, &b);
        assert_eq!(result.outcome, PointOutcome::Error);
        assert_eq!(result.winner, None);
        assert_eq!(
            result.fault,
            Some(EngineFault::IterationCap { state: RallyState::ServeInPlay, transitions: 1 })
        );
    }

    #[test]
    fn test_resolve_winner_by_terminal_family() {
        let event = |state, acting| RallyEvent {
            sequence: 1,
            state,
            action: state.action_type(),
            acting,
            probability: 1.0,
            effectiveness: effectiveness(state),
        };
        use RallyState::*;
        assert_eq!(resolve_winner(&event(ServeAce, TeamSide::A), TeamSide::A), TeamSide::A);
        assert_eq!(resolve_winner(&event(AttackKill, TeamSide::B), TeamSide::A), TeamSide::B);
        assert_eq!(resolve_winner(&event(BlockKill, TeamSide::A), TeamSide::B), TeamSide::A);
        for error in [ServeError, ReceptionError, SetError, AttackError, DigError, BlockError] {
            assert_eq!(resolve_winner(&event(error, TeamSide::A), TeamSide::A), TeamSide::B, "{error}");
        }
    }

    #[test]
    fn test_momentum_follows_events() {
        let sim = RallySimulator::default();
        let mut server = profile(0.5);
        server.service_ace_percentage = 100.0;
        server.service_error_percentage = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let result = sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::B), &profile(0.5), &server);
        assert!((result.final_context.momentum + 0.3).abs() < 1e-12);

        let flat = RallySimulator::default().with_toggles(FeatureToggles::none());
        let result = flat.simulate_rally(&mut rng, RallyContext::new(TeamSide::B), &profile(0.5), &server);
        assert_eq!(result.final_context.momentum, 0.0);
    }

    #[test]
    fn test_rallies_alternate_server() {
        let sim = RallySimulator::default();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let results = sim.simulate_rallies(&mut rng, 6, TeamSide::B, &profile(0.6), &profile(0.6));
        let servers: Vec<_> = results.iter().map(|r| r.serving).collect();
        use TeamSide::*;
        assert_eq!(servers, vec![B, A, B, A, B, A]);
    }

    #[test]
    fn test_fatigue_accumulates_from_contacts() {
        let sim = RallySimulator::default();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let result = sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::A), &profile(0.6), &profile(0.6));
        let cfg = ModifierConfig::default();
        let fatigue = FatigueState::default().after_rally(&result, &cfg);
        assert!((fatigue.team_a - f64::from(result.team_a_actions) * 0.004).abs() < 1e-12);
        assert!((fatigue.team_b - f64::from(result.team_b_actions) * 0.004).abs() < 1e-12);
    }

    #[test]
    fn test_event_summary_counts_actions() {
        let sim = RallySimulator::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let result = sim.simulate_rally(&mut rng, RallyContext::new(TeamSide::A), &profile(0.6), &profile(0.6));
        let summary = result.event_summary();
        assert_eq!(summary.values().sum::<u32>(), result.rally_length);
        assert_eq!(summary.get(&ActionType::Serve), Some(&1));
    }
}
