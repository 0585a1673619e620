//! Transition probability engine
//!
//! Turns two skill profiles plus the live rally context into an ordered,
//! normalized distribution over the next states. All functions are pure: the
//! same inputs always produce the same distribution, so everything here can be
//! tested without running a rally.
//!
//! Pipeline for one query:
//! 1. base weights from the acting/opponent profiles (`base_weights`)
//! 2. filter to `valid_next_states`, keeping table order
//! 3. contextual adjustment (momentum, pressure, fatigue of the acting side)
//! 4. normalize; an empty or degenerate total is an engine fault

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::context::RallyContext;
use super::rally_state::{is_positive_outcome, valid_next_states, RallyState, TeamSide};
use crate::error::EngineFault;
use crate::models::team::TeamStatisticsProfile;

/// Tolerance used when checking that a distribution sums to 1.
pub const SUM_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Constants
// ============================================================================

/// Every tunable constant of the probability model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbabilityConfig {
    /// Reception perfect/good/poor/error when the profile has no reception data.
    pub reception_fallback: [f64; 4],

    /// Setter skill modifier after a perfect/good/poor reception.
    pub set_reception_modifiers: [f64; 3],
    pub set_perfect_weight: f64,
    pub set_good_skill_weight: f64,
    pub set_good_base_weight: f64,
    pub set_poor_weight: f64,

    /// Attacker modifier after a perfect/good/poor set.
    pub attack_set_modifiers: [f64; 3],
    /// Share of the opponent's block-kill rate that turns into blocked attacks.
    pub block_share: f64,
    pub attack_in_play_floor: f64,

    pub dig_perfect_weight: f64,
    pub dig_good_weight: f64,
    pub dig_poor_skill_weight: f64,
    pub dig_poor_base_weight: f64,
    pub dig_error_weight: f64,

    /// transition-set / transition-attack after a controlled block.
    pub block_controlled_split: [f64; 2],
    /// dig-poor / dig-good / dig-error after a block touch.
    pub block_touch_split: [f64; 3],
    /// transition-set / transition-attack after a good dig.
    pub dig_good_split: [f64; 2],
    /// transition-attack / attack-error after a poor dig.
    pub dig_poor_split: [f64; 2],

    pub transition_kill_factor: f64,
    pub transition_error_factor: f64,
    pub transition_blocked_factor: f64,

    pub momentum_factor: f64,
    pub pressure_factor: f64,
    pub fatigue_factor: f64,
    /// Fraction of the adjustment applied (inversely) to non-positive outcomes.
    pub negative_adjustment_ratio: f64,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            reception_fallback: [0.40, 0.40, 0.15, 0.05],
            set_reception_modifiers: [1.0, 0.85, 0.60],
            set_perfect_weight: 0.40,
            set_good_skill_weight: 0.45,
            set_good_base_weight: 0.30,
            set_poor_weight: 0.60,
            attack_set_modifiers: [1.0, 0.85, 0.65],
            block_share: 0.30,
            attack_in_play_floor: 0.10,
            dig_perfect_weight: 0.20,
            dig_good_weight: 0.50,
            dig_poor_skill_weight: 0.25,
            dig_poor_base_weight: 0.40,
            dig_error_weight: 0.60,
            block_controlled_split: [0.8, 0.2],
            block_touch_split: [0.60, 0.25, 0.15],
            dig_good_split: [0.75, 0.25],
            dig_poor_split: [0.85, 0.15],
            transition_kill_factor: 0.7,
            transition_error_factor: 1.3,
            transition_blocked_factor: 1.2,
            momentum_factor: 0.15,
            pressure_factor: 0.10,
            fatigue_factor: 0.20,
            negative_adjustment_ratio: 0.5,
        }
    }
}

impl ProbabilityConfig {
    fn constants(&self) -> Vec<(&'static str, f64)> {
        let mut values = vec![
            ("set_perfect_weight", self.set_perfect_weight),
            ("set_good_skill_weight", self.set_good_skill_weight),
            ("set_good_base_weight", self.set_good_base_weight),
            ("set_poor_weight", self.set_poor_weight),
            ("block_share", self.block_share),
            ("attack_in_play_floor", self.attack_in_play_floor),
            ("dig_perfect_weight", self.dig_perfect_weight),
            ("dig_good_weight", self.dig_good_weight),
            ("dig_poor_skill_weight", self.dig_poor_skill_weight),
            ("dig_poor_base_weight", self.dig_poor_base_weight),
            ("dig_error_weight", self.dig_error_weight),
            ("transition_kill_factor", self.transition_kill_factor),
            ("transition_error_factor", self.transition_error_factor),
            ("transition_blocked_factor", self.transition_blocked_factor),
            ("momentum_factor", self.momentum_factor),
            ("pressure_factor", self.pressure_factor),
            ("fatigue_factor", self.fatigue_factor),
            ("negative_adjustment_ratio", self.negative_adjustment_ratio),
        ];
        values.extend(self.reception_fallback.iter().map(|v| ("reception_fallback", *v)));
        values.extend(self.set_reception_modifiers.iter().map(|v| ("set_reception_modifiers", *v)));
        values.extend(self.block_controlled_split.iter().map(|v| ("block_controlled_split", *v)));
        values.extend(self.block_touch_split.iter().map(|v| ("block_touch_split", *v)));
        values.extend(self.dig_good_split.iter().map(|v| ("dig_good_split", *v)));
        values.extend(self.dig_poor_split.iter().map(|v| ("dig_poor_split", *v)));
        values
    }

    /// Reject negative or non-finite constants. Attack modifiers must be
    /// strictly positive because the error rate is divided by them.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in self.constants() {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("probability.{name} must be finite and >= 0 (got {value})"));
            }
        }
        for value in self.attack_set_modifiers {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("probability.attack_set_modifiers must be > 0 (got {value})"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Distribution
// ============================================================================

/// Ordered `(next_state, probability)` pairs leaving `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDistribution {
    pub from: RallyState,
    pub entries: Vec<(RallyState, f64)>,
}

impl TransitionDistribution {
    pub fn probability(&self, state: RallyState) -> f64 {
        self.entries.iter().find(|(s, _)| *s == state).map(|(_, p)| *p).unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    pub fn states(&self) -> impl Iterator<Item = RallyState> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw one next state, returning it with its probability.
    ///
    /// Zero-weight entries are never drawn.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(RallyState, f64), EngineFault> {
        let empty = EngineFault::EmptyDistribution { state: self.from };
        let total = self.total();
        if !total.is_finite() || total <= 0.0 {
            return Err(empty);
        }

        let mut r = rng.gen::<f64>() * total;
        for &(state, p) in &self.entries {
            r -= p;
            if r < 0.0 {
                return Ok((state, p));
            }
        }
        // rounding left a remainder; settle on the last weighted entry
        self.entries.iter().rev().find(|(_, p)| *p > 0.0).copied().ok_or(empty)
    }
}

// ============================================================================
// Base weights per contact family
// ============================================================================

fn pct(value: f64) -> f64 {
    value / 100.0
}

fn serve_weights(server: &TeamStatisticsProfile) -> Vec<(RallyState, f64)> {
    let ace = pct(server.service_ace_percentage);
    let error = pct(server.service_error_percentage);
    vec![
        (RallyState::ServeAce, ace),
        (RallyState::ServeError, error),
        (RallyState::ServeInPlay, (1.0 - ace - error).max(0.0)),
    ]
}

fn reception_weights(
    cfg: &ProbabilityConfig,
    receiver: &TeamStatisticsProfile,
) -> Vec<(RallyState, f64)> {
    let [perfect, good, poor, error] = match receiver.reception_shares() {
        Some(s) => [s.perfect, s.good, s.poor, s.error],
        None => cfg.reception_fallback,
    };
    vec![
        (RallyState::ReceptionPerfect, perfect),
        (RallyState::ReceptionGood, good),
        (RallyState::ReceptionPoor, poor),
        (RallyState::ReceptionError, error),
    ]
}

fn set_weights(
    cfg: &ProbabilityConfig,
    setter: &TeamStatisticsProfile,
    reception: RallyState,
) -> Vec<(RallyState, f64)> {
    let [m_perfect, m_good, m_poor] = cfg.set_reception_modifiers;
    let modifier = match reception {
        RallyState::ReceptionPerfect => m_perfect,
        RallyState::ReceptionGood => m_good,
        _ => m_poor,
    };
    let skill = pct(setter.assist_percentage) * modifier;
    vec![
        (RallyState::SetPerfect, skill * cfg.set_perfect_weight),
        (
            RallyState::SetGood,
            skill * cfg.set_good_skill_weight + (1.0 - skill) * cfg.set_good_base_weight,
        ),
        (RallyState::SetPoor, (1.0 - skill) * cfg.set_poor_weight),
        (RallyState::SetError, pct(setter.ball_handling_error_percentage) * modifier),
    ]
}

/// Attack outcome weights: kill, blocked, in-play, error.
fn attack_weights(
    cfg: &ProbabilityConfig,
    attacker: &TeamStatisticsProfile,
    blocker: &TeamStatisticsProfile,
    set: RallyState,
) -> [f64; 4] {
    let [m_perfect, m_good, m_poor] = cfg.attack_set_modifiers;
    let modifier = match set {
        RallyState::SetPerfect => m_perfect,
        RallyState::SetGood => m_good,
        _ => m_poor,
    };
    let blocked = pct(blocker.block_kill_percentage) * cfg.block_share;
    let kill = pct(attacker.attack_kill_percentage) * modifier * (1.0 - blocked);
    let error = pct(attacker.attack_error_percentage) / modifier;
    let in_play = (1.0 - kill - blocked - error).max(cfg.attack_in_play_floor);
    [kill, blocked, in_play, error]
}

fn attack_entries([kill, blocked, in_play, error]: [f64; 4]) -> Vec<(RallyState, f64)> {
    vec![
        (RallyState::AttackKill, kill),
        (RallyState::AttackBlocked, blocked),
        (RallyState::AttackInPlay, in_play),
        (RallyState::AttackError, error),
    ]
}

fn transition_attack_weights(
    cfg: &ProbabilityConfig,
    attacker: &TeamStatisticsProfile,
    blocker: &TeamStatisticsProfile,
) -> Vec<(RallyState, f64)> {
    let [kill, blocked, in_play, error] =
        attack_weights(cfg, attacker, blocker, RallyState::SetPoor);
    let total = kill + blocked + in_play + error;
    let kill = kill / total * cfg.transition_kill_factor;
    let blocked = blocked / total * cfg.transition_blocked_factor;
    let error = error / total * cfg.transition_error_factor;
    let in_play = (1.0 - kill - blocked - error).max(cfg.attack_in_play_floor);
    attack_entries([kill, blocked, in_play, error])
}

fn dig_weights(cfg: &ProbabilityConfig, digger: &TeamStatisticsProfile) -> Vec<(RallyState, f64)> {
    let skill = pct(digger.dig_percentage);
    vec![
        (RallyState::DigPerfect, skill * cfg.dig_perfect_weight),
        (RallyState::DigGood, skill * cfg.dig_good_weight),
        (
            RallyState::DigPoor,
            skill * cfg.dig_poor_skill_weight + (1.0 - skill) * cfg.dig_poor_base_weight,
        ),
        (RallyState::DigError, (1.0 - skill) * cfg.dig_error_weight),
    ]
}

fn block_outcome_weights(blocker: &TeamStatisticsProfile) -> Vec<(RallyState, f64)> {
    let kill = pct(blocker.block_kill_percentage);
    let controlled = pct(blocker.controlled_block_percentage);
    let error = pct(blocker.blocking_error_percentage);
    vec![
        (RallyState::BlockKill, kill),
        (RallyState::BlockControlled, controlled),
        (RallyState::BlockTouch, (1.0 - kill - controlled - error).max(0.0)),
        (RallyState::BlockError, error),
    ]
}

/// Unfiltered, unadjusted weights for the contact following `state`.
///
/// `acting` makes that contact, `opponent` is the other side (the blocker
/// when `acting` attacks). States with no rule yield an empty list.
pub fn base_weights(
    cfg: &ProbabilityConfig,
    state: RallyState,
    acting: &TeamStatisticsProfile,
    opponent: &TeamStatisticsProfile,
) -> Vec<(RallyState, f64)> {
    use RallyState::*;
    match state {
        ServeReady => serve_weights(acting),
        ServeInPlay => reception_weights(cfg, acting),
        ReceptionPerfect | ReceptionGood | ReceptionPoor => set_weights(cfg, acting, state),
        SetPerfect | SetGood | SetPoor => {
            attack_entries(attack_weights(cfg, acting, opponent, state))
        }
        AttackInPlay => dig_weights(cfg, acting),
        AttackBlocked => block_outcome_weights(acting),
        BlockControlled => {
            let [set, attack] = cfg.block_controlled_split;
            vec![(TransitionSet, set), (TransitionAttack, attack)]
        }
        BlockTouch => {
            let [poor, good, error] = cfg.block_touch_split;
            vec![(DigPoor, poor), (DigGood, good), (DigError, error)]
        }
        DigPerfect => vec![(TransitionSet, 1.0)],
        DigGood => {
            let [set, attack] = cfg.dig_good_split;
            vec![(TransitionSet, set), (TransitionAttack, attack)]
        }
        DigPoor => {
            let [attack, error] = cfg.dig_poor_split;
            vec![(TransitionAttack, attack), (AttackError, error)]
        }
        TransitionSet | TransitionAttack => transition_attack_weights(cfg, acting, opponent),
        _ => Vec::new(),
    }
}

// ============================================================================
// Contextual adjustment
// ============================================================================

/// Combined momentum/pressure/fatigue adjustment for the acting side.
#[inline]
pub fn contextual_adjustment(
    cfg: &ProbabilityConfig,
    context: &RallyContext,
    acting_side: TeamSide,
) -> f64 {
    context.momentum_for(acting_side) * cfg.momentum_factor
        - context.pressure * cfg.pressure_factor
        - context.fatigue_of(acting_side) * cfg.fatigue_factor
}

/// Scale factor applied to one state's weight for a given adjustment.
#[inline]
pub fn adjustment_scale(cfg: &ProbabilityConfig, state: RallyState, adjustment: f64) -> f64 {
    if is_positive_outcome(state) {
        1.0 + adjustment
    } else {
        1.0 - adjustment * cfg.negative_adjustment_ratio
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ProbabilityEngine {
    config: ProbabilityConfig,
}

impl ProbabilityEngine {
    pub fn new(config: ProbabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbabilityConfig {
        &self.config
    }

    /// Normalized distribution over the states that may follow `state`.
    ///
    /// `acting_profile` belongs to `acting_side`, the side making the next
    /// contact. Fails with `EmptyDistribution` when no valid successor carries
    /// weight.
    pub fn distribution(
        &self,
        state: RallyState,
        context: &RallyContext,
        acting_side: TeamSide,
        acting_profile: &TeamStatisticsProfile,
        opponent_profile: &TeamStatisticsProfile,
    ) -> Result<TransitionDistribution, EngineFault> {
        let valid = valid_next_states(state);
        if valid.is_empty() {
            return Err(EngineFault::EmptyDistribution { state });
        }

        let base = base_weights(&self.config, state, acting_profile, opponent_profile);
        let adjustment = contextual_adjustment(&self.config, context, acting_side);

        let mut entries: Vec<(RallyState, f64)> = valid
            .iter()
            .filter_map(|next| {
                base.iter().find(|(s, _)| s == next).map(|(s, w)| {
                    (*s, (w * adjustment_scale(&self.config, *s, adjustment)).max(0.0))
                })
            })
            .collect();

        let total: f64 = entries.iter().map(|(_, p)| p).sum();
        if entries.is_empty() || !total.is_finite() || total <= 0.0 {
            return Err(EngineFault::EmptyDistribution { state });
        }
        for (_, p) in entries.iter_mut() {
            *p /= total;
        }

        Ok(TransitionDistribution { from: state, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn profile(level: f64) -> TeamStatisticsProfile {
        TeamStatisticsProfile::from_skill_level("Team", level)
    }

    fn neutral() -> RallyContext {
        RallyContext::new(TeamSide::A)
    }

    fn assert_normalized(dist: &TransitionDistribution) {
        assert!((dist.total() - 1.0).abs() < SUM_TOLERANCE, "{dist:?}");
        assert!(dist.entries.iter().all(|(_, p)| *p >= 0.0));
    }

    #[test]
    fn test_every_continuation_state_yields_normalized_distribution() {
        let engine = ProbabilityEngine::default();
        let (a, b) = (profile(0.7), profile(0.4));
        for state in RallyState::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let dist = engine.distribution(state, &neutral(), TeamSide::A, &a, &b).unwrap();
            assert_normalized(&dist);
            for next in dist.states() {
                assert!(valid_next_states(state).contains(&next), "{state} -> {next}");
            }
        }
    }

    #[test]
    fn test_terminal_state_is_a_fault() {
        let engine = ProbabilityEngine::default();
        let err = engine
            .distribution(RallyState::AttackKill, &neutral(), TeamSide::A, &profile(0.5), &profile(0.5))
            .unwrap_err();
        assert_eq!(err, EngineFault::EmptyDistribution { state: RallyState::AttackKill });
    }

    #[test]
    fn test_serve_probabilities_follow_profile() {
        let engine = ProbabilityEngine::default();
        let mut server = profile(0.5);
        server.service_ace_percentage = 10.0;
        server.service_error_percentage = 5.0;
        let dist = engine
            .distribution(RallyState::ServeReady, &neutral(), TeamSide::A, &server, &profile(0.5))
            .unwrap();
        assert!((dist.probability(RallyState::ServeAce) - 0.10).abs() < 1e-9);
        assert!((dist.probability(RallyState::ServeError) - 0.05).abs() < 1e-9);
        assert!((dist.probability(RallyState::ServeInPlay) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_reception_uses_acting_profile() {
        let engine = ProbabilityEngine::default();
        let mut receiver = profile(0.5);
        receiver.perfect_pass_percentage = 50.0;
        receiver.good_pass_percentage = 30.0;
        receiver.poor_pass_percentage = 15.0;
        receiver.reception_error_percentage = 5.0;
        let dist = engine
            .distribution(RallyState::ServeInPlay, &neutral(), TeamSide::B, &receiver, &profile(0.1))
            .unwrap();
        assert!((dist.probability(RallyState::ReceptionPerfect) - 0.50).abs() < 1e-9);
        assert!((dist.probability(RallyState::ReceptionError) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_reception_fallback_when_all_zero() {
        let cfg = ProbabilityConfig::default();
        let mut receiver = profile(0.5);
        receiver.perfect_pass_percentage = 0.0;
        receiver.good_pass_percentage = 0.0;
        receiver.poor_pass_percentage = 0.0;
        receiver.reception_error_percentage = 0.0;
        let weights = base_weights(&cfg, RallyState::ServeInPlay, &receiver, &profile(0.5));
        let values: Vec<f64> = weights.iter().map(|(_, w)| *w).collect();
        assert_eq!(values, vec![0.40, 0.40, 0.15, 0.05]);
    }

    #[test]
    fn test_poor_set_never_yields_kill() {
        let engine = ProbabilityEngine::default();
        let dist = engine
            .distribution(RallyState::SetPoor, &neutral(), TeamSide::A, &profile(1.0), &profile(0.1))
            .unwrap();
        assert_eq!(dist.probability(RallyState::AttackKill), 0.0);
        assert!(!dist.states().any(|s| s == RallyState::AttackKill));
        assert_normalized(&dist);
    }

    #[test]
    fn test_block_controlled_filters_to_transition_set() {
        let engine = ProbabilityEngine::default();
        let dist = engine
            .distribution(RallyState::BlockControlled, &neutral(), TeamSide::A, &profile(0.5), &profile(0.5))
            .unwrap();
        assert_eq!(dist.entries, vec![(RallyState::TransitionSet, 1.0)]);
    }

    #[test]
    fn test_poor_dig_has_no_transition_set_weight() {
        let engine = ProbabilityEngine::default();
        let dist = engine
            .distribution(RallyState::DigPoor, &neutral(), TeamSide::A, &profile(0.5), &profile(0.5))
            .unwrap();
        let states: Vec<_> = dist.states().collect();
        assert_eq!(states, vec![RallyState::TransitionAttack, RallyState::AttackError]);
        assert!((dist.probability(RallyState::TransitionAttack) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_opponent_block_raises_blocked_share() {
        let cfg = ProbabilityConfig::default();
        let attacker = profile(0.7);
        let weak = profile(0.1);
        let mut strong = profile(0.1);
        strong.block_kill_percentage = 60.0;
        let [_, blocked_weak, _, _] = attack_weights(&cfg, &attacker, &weak, RallyState::SetGood);
        let [_, blocked_strong, _, _] =
            attack_weights(&cfg, &attacker, &strong, RallyState::SetGood);
        assert!(blocked_strong > blocked_weak);
        assert!((blocked_strong - 0.18).abs() < 1e-9);
    }

    #[test]
    fn test_transition_attack_is_less_effective() {
        let engine = ProbabilityEngine::default();
        let (a, b) = (profile(0.8), profile(0.5));
        let set = engine.distribution(RallyState::SetPoor, &neutral(), TeamSide::A, &a, &b).unwrap();
        let transition =
            engine.distribution(RallyState::TransitionSet, &neutral(), TeamSide::A, &a, &b).unwrap();
        assert!(transition.probability(RallyState::AttackError) > set.probability(RallyState::AttackError));
        assert!(transition.probability(RallyState::AttackKill) > 0.0);
    }

    #[test]
    fn test_momentum_boosts_positive_outcomes_for_acting_side() {
        let engine = ProbabilityEngine::default();
        let (a, b) = (profile(0.6), profile(0.6));
        let flat = engine.distribution(RallyState::SetGood, &neutral(), TeamSide::A, &a, &b).unwrap();
        let hot = neutral().with_momentum(1.0);

        let for_a = engine.distribution(RallyState::SetGood, &hot, TeamSide::A, &a, &b).unwrap();
        let for_b = engine.distribution(RallyState::SetGood, &hot, TeamSide::B, &a, &b).unwrap();
        assert!(for_a.probability(RallyState::AttackKill) > flat.probability(RallyState::AttackKill));
        assert!(for_b.probability(RallyState::AttackKill) < flat.probability(RallyState::AttackKill));
    }

    #[test]
    fn test_pressure_and_fatigue_penalize() {
        let cfg = ProbabilityConfig::default();
        let ctx = neutral().with_pressure(1.0).with_fatigue(0.0, 1.0);
        assert!((contextual_adjustment(&cfg, &ctx, TeamSide::A) + 0.10).abs() < 1e-12);
        assert!((contextual_adjustment(&cfg, &ctx, TeamSide::B) + 0.30).abs() < 1e-12);
        assert!((adjustment_scale(&cfg, RallyState::AttackKill, -0.3) - 0.7).abs() < 1e-12);
        assert!((adjustment_scale(&cfg, RallyState::AttackError, -0.3) - 1.15).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_distribution_is_a_fault() {
        let mut cfg = ProbabilityConfig::default();
        cfg.block_controlled_split = [0.0, 1.0];
        let engine = ProbabilityEngine::new(cfg);
        let err = engine
            .distribution(RallyState::BlockControlled, &neutral(), TeamSide::A, &profile(0.5), &profile(0.5))
            .unwrap_err();
        assert_eq!(err.state(), RallyState::BlockControlled);
    }

    #[test]
    fn test_sampling_is_seed_deterministic() {
        let engine = ProbabilityEngine::default();
        let dist = engine
            .distribution(RallyState::ServeInPlay, &neutral(), TeamSide::B, &profile(0.5), &profile(0.5))
            .unwrap();
        let draw = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..20).map(|_| dist.sample(&mut rng).unwrap().0).collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
    }

    #[test]
    fn test_zero_weight_entries_are_never_drawn() {
        let dist = TransitionDistribution {
            from: RallyState::ServeReady,
            entries: vec![
                (RallyState::ServeError, 0.0),
                (RallyState::ServeAce, 1.0),
                (RallyState::ServeInPlay, 0.0),
            ],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..500 {
            assert_eq!(dist.sample(&mut rng).unwrap(), (RallyState::ServeAce, 1.0));
        }

        let empty = TransitionDistribution { from: RallyState::DigGood, entries: Vec::new() };
        assert!(empty.sample(&mut rng).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(ProbabilityConfig::default().validate().is_ok());
        let mut cfg = ProbabilityConfig::default();
        cfg.momentum_factor = f64::NAN;
        assert!(cfg.validate().is_err());
        let mut cfg = ProbabilityConfig::default();
        cfg.attack_set_modifiers[2] = 0.0;
        assert!(cfg.validate().is_err());
    }
}
