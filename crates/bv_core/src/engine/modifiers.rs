//! Contextual modifiers
//!
//! Momentum, pressure and fatigue as seen by the probability engine. The
//! simulator moves momentum and pressure inside a rally; the composer seeds
//! each rally from the score, the recent winners and the accumulated fatigue.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::rally::RallyResult;
use super::rally_state::{RallyState, TeamSide};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierConfig {
    /// Momentum swing for an ace, kill or block kill.
    pub winning_shot_momentum: f64,
    /// Momentum swing for a perfect reception or set.
    pub quality_contact_momentum: f64,
    /// Momentum lost by the side that errs.
    pub error_momentum: f64,

    /// Rally length after which pressure starts to build.
    pub rally_pressure_start: u32,
    pub rally_pressure_step: f64,

    /// Fraction of the set target at which score pressure kicks in.
    pub score_pressure_threshold: f64,
    pub score_pressure_scale: f64,
    pub server_behind_pressure: f64,

    /// Number of recent rallies averaged into starting momentum.
    pub momentum_window: usize,

    pub fatigue_per_contact: f64,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            winning_shot_momentum: 0.3,
            quality_contact_momentum: 0.1,
            error_momentum: 0.3,
            rally_pressure_start: 10,
            rally_pressure_step: 0.1,
            score_pressure_threshold: 0.8,
            score_pressure_scale: 5.0,
            server_behind_pressure: 0.2,
            momentum_window: 3,
            fatigue_per_contact: 0.004,
        }
    }
}

impl ModifierConfig {
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("winning_shot_momentum", self.winning_shot_momentum),
            ("quality_contact_momentum", self.quality_contact_momentum),
            ("error_momentum", self.error_momentum),
            ("rally_pressure_step", self.rally_pressure_step),
            ("score_pressure_threshold", self.score_pressure_threshold),
            ("score_pressure_scale", self.score_pressure_scale),
            ("server_behind_pressure", self.server_behind_pressure),
            ("fatigue_per_contact", self.fatigue_per_contact),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("modifiers.{name} must be finite and >= 0 (got {value})"));
            }
        }
        if self.momentum_window == 0 {
            return Err("modifiers.momentum_window must be at least 1".to_string());
        }
        Ok(())
    }

    /// Momentum change caused by `acting` producing `state`, in A's frame.
    pub fn momentum_delta(&self, state: RallyState, acting: TeamSide) -> f64 {
        let delta = if state.is_winning_shot() {
            self.winning_shot_momentum
        } else if matches!(state, RallyState::ReceptionPerfect | RallyState::SetPerfect) {
            self.quality_contact_momentum
        } else if state.is_error() {
            -self.error_momentum
        } else {
            0.0
        };
        delta * acting.sign()
    }

    /// Pressure after a transition that brought the rally to `rally_length`.
    ///
    /// Pressure never drops inside a rally.
    pub fn rally_pressure(&self, rally_length: u32, current: f64) -> f64 {
        if rally_length <= self.rally_pressure_start {
            return current;
        }
        let built = (self.rally_pressure_step
            * f64::from(rally_length - self.rally_pressure_start))
        .min(1.0);
        current.max(built)
    }

    /// Starting pressure for a rally, from the live score.
    ///
    /// The result is a single scalar shared by both sides, so the bump for a
    /// trailing server also dampens the leading receiver's contacts.
    pub fn score_pressure(&self, score_a: u32, score_b: u32, target: u32, server: TeamSide) -> f64 {
        let leading = f64::from(score_a.max(score_b));
        let ratio = leading / f64::from(target.max(1));
        let mut pressure = if ratio > self.score_pressure_threshold {
            ((ratio - self.score_pressure_threshold) * self.score_pressure_scale).min(1.0)
        } else {
            0.0
        };

        let (own, other) = match server {
            TeamSide::A => (score_a, score_b),
            TeamSide::B => (score_b, score_a),
        };
        if own < other {
            pressure += self.server_behind_pressure;
        }
        pressure.clamp(0.0, 1.0)
    }

    /// (A wins - B wins) / n over the last `momentum_window` winners.
    pub fn recent_momentum(&self, recent_winners: &[TeamSide]) -> f64 {
        let start = recent_winners.len().saturating_sub(self.momentum_window);
        let window = &recent_winners[start..];
        if window.is_empty() {
            return 0.0;
        }
        let net: f64 = window.iter().map(|side| side.sign()).sum();
        (net / window.len() as f64).clamp(-1.0, 1.0)
    }
}

/// Which contextual effects are active for a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub momentum: bool,
    pub pressure: bool,
    pub fatigue: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self { momentum: true, pressure: true, fatigue: true }
    }
}

impl FeatureToggles {
    /// Pure profile-vs-profile model with no contextual effects.
    pub fn none() -> Self {
        Self { momentum: false, pressure: false, fatigue: false }
    }
}

// ============================================================================
// Per-set state carried between rallies
// ============================================================================

/// Bounded history of rally winners inside one set. A zero capacity keeps
/// nothing.
#[derive(Debug, Clone)]
pub struct MomentumWindow {
    winners: VecDeque<TeamSide>,
    capacity: usize,
}

impl MomentumWindow {
    pub fn new(capacity: usize) -> Self {
        Self { winners: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, winner: TeamSide) {
        if self.capacity == 0 {
            return;
        }
        if self.winners.len() == self.capacity {
            self.winners.pop_front();
        }
        self.winners.push_back(winner);
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }

    pub fn momentum(&self, config: &ModifierConfig) -> f64 {
        let winners: Vec<TeamSide> = self.winners.iter().copied().collect();
        config.recent_momentum(&winners)
    }
}

/// Accumulated fatigue per side; reset at the start of each set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueState {
    pub team_a: f64,
    pub team_b: f64,
}

impl FatigueState {
    pub fn after_rally(self, result: &RallyResult, config: &ModifierConfig) -> Self {
        Self {
            team_a: (self.team_a + f64::from(result.team_a_actions) * config.fatigue_per_contact)
                .clamp(0.0, 1.0),
            team_b: (self.team_b + f64::from(result.team_b_actions) * config.fatigue_per_contact)
                .clamp(0.0, 1.0),
        }
    }
}
