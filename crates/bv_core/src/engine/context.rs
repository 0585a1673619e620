//! Live rally context
//!
//! A `RallyContext` is rebuilt for every transition (`with_*` methods return a
//! new value). The composer seeds momentum, pressure and fatigue at the start
//! of a rally; the simulator only moves state, length, momentum and pressure.

use serde::{Deserialize, Serialize};

use super::rally_state::{RallyState, TeamSide};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RallyContext {
    pub current_state: RallyState,
    pub serving: TeamSide,
    /// Transitions taken so far in this rally.
    pub rally_length: u32,

    pub score_a: u32,
    pub score_b: u32,
    pub set_number: u32,

    /// -1.0 ..= 1.0, positive favours A.
    pub momentum: f64,
    /// 0.0 ..= 1.0
    pub pressure: f64,
    /// 0.0 ..= 1.0 per side
    pub fatigue_a: f64,
    pub fatigue_b: f64,
}

impl RallyContext {
    /// Neutral context at serve-ready for the given server.
    pub fn new(serving: TeamSide) -> Self {
        Self {
            current_state: RallyState::ServeReady,
            serving,
            rally_length: 0,
            score_a: 0,
            score_b: 0,
            set_number: 1,
            momentum: 0.0,
            pressure: 0.0,
            fatigue_a: 0.0,
            fatigue_b: 0.0,
        }
    }

    pub fn with_score(mut self, score_a: u32, score_b: u32, set_number: u32) -> Self {
        self.score_a = score_a;
        self.score_b = score_b;
        self.set_number = set_number;
        self
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum.clamp(-1.0, 1.0);
        self
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = pressure.clamp(0.0, 1.0);
        self
    }

    pub fn with_fatigue(mut self, fatigue_a: f64, fatigue_b: f64) -> Self {
        self.fatigue_a = fatigue_a.clamp(0.0, 1.0);
        self.fatigue_b = fatigue_b.clamp(0.0, 1.0);
        self
    }

    /// Context after one transition into `next`.
    pub fn advanced(&self, next: RallyState, momentum: f64, pressure: f64) -> Self {
        Self {
            current_state: next,
            rally_length: self.rally_length + 1,
            momentum: momentum.clamp(-1.0, 1.0),
            pressure: pressure.clamp(0.0, 1.0),
            ..*self
        }
    }

    #[inline]
    pub fn receiving(&self) -> TeamSide {
        self.serving.opponent()
    }

    /// Momentum seen from `side`'s point of view.
    #[inline]
    pub fn momentum_for(&self, side: TeamSide) -> f64 {
        self.momentum * side.sign()
    }

    #[inline]
    pub fn fatigue_of(&self, side: TeamSide) -> f64 {
        match side {
            TeamSide::A => self.fatigue_a,
            TeamSide::B => self.fatigue_b,
        }
    }

    pub fn score_of(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::A => self.score_a,
            TeamSide::B => self.score_b,
        }
    }

    pub fn is_close_score(&self, threshold: u32) -> bool {
        self.score_a.abs_diff(self.score_b) <= threshold
    }

    /// Either side within two points of a regular-set target.
    pub fn is_critical_point(&self) -> bool {
        self.score_a >= 19 || self.score_b >= 19
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advanced_is_a_fresh_value() {
        let ctx = RallyContext::new(TeamSide::A).with_score(5, 7, 2).with_fatigue(0.2, 0.4);
        let next = ctx.advanced(RallyState::ServeInPlay, 0.5, 0.0);

        assert_eq!(ctx.rally_length, 0);
        assert_eq!(ctx.current_state, RallyState::ServeReady);
        assert_eq!(next.rally_length, 1);
        assert_eq!(next.current_state, RallyState::ServeInPlay);
        assert_eq!(next.score_b, 7);
        assert_eq!(next.fatigue_b, 0.4);
    }

    #[test]
    fn test_scalars_are_clamped() {
        let ctx = RallyContext::new(TeamSide::B)
            .with_momentum(3.0)
            .with_pressure(-1.0)
            .with_fatigue(1.5, -0.5);
        assert_eq!(ctx.momentum, 1.0);
        assert_eq!(ctx.pressure, 0.0);
        assert_eq!(ctx.fatigue_a, 1.0);
        assert_eq!(ctx.fatigue_b, 0.0);

        let next = ctx.advanced(RallyState::ServeAce, -2.0, 4.0);
        assert_eq!(next.momentum, -1.0);
        assert_eq!(next.pressure, 1.0);
    }

    #[test]
    fn test_momentum_is_signed_per_side() {
        let ctx = RallyContext::new(TeamSide::A).with_momentum(0.4);
        assert_eq!(ctx.momentum_for(TeamSide::A), 0.4);
        assert_eq!(ctx.momentum_for(TeamSide::B), -0.4);
        assert_eq!(ctx.receiving(), TeamSide::B);
    }

    #[test]
    fn test_score_helpers() {
        let ctx = RallyContext::new(TeamSide::A).with_score(19, 17, 1);
        assert!(ctx.is_critical_point());
        assert!(ctx.is_close_score(2));
        assert!(!ctx.is_close_score(1));
        assert_eq!(ctx.score_of(TeamSide::B), 17);
    }
}
