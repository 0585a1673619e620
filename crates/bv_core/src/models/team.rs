use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::engine::rally_state::TeamSide;
use crate::error::{Result, SimError};

/// Skill record for one team. All percentages are on a 0-100 scale.
///
/// Profiles are supplied once and shared read-only across every trial of a
/// batch; nothing in the engine mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_percentage_totals", skip_on_field_errors = false))]
pub struct TeamStatisticsProfile {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    // Serve
    #[validate(range(min = 0.0, max = 100.0))]
    pub service_ace_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub service_error_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub serve_success_rate: f64,

    // Reception
    #[validate(range(min = 0.0, max = 100.0))]
    pub perfect_pass_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub good_pass_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub poor_pass_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub reception_error_percentage: f64,

    // Setting
    #[validate(range(min = 0.0, max = 100.0))]
    pub assist_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub ball_handling_error_percentage: f64,

    // Attack
    #[validate(range(min = 0.0, max = 100.0))]
    pub attack_kill_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub attack_error_percentage: f64,
    /// (kills - errors) / attempts
    #[validate(range(min = -1.0, max = 1.0))]
    pub hitting_efficiency: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub first_ball_kill_percentage: f64,

    // Defense
    #[validate(range(min = 0.0, max = 100.0))]
    pub dig_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub block_kill_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub controlled_block_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub blocking_error_percentage: f64,
}

/// Reception outcome shares, renormalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceptionShares {
    pub perfect: f64,
    pub good: f64,
    pub poor: f64,
    pub error: f64,
}

impl TeamStatisticsProfile {
    fn numeric_fields(&self) -> [f64; 17] {
        [
            self.service_ace_percentage,
            self.service_error_percentage,
            self.serve_success_rate,
            self.perfect_pass_percentage,
            self.good_pass_percentage,
            self.poor_pass_percentage,
            self.reception_error_percentage,
            self.assist_percentage,
            self.ball_handling_error_percentage,
            self.attack_kill_percentage,
            self.attack_error_percentage,
            self.hitting_efficiency,
            self.first_ball_kill_percentage,
            self.dig_percentage,
            self.block_kill_percentage,
            self.controlled_block_percentage,
            self.blocking_error_percentage,
        ]
    }

    /// Sum of the four reception percentages.
    pub fn reception_total(&self) -> f64 {
        self.perfect_pass_percentage
            + self.good_pass_percentage
            + self.poor_pass_percentage
            + self.reception_error_percentage
    }

    /// Reception percentages divided by their sum. `None` when all are zero.
    pub fn reception_shares(&self) -> Option<ReceptionShares> {
        let total = self.reception_total();
        if total <= 0.0 {
            return None;
        }
        Some(ReceptionShares {
            perfect: self.perfect_pass_percentage / total,
            good: self.good_pass_percentage / total,
            poor: self.poor_pass_percentage / total,
            error: self.reception_error_percentage / total,
        })
    }

    /// Validate and map any violation to `SimError::InvalidProfile`.
    ///
    /// `team` labels the profile in the error ("team_a", "team_b").
    pub fn check(&self, team: &str) -> Result<()> {
        self.validate().map_err(|errors| SimError::InvalidProfile {
            team: team.to_string(),
            reason: errors.to_string(),
        })
    }

    /// Parse a profile from JSON. Validation is left to `check`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Synthesize a consistent profile from a single skill level in 0.1..=1.0.
    ///
    /// Used for quick simulations, the CLI, tests and benches. Out-of-range
    /// levels are clamped.
    pub fn from_skill_level(name: impl Into<String>, skill_level: f64) -> Self {
        let s = skill_level.clamp(0.1, 1.0);
        let inv = 1.0 - s;

        let mut perfect = s * 35.0;
        let mut good = s * 30.0 + inv * 25.0;
        let mut poor = inv * 30.0;
        let mut error = inv * 15.0;
        let total = perfect + good + poor + error;
        if total > 0.0 {
            perfect = perfect / total * 100.0;
            good = good / total * 100.0;
            poor = poor / total * 100.0;
            error = error / total * 100.0;
        }

        Self {
            name: name.into(),
            service_ace_percentage: s * 8.0,
            service_error_percentage: inv * 12.0,
            serve_success_rate: s * 60.0,
            perfect_pass_percentage: perfect,
            good_pass_percentage: good,
            poor_pass_percentage: poor,
            reception_error_percentage: error,
            assist_percentage: s * 45.0,
            ball_handling_error_percentage: inv * 8.0,
            attack_kill_percentage: s * 35.0,
            attack_error_percentage: inv * 15.0,
            hitting_efficiency: s * 0.6 - 0.1,
            first_ball_kill_percentage: s * 25.0,
            dig_percentage: s * 70.0,
            block_kill_percentage: s * 12.0,
            controlled_block_percentage: s * 25.0,
            blocking_error_percentage: inv * 8.0,
        }
    }
}

/// The two profiles of a simulation, shared read-only between workers.
#[derive(Debug, Clone)]
pub struct Matchup {
    pub team_a: Arc<TeamStatisticsProfile>,
    pub team_b: Arc<TeamStatisticsProfile>,
}

impl Matchup {
    pub fn new(team_a: TeamStatisticsProfile, team_b: TeamStatisticsProfile) -> Self {
        Self { team_a: Arc::new(team_a), team_b: Arc::new(team_b) }
    }

    pub fn profile(&self, side: TeamSide) -> &TeamStatisticsProfile {
        match side {
            TeamSide::A => &self.team_a,
            TeamSide::B => &self.team_b,
        }
    }

    pub fn check(&self) -> Result<()> {
        self.team_a.check("team_a")?;
        self.team_b.check("team_b")
    }
}

fn validate_percentage_totals(
    profile: &TeamStatisticsProfile,
) -> std::result::Result<(), ValidationError> {
    if profile.numeric_fields().iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::new("non_finite_value"));
    }
    if profile.service_ace_percentage + profile.service_error_percentage > 100.0 {
        return Err(ValidationError::new("serve_total_exceeds_100"));
    }
    if profile.attack_kill_percentage + profile.attack_error_percentage > 100.0 {
        return Err(ValidationError::new("attack_total_exceeds_100"));
    }
    let reception = profile.reception_total();
    if !(95.0..=105.0).contains(&reception) {
        return Err(ValidationError::new("reception_total_out_of_range"));
    }
    Ok(())
}
