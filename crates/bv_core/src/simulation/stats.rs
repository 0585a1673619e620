//! Statistics helpers
//!
//! Normal-approximation confidence intervals for win probabilities and the
//! match-level report built from a set of completed matches.

use serde::{Deserialize, Serialize};

use crate::engine::rally_state::TeamSide;
use crate::models::match_result::MatchResult;

/// z-score for a two-sided 95% interval.
pub const Z_95: f64 = 1.96;

/// A batch estimate is significant when its worst-case margin is below this.
pub const BATCH_SIGNIFICANCE_MARGIN: f64 = 0.05;

/// Match-level reports use a looser threshold on the observed-p margin.
pub const MATCH_SIGNIFICANCE_MARGIN: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}

/// Margin of error for an observed proportion `p` over `n` trials.
pub fn observed_margin(p: f64, n: u32) -> f64 {
    if n == 0 {
        return 1.0;
    }
    Z_95 * (p * (1.0 - p) / f64::from(n)).sqrt()
}

/// Margin of error assuming the worst-case variance (p = 0.5).
pub fn worst_case_margin(n: u32) -> f64 {
    observed_margin(0.5, n)
}

/// 95% interval around the observed `p`, clamped to [0, 1].
pub fn confidence_interval(p: f64, n: u32) -> ConfidenceInterval {
    let margin = observed_margin(p, n);
    ConfidenceInterval { lower: (p - margin).max(0.0), upper: (p + margin).min(1.0) }
}

/// Match-level summary over a set of completed matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStatistics {
    pub total_matches: u32,
    pub team_a_wins: u32,
    pub team_b_wins: u32,
    pub team_a_win_probability: f64,
    pub team_b_win_probability: f64,
    pub confidence_interval: ConfidenceInterval,
    pub margin_of_error: f64,
    pub is_significant: bool,

    pub straight_set_wins_a: u32,
    pub straight_set_wins_b: u32,
    pub three_set_matches: u32,

    pub average_sets: f64,
    pub average_rallies_per_set: f64,
    pub average_rally_length: f64,
    pub longest_rally: u32,
    pub shortest_rally: u32,
}

/// Build the match-level report. `None` when `matches` is empty.
pub fn match_statistics(matches: &[MatchResult]) -> Option<MatchStatistics> {
    if matches.is_empty() {
        return None;
    }
    let n = matches.len() as u32;
    let wins = |side| matches.iter().filter(|m| m.winner == side).count() as u32;
    let straight = |side| {
        matches.iter().filter(|m| m.winner == side && m.is_straight_sets()).count() as u32
    };

    let team_a_wins = wins(TeamSide::A);
    let p = f64::from(team_a_wins) / f64::from(n);
    let margin = observed_margin(p, n);

    let total_sets: u32 = matches.iter().map(|m| m.sets_played()).sum();
    let total_rallies: u32 = matches.iter().map(|m| m.total_rallies).sum();
    let total_contacts: u32 = matches.iter().map(|m| m.total_contacts).sum();

    Some(MatchStatistics {
        total_matches: n,
        team_a_wins,
        team_b_wins: n - team_a_wins,
        team_a_win_probability: p,
        team_b_win_probability: 1.0 - p,
        confidence_interval: confidence_interval(p, n),
        margin_of_error: margin,
        is_significant: margin < MATCH_SIGNIFICANCE_MARGIN,
        straight_set_wins_a: straight(TeamSide::A),
        straight_set_wins_b: straight(TeamSide::B),
        three_set_matches: matches.iter().filter(|m| m.sets_played() == 3).count() as u32,
        average_sets: f64::from(total_sets) / f64::from(n),
        average_rallies_per_set: if total_sets == 0 {
            0.0
        } else {
            f64::from(total_rallies) / f64::from(total_sets)
        },
        average_rally_length: if total_rallies == 0 {
            0.0
        } else {
            f64::from(total_contacts) / f64::from(total_rallies)
        },
        longest_rally: matches.iter().map(|m| m.longest_rally()).max().unwrap_or(0),
        shortest_rally: matches.iter().map(|m| m.shortest_rally()).min().unwrap_or(0),
    })
}
