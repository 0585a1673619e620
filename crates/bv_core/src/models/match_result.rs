//! Set and match results
//!
//! Built once by the composer and frozen. Match totals are always recomputed
//! from the sets so the two can never disagree.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::rally::RallyResult;
use crate::engine::rally_state::TeamSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    /// First to 21, win by 2.
    Regular,
    /// Third set of a best-of-3: first to 15, win by 2.
    Deciding,
}

impl SetType {
    pub const WIN_MARGIN: u32 = 2;

    pub fn target(self) -> u32 {
        match self {
            SetType::Regular => 21,
            SetType::Deciding => 15,
        }
    }

    /// Winner of a set at this score, if it is over.
    pub fn winner(self, score_a: u32, score_b: u32) -> Option<TeamSide> {
        let target = self.target();
        if score_a >= target && score_a >= score_b + Self::WIN_MARGIN {
            Some(TeamSide::A)
        } else if score_b >= target && score_b >= score_a + Self::WIN_MARGIN {
            Some(TeamSide::B)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFormat {
    BestOfOne,
    #[default]
    BestOfThree,
}

impl MatchFormat {
    pub fn sets_to_win(self) -> u32 {
        match self {
            MatchFormat::BestOfOne => 1,
            MatchFormat::BestOfThree => 2,
        }
    }

    pub fn max_sets(self) -> u32 {
        self.sets_to_win() * 2 - 1
    }

    /// Type of set `set_number` (1-based) under this format.
    pub fn set_type(self, set_number: u32) -> SetType {
        if self == MatchFormat::BestOfThree && set_number == 3 {
            SetType::Deciding
        } else {
            SetType::Regular
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetResult {
    pub set_number: u32,
    pub set_type: SetType,
    pub first_server: TeamSide,
    pub winner: TeamSide,
    pub score_a: u32,
    pub score_b: u32,
    /// Completed rallies (one per point).
    pub rallies_played: u32,
    /// Rallies that faulted and were replayed.
    pub faulted_rallies: u32,

    pub total_contacts: u32,
    pub longest_rally: u32,
    pub shortest_rally: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rallies: Option<Vec<RallyResult>>,
}

impl SetResult {
    pub fn average_rally_length(&self) -> f64 {
        if self.rallies_played == 0 {
            0.0
        } else {
            f64::from(self.total_contacts) / f64::from(self.rallies_played)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: Uuid,
    /// Trial index inside a batch (0 for a standalone match).
    pub trial: u32,
    pub format: MatchFormat,
    pub first_server: TeamSide,
    pub winner: TeamSide,
    pub sets: Vec<SetResult>,

    pub sets_won_a: u32,
    pub sets_won_b: u32,
    pub total_points_a: u32,
    pub total_points_b: u32,
    pub total_rallies: u32,
    pub faulted_rallies: u32,
    pub total_contacts: u32,
}

impl MatchResult {
    /// Assemble a result, recomputing every total from `sets`.
    pub fn from_sets(
        id: Uuid,
        trial: u32,
        format: MatchFormat,
        first_server: TeamSide,
        winner: TeamSide,
        sets: Vec<SetResult>,
    ) -> Self {
        let won = |side| sets.iter().filter(|s| s.winner == side).count() as u32;
        Self {
            id,
            trial,
            format,
            first_server,
            winner,
            sets_won_a: won(TeamSide::A),
            sets_won_b: won(TeamSide::B),
            total_points_a: sets.iter().map(|s| s.score_a).sum(),
            total_points_b: sets.iter().map(|s| s.score_b).sum(),
            total_rallies: sets.iter().map(|s| s.rallies_played).sum(),
            faulted_rallies: sets.iter().map(|s| s.faulted_rallies).sum(),
            total_contacts: sets.iter().map(|s| s.total_contacts).sum(),
            sets,
        }
    }

    /// Set score from A's point of view: "2-0", "2-1", "1-2", "0-2", "1-0", "0-1".
    pub fn outcome_shape(&self) -> String {
        format!("{}-{}", self.sets_won_a, self.sets_won_b)
    }

    pub fn sets_played(&self) -> u32 {
        self.sets.len() as u32
    }

    pub fn is_straight_sets(&self) -> bool {
        self.sets_won_a == 0 || self.sets_won_b == 0
    }

    pub fn average_rally_length(&self) -> f64 {
        if self.total_rallies == 0 {
            0.0
        } else {
            f64::from(self.total_contacts) / f64::from(self.total_rallies)
        }
    }

    pub fn longest_rally(&self) -> u32 {
        self.sets.iter().map(|s| s.longest_rally).max().unwrap_or(0)
    }

    pub fn shortest_rally(&self) -> u32 {
        self.sets
            .iter()
            .filter(|s| s.rallies_played > 0)
            .map(|s| s.shortest_rally)
            .min()
            .unwrap_or(0)
    }
}
