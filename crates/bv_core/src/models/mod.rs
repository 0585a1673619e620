pub mod match_result;
pub mod team;

pub use match_result::{MatchFormat, MatchResult, SetResult, SetType};
pub use team::{Matchup, ReceptionShares, TeamStatisticsProfile};
