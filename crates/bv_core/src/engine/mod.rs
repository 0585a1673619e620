//! Rally engine
//!
//! Leaves first: the state vocabulary and possession rules, the live context,
//! the probability engine and modifiers, then the rally simulator and the
//! set/match composer built on top of it.

pub mod context;
pub mod match_sim;
pub mod modifiers;
pub mod possession;
pub mod probability;
pub mod rally;
pub mod rally_state;

pub use context::RallyContext;
pub use match_sim::{ComposerConfig, MatchOptions, MatchSimulator};
pub use modifiers::{FatigueState, FeatureToggles, ModifierConfig, MomentumWindow};
pub use possession::{
    next_acting_side, possession_after, possession_divergences, static_acting_side, Possession,
    PossessionDivergence,
};
pub use probability::{ProbabilityConfig, ProbabilityEngine, TransitionDistribution};
pub use rally::{PointOutcome, RallyConfig, RallyEvent, RallyResult, RallySimulator};
pub use rally_state::{
    action_type, effectiveness, is_continuation, is_positive_outcome, is_terminal,
    valid_next_states, ActionType, RallyState, TeamSide,
};
