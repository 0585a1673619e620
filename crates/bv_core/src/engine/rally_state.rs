//! Rally state vocabulary
//!
//! Static description of every contact outcome in a rally, which outcomes end
//! the rally, and which states may follow which. Everything here is pure and
//! table driven so the probability engine and the simulator share one source
//! of truth.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Sides
// ============================================================================

/// One of the two teams on court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TeamSide {
    A,
    B,
}

impl TeamSide {
    #[inline]
    pub fn opponent(self) -> TeamSide {
        match self {
            TeamSide::A => TeamSide::B,
            TeamSide::B => TeamSide::A,
        }
    }

    /// +1.0 for A, -1.0 for B. Momentum is stored in A's frame.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            TeamSide::A => 1.0,
            TeamSide::B => -1.0,
        }
    }
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TeamSide::A => write!(f, "A"),
            TeamSide::B => write!(f, "B"),
        }
    }
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RallyState {
    // Serve
    ServeReady,
    ServeAce,
    ServeError,
    ServeInPlay,

    // Reception
    ReceptionPerfect,
    ReceptionGood,
    ReceptionPoor,
    ReceptionError,

    // Setting
    SetPerfect,
    SetGood,
    SetPoor,
    SetError,

    // Attack
    AttackKill,
    AttackError,
    AttackInPlay,
    AttackBlocked,

    // Defense
    DigPerfect,
    DigGood,
    DigPoor,
    DigError,

    // Block
    BlockKill,
    BlockControlled,
    BlockError,
    BlockTouch,

    // Transition
    TransitionAttack,
    TransitionSet,
}

/// Contact family an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Serve,
    Reception,
    Set,
    Attack,
    Dig,
    Block,
    Transition,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Serve => "serve",
            ActionType::Reception => "reception",
            ActionType::Set => "set",
            ActionType::Attack => "attack",
            ActionType::Dig => "dig",
            ActionType::Block => "block",
            ActionType::Transition => "transition",
        }
    }
}

impl RallyState {
    pub const ALL: [RallyState; 26] = [
        RallyState::ServeReady,
        RallyState::ServeAce,
        RallyState::ServeError,
        RallyState::ServeInPlay,
        RallyState::ReceptionPerfect,
        RallyState::ReceptionGood,
        RallyState::ReceptionPoor,
        RallyState::ReceptionError,
        RallyState::SetPerfect,
        RallyState::SetGood,
        RallyState::SetPoor,
        RallyState::SetError,
        RallyState::AttackKill,
        RallyState::AttackError,
        RallyState::AttackInPlay,
        RallyState::AttackBlocked,
        RallyState::DigPerfect,
        RallyState::DigGood,
        RallyState::DigPoor,
        RallyState::DigError,
        RallyState::BlockKill,
        RallyState::BlockControlled,
        RallyState::BlockError,
        RallyState::BlockTouch,
        RallyState::TransitionAttack,
        RallyState::TransitionSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RallyState::ServeReady => "serve_ready",
            RallyState::ServeAce => "serve_ace",
            RallyState::ServeError => "serve_error",
            RallyState::ServeInPlay => "serve_in_play",
            RallyState::ReceptionPerfect => "reception_perfect",
            RallyState::ReceptionGood => "reception_good",
            RallyState::ReceptionPoor => "reception_poor",
            RallyState::ReceptionError => "reception_error",
            RallyState::SetPerfect => "set_perfect",
            RallyState::SetGood => "set_good",
            RallyState::SetPoor => "set_poor",
            RallyState::SetError => "set_error",
            RallyState::AttackKill => "attack_kill",
            RallyState::AttackError => "attack_error",
            RallyState::AttackInPlay => "attack_in_play",
            RallyState::AttackBlocked => "attack_blocked",
            RallyState::DigPerfect => "dig_perfect",
            RallyState::DigGood => "dig_good",
            RallyState::DigPoor => "dig_poor",
            RallyState::DigError => "dig_error",
            RallyState::BlockKill => "block_kill",
            RallyState::BlockControlled => "block_controlled",
            RallyState::BlockError => "block_error",
            RallyState::BlockTouch => "block_touch",
            RallyState::TransitionAttack => "transition_attack",
            RallyState::TransitionSet => "transition_set",
        }
    }

    /// Contact family of this state.
    pub fn action_type(&self) -> ActionType {
        use RallyState::*;
        match self {
            ServeReady | ServeAce | ServeError | ServeInPlay => ActionType::Serve,
            ReceptionPerfect | ReceptionGood | ReceptionPoor | ReceptionError => {
                ActionType::Reception
            }
            SetPerfect | SetGood | SetPoor | SetError => ActionType::Set,
            AttackKill | AttackError | AttackInPlay | AttackBlocked => ActionType::Attack,
            DigPerfect | DigGood | DigPoor | DigError => ActionType::Dig,
            BlockKill | BlockControlled | BlockError | BlockTouch => ActionType::Block,
            TransitionAttack | TransitionSet => ActionType::Transition,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        is_terminal(*self)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        use RallyState::*;
        matches!(
            self,
            ServeError | ReceptionError | SetError | AttackError | DigError | BlockError
        )
    }

    /// Outcomes that end the rally in favour of the acting side.
    #[inline]
    pub fn is_winning_shot(&self) -> bool {
        matches!(self, RallyState::ServeAce | RallyState::AttackKill | RallyState::BlockKill)
    }
}

impl fmt::Display for RallyState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Terminal states end the rally and decide the point.
pub fn is_terminal(state: RallyState) -> bool {
    use RallyState::*;
    matches!(
        state,
        ServeAce
            | ServeError
            | ReceptionError
            | SetError
            | AttackKill
            | AttackError
            | DigError
            | BlockKill
            | BlockError
    )
}

/// Continuation states keep the ball alive. `ServeReady` is the start state and
/// belongs to neither class.
pub fn is_continuation(state: RallyState) -> bool {
    state != RallyState::ServeReady && !is_terminal(state)
}

/// States whose probability is boosted by a positive contextual adjustment.
pub fn is_positive_outcome(state: RallyState) -> bool {
    use RallyState::*;
    matches!(
        state,
        ServeAce | AttackKill | BlockKill | ReceptionPerfect | SetPerfect | DigPerfect
    )
}

/// Contact quality recorded on an event.
pub fn effectiveness(state: RallyState) -> Option<f64> {
    use RallyState::*;
    match state {
        ServeAce | AttackKill | BlockKill | ReceptionPerfect | SetPerfect | DigPerfect => {
            Some(1.0)
        }
        ReceptionGood | SetGood | DigGood | BlockControlled | AttackInPlay => Some(0.75),
        ReceptionPoor | SetPoor | DigPoor | BlockTouch | AttackBlocked => Some(0.25),
        s if s.is_error() => Some(0.0),
        _ => None,
    }
}

/// Action category for the transition `from -> to`.
///
/// The outcome of `ServeReady` is always a serve; everything else is
/// categorized by the family of the resulting state.
pub fn action_type(from: RallyState, to: RallyState) -> ActionType {
    if from == RallyState::ServeReady {
        ActionType::Serve
    } else {
        to.action_type()
    }
}

// ============================================================================
// Transition table
// ============================================================================

use self::RallyState as S;

const FROM_SERVE_READY: &[RallyState] = &[S::ServeAce, S::ServeError, S::ServeInPlay];
const FROM_SERVE_IN_PLAY: &[RallyState] =
    &[S::ReceptionPerfect, S::ReceptionGood, S::ReceptionPoor, S::ReceptionError];
const FROM_RECEPTION_PERFECT: &[RallyState] = &[S::SetPerfect, S::SetGood, S::SetError];
const FROM_RECEPTION_GOOD: &[RallyState] = &[S::SetPerfect, S::SetGood, S::SetPoor, S::SetError];
const FROM_RECEPTION_POOR: &[RallyState] = &[S::SetPoor, S::SetError, S::AttackError];
const ATTACK_OUTCOMES: &[RallyState] =
    &[S::AttackKill, S::AttackInPlay, S::AttackError, S::AttackBlocked];
const FROM_SET_POOR: &[RallyState] = &[S::AttackInPlay, S::AttackError, S::AttackBlocked];
const DIG_OUTCOMES: &[RallyState] = &[S::DigPerfect, S::DigGood, S::DigPoor, S::DigError];
const FROM_ATTACK_BLOCKED: &[RallyState] = &[S::BlockKill, S::BlockControlled, S::BlockTouch];
const FROM_DIG_PERFECT: &[RallyState] = &[S::TransitionSet];
const FROM_DIG_GOOD: &[RallyState] = &[S::TransitionSet, S::TransitionAttack];
const FROM_DIG_POOR: &[RallyState] = &[S::TransitionAttack, S::TransitionSet, S::AttackError];
const FROM_BLOCK_CONTROLLED: &[RallyState] = &[S::TransitionSet];

/// Valid successor states, in sampling order.
///
/// An empty slice means the state has no outgoing rule. Terminal states are the
/// expected case; for any other state the caller must treat it as an engine
/// fault rather than an implicit end of rally.
pub fn valid_next_states(state: RallyState) -> &'static [RallyState] {
    match state {
        S::ServeReady => FROM_SERVE_READY,
        S::ServeInPlay => FROM_SERVE_IN_PLAY,
        S::ReceptionPerfect => FROM_RECEPTION_PERFECT,
        S::ReceptionGood => FROM_RECEPTION_GOOD,
        S::ReceptionPoor => FROM_RECEPTION_POOR,
        S::SetPerfect | S::SetGood => ATTACK_OUTCOMES,
        S::SetPoor => FROM_SET_POOR,
        S::AttackInPlay => DIG_OUTCOMES,
        S::AttackBlocked => FROM_ATTACK_BLOCKED,
        S::DigPerfect => FROM_DIG_PERFECT,
        S::DigGood => FROM_DIG_GOOD,
        S::DigPoor => FROM_DIG_POOR,
        S::BlockControlled => FROM_BLOCK_CONTROLLED,
        S::BlockTouch => DIG_OUTCOMES,
        S::TransitionSet | S::TransitionAttack => ATTACK_OUTCOMES,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_and_continuation_partition() {
        for state in RallyState::ALL {
            if state == RallyState::ServeReady {
                assert!(!is_terminal(state));
                assert!(!is_continuation(state));
            } else {
                assert_ne!(is_terminal(state), is_continuation(state), "{state}");
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for state in RallyState::ALL.into_iter().filter(|s| is_terminal(*s)) {
            assert!(valid_next_states(state).is_empty(), "{state}");
        }
    }

    #[test]
    fn test_every_non_terminal_state_has_successors() {
        for state in RallyState::ALL.into_iter().filter(|s| !is_terminal(*s)) {
            assert!(!valid_next_states(state).is_empty(), "{state}");
        }
    }

    #[test]
    fn test_successors_never_loop_back_to_serve_ready() {
        for state in RallyState::ALL {
            assert!(!valid_next_states(state).contains(&RallyState::ServeReady));
        }
    }

    #[test]
    fn test_poor_set_cannot_produce_kill() {
        assert!(!valid_next_states(RallyState::SetPoor).contains(&RallyState::AttackKill));
        assert!(valid_next_states(RallyState::SetGood).contains(&RallyState::AttackKill));
    }

    #[test]
    fn test_action_type_from_serve_ready_is_serve() {
        assert_eq!(action_type(RallyState::ServeReady, RallyState::ServeInPlay), ActionType::Serve);
        assert_eq!(
            action_type(RallyState::DigGood, RallyState::TransitionAttack),
            ActionType::Transition
        );
        assert_eq!(
            action_type(RallyState::SetGood, RallyState::AttackBlocked),
            ActionType::Attack
        );
    }

    #[test]
    fn test_effectiveness_tiers() {
        assert_eq!(effectiveness(RallyState::AttackKill), Some(1.0));
        assert_eq!(effectiveness(RallyState::DigGood), Some(0.75));
        assert_eq!(effectiveness(RallyState::BlockTouch), Some(0.25));
        assert_eq!(effectiveness(RallyState::ReceptionError), Some(0.0));
        assert_eq!(effectiveness(RallyState::ServeInPlay), None);
        assert_eq!(effectiveness(RallyState::TransitionSet), None);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&RallyState::TransitionAttack).unwrap();
        assert_eq!(json, "\"transition_attack\"");
        for state in RallyState::ALL {
            assert_eq!(serde_json::to_string(&state).unwrap(), format!("\"{}\"", state.as_str()));
        }
    }
}
