//! Possession rules
//!
//! Who makes the next contact is a pure function of the event history: the
//! first contact belongs to the server, every later one is derived from the
//! state of the immediately preceding event. The static serve/receive roles
//! are kept separately so the dynamic rule can be cross-checked.

use serde::{Deserialize, Serialize};

use super::rally::RallyEvent;
use super::rally_state::{ActionType, RallyState, TeamSide};

/// Which side plays the ball after a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Possession {
    /// The side that produced the state plays again.
    Same,
    /// The ball crossed the net.
    Switch,
}

/// Possession change implied by `state`. `None` for terminal states.
pub fn possession_after(state: RallyState) -> Option<Possession> {
    use RallyState::*;
    match state {
        // ball goes over the net
        ServeInPlay | AttackInPlay | AttackBlocked | BlockTouch => Some(Possession::Switch),
        // receiver sets, setter attacks, digger/blocker transitions
        ServeReady | ReceptionPerfect | ReceptionGood | ReceptionPoor | SetPerfect | SetGood
        | SetPoor | DigPerfect | DigGood | DigPoor | BlockControlled | TransitionSet
        | TransitionAttack => Some(Possession::Same),
        _ => None,
    }
}

/// Fixed serve/receive roles, independent of history.
///
/// The server serves; the receiver receives, sets and attacks the first ball
/// through facing a block; the server makes the first defensive response and
/// plays the transition that follows.
pub fn static_acting_side(state: RallyState, server: TeamSide) -> TeamSide {
    match state.action_type() {
        ActionType::Serve => server,
        ActionType::Reception | ActionType::Set | ActionType::Attack => server.opponent(),
        ActionType::Dig | ActionType::Block | ActionType::Transition => server,
    }
}

/// Acting side for the next transition given the events so far.
///
/// Returns `None` when the last event is terminal: there is no next contact.
pub fn next_acting_side(events: &[RallyEvent], server: TeamSide) -> Option<TeamSide> {
    let Some(last) = events.last() else {
        return Some(static_acting_side(RallyState::ServeReady, server));
    };
    match possession_after(last.state)? {
        Possession::Same => Some(last.acting),
        Possession::Switch => Some(last.acting.opponent()),
    }
}

/// One event whose dynamic acting side disagrees with the static role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PossessionDivergence {
    pub sequence: u32,
    pub state: RallyState,
    pub dynamic: TeamSide,
    pub expected: TeamSide,
}

/// Cross-check the first-ball phase of a rally against the static roles.
///
/// The phase runs from the serve through the first defensive response (the
/// first dig or block outcome). After that both sides attack and the static
/// roles stop being meaningful, so later events are not compared.
pub fn possession_divergences(events: &[RallyEvent], server: TeamSide) -> Vec<PossessionDivergence> {
    let mut divergences = Vec::new();
    for event in events {
        let expected = static_acting_side(event.state, server);
        if event.acting != expected {
            divergences.push(PossessionDivergence {
                sequence: event.sequence,
                state: event.state,
                dynamic: event.acting,
                expected,
            });
        }
        if matches!(event.action, ActionType::Dig | ActionType::Block) {
            break;
        }
    }
    divergences
}
