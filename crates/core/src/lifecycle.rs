//! Forward-only call lifecycle graph.
//!
//! `initiated → ringing → answered → in_conversation → {completed | failed |
//! busy | no_answer}`, with a direct `initiated → failed` edge for placement
//! failures and a self-loop on `in_conversation` while turns continue.
//! Terminal states absorb every later event, which guards against duplicate
//! and delayed provider callbacks.

use crate::domain::call::CallStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Legal forward move. Providers may skip intermediate states (a call
    /// that is answered before we ever see `ringing`), so any forward jump
    /// advances.
    Advance(CallStatus),
    /// A terminal status arrived before the states that should precede it
    /// (e.g. `completed` before `answered`). Terminal events always win, but
    /// callers flag this outcome for audit.
    TerminalOverride(CallStatus),
    /// Idempotent no-op: the session is already terminal, the event moves
    /// backward to a non-terminal state, or it repeats the current state.
    Ignored,
}

impl TransitionOutcome {
    pub fn applied_status(&self) -> Option<CallStatus> {
        match self {
            Self::Advance(status) | Self::TerminalOverride(status) => Some(*status),
            Self::Ignored => None,
        }
    }
}

/// Position along the non-terminal spine of the graph. Terminal states sit
/// past the end of the spine.
fn rank(status: CallStatus) -> u8 {
    match status {
        CallStatus::Initiated => 0,
        CallStatus::Ringing => 1,
        CallStatus::Answered => 2,
        CallStatus::InConversation => 3,
        CallStatus::Completed | CallStatus::Failed | CallStatus::Busy | CallStatus::NoAnswer => 4,
    }
}

pub fn apply(current: CallStatus, incoming: CallStatus) -> TransitionOutcome {
    if current.is_terminal() {
        return TransitionOutcome::Ignored;
    }

    if incoming.is_terminal() {
        // A terminal event that skips the conversational states is out of
        // order; it still lands, distinguishably.
        let expected_predecessor = matches!(
            current,
            CallStatus::InConversation | CallStatus::Answered | CallStatus::Initiated
        );
        let in_order = match incoming {
            CallStatus::Failed => true,
            CallStatus::Busy | CallStatus::NoAnswer => {
                matches!(current, CallStatus::Initiated | CallStatus::Ringing)
            }
            _ => {
                expected_predecessor
                    && matches!(current, CallStatus::Answered | CallStatus::InConversation)
            }
        };
        if in_order {
            return TransitionOutcome::Advance(incoming);
        }
        return TransitionOutcome::TerminalOverride(incoming);
    }

    if rank(incoming) > rank(current) {
        return TransitionOutcome::Advance(incoming);
    }

    TransitionOutcome::Ignored
}
