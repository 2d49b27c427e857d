//! Per-request lifecycle
//!
//! ```text
//! Created ──ReplyReceived──▶ Replied
//!    │ ────DeadlineElapsed─▶ TimedOut
//!    └─────SendFailed──────▶ TransportFailed
//! ```
//!
//! Terminal states accept no further events.

use crate::now_ms;

/// Lifecycle state of one dispatched command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Created,
    Replied,
    TimedOut,
    TransportFailed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Created)
    }
}

/// Events that can end a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    /// A matching reply (or ingested answer) arrived
    ReplyReceived,
    /// The caller's deadline passed first
    DeadlineElapsed,
    /// The channel send itself failed
    SendFailed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(RequestState),
    /// Transition was invalid from current state
    Invalid {
        from: RequestState,
        event: RequestEvent,
    },
}

/// State machine for a single request
#[derive(Debug)]
pub struct RequestLifecycle {
    state: RequestState,
    created_at_ms: u64,
    finished_at_ms: Option<u64>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            state: RequestState::Created,
            created_at_ms: now_ms(),
            finished_at_ms: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Time from creation to the terminal transition, if reached
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.finished_at_ms
            .map(|finished| finished.saturating_sub(self.created_at_ms))
    }

    /// Process an event and return the transition result
    pub fn apply(&mut self, event: RequestEvent) -> TransitionResult {
        use RequestEvent::*;
        use RequestState::*;

        let next = match (self.state, event) {
            (Created, ReplyReceived) => Replied,
            (Created, DeadlineElapsed) => TimedOut,
            (Created, SendFailed) => TransportFailed,
            (from, event) => return TransitionResult::Invalid { from, event },
        };

        self.state = next;
        self.finished_at_ms = Some(now_ms());
        TransitionResult::Success(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let lifecycle = RequestLifecycle::new();
        assert_eq!(lifecycle.state(), RequestState::Created);
        assert!(!lifecycle.state().is_terminal());
        assert_eq!(lifecycle.elapsed_ms(), None);
    }

    #[test]
    fn test_each_event_reaches_its_terminal_state() {
        let cases = [
            (RequestEvent::ReplyReceived, RequestState::Replied),
            (RequestEvent::DeadlineElapsed, RequestState::TimedOut),
            (RequestEvent::SendFailed, RequestState::TransportFailed),
        ];

        for (event, expected) in cases {
            let mut lifecycle = RequestLifecycle::new();
            assert_eq!(lifecycle.apply(event), TransitionResult::Success(expected));
            assert!(lifecycle.state().is_terminal());
            assert!(lifecycle.elapsed_ms().is_some());
        }
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut lifecycle = RequestLifecycle::new();
        lifecycle.apply(RequestEvent::DeadlineElapsed);

        // A late reply cannot revive a timed-out request
        let result = lifecycle.apply(RequestEvent::ReplyReceived);
        assert_eq!(
            result,
            TransitionResult::Invalid {
                from: RequestState::TimedOut,
                event: RequestEvent::ReplyReceived,
            }
        );
        assert_eq!(lifecycle.state(), RequestState::TimedOut);
    }
}
