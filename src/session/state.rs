//! Session lifecycle state machine.

use serde::Serialize;

/// Lifecycle state of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session is live; every access extends its TTL window.
    #[default]
    Active,
    /// TTL elapsed without activity. Detected lazily; never handed out again.
    Expired,
    /// Removed from the registry by a prune or capacity eviction.
    Evicted,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Active -> Active (touch)
    /// - Active -> Expired
    /// - Active -> Evicted
    /// - Expired -> Evicted
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Active, Active) | (Active, Expired) | (Active, Evicted) | (Expired, Evicted)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `true` and updates `self` if the transition is valid.
    pub fn transition_to(&mut self, target: SessionState) -> bool {
        if self.can_transition_to(target) {
            *self = target;
            true
        } else {
            false
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Evicted)
    }

    /// Whether a session in this state may be returned to callers.
    pub fn is_usable(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}
