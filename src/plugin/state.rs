//! Plugin lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Unstarted → Launching:    child process spawned
//! Launching → Handshaking:  waiting for the handshake line
//! Handshaking → Ready:      handshake validated, channel connected
//! any (not Terminated) → Terminated: shutdown or fatal startup error
//! ```
//!
//! `Terminated` is terminal. Re-terminating is handled by the host as a
//! no-op and never reaches `transition`.

use super::error::PluginError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unstarted,
    Launching,
    Handshaking,
    Ready,
    Terminated,
}

impl PluginState {
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Unstarted, Launching)
                | (Launching, Handshaking)
                | (Handshaking, Ready)
                | (Unstarted | Launching | Handshaking | Ready, Terminated)
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: PluginState) -> Result<(), PluginError> {
        if !self.can_transition_to(next) {
            return Err(PluginError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        tracing::trace!(from = ?*self, to = ?next, "Plugin state transition");
        *self = next;
        Ok(())
    }

    pub fn is_terminated(self) -> bool {
        self == PluginState::Terminated
    }
}
