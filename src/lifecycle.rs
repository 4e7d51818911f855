//! Session lifecycle state machine.
//!
//! The lifecycle gates which background loops may run: the poll and frame loops
//! only exist while the session is `ActivePlaying`/`ActivePaused`.

use log::info;

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionLifecycleState {
    #[default]
    Inactive,
    Activating,
    ActivePlaying,
    ActivePaused,
    Switching,
}

impl SessionLifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionLifecycleState::ActivePlaying | SessionLifecycleState::ActivePaused
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Activate,
    ActivationSucceeded,
    ActivationFailed,
    Toggle,
    /// Server-reported play state, applied without flipping blindly.
    PlayStateObserved { playing: bool },
    Navigate,
    SwitchSucceeded,
    SwitchFailed,
    Stop,
    SessionLost,
}

/// Lifecycle state plus the `Active*` state to restore when a switch fails.
#[derive(Debug, Clone, Default)]
pub struct SessionLifecycle {
    state: SessionLifecycleState,
    resume_state: Option<SessionLifecycleState>,
}

impl SessionLifecycle {
    pub fn state(&self) -> SessionLifecycleState {
        self.state
    }

    /// Applies `event`, returning the new state.
    ///
    /// Invalid transitions leave the state untouched.
    pub fn apply(&mut self, event: LifecycleEvent) -> SessionResult<SessionLifecycleState> {
        use LifecycleEvent as E;
        use SessionLifecycleState as S;

        let next = match (self.state, event) {
            (S::Inactive, E::Activate) => S::Activating,
            (S::Activating, E::ActivationSucceeded) => S::ActivePlaying,
            (S::Activating, E::ActivationFailed) => S::Inactive,
            (S::ActivePlaying, E::Toggle) => S::ActivePaused,
            (S::ActivePaused, E::Toggle) => S::ActivePlaying,
            (S::ActivePlaying | S::ActivePaused, E::PlayStateObserved { playing }) => {
                if playing {
                    S::ActivePlaying
                } else {
                    S::ActivePaused
                }
            }
            (S::ActivePlaying | S::ActivePaused, E::Navigate) => {
                self.resume_state = Some(self.state);
                S::Switching
            }
            (S::Switching, E::SwitchSucceeded) => S::ActivePlaying,
            (S::Switching, E::SwitchFailed) => {
                self.resume_state.take().unwrap_or(S::ActivePaused)
            }
            (S::ActivePlaying | S::ActivePaused | S::Switching, E::Stop) => S::Inactive,
            (S::ActivePlaying | S::ActivePaused, E::SessionLost) => S::Inactive,
            (from, event) => return Err(SessionError::InvalidTransition { from, event }),
        };

        if next != self.state {
            info!("SessionLifecycle: {:?} -> {:?} ({:?})", self.state, next, event);
        }
        if !matches!(next, S::Switching) {
            self.resume_state = None;
        }
        self.state = next;
        Ok(next)
    }
}
