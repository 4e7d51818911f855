//! Error taxonomy shared by the backend adapter, session state and controller.

use thiserror::Error;

use crate::lifecycle::{LifecycleEvent, SessionLifecycleState};
use crate::protocol::{NoticeKind, SessionNotice, TransportControl};

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Request never produced an HTTP response (DNS, refused, reset, read timeout).
    #[error("network error: {0}")]
    Network(String),
    /// Backend answered 429 or the client-side request budget is exhausted.
    #[error("rate limited")]
    RateLimited,
    /// Backend answered with `status != "success"`.
    #[error("backend rejected the request: {0}")]
    BackendLogic(String),
    #[error("playback session was lost on the backend")]
    SessionLost,
    #[error("activation did not complete within {0} ms")]
    ActivationTimeout(u64),
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error("unsupported playback speed {0}")]
    InvalidSpeed(f64),
    #[error("a session switch is already in progress")]
    NavigationBusy,
    #[error("invalid lifecycle transition {event:?} from {from:?}")]
    InvalidTransition {
        from: SessionLifecycleState,
        event: LifecycleEvent,
    },
}

impl SessionError {
    /// Maps an error to the notice surfaced to the user, if any.
    ///
    /// `control` is the transport control that triggered the failing request.
    /// Rate limiting and invalid transitions stay in the log.
    pub fn to_notice(&self, control: Option<TransportControl>) -> Option<SessionNotice> {
        let (kind, message) = match self {
            SessionError::Network(_) | SessionError::InvalidResponse(_) => (
                NoticeKind::Connectivity,
                "Connection to the session backend failed. Retrying.".to_string(),
            ),
            SessionError::BackendLogic(message) => (
                control.map_or(NoticeKind::Connectivity, NoticeKind::Control),
                message.clone(),
            ),
            SessionError::SessionLost => (
                NoticeKind::SessionLost,
                "The playback session ended on the server. Press play to start a new one."
                    .to_string(),
            ),
            SessionError::ActivationTimeout(timeout_ms) => (
                NoticeKind::ActivationTimeout,
                format!(
                    "The backend did not start session mode within {} seconds. Try again.",
                    timeout_ms / 1000
                ),
            ),
            SessionError::InvalidSpeed(speed) => (
                NoticeKind::Control(TransportControl::Speed),
                format!("{speed}x is not a supported playback speed"),
            ),
            SessionError::NavigationBusy => (
                NoticeKind::Control(control.unwrap_or(TransportControl::Playlist)),
                "Still switching sessions.".to_string(),
            ),
            SessionError::RateLimited | SessionError::InvalidTransition { .. } => return None,
        };
        Some(SessionNotice { kind, message })
    }
}
