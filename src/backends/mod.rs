//! Session backend abstraction and its HTTP implementation.

pub mod http;
#[cfg(test)]
pub mod scripted;

use crate::error::SessionResult;
use crate::protocol::{PlaybackStatus, PlaylistSnapshot, TimelineMarker};

/// Interface to the backend that owns the authoritative playback session.
///
/// Calls are blocking; the controller runs them on worker threads and never
/// while holding session state.
pub trait SessionBackend: Send + Sync {
    /// Reads the current status. An inactive backend session is reported as a
    /// status with `session_active == false`, not as an error.
    fn fetch_status(&self) -> SessionResult<PlaybackStatus>;
    fn play(&self) -> SessionResult<()>;
    fn pause(&self) -> SessionResult<()>;
    fn seek(&self, seconds: f64) -> SessionResult<()>;
    fn set_speed(&self, speed: f64) -> SessionResult<()>;
    fn fetch_timeline(&self) -> SessionResult<Vec<TimelineMarker>>;
    fn fetch_playlist(&self) -> SessionResult<PlaylistSnapshot>;
    fn next_session(&self) -> SessionResult<()>;
    fn previous_session(&self) -> SessionResult<()>;
    fn select_session(&self, index: usize) -> SessionResult<()>;
    /// Switches the backend into session-replay mode. Idempotent.
    fn activate(&self) -> SessionResult<()>;
    /// Returns the backend to idle so the next activation starts fresh.
    fn deactivate(&self) -> SessionResult<()>;
}
