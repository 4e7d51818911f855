//! Transport commands and the local play/speed state they update.

use log::warn;

use crate::backends::SessionBackend;
use crate::error::{SessionError, SessionResult};
use crate::lifecycle::SessionLifecycleState;
use crate::protocol::TransportControl;

/// Speed multipliers the backend replay engine accepts.
pub const SUPPORTED_SPEEDS: [f64; 4] = [0.5, 1.0, 2.0, 5.0];

pub fn is_supported_speed(speed: f64) -> bool {
    SUPPORTED_SPEEDS
        .iter()
        .any(|supported| (supported - speed).abs() < f64::EPSILON)
}

pub fn validate_speed(speed: f64) -> SessionResult<f64> {
    if is_supported_speed(speed) {
        Ok(speed)
    } else {
        Err(SessionError::InvalidSpeed(speed))
    }
}

/// Locally authoritative transport values.
///
/// They are overwritten by the next trusted status reading and are never
/// rolled back when a command fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub is_playing: bool,
    pub speed: f64,
}

impl TransportState {
    pub fn new(default_speed: f64) -> Self {
        Self {
            is_playing: false,
            speed: validate_speed(default_speed).unwrap_or(1.0),
        }
    }
}

/// Fire-and-forget request sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    Seek(f64),
    SetSpeed(f64),
}

impl TransportCommand {
    pub fn control(&self) -> TransportControl {
        match self {
            TransportCommand::Play | TransportCommand::Pause => TransportControl::PlayPause,
            TransportCommand::Seek(_) => TransportControl::Seek,
            TransportCommand::SetSpeed(_) => TransportControl::Speed,
        }
    }
}

/// What a play/pause press means in the current lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Activate,
    Pause,
    Play,
    Ignore,
}

pub fn toggle_action(state: SessionLifecycleState) -> ToggleAction {
    match state {
        SessionLifecycleState::Inactive => ToggleAction::Activate,
        SessionLifecycleState::ActivePlaying => ToggleAction::Pause,
        SessionLifecycleState::ActivePaused => ToggleAction::Play,
        SessionLifecycleState::Activating | SessionLifecycleState::Switching => {
            ToggleAction::Ignore
        }
    }
}

pub fn run_command(backend: &dyn SessionBackend, command: TransportCommand) -> SessionResult<()> {
    let result = match command {
        TransportCommand::Play => backend.play(),
        TransportCommand::Pause => backend.pause(),
        TransportCommand::Seek(seconds) => backend.seek(seconds),
        TransportCommand::SetSpeed(speed) => backend.set_speed(speed),
    };
    if let Err(err) = &result {
        warn!("Transport: {:?} failed: {}", command, err);
    }
    result
}
