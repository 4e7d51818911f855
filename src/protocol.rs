//! Event-bus protocol shared by all runtime components.
//!
//! This module defines the message payloads exchanged between the session
//! controller, the console front-end and the audio-feedback collaborator, plus
//! the session data model those messages carry.

use crate::lifecycle::SessionLifecycleState;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Transport(TransportMessage),
    SeekBar(SeekBarMessage),
    Playlist(PlaylistMessage),
    Session(SessionMessage),
    Audio(AudioFeedbackMessage),
}

/// Transport commands issued by the user.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    /// Activates session mode when inactive, otherwise flips play/pause.
    TogglePlayPause,
    SetSpeed(f64),
    /// Direct seek in seconds, bypassing the progress track.
    SeekSeconds(f64),
    Stop,
}

/// Horizontal placement of the progress track in front-end coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackGeometry {
    pub left: f64,
    pub width: f64,
}

impl TrackGeometry {
    /// Maps a pointer x coordinate to a clamped percent of the track.
    ///
    /// Returns `None` for a degenerate track.
    pub fn percent_at(&self, pointer_x: f64) -> Option<f64> {
        if !(self.width > 0.0) || !pointer_x.is_finite() {
            return None;
        }
        Some(((pointer_x - self.left) / self.width * 100.0).clamp(0.0, 100.0))
    }
}

/// Pointer interaction on the progress track.
#[derive(Debug, Clone, PartialEq)]
pub enum SeekBarMessage {
    PointerDown { x: f64, track: TrackGeometry },
    PointerMove { x: f64, track: TrackGeometry },
    PointerUp,
    /// Pointer left the window or the gesture was aborted; no seek is issued.
    PointerCancel,
}

/// Playlist navigation commands.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistMessage {
    Next,
    Previous,
    SelectByIndex(usize),
    /// Re-fetches the listing without switching sessions.
    Refresh,
}

/// Notifications published by the session controller.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    StateChanged(SessionSnapshot),
    PlaylistUpdated(PlaylistSnapshot),
    TimelineUpdated(Vec<TimelineMarker>),
    Notice(SessionNotice),
    /// Asks the controller to cancel every loop and exit its run loop.
    Shutdown,
}

/// Signal consumed by the binaural audio collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFeedbackMessage {
    SetPaused(bool),
}

/// Descriptive metadata of the session being replayed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetadata {
    pub name: String,
    pub category: String,
}

/// One authoritative status reading from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub session_active: bool,
    pub is_playing: bool,
    pub current_position_sec: f64,
    pub total_duration_sec: f64,
    pub progress_percent: f64,
    pub playback_speed: f64,
    pub metadata: SessionMetadata,
}

/// Source category of a playlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Recorded,
    Meditation,
    Dataset,
}

impl SessionKind {
    /// Maps the backend `type` field. Unknown sources are public datasets.
    pub fn from_backend_type(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "recorded" => SessionKind::Recorded,
            "meditation" => SessionKind::Meditation,
            _ => SessionKind::Dataset,
        }
    }

    /// Short badge shown next to playlist rows.
    pub fn badge(&self) -> &'static str {
        match self {
            SessionKind::Recorded => "REC",
            SessionKind::Meditation => "MED",
            SessionKind::Dataset => "DS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub index: usize,
    pub name: String,
    pub category: String,
    pub duration_sec: f64,
    pub kind: SessionKind,
}

/// Currently loaded playlist session. `index` is zero-based.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentSessionInfo {
    pub index: usize,
    pub name: String,
    pub category: String,
    pub kind: SessionKind,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistSnapshot {
    pub entries: Vec<PlaylistEntry>,
    pub current: Option<CurrentSessionInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineMarkerKind {
    Start,
    End,
    Marker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineMarker {
    pub time_sec: f64,
    pub label: String,
    pub kind: TimelineMarkerKind,
}

/// Transport control a notice is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportControl {
    PlayPause,
    Seek,
    Speed,
    Playlist,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Non-blocking connectivity banner.
    Connectivity,
    /// Message shown next to the control that triggered it.
    Control(TransportControl),
    SessionLost,
    ActivationTimeout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionNotice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Discrete view state. Published on change, never per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub lifecycle: SessionLifecycleState,
    pub is_playing: bool,
    pub playback_speed: f64,
    pub loading: bool,
    pub dragging: bool,
    pub status: Option<PlaybackStatus>,
}
