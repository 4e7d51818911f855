//! In-memory session backend used by controller and navigator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::backends::SessionBackend;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{
    CurrentSessionInfo, PlaybackStatus, PlaylistEntry, PlaylistSnapshot, SessionKind,
    SessionMetadata, TimelineMarker, TimelineMarkerKind,
};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    FetchStatus,
    Play,
    Pause,
    Seek(f64),
    SetSpeed(f64),
    FetchTimeline,
    FetchPlaylist,
    Next,
    Previous,
    Select(usize),
    Activate,
    Deactivate,
}

impl BackendCall {
    fn label(&self) -> &'static str {
        match self {
            BackendCall::FetchStatus => "status",
            BackendCall::Play => "play",
            BackendCall::Pause => "pause",
            BackendCall::Seek(_) => "seek",
            BackendCall::SetSpeed(_) => "speed",
            BackendCall::FetchTimeline => "timeline",
            BackendCall::FetchPlaylist => "playlist",
            BackendCall::Next => "next",
            BackendCall::Previous => "previous",
            BackendCall::Select(_) => "select",
            BackendCall::Activate => "activate",
            BackendCall::Deactivate => "deactivate",
        }
    }
}

/// Records every call and answers from scripted responses.
pub struct ScriptedBackend {
    calls: Mutex<Vec<BackendCall>>,
    statuses: Mutex<VecDeque<SessionResult<PlaybackStatus>>>,
    fallback_status: Mutex<PlaybackStatus>,
    failures: Mutex<HashMap<&'static str, SessionError>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    playlist: Mutex<PlaylistSnapshot>,
}

pub fn playing_status(percent: f64, total_duration_sec: f64) -> PlaybackStatus {
    PlaybackStatus {
        session_active: true,
        is_playing: true,
        current_position_sec: percent / 100.0 * total_duration_sec,
        total_duration_sec,
        progress_percent: percent,
        playback_speed: 1.0,
        metadata: SessionMetadata {
            name: "Eyes Closed Baseline".to_string(),
            category: "Relaxation".to_string(),
        },
    }
}

pub fn inactive_status() -> PlaybackStatus {
    PlaybackStatus {
        session_active: false,
        is_playing: false,
        current_position_sec: 0.0,
        total_duration_sec: 0.0,
        progress_percent: 0.0,
        playback_speed: 1.0,
        metadata: SessionMetadata::default(),
    }
}

pub fn three_session_playlist(current: usize) -> PlaylistSnapshot {
    let names = ["Breathing", "Eyes Closed Baseline", "Morning sit"];
    let kinds = [
        SessionKind::Meditation,
        SessionKind::Dataset,
        SessionKind::Recorded,
    ];
    let entries = names
        .iter()
        .zip(kinds)
        .enumerate()
        .map(|(index, (name, kind))| PlaylistEntry {
            index,
            name: name.to_string(),
            category: "Relaxation".to_string(),
            duration_sec: 600.0,
            kind,
        })
        .collect::<Vec<_>>();
    PlaylistSnapshot {
        current: Some(CurrentSessionInfo {
            index: current,
            name: names[current].to_string(),
            category: "Relaxation".to_string(),
            kind: kinds[current],
            total: entries.len(),
        }),
        entries,
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: Mutex::new(playing_status(0.0, 600.0)),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            playlist: Mutex::new(three_session_playlist(0)),
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &BackendCall) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|recorded| recorded.label() == call.label())
            .count()
    }

    /// Queues a one-shot status answer; the fallback is served once drained.
    pub fn push_status(&self, status: SessionResult<PlaybackStatus>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn set_fallback_status(&self, status: PlaybackStatus) {
        *self.fallback_status.lock().unwrap() = status;
    }

    pub fn set_playlist(&self, playlist: PlaylistSnapshot) {
        *self.playlist.lock().unwrap() = playlist;
    }

    /// Makes every call of this kind fail until cleared.
    pub fn fail(&self, call: BackendCall, error: SessionError) {
        self.failures.lock().unwrap().insert(call.label(), error);
    }

    pub fn clear_failure(&self, call: BackendCall) {
        self.failures.lock().unwrap().remove(call.label());
    }

    /// Blocks every call of this kind for `delay` before answering.
    pub fn delay(&self, call: BackendCall, delay: Duration) {
        self.delays.lock().unwrap().insert(call.label(), delay);
    }

    fn record(&self, call: BackendCall) -> SessionResult<()> {
        let label = call.label();
        self.calls.lock().unwrap().push(call);
        let delay = self.delays.lock().unwrap().get(label).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        match self.failures.lock().unwrap().get(label) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl SessionBackend for ScriptedBackend {
    fn fetch_status(&self) -> SessionResult<PlaybackStatus> {
        self.record(BackendCall::FetchStatus)?;
        match self.statuses.lock().unwrap().pop_front() {
            Some(status) => status,
            None => Ok(self.fallback_status.lock().unwrap().clone()),
        }
    }

    fn play(&self) -> SessionResult<()> {
        self.record(BackendCall::Play)
    }

    fn pause(&self) -> SessionResult<()> {
        self.record(BackendCall::Pause)
    }

    fn seek(&self, seconds: f64) -> SessionResult<()> {
        self.record(BackendCall::Seek(seconds))
    }

    fn set_speed(&self, speed: f64) -> SessionResult<()> {
        self.record(BackendCall::SetSpeed(speed))
    }

    fn fetch_timeline(&self) -> SessionResult<Vec<TimelineMarker>> {
        self.record(BackendCall::FetchTimeline)?;
        Ok(vec![
            TimelineMarker {
                time_sec: 0.0,
                label: "Session Start".to_string(),
                kind: TimelineMarkerKind::Start,
            },
            TimelineMarker {
                time_sec: 600.0,
                label: "Session End".to_string(),
                kind: TimelineMarkerKind::End,
            },
        ])
    }

    fn fetch_playlist(&self) -> SessionResult<PlaylistSnapshot> {
        self.record(BackendCall::FetchPlaylist)?;
        Ok(self.playlist.lock().unwrap().clone())
    }

    fn next_session(&self) -> SessionResult<()> {
        self.record(BackendCall::Next)
    }

    fn previous_session(&self) -> SessionResult<()> {
        self.record(BackendCall::Previous)
    }

    fn select_session(&self, index: usize) -> SessionResult<()> {
        self.record(BackendCall::Select(index))
    }

    fn activate(&self) -> SessionResult<()> {
        self.record(BackendCall::Activate)
    }

    fn deactivate(&self) -> SessionResult<()> {
        self.record(BackendCall::Deactivate)
    }
}
