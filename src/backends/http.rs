//! REST session backend adapter implementation.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::backends::SessionBackend;
use crate::config::BackendConfig;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{
    CurrentSessionInfo, PlaybackStatus, PlaylistEntry, PlaylistSnapshot, SessionKind,
    SessionMetadata, TimelineMarker, TimelineMarkerKind,
};

const STATUS_SUCCESS: &str = "success";

/// Session backend adapter backed by `ureq`.
pub struct HttpSessionBackend {
    api_base: String,
    http_client: ureq::Agent,
    activation_client: ureq::Agent,
    activation_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    session_active: bool,
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    current_position: f64,
    #[serde(default)]
    total_duration: f64,
    #[serde(default)]
    progress_percent: f64,
    #[serde(default = "default_payload_speed")]
    playback_speed: f64,
    #[serde(default)]
    session_metadata: Option<MetadataPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    category: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistPayload {
    #[serde(default)]
    playlist: Vec<PlaylistEntryPayload>,
    #[serde(default)]
    current: Option<CurrentPayload>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntryPayload {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    category: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentPayload {
    /// One-based position reported by the backend.
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct TimelinePayload {
    #[serde(default)]
    markers: Vec<MarkerPayload>,
}

#[derive(Debug, Deserialize)]
struct MarkerPayload {
    time: f64,
    #[serde(default)]
    label: String,
    #[serde(rename = "type", default)]
    kind: String,
}

fn default_payload_speed() -> f64 {
    1.0
}

impl HttpSessionBackend {
    /// Creates a new adapter for `config.api_base`.
    pub fn new(config: &BackendConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.request_timeout_ms))
            .timeout_write(Duration::from_millis(config.request_timeout_ms))
            .build();
        let activation_client = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.activation_timeout_ms))
            .build();
        Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            http_client,
            activation_client,
            activation_timeout_ms: config.activation_timeout_ms,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn get_json(&self, path: &str) -> SessionResult<Value> {
        let response = self
            .http_client
            .get(&self.url(path))
            .call()
            .map_err(|err| map_request_error(err, path))?;
        read_success_payload(response, path)
    }

    fn post_json(&self, path: &str) -> SessionResult<Value> {
        let response = self
            .http_client
            .post(&self.url(path))
            .call()
            .map_err(|err| map_request_error(err, path))?;
        read_success_payload(response, path)
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = err.source();
    }
    transport.to_string().contains("timed out")
}

fn map_request_error(err: ureq::Error, path: &str) -> SessionError {
    match err {
        ureq::Error::Status(429, _) => SessionError::RateLimited,
        ureq::Error::Status(code, response) => {
            let detail = response
                .into_json::<Value>()
                .ok()
                .and_then(|body| error_message(&body))
                .unwrap_or_else(|| format!("HTTP {code}"));
            SessionError::BackendLogic(format!("{path}: {detail}"))
        }
        ureq::Error::Transport(transport) => {
            SessionError::Network(format!("{path}: {transport}"))
        }
    }
}

fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("detail"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

fn read_success_payload(response: ureq::Response, path: &str) -> SessionResult<Value> {
    let parsed: Value = response
        .into_json()
        .map_err(|err| SessionError::InvalidResponse(format!("{path}: {err}")))?;
    check_success(parsed)
}

/// Rejects payloads whose `status` field is not `"success"`.
fn check_success(payload: Value) -> SessionResult<Value> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if status != STATUS_SUCCESS {
        let message = error_message(&payload)
            .unwrap_or_else(|| format!("backend returned status '{status}'"));
        return Err(SessionError::BackendLogic(message));
    }
    Ok(payload)
}

fn parse_status(payload: Value) -> SessionResult<PlaybackStatus> {
    let parsed: StatusPayload = serde_json::from_value(payload)
        .map_err(|err| SessionError::InvalidResponse(format!("session status: {err}")))?;
    let metadata = parsed.session_metadata.unwrap_or_default();
    Ok(PlaybackStatus {
        session_active: parsed.session_active,
        is_playing: parsed.is_playing,
        current_position_sec: parsed.current_position.max(0.0),
        total_duration_sec: parsed.total_duration.max(0.0),
        progress_percent: parsed.progress_percent.clamp(0.0, 100.0),
        playback_speed: parsed.playback_speed,
        metadata: SessionMetadata {
            name: metadata.name,
            category: metadata.category,
        },
    })
}

fn parse_playlist(payload: Value) -> SessionResult<PlaylistSnapshot> {
    let parsed: PlaylistPayload = serde_json::from_value(payload)
        .map_err(|err| SessionError::InvalidResponse(format!("playlist: {err}")))?;
    let entries = parsed
        .playlist
        .into_iter()
        .enumerate()
        .map(|(position, entry)| PlaylistEntry {
            index: entry.index.unwrap_or(position),
            name: entry.name,
            category: entry.category,
            duration_sec: entry.duration.max(0.0),
            kind: SessionKind::from_backend_type(&entry.kind),
        })
        .collect::<Vec<_>>();
    let total_entries = entries.len();
    // An out-of-range current session is reported as an empty object.
    let current = parsed.current.and_then(|current| {
        let index = current.index?.checked_sub(1)?;
        let name = current.name?;
        Some(CurrentSessionInfo {
            index,
            name,
            category: current.category,
            kind: SessionKind::from_backend_type(&current.kind),
            total: if current.total > 0 {
                current.total
            } else {
                total_entries
            },
        })
    });
    Ok(PlaylistSnapshot { entries, current })
}

fn parse_timeline(payload: Value) -> SessionResult<Vec<TimelineMarker>> {
    let parsed: TimelinePayload = serde_json::from_value(payload)
        .map_err(|err| SessionError::InvalidResponse(format!("timeline: {err}")))?;
    let mut markers: Vec<TimelineMarker> = parsed
        .markers
        .into_iter()
        .filter(|marker| marker.time.is_finite())
        .map(|marker| TimelineMarker {
            time_sec: marker.time.max(0.0),
            label: marker.label,
            kind: match marker.kind.as_str() {
                "start" => TimelineMarkerKind::Start,
                "end" => TimelineMarkerKind::End,
                _ => TimelineMarkerKind::Marker,
            },
        })
        .collect();
    markers.sort_by(|left, right| left.time_sec.total_cmp(&right.time_sec));
    Ok(markers)
}

impl SessionBackend for HttpSessionBackend {
    fn fetch_status(&self) -> SessionResult<PlaybackStatus> {
        parse_status(self.get_json("/session/status")?)
    }

    fn play(&self) -> SessionResult<()> {
        self.post_json("/session/play").map(|_| ())
    }

    fn pause(&self) -> SessionResult<()> {
        self.post_json("/session/pause").map(|_| ())
    }

    fn seek(&self, seconds: f64) -> SessionResult<()> {
        self.post_json(&format!("/session/seek/{}", seconds.max(0.0)))
            .map(|_| ())
    }

    fn set_speed(&self, speed: f64) -> SessionResult<()> {
        self.post_json(&format!("/session/speed/{speed}")).map(|_| ())
    }

    fn fetch_timeline(&self) -> SessionResult<Vec<TimelineMarker>> {
        parse_timeline(self.get_json("/session/timeline")?)
    }

    fn fetch_playlist(&self) -> SessionResult<PlaylistSnapshot> {
        parse_playlist(self.get_json("/playlist")?)
    }

    fn next_session(&self) -> SessionResult<()> {
        self.post_json("/playlist/next").map(|_| ())
    }

    fn previous_session(&self) -> SessionResult<()> {
        self.post_json("/playlist/previous").map(|_| ())
    }

    fn select_session(&self, index: usize) -> SessionResult<()> {
        self.post_json(&format!("/playlist/select/{index}"))
            .map(|_| ())
    }

    fn activate(&self) -> SessionResult<()> {
        let path = "/set-mode/session";
        let response = match self.activation_client.post(&self.url(path)).call() {
            Ok(response) => response,
            Err(ureq::Error::Transport(transport)) if is_timeout(&transport) => {
                return Err(SessionError::ActivationTimeout(self.activation_timeout_ms));
            }
            Err(err) => return Err(map_request_error(err, path)),
        };
        read_success_payload(response, path).map(|_| ())
    }

    fn deactivate(&self) -> SessionResult<()> {
        self.post_json("/set-mode/idle").map(|_| ())
    }
}
