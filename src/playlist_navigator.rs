//! Session switching over the backend playlist.

use log::{info, warn};

use crate::backends::SessionBackend;
use crate::error::{SessionError, SessionResult};
use crate::protocol::PlaylistSnapshot;
use crate::transport::{run_command, TransportCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationRequest {
    Next,
    Previous,
    Select(usize),
}

/// Result of a switch whose navigation call succeeded.
///
/// The follow-up refresh and play are best effort; the next status poll
/// reconciles whatever they failed to do.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchReport {
    pub playlist: SessionResult<PlaylistSnapshot>,
    pub play: SessionResult<()>,
}

/// Playlist listing plus the busy flag that blocks overlapping switches.
#[derive(Debug, Default)]
pub struct PlaylistNavigator {
    loading: bool,
    playlist: PlaylistSnapshot,
}

impl PlaylistNavigator {
    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn playlist(&self) -> &PlaylistSnapshot {
        &self.playlist
    }

    pub fn set_playlist(&mut self, playlist: PlaylistSnapshot) {
        self.playlist = playlist;
    }

    /// Marks a switch as started.
    ///
    /// Returns `Ok(false)` when the request would select the session that is
    /// already current.
    pub fn begin(&mut self, request: NavigationRequest) -> SessionResult<bool> {
        if self.loading {
            return Err(SessionError::NavigationBusy);
        }
        if let NavigationRequest::Select(index) = request {
            let current = self.playlist.current.as_ref().map(|current| current.index);
            if current == Some(index) {
                info!("PlaylistNavigator: session {} is already current", index);
                return Ok(false);
            }
        }
        self.loading = true;
        Ok(true)
    }

    /// Ends a switch on every completion path.
    pub fn finish(&mut self, playlist: Option<PlaylistSnapshot>) {
        self.loading = false;
        if let Some(playlist) = playlist {
            self.playlist = playlist;
        }
    }
}

/// Switches sessions, then refreshes the listing and resumes playback.
pub fn run_navigation(
    backend: &dyn SessionBackend,
    request: NavigationRequest,
) -> SessionResult<SwitchReport> {
    let switched = match request {
        NavigationRequest::Next => backend.next_session(),
        NavigationRequest::Previous => backend.previous_session(),
        NavigationRequest::Select(index) => backend.select_session(index),
    };
    if let Err(err) = switched {
        warn!("PlaylistNavigator: {:?} failed: {}", request, err);
        return Err(err);
    }

    let playlist = backend.fetch_playlist();
    if let Err(err) = &playlist {
        warn!("PlaylistNavigator: playlist refresh failed: {}", err);
    }
    let play = run_command(backend, TransportCommand::Play);
    Ok(SwitchReport { playlist, play })
}
