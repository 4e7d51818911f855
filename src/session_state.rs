//! Explicitly owned session state.
//!
//! `SessionState` composes the lifecycle, transport values, anchor store, seek
//! bar and playlist navigator. It never performs I/O and never reads the clock:
//! callers pass `now_ms` and feed backend results back in, tagged with the
//! `RequestTicket` they were issued under.
//!
//! Recency is logical, not arrival order. Every request gets a sequence number
//! when it is issued; every local commit (seek, speed change, play/pause flip)
//! also takes one. A poll result issued before the latest commit or before the
//! latest accepted poll is stale. Ending a session, starting an activation or
//! starting a switch bumps the epoch, which invalidates everything in flight.

use log::{debug, info, warn};

use crate::config::{Config, GlitchConfig};
use crate::error::{SessionError, SessionResult};
use crate::extrapolation::{Anchor, AnchorStore, ExtrapolationPlan};
use crate::glitch_filter;
use crate::lifecycle::{LifecycleEvent, SessionLifecycle, SessionLifecycleState};
use crate::playlist_navigator::{NavigationRequest, PlaylistNavigator, SwitchReport};
use crate::progress_surface::ProgressFrame;
use crate::protocol::{
    PlaybackStatus, PlaylistSnapshot, SessionSnapshot, TimelineMarker, TrackGeometry,
};
use crate::seek_bar::{SeekBar, SeekCommit};
use crate::transport::{
    is_supported_speed, toggle_action, validate_speed, ToggleAction, TransportCommand,
    TransportState,
};

/// Identifies when a backend request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub epoch: u64,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationOutcome {
    Activated,
    Failed(SessionError),
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Reading became the new anchor source. Carries the new play state when
    /// the server changed it.
    Accepted { play_state_changed: Option<bool> },
    /// Dropped by the glitch filter.
    Rejected,
    /// Issued before a newer commit, an accepted poll or a new epoch.
    Stale,
    /// HTTP 429; the tick is skipped silently.
    Skipped,
    Failed(SessionError),
    SessionLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleRequest {
    Activate(RequestTicket),
    Command(TransportCommand, RequestTicket),
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Switched {
        playlist_updated: bool,
        play_error: Option<SessionError>,
    },
    Failed(SessionError),
    Stale,
}

pub struct SessionState {
    lifecycle: SessionLifecycle,
    transport: TransportState,
    status: Option<PlaybackStatus>,
    anchor: AnchorStore,
    seek_bar: SeekBar,
    navigator: PlaylistNavigator,
    timeline: Vec<TimelineMarker>,
    glitch: GlitchConfig,
    epoch: u64,
    next_seq: u64,
    last_commit_seq: u64,
    last_accepted_poll_seq: u64,
    toggle_pending: bool,
}

impl SessionState {
    pub fn new(config: &Config) -> Self {
        Self {
            lifecycle: SessionLifecycle::default(),
            transport: TransportState::new(config.playback.default_speed),
            status: None,
            anchor: AnchorStore::default(),
            seek_bar: SeekBar::default(),
            navigator: PlaylistNavigator::default(),
            timeline: Vec::new(),
            glitch: config.glitch.clone(),
            epoch: 0,
            next_seq: 0,
            last_commit_seq: 0,
            last_accepted_poll_seq: 0,
            toggle_pending: false,
        }
    }

    pub fn lifecycle(&self) -> SessionLifecycleState {
        self.lifecycle.state()
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn status(&self) -> Option<&PlaybackStatus> {
        self.status.as_ref()
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor.current()
    }

    pub fn playlist(&self) -> &PlaylistSnapshot {
        self.navigator.playlist()
    }

    pub fn timeline(&self) -> &[TimelineMarker] {
        &self.timeline
    }

    pub fn is_loading(&self) -> bool {
        self.navigator.loading()
    }

    pub fn is_dragging(&self) -> bool {
        self.seek_bar.is_dragging()
    }

    /// Whether a result issued under `ticket` still belongs to this session.
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        ticket.epoch == self.epoch
    }

    pub fn ticket(&mut self) -> RequestTicket {
        self.next_seq += 1;
        RequestTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        }
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
        self.toggle_pending = false;
    }

    fn commit_anchor(&mut self, percent: f64, now_ms: f64) {
        let ticket = self.ticket();
        self.last_commit_seq = ticket.seq;
        self.anchor.offer(
            Anchor {
                percent,
                captured_at_ms: now_ms,
            },
            ticket.seq,
        );
    }

    fn total_duration_sec(&self) -> f64 {
        self.status
            .as_ref()
            .map_or(0.0, |status| status.total_duration_sec)
    }

    /// Percent the progress indicator shows at `now_ms`, ignoring any drag.
    pub fn projected_percent(&self, now_ms: f64) -> Option<f64> {
        let anchor = self.anchor.current()?;
        if self.transport.is_playing {
            Some(crate::extrapolation::project(
                &anchor,
                now_ms,
                self.transport.speed,
                self.total_duration_sec(),
            ))
        } else {
            Some(anchor.percent)
        }
    }

    /// Moves the anchor to the projected position so a change in rate does not
    /// make the indicator jump.
    /// Without an anchor the change is still a commit, so older polls cannot
    /// undo it.
    fn rebase(&mut self, now_ms: f64) {
        match self.projected_percent(now_ms) {
            Some(percent) => self.commit_anchor(percent, now_ms),
            None => self.last_commit_seq = self.ticket().seq,
        }
    }

    /// Parameters for the frame loop, or `None` when it must not run.
    pub fn extrapolation_plan(&self) -> Option<ExtrapolationPlan> {
        let total_duration_sec = self.total_duration_sec();
        let runnable = self.lifecycle() == SessionLifecycleState::ActivePlaying
            && self.transport.is_playing
            && !self.seek_bar.is_dragging()
            && !self.navigator.loading()
            && total_duration_sec > 0.0;
        if !runnable {
            return None;
        }
        Some(ExtrapolationPlan {
            anchor: self.anchor.current()?,
            speed: self.transport.speed,
            total_duration_sec,
        })
    }

    /// Frame to show outside the frame loop.
    pub fn display_frame(&self, now_ms: f64) -> ProgressFrame {
        let total_duration_sec = self.total_duration_sec();
        if let Some(drag) = self.seek_bar.drag() {
            return ProgressFrame::at(drag.percent, total_duration_sec, true);
        }
        match self.projected_percent(now_ms) {
            Some(percent) if self.status.is_some() => {
                ProgressFrame::at(percent, total_duration_sec, false)
            }
            _ => ProgressFrame::at(0.0, total_duration_sec, false),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            lifecycle: self.lifecycle(),
            is_playing: self.transport.is_playing,
            playback_speed: self.transport.speed,
            loading: self.navigator.loading(),
            dragging: self.seek_bar.is_dragging(),
            status: self.status.clone(),
        }
    }

    // Activation

    pub fn begin_activation(&mut self) -> SessionResult<RequestTicket> {
        self.lifecycle.apply(LifecycleEvent::Activate)?;
        self.bump_epoch();
        self.status = None;
        self.anchor.clear();
        Ok(self.ticket())
    }

    pub fn finish_activation(
        &mut self,
        ticket: RequestTicket,
        result: SessionResult<()>,
    ) -> ActivationOutcome {
        if !self.is_current(ticket) || self.lifecycle() != SessionLifecycleState::Activating {
            return ActivationOutcome::Stale;
        }
        match result {
            Ok(()) => match self.lifecycle.apply(LifecycleEvent::ActivationSucceeded) {
                Ok(_) => {
                    self.transport.is_playing = true;
                    ActivationOutcome::Activated
                }
                Err(err) => ActivationOutcome::Failed(err),
            },
            Err(err) => {
                warn!("SessionState: activation failed: {}", err);
                let _ = self.lifecycle.apply(LifecycleEvent::ActivationFailed);
                self.transport.is_playing = false;
                ActivationOutcome::Failed(err)
            }
        }
    }

    // Status polling

    /// Allocates a ticket for the next poll, if polling is allowed now.
    pub fn issue_poll(&mut self) -> Option<RequestTicket> {
        if !self.lifecycle().is_active() || self.navigator.loading() {
            return None;
        }
        Some(self.ticket())
    }

    pub fn apply_poll(
        &mut self,
        ticket: RequestTicket,
        result: SessionResult<PlaybackStatus>,
        now_ms: f64,
    ) -> PollOutcome {
        if !self.is_current(ticket) || !self.lifecycle().is_active() {
            return PollOutcome::Stale;
        }
        let status = match result {
            Ok(status) => status,
            Err(SessionError::RateLimited) => {
                debug!("SessionState: status poll rate limited, skipping tick");
                return PollOutcome::Skipped;
            }
            Err(err) => return PollOutcome::Failed(err),
        };
        if ticket.seq < self.last_commit_seq || ticket.seq < self.last_accepted_poll_seq {
            debug!(
                "SessionState: dropping stale status #{} (commit #{}, poll #{})",
                ticket.seq, self.last_commit_seq, self.last_accepted_poll_seq
            );
            return PollOutcome::Stale;
        }
        if !status.session_active {
            self.lose_session();
            return PollOutcome::SessionLost;
        }
        if !glitch_filter::accept(self.status.as_ref(), &status, &self.glitch) {
            debug!(
                "SessionState: rejected glitch reading at {:.2}s (playing={})",
                status.current_position_sec, status.is_playing
            );
            return PollOutcome::Rejected;
        }

        self.last_accepted_poll_seq = ticket.seq;
        self.anchor.offer(
            Anchor {
                percent: status.progress_percent,
                captured_at_ms: now_ms,
            },
            ticket.seq,
        );
        if is_supported_speed(status.playback_speed) {
            self.transport.speed = status.playback_speed;
        }
        let play_state_changed = if status.is_playing != self.transport.is_playing {
            self.transport.is_playing = status.is_playing;
            let _ = self.lifecycle.apply(LifecycleEvent::PlayStateObserved {
                playing: status.is_playing,
            });
            Some(status.is_playing)
        } else {
            None
        };
        self.status = Some(status);
        PollOutcome::Accepted { play_state_changed }
    }

    // Seek bar

    fn can_seek(&self) -> bool {
        self.lifecycle().is_active() && self.total_duration_sec() > 0.0
    }

    pub fn pointer_down(&mut self, pointer_x: f64, track: TrackGeometry) -> Option<ProgressFrame> {
        if !self.can_seek() {
            return None;
        }
        let percent = self.seek_bar.pointer_down(pointer_x, track)?;
        Some(ProgressFrame::at(percent, self.total_duration_sec(), true))
    }

    pub fn pointer_move(&mut self, pointer_x: f64, track: TrackGeometry) -> Option<ProgressFrame> {
        let percent = self.seek_bar.pointer_move(pointer_x, track)?;
        Some(ProgressFrame::at(percent, self.total_duration_sec(), true))
    }

    /// Ends the gesture; the returned seek must be sent exactly once.
    pub fn pointer_up(&mut self, now_ms: f64) -> Option<SeekCommit> {
        let commit = self.seek_bar.pointer_up(self.total_duration_sec())?;
        self.apply_seek(commit, now_ms);
        Some(commit)
    }

    pub fn pointer_cancel(&mut self) -> bool {
        self.seek_bar.cancel()
    }

    /// Seek by time rather than by pointer.
    pub fn seek_seconds(&mut self, seconds: f64, now_ms: f64) -> Option<SeekCommit> {
        if !self.can_seek() || !seconds.is_finite() {
            return None;
        }
        let total_duration_sec = self.total_duration_sec();
        let seek_sec = seconds.clamp(0.0, total_duration_sec);
        let commit = SeekCommit {
            percent: seek_sec / total_duration_sec * 100.0,
            seek_sec,
        };
        self.seek_bar.cancel();
        self.apply_seek(commit, now_ms);
        Some(commit)
    }

    fn apply_seek(&mut self, commit: SeekCommit, now_ms: f64) {
        self.commit_anchor(commit.percent, now_ms);
        if let Some(status) = self.status.as_mut() {
            status.progress_percent = commit.percent;
            status.current_position_sec = commit.seek_sec;
        }
    }

    // Transport

    pub fn request_toggle(&mut self) -> SessionResult<ToggleRequest> {
        match toggle_action(self.lifecycle()) {
            ToggleAction::Activate => Ok(ToggleRequest::Activate(self.begin_activation()?)),
            ToggleAction::Ignore => Ok(ToggleRequest::Ignored),
            _ if self.toggle_pending => Ok(ToggleRequest::Ignored),
            ToggleAction::Pause => {
                self.toggle_pending = true;
                Ok(ToggleRequest::Command(TransportCommand::Pause, self.ticket()))
            }
            ToggleAction::Play => {
                self.toggle_pending = true;
                Ok(ToggleRequest::Command(TransportCommand::Play, self.ticket()))
            }
        }
    }

    /// Applies a finished play/pause request. Returns the new play state when
    /// it was flipped.
    pub fn finish_toggle(
        &mut self,
        ticket: RequestTicket,
        command: TransportCommand,
        result: SessionResult<()>,
        now_ms: f64,
    ) -> SessionResult<Option<bool>> {
        if !self.is_current(ticket) {
            return Ok(None);
        }
        self.toggle_pending = false;
        result?;
        if !self.lifecycle().is_active() {
            return Ok(None);
        }
        let playing = command == TransportCommand::Play;
        self.rebase(now_ms);
        self.transport.is_playing = playing;
        self.lifecycle
            .apply(LifecycleEvent::PlayStateObserved { playing })?;
        if let Some(status) = self.status.as_mut() {
            status.is_playing = playing;
        }
        Ok(Some(playing))
    }

    /// Updates the local speed immediately. Returns the command to send, or
    /// `None` while no session is active.
    pub fn set_speed(&mut self, speed: f64, now_ms: f64) -> SessionResult<Option<TransportCommand>> {
        let speed = validate_speed(speed)?;
        if !self.lifecycle().is_active() {
            self.transport.speed = speed;
            return Ok(None);
        }
        self.rebase(now_ms);
        self.transport.speed = speed;
        if let Some(status) = self.status.as_mut() {
            status.playback_speed = speed;
        }
        Ok(Some(TransportCommand::SetSpeed(speed)))
    }

    // Playlist

    /// Starts a switch. Returns `None` when the request is a no-op.
    pub fn begin_navigation(
        &mut self,
        request: NavigationRequest,
    ) -> SessionResult<Option<RequestTicket>> {
        if !self.navigator.begin(request)? {
            return Ok(None);
        }
        if let Err(err) = self.lifecycle.apply(LifecycleEvent::Navigate) {
            self.navigator.finish(None);
            return Err(err);
        }
        self.bump_epoch();
        self.status = None;
        self.anchor.clear();
        self.seek_bar.cancel();
        Ok(Some(self.ticket()))
    }

    pub fn finish_navigation(
        &mut self,
        ticket: RequestTicket,
        result: SessionResult<SwitchReport>,
    ) -> NavigationOutcome {
        if !self.is_current(ticket) || self.lifecycle() != SessionLifecycleState::Switching {
            return NavigationOutcome::Stale;
        }
        match result {
            Ok(report) => {
                let playlist_updated = report.playlist.is_ok();
                self.navigator.finish(report.playlist.ok());
                let _ = self.lifecycle.apply(LifecycleEvent::SwitchSucceeded);
                self.transport.is_playing = true;
                self.timeline.clear();
                NavigationOutcome::Switched {
                    playlist_updated,
                    play_error: report.play.err(),
                }
            }
            Err(err) => {
                self.navigator.finish(None);
                let restored = self
                    .lifecycle
                    .apply(LifecycleEvent::SwitchFailed)
                    .unwrap_or(SessionLifecycleState::ActivePaused);
                self.transport.is_playing = restored == SessionLifecycleState::ActivePlaying;
                NavigationOutcome::Failed(err)
            }
        }
    }

    /// Replaces the playlist listing with a fetch issued under `ticket`.
    pub fn apply_playlist(&mut self, ticket: RequestTicket, playlist: PlaylistSnapshot) -> bool {
        if !self.is_current(ticket) || self.navigator.loading() {
            return false;
        }
        self.navigator.set_playlist(playlist);
        true
    }

    pub fn apply_timeline(&mut self, ticket: RequestTicket, markers: Vec<TimelineMarker>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.timeline = markers;
        true
    }

    // Teardown

    fn end_session(&mut self) {
        self.bump_epoch();
        self.status = None;
        self.anchor.clear();
        self.seek_bar.cancel();
        self.navigator.finish(None);
        self.timeline.clear();
        self.transport.is_playing = false;
    }

    pub fn stop(&mut self) -> SessionResult<()> {
        self.lifecycle.apply(LifecycleEvent::Stop)?;
        self.end_session();
        Ok(())
    }

    fn lose_session(&mut self) {
        info!("SessionState: backend reports no active session");
        let _ = self.lifecycle.apply(LifecycleEvent::SessionLost);
        self.end_session();
    }
}
