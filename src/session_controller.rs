//! Async shell around `SessionState`.
//!
//! The controller owns the session state, the backend adapter and the handles
//! of the two background loops:
//! - the poll loop ticks every `poll_interval_ms` while a session is active
//! - the frame loop projects the anchor onto the progress surface while playing
//!
//! Backend calls block, so they run on `spawn_blocking` workers and report back
//! through an mpsc channel. Only the controller task mutates session state.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use log::{debug, error, info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::audio_feedback::AudioFeedbackSink;
use crate::backends::SessionBackend;
use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::extrapolation::{ExtrapolationPlan, MonotonicClock};
use crate::playlist_navigator::{run_navigation, NavigationRequest, SwitchReport};
use crate::progress_surface::{ProgressFrame, ProgressSurface};
use crate::protocol::{
    Message, PlaybackStatus, PlaylistMessage, PlaylistSnapshot, SeekBarMessage, SessionMessage,
    SessionSnapshot, TimelineMarker, TransportControl, TransportMessage,
};
use crate::session_state::{
    ActivationOutcome, NavigationOutcome, PollOutcome, RequestTicket, SessionState, ToggleRequest,
};
use crate::transport::{run_command, TransportCommand};

/// Results and timer ticks delivered back to the controller task.
enum ControllerEvent {
    PollTick,
    Activation {
        ticket: RequestTicket,
        result: SessionResult<()>,
    },
    Poll {
        ticket: RequestTicket,
        result: SessionResult<PlaybackStatus>,
    },
    Toggle {
        ticket: RequestTicket,
        command: TransportCommand,
        result: SessionResult<()>,
    },
    Command {
        ticket: RequestTicket,
        command: TransportCommand,
        result: SessionResult<()>,
    },
    Navigation {
        ticket: RequestTicket,
        result: SessionResult<SwitchReport>,
    },
    Playlist {
        ticket: RequestTicket,
        result: SessionResult<PlaylistSnapshot>,
    },
    Timeline {
        ticket: RequestTicket,
        result: SessionResult<Vec<TimelineMarker>>,
    },
}

struct LoopHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

pub struct SessionController {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    backend: Arc<dyn SessionBackend>,
    audio: Arc<dyn AudioFeedbackSink>,
    surface: Arc<dyn ProgressSurface>,
    clock: MonotonicClock,
    state: SessionState,
    poll_interval: Duration,
    frame_interval: Duration,
    activation_timeout_ms: u64,
    request_budget: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    event_sender: mpsc::UnboundedSender<ControllerEvent>,
    event_receiver: mpsc::UnboundedReceiver<ControllerEvent>,
    plan_sender: watch::Sender<Option<ExtrapolationPlan>>,
    session_token: CancellationToken,
    poll_loop: Option<LoopHandle>,
    frame_loop: Option<LoopHandle>,
    last_snapshot: Option<SessionSnapshot>,
}

impl SessionController {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        backend: Arc<dyn SessionBackend>,
        audio: Arc<dyn AudioFeedbackSink>,
        surface: Arc<dyn ProgressSurface>,
        config: &Config,
    ) -> Self {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let (plan_sender, _) = watch::channel(None);
        let requests_per_minute =
            NonZeroU32::new(config.backend.max_requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            bus_consumer,
            bus_producer,
            backend,
            audio,
            surface,
            clock: MonotonicClock::new(),
            state: SessionState::new(config),
            poll_interval: Duration::from_millis(config.playback.poll_interval_ms),
            frame_interval: Duration::from_millis(config.playback.frame_interval_ms.max(1)),
            activation_timeout_ms: config.backend.activation_timeout_ms,
            request_budget: RateLimiter::direct(Quota::per_minute(requests_per_minute)),
            event_sender,
            event_receiver,
            plan_sender,
            session_token: CancellationToken::new(),
            poll_loop: None,
            frame_loop: None,
            last_snapshot: None,
        }
    }

    /// Runs the controller on a dedicated single-threaded runtime. Blocks until
    /// shutdown.
    pub fn run_blocking(mut self) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        runtime.block_on(self.run());
        Ok(())
    }

    /// Starts the controller loop. Returns on `SessionMessage::Shutdown` or when
    /// the bus closes.
    pub async fn run(&mut self) {
        info!("SessionController: started");
        self.publish_state();
        loop {
            let keep_running = tokio::select! {
                message = self.bus_consumer.recv() => match message {
                    Ok(message) => self.handle_message(message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SessionController: bus lagged by {} messages", skipped);
                        true
                    }
                    Err(RecvError::Closed) => false,
                },
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                    true
                }
            };
            if !keep_running {
                break;
            }
            self.sync_loops();
            self.publish_state();
        }
        self.session_token.cancel();
        self.cancel_poll_loop();
        self.cancel_frame_loop();
        info!("SessionController: stopped");
    }

    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Transport(message) => self.handle_transport(message),
            Message::SeekBar(message) => self.handle_seek_bar(message),
            Message::Playlist(message) => self.handle_playlist(message),
            Message::Session(SessionMessage::Shutdown) => return false,
            Message::Session(_) | Message::Audio(_) => {}
        }
        true
    }

    fn handle_transport(&mut self, message: TransportMessage) {
        let now_ms = self.clock.now_ms();
        match message {
            TransportMessage::TogglePlayPause => match self.state.request_toggle() {
                Ok(ToggleRequest::Activate(ticket)) => self.start_activation(ticket),
                Ok(ToggleRequest::Command(command, ticket)) => {
                    self.consume_budget();
                    self.spawn_backend_call(
                        move |backend| run_command(backend, command),
                        move |result| ControllerEvent::Toggle {
                            ticket,
                            command,
                            result,
                        },
                    );
                }
                Ok(ToggleRequest::Ignored) => {
                    debug!(
                        "SessionController: play/pause ignored while {:?}",
                        self.state.lifecycle()
                    );
                }
                Err(err) => self.report(&err, Some(TransportControl::PlayPause)),
            },
            TransportMessage::SetSpeed(speed) => match self.state.set_speed(speed, now_ms) {
                Ok(Some(command)) => self.send_command(command),
                Ok(None) => {}
                Err(err) => self.report(&err, Some(TransportControl::Speed)),
            },
            TransportMessage::SeekSeconds(seconds) => {
                match self.state.seek_seconds(seconds, now_ms) {
                    Some(commit) => self.send_command(TransportCommand::Seek(commit.seek_sec)),
                    None => debug!("SessionController: seek to {}s ignored", seconds),
                }
            }
            TransportMessage::Stop => self.stop(),
        }
    }

    fn handle_seek_bar(&mut self, message: SeekBarMessage) {
        match message {
            SeekBarMessage::PointerDown { x, track } => {
                if self.state.pointer_down(x, track).is_none() {
                    debug!("SessionController: pointer down ignored");
                }
            }
            SeekBarMessage::PointerMove { x, track } => {
                let _ = self.state.pointer_move(x, track);
            }
            SeekBarMessage::PointerUp => {
                if let Some(commit) = self.state.pointer_up(self.clock.now_ms()) {
                    self.send_command(TransportCommand::Seek(commit.seek_sec));
                }
            }
            SeekBarMessage::PointerCancel => {
                self.state.pointer_cancel();
            }
        }
    }

    fn handle_playlist(&mut self, message: PlaylistMessage) {
        let request = match message {
            PlaylistMessage::Next => NavigationRequest::Next,
            PlaylistMessage::Previous => NavigationRequest::Previous,
            PlaylistMessage::SelectByIndex(index) => NavigationRequest::Select(index),
            PlaylistMessage::Refresh => {
                if self.state.lifecycle().is_active() {
                    let ticket = self.state.ticket();
                    self.fetch_playlist(ticket);
                }
                return;
            }
        };
        match self.state.begin_navigation(request) {
            Ok(Some(ticket)) => {
                // Work still running for the session being left must not report.
                self.session_token.cancel();
                self.session_token = CancellationToken::new();
                self.consume_budget();
                self.spawn_backend_call(
                    move |backend| run_navigation(backend, request),
                    move |result| ControllerEvent::Navigation { ticket, result },
                );
            }
            Ok(None) => {}
            Err(err) => self.report(&err, Some(TransportControl::Playlist)),
        }
    }

    fn handle_event(&mut self, event: ControllerEvent) {
        let now_ms = self.clock.now_ms();
        match event {
            ControllerEvent::PollTick => self.poll_status(),
            ControllerEvent::Poll { ticket, result } => {
                match self.state.apply_poll(ticket, result, now_ms) {
                    PollOutcome::Accepted {
                        play_state_changed: Some(playing),
                    } => self.audio.set_paused(!playing),
                    PollOutcome::Accepted { .. }
                    | PollOutcome::Rejected
                    | PollOutcome::Stale
                    | PollOutcome::Skipped => {}
                    PollOutcome::Failed(err) => {
                        warn!("SessionController: status poll failed: {}", err);
                        self.report(&err, None);
                    }
                    PollOutcome::SessionLost => {
                        warn!("SessionController: playback session lost");
                        self.end_session();
                        self.report(&SessionError::SessionLost, None);
                    }
                }
            }
            ControllerEvent::Activation { ticket, result } => {
                match self.state.finish_activation(ticket, result) {
                    ActivationOutcome::Activated => {
                        info!("SessionController: session mode active");
                        self.audio.set_paused(false);
                        let ticket = self.state.ticket();
                        self.fetch_playlist(ticket);
                        self.fetch_timeline(ticket);
                    }
                    ActivationOutcome::Failed(err) => {
                        self.session_token.cancel();
                        self.report(&err, Some(TransportControl::PlayPause));
                    }
                    ActivationOutcome::Stale => {}
                }
            }
            ControllerEvent::Toggle {
                ticket,
                command,
                result,
            } => match self.state.finish_toggle(ticket, command, result, now_ms) {
                Ok(Some(playing)) => self.audio.set_paused(!playing),
                Ok(None) => {}
                Err(err) => self.report(&err, Some(TransportControl::PlayPause)),
            },
            ControllerEvent::Command {
                ticket,
                command,
                result,
            } => {
                if !self.state.is_current(ticket) {
                    debug!(
                        "SessionController: dropping {:?} result from an earlier session",
                        command
                    );
                } else if let Err(err) = result {
                    self.report(&err, Some(command.control()));
                }
            }
            ControllerEvent::Navigation { ticket, result } => {
                match self.state.finish_navigation(ticket, result) {
                    NavigationOutcome::Switched {
                        playlist_updated,
                        play_error,
                    } => {
                        self.audio.set_paused(false);
                        if playlist_updated {
                            self.publish(SessionMessage::PlaylistUpdated(
                                self.state.playlist().clone(),
                            ));
                        }
                        if let Some(err) = play_error {
                            self.report(&err, Some(TransportControl::PlayPause));
                        }
                        let ticket = self.state.ticket();
                        self.fetch_timeline(ticket);
                    }
                    NavigationOutcome::Failed(err) => {
                        self.report(&err, Some(TransportControl::Playlist));
                    }
                    NavigationOutcome::Stale => {}
                }
            }
            ControllerEvent::Playlist { ticket, result } => match result {
                Ok(playlist) => {
                    if self.state.apply_playlist(ticket, playlist) {
                        self.publish(SessionMessage::PlaylistUpdated(
                            self.state.playlist().clone(),
                        ));
                    }
                }
                Err(err) => warn!("SessionController: playlist fetch failed: {}", err),
            },
            ControllerEvent::Timeline { ticket, result } => match result {
                Ok(markers) => {
                    if self.state.apply_timeline(ticket, markers) {
                        self.publish(SessionMessage::TimelineUpdated(
                            self.state.timeline().to_vec(),
                        ));
                    }
                }
                Err(err) => warn!("SessionController: timeline fetch failed: {}", err),
            },
        }
    }

    fn start_activation(&mut self, ticket: RequestTicket) {
        self.session_token.cancel();
        self.session_token = CancellationToken::new();
        self.consume_budget();

        let backend = Arc::clone(&self.backend);
        let events = self.event_sender.clone();
        let token = self.session_token.clone();
        let timeout_ms = self.activation_timeout_ms;
        tokio::spawn(async move {
            let call = tokio::task::spawn_blocking(move || backend.activate());
            let result =
                match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
                    Ok(joined) => flatten_join(joined),
                    Err(_) => Err(SessionError::ActivationTimeout(timeout_ms)),
                };
            if !token.is_cancelled() {
                let _ = events.send(ControllerEvent::Activation { ticket, result });
            }
        });
    }

    fn poll_status(&mut self) {
        let Some(ticket) = self.state.issue_poll() else {
            return;
        };
        if self.request_budget.check().is_err() {
            debug!("SessionController: request budget exhausted, skipping status poll");
            return;
        }
        self.spawn_backend_call(
            |backend| backend.fetch_status(),
            move |result| ControllerEvent::Poll { ticket, result },
        );
    }

    fn send_command(&mut self, command: TransportCommand) {
        self.consume_budget();
        let ticket = self.state.ticket();
        self.spawn_backend_call(
            move |backend| run_command(backend, command),
            move |result| ControllerEvent::Command {
                ticket,
                command,
                result,
            },
        );
    }

    fn fetch_playlist(&mut self, ticket: RequestTicket) {
        self.consume_budget();
        self.spawn_backend_call(
            |backend| backend.fetch_playlist(),
            move |result| ControllerEvent::Playlist { ticket, result },
        );
    }

    fn fetch_timeline(&mut self, ticket: RequestTicket) {
        self.consume_budget();
        self.spawn_backend_call(
            |backend| backend.fetch_timeline(),
            move |result| ControllerEvent::Timeline { ticket, result },
        );
    }

    fn stop(&mut self) {
        if let Err(err) = self.state.stop() {
            debug!("SessionController: stop ignored: {}", err);
            return;
        }
        self.end_session();
        let backend = Arc::clone(&self.backend);
        // Not bound to the session token; the next activation must start fresh.
        tokio::task::spawn_blocking(move || {
            if let Err(err) = backend.deactivate() {
                warn!("SessionController: failed to return backend to idle: {}", err);
            }
        });
    }

    fn end_session(&mut self) {
        self.session_token.cancel();
        self.cancel_poll_loop();
        self.cancel_frame_loop();
        self.audio.set_paused(true);
    }

    /// Commands are always sent; an exhausted budget is only logged.
    fn consume_budget(&self) {
        if self.request_budget.check().is_err() {
            debug!("SessionController: request budget exhausted by user command");
        }
    }

    /// Runs `call` on a blocking worker and reports its result unless the
    /// session ended in the meantime.
    fn spawn_backend_call<T, F, E>(&self, call: F, into_event: E)
    where
        T: Send + 'static,
        F: FnOnce(&dyn SessionBackend) -> SessionResult<T> + Send + 'static,
        E: FnOnce(SessionResult<T>) -> ControllerEvent + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let events = self.event_sender.clone();
        let token = self.session_token.clone();
        tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || call(backend.as_ref())).await;
            if token.is_cancelled() {
                return;
            }
            let _ = events.send(into_event(flatten_join(joined)));
        });
    }

    fn report(&self, err: &SessionError, control: Option<TransportControl>) {
        match err.to_notice(control) {
            Some(notice) => self.publish(SessionMessage::Notice(notice)),
            None => debug!("SessionController: {}", err),
        }
    }

    fn publish(&self, message: SessionMessage) {
        let _ = self.bus_producer.send(Message::Session(message));
    }

    fn publish_state(&mut self) {
        let snapshot = self.state.snapshot();
        if self.last_snapshot.as_ref() == Some(&snapshot) {
            return;
        }
        self.last_snapshot = Some(snapshot.clone());
        self.publish(SessionMessage::StateChanged(snapshot));
    }

    /// Starts or cancels the loops to match the current state.
    fn sync_loops(&mut self) {
        if self.state.lifecycle().is_active() {
            if !self.poll_loop.as_ref().is_some_and(LoopHandle::is_running) {
                self.start_poll_loop();
            }
        } else {
            self.cancel_poll_loop();
        }

        let plan = self.state.extrapolation_plan();
        self.plan_sender.send_replace(plan);
        if plan.is_some() {
            if !self.frame_loop.as_ref().is_some_and(LoopHandle::is_running) {
                self.start_frame_loop();
            }
        } else {
            self.cancel_frame_loop();
            self.surface
                .write(self.state.display_frame(self.clock.now_ms()));
        }
    }

    fn start_poll_loop(&mut self) {
        self.cancel_poll_loop();
        let token = self.session_token.child_token();
        let loop_token = token.clone();
        let events = self.event_sender.clone();
        let period = self.poll_interval;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if events.send(ControllerEvent::PollTick).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        debug!("SessionController: poll loop started ({:?})", period);
        self.poll_loop = Some(LoopHandle { token, task });
    }

    fn start_frame_loop(&mut self) {
        self.cancel_frame_loop();
        let token = self.session_token.child_token();
        let loop_token = token.clone();
        let mut plan_receiver = self.plan_sender.subscribe();
        let surface = Arc::clone(&self.surface);
        let clock = self.clock;
        let period = self.frame_interval;
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(plan) = *plan_receiver.borrow_and_update() else {
                            break;
                        };
                        let percent = plan.project(clock.now_ms());
                        surface.write(ProgressFrame::at(percent, plan.total_duration_sec, false));
                    }
                }
            }
        });
        self.frame_loop = Some(LoopHandle { token, task });
    }

    fn cancel_poll_loop(&mut self) {
        if let Some(handle) = self.poll_loop.take() {
            handle.token.cancel();
        }
    }

    fn cancel_frame_loop(&mut self) {
        if let Some(handle) = self.frame_loop.take() {
            handle.token.cancel();
        }
    }
}

fn flatten_join<T>(joined: Result<SessionResult<T>, tokio::task::JoinError>) -> SessionResult<T> {
    joined.unwrap_or_else(|err| {
        error!("SessionController: backend worker failed: {}", err);
        Err(SessionError::Network(format!("backend worker failed: {err}")))
    })
}

#[cfg(test)]
mod tests {
    use super::SessionController;
    use crate::audio_feedback::BusAudioFeedback;
    use crate::backends::scripted::{inactive_status, playing_status, BackendCall, ScriptedBackend};
    use crate::config::Config;
    use crate::error::SessionError;
    use crate::lifecycle::SessionLifecycleState;
    use crate::progress_surface::{ProgressFrame, RetainedProgressHandle};
    use crate::protocol::{
        AudioFeedbackMessage, Message, NoticeKind, PlaylistMessage, SeekBarMessage,
        SessionMessage, TrackGeometry, TransportControl, TransportMessage,
    };
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast::{self, error::TryRecvError, Receiver, Sender};

    const WAIT: Duration = Duration::from_secs(3);
    const TRACK: TrackGeometry = TrackGeometry {
        left: 0.0,
        width: 500.0,
    };

    struct ControllerHarness {
        bus_sender: Sender<Message>,
        receiver: Receiver<Message>,
        backend: Arc<ScriptedBackend>,
        progress: RetainedProgressHandle,
        controller_thread: Option<thread::JoinHandle<()>>,
    }

    impl ControllerHarness {
        fn new(backend: ScriptedBackend) -> Self {
            let mut config = Config::default();
            config.playback.poll_interval_ms = 40;
            config.backend.activation_timeout_ms = 150;
            Self::with_config(backend, config)
        }

        fn with_config(backend: ScriptedBackend, config: Config) -> Self {
            let (bus_sender, _) = broadcast::channel(4096);
            let backend = Arc::new(backend);
            let progress = RetainedProgressHandle::new();
            let receiver = bus_sender.subscribe();
            let controller = SessionController::new(
                bus_sender.subscribe(),
                bus_sender.clone(),
                backend.clone(),
                Arc::new(BusAudioFeedback::new(bus_sender.clone())),
                Arc::new(progress.clone()),
                &config,
            );
            let controller_thread = thread::spawn(move || {
                controller
                    .run_blocking()
                    .expect("controller runtime should start");
            });
            Self {
                bus_sender,
                receiver,
                backend,
                progress,
                controller_thread: Some(controller_thread),
            }
        }

        fn send(&self, message: Message) {
            self.bus_sender
                .send(message)
                .expect("failed to send message to bus");
        }

        fn activate(&mut self) {
            self.send(Message::Transport(TransportMessage::TogglePlayPause));
            self.wait_for_lifecycle(SessionLifecycleState::ActivePlaying);
        }

        /// Activates and waits until a status reading has been accepted.
        fn activate_with_status(&mut self) {
            self.activate();
            wait_for_message(&mut self.receiver, WAIT, |message| {
                matches!(
                    message,
                    Message::Session(SessionMessage::StateChanged(snapshot))
                        if snapshot.status.is_some()
                )
            });
        }

        fn wait_for_lifecycle(&mut self, lifecycle: SessionLifecycleState) {
            wait_for_message(&mut self.receiver, WAIT, |message| {
                matches!(
                    message,
                    Message::Session(SessionMessage::StateChanged(snapshot))
                        if snapshot.lifecycle == lifecycle
                )
            });
        }

        fn wait_for_progress<F>(&self, mut predicate: F)
        where
            F: FnMut(&ProgressFrame) -> bool,
        {
            let start = Instant::now();
            while !predicate(&self.progress.snapshot()) {
                if start.elapsed() > WAIT {
                    panic!("timed out waiting for progress frame");
                }
                thread::sleep(Duration::from_millis(5));
            }
        }

        fn wait_for_calls(&self, call: BackendCall, count: usize) {
            let start = Instant::now();
            while self.backend.count(&call) < count {
                if start.elapsed() > WAIT {
                    panic!("timed out waiting for {:?} x{}", call, count);
                }
                thread::sleep(Duration::from_millis(5));
            }
        }
    }

    impl Drop for ControllerHarness {
        fn drop(&mut self) {
            let _ = self
                .bus_sender
                .send(Message::Session(SessionMessage::Shutdown));
            if let Some(controller_thread) = self.controller_thread.take() {
                let _ = controller_thread.join();
            }
        }
    }

    fn wait_for_message<F>(
        receiver: &mut Receiver<Message>,
        timeout: Duration,
        mut predicate: F,
    ) -> Message
    where
        F: FnMut(&Message) -> bool,
    {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timed out waiting for expected message");
            }
            match receiver.try_recv() {
                Ok(message) => {
                    if predicate(&message) {
                        return message;
                    }
                }
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("bus closed while waiting for message"),
            }
        }
    }

    #[test]
    fn test_toggle_while_inactive_activates_and_fetches_listing() {
        let mut harness = ControllerHarness::new(ScriptedBackend::new());

        harness.activate();

        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(message, Message::Session(SessionMessage::PlaylistUpdated(_)))
        });
        harness.wait_for_calls(BackendCall::FetchTimeline, 1);
        harness.wait_for_calls(BackendCall::FetchStatus, 1);
        assert_eq!(harness.backend.count(&BackendCall::Activate), 1);
        assert_eq!(harness.backend.count(&BackendCall::Play), 0);
    }

    #[test]
    fn test_activation_resumes_audio() {
        let mut harness = ControllerHarness::new(ScriptedBackend::new());
        harness.send(Message::Transport(TransportMessage::TogglePlayPause));
        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(
                message,
                Message::Audio(AudioFeedbackMessage::SetPaused(false))
            )
        });
    }

    #[test]
    fn test_activation_timeout_is_reported_and_returns_to_inactive() {
        let backend = ScriptedBackend::new();
        backend.delay(BackendCall::Activate, Duration::from_millis(600));
        let mut harness = ControllerHarness::new(backend);

        harness.send(Message::Transport(TransportMessage::TogglePlayPause));

        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(
                message,
                Message::Session(SessionMessage::Notice(notice))
                    if notice.kind == NoticeKind::ActivationTimeout
            )
        });
        harness.wait_for_lifecycle(SessionLifecycleState::Inactive);
    }

    #[test]
    fn test_drag_gesture_issues_exactly_one_seek() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(playing_status(10.0, 600.0));
        let mut harness = ControllerHarness::new(backend);
        harness.activate_with_status();

        harness.send(Message::SeekBar(SeekBarMessage::PointerDown {
            x: 100.0,
            track: TRACK,
        }));
        harness.send(Message::SeekBar(SeekBarMessage::PointerMove {
            x: 200.0,
            track: TRACK,
        }));
        harness.send(Message::SeekBar(SeekBarMessage::PointerMove {
            x: 300.0,
            track: TRACK,
        }));
        harness.wait_for_progress(|frame| frame.dragging && (frame.percent - 60.0).abs() < 1e-9);
        assert_eq!(harness.backend.count(&BackendCall::Seek(0.0)), 0);

        harness.send(Message::SeekBar(SeekBarMessage::PointerUp));
        harness.wait_for_calls(BackendCall::Seek(0.0), 1);
        thread::sleep(Duration::from_millis(50));

        let seeks = harness
            .backend
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::Seek(_)))
            .collect::<Vec<_>>();
        assert_eq!(seeks, vec![BackendCall::Seek(360.0)]);
    }

    #[test]
    fn test_frame_loop_animates_progress_while_playing() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(playing_status(50.0, 600.0));
        let mut config = Config::default();
        config.playback.poll_interval_ms = 40;
        config.playback.frame_interval_ms = 5;
        let mut harness = ControllerHarness::with_config(backend, config);
        harness.activate_with_status();

        let revision = harness.progress.revision();
        thread::sleep(Duration::from_millis(100));

        assert!(harness.progress.revision() > revision);
        let progress = harness.progress.snapshot();
        assert!(progress.percent >= 50.0);
        assert_eq!(progress.total_label, "10:00");
    }

    #[test]
    fn test_session_lost_resets_to_inactive_with_notice() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(inactive_status());
        let mut harness = ControllerHarness::new(backend);
        harness.activate();

        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(
                message,
                Message::Session(SessionMessage::Notice(notice))
                    if notice.kind == NoticeKind::SessionLost
            )
        });
        harness.wait_for_lifecycle(SessionLifecycleState::Inactive);
    }

    #[test]
    fn test_failed_navigation_clears_loading_and_reports() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(playing_status(10.0, 600.0));
        backend.fail(
            BackendCall::Next,
            SessionError::BackendLogic("No next session".to_string()),
        );
        let mut harness = ControllerHarness::new(backend);
        harness.activate_with_status();

        harness.send(Message::Playlist(PlaylistMessage::Next));

        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(
                message,
                Message::Session(SessionMessage::Notice(notice))
                    if notice.kind == NoticeKind::Control(TransportControl::Playlist)
            )
        });
        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(
                message,
                Message::Session(SessionMessage::StateChanged(snapshot))
                    if !snapshot.loading
                        && snapshot.lifecycle == SessionLifecycleState::ActivePlaying
            )
        });
        assert_eq!(harness.backend.count(&BackendCall::Play), 0);
    }

    #[test]
    fn test_successful_navigation_refreshes_and_plays() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(playing_status(10.0, 600.0));
        let mut harness = ControllerHarness::new(backend);
        harness.activate_with_status();

        harness.send(Message::Playlist(PlaylistMessage::SelectByIndex(2)));

        harness.wait_for_lifecycle(SessionLifecycleState::Switching);
        harness.wait_for_calls(BackendCall::Play, 1);
        harness.wait_for_lifecycle(SessionLifecycleState::ActivePlaying);
        assert_eq!(harness.backend.count(&BackendCall::Select(2)), 1);
    }

    #[test]
    fn test_seek_failure_from_previous_session_is_not_reported_after_switch() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(playing_status(10.0, 600.0));
        backend.delay(BackendCall::Seek(0.0), Duration::from_millis(200));
        backend.fail(
            BackendCall::Seek(0.0),
            SessionError::BackendLogic("Session mode not active".to_string()),
        );
        let mut harness = ControllerHarness::new(backend);
        harness.activate_with_status();

        harness.send(Message::Transport(TransportMessage::SeekSeconds(300.0)));
        harness.wait_for_calls(BackendCall::Seek(0.0), 1);
        harness.send(Message::Playlist(PlaylistMessage::Next));
        harness.wait_for_lifecycle(SessionLifecycleState::Switching);
        harness.wait_for_calls(BackendCall::Play, 1);

        let deadline = Instant::now() + Duration::from_millis(400);
        while Instant::now() < deadline {
            match harness.receiver.try_recv() {
                Ok(Message::Session(SessionMessage::Notice(notice))) => {
                    assert_ne!(notice.kind, NoticeKind::Control(TransportControl::Seek));
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(TryRecvError::Closed) => panic!("bus closed while waiting for message"),
            }
        }
        assert_eq!(harness.backend.count(&BackendCall::Next), 1);
    }

    #[test]
    fn test_seek_without_active_session_is_ignored() {
        let mut harness = ControllerHarness::new(ScriptedBackend::new());

        harness.send(Message::Transport(TransportMessage::SeekSeconds(120.0)));
        harness.activate();
        harness.send(Message::Transport(TransportMessage::SeekSeconds(f64::NAN)));
        harness.wait_for_calls(BackendCall::FetchStatus, 1);

        assert_eq!(harness.backend.count(&BackendCall::Seek(0.0)), 0);
    }

    #[test]
    fn test_stop_returns_backend_to_idle_and_pauses_audio() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(playing_status(10.0, 600.0));
        let mut harness = ControllerHarness::new(backend);
        harness.activate_with_status();

        harness.send(Message::Transport(TransportMessage::Stop));

        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(message, Message::Audio(AudioFeedbackMessage::SetPaused(true)))
        });
        harness.wait_for_lifecycle(SessionLifecycleState::Inactive);
        harness.wait_for_calls(BackendCall::Deactivate, 1);
    }

    #[test]
    fn test_pause_flips_state_and_notifies_audio() {
        let backend = ScriptedBackend::new();
        backend.set_fallback_status(playing_status(10.0, 600.0));
        let mut config = Config::default();
        config.playback.poll_interval_ms = 60_000;
        let mut harness = ControllerHarness::with_config(backend, config);
        harness.activate();

        harness.send(Message::Transport(TransportMessage::TogglePlayPause));

        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(message, Message::Audio(AudioFeedbackMessage::SetPaused(true)))
        });
        harness.wait_for_lifecycle(SessionLifecycleState::ActivePaused);
        assert_eq!(harness.backend.count(&BackendCall::Pause), 1);
    }

    #[test]
    fn test_unsupported_speed_is_reported_without_request() {
        let mut harness = ControllerHarness::new(ScriptedBackend::new());
        harness.activate();

        harness.send(Message::Transport(TransportMessage::SetSpeed(3.0)));

        wait_for_message(&mut harness.receiver, WAIT, |message| {
            matches!(
                message,
                Message::Session(SessionMessage::Notice(notice))
                    if notice.kind == NoticeKind::Control(TransportControl::Speed)
            )
        });
        assert_eq!(harness.backend.count(&BackendCall::SetSpeed(0.0)), 0);
    }
}
