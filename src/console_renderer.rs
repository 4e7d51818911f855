//! Text rendering of the retained progress handle and session notifications.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::{error::TryRecvError, Receiver};

use crate::lifecycle::SessionLifecycleState;
use crate::progress_surface::{format_clock, ProgressFrame, RetainedProgressHandle};
use crate::protocol::{
    AudioFeedbackMessage, Message, NoticeKind, PlaylistSnapshot, SessionMessage, SessionSnapshot,
    TimelineMarker,
};

const RENDER_INTERVAL: Duration = Duration::from_millis(250);
const BAR_WIDTH: usize = 30;

pub fn render_progress_line(frame: &ProgressFrame, snapshot: Option<&SessionSnapshot>) -> String {
    let filled = ((frame.percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    let knob = if frame.dragging { '#' } else { '>' };
    let mut bar = "=".repeat(filled.saturating_sub(1));
    if filled > 0 {
        bar.push(knob);
    }
    bar.push_str(&" ".repeat(BAR_WIDTH - filled));

    let mut line = format!(
        "[{bar}] {} / {}",
        frame.elapsed_label, frame.total_label
    );
    if let Some(snapshot) = snapshot {
        line.push_str(&format!("  {}x", snapshot.playback_speed));
        let state = match snapshot.lifecycle {
            SessionLifecycleState::Inactive => "stopped",
            SessionLifecycleState::Activating => "starting",
            SessionLifecycleState::ActivePlaying => "playing",
            SessionLifecycleState::ActivePaused => "paused",
            SessionLifecycleState::Switching => "switching",
        };
        line.push_str(&format!("  {state}"));
        if let Some(status) = snapshot.status.as_ref() {
            if !status.metadata.name.is_empty() {
                line.push_str(&format!("  {}", status.metadata.name));
            }
        }
    }
    line
}

pub fn render_playlist(playlist: &PlaylistSnapshot) -> Vec<String> {
    if playlist.entries.is_empty() {
        return vec!["playlist is empty".to_string()];
    }
    let current_index = playlist.current.as_ref().map(|current| current.index);
    let mut lines = Vec::with_capacity(playlist.entries.len() + 1);
    if let Some(current) = playlist.current.as_ref() {
        lines.push(format!(
            "session {} of {}: {}",
            current.index + 1,
            current.total,
            current.name
        ));
    }
    for entry in &playlist.entries {
        let marker = if Some(entry.index) == current_index {
            '*'
        } else {
            ' '
        };
        let duration = if entry.duration_sec > 0.0 {
            format!(" ({})", format_clock(entry.duration_sec))
        } else {
            String::new()
        };
        lines.push(format!(
            "{marker} {:>2} [{}] {}{duration}",
            entry.index,
            entry.kind.badge(),
            entry.name
        ));
    }
    lines
}

fn render_timeline(markers: &[TimelineMarker]) -> String {
    let labels = markers
        .iter()
        .map(|marker| format!("{} {}", format_clock(marker.time_sec), marker.label))
        .collect::<Vec<_>>();
    format!("timeline: {}", labels.join(" | "))
}

/// Prints bus notifications and the progress line until shutdown.
pub struct ConsoleRenderer {
    bus_consumer: Receiver<Message>,
    progress: RetainedProgressHandle,
    snapshot: Option<SessionSnapshot>,
    last_revision: Option<u64>,
}

impl ConsoleRenderer {
    pub fn new(bus_consumer: Receiver<Message>, progress: RetainedProgressHandle) -> Self {
        Self {
            bus_consumer,
            progress,
            snapshot: None,
            last_revision: None,
        }
    }

    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Session(SessionMessage::StateChanged(snapshot)) => {
                let lifecycle_changed = self
                    .snapshot
                    .as_ref()
                    .map_or(true, |previous| previous.lifecycle != snapshot.lifecycle);
                if lifecycle_changed {
                    info!("ConsoleRenderer: session {:?}", snapshot.lifecycle);
                }
                self.snapshot = Some(snapshot);
                self.last_revision = None;
            }
            Message::Session(SessionMessage::PlaylistUpdated(playlist)) => {
                for line in render_playlist(&playlist) {
                    println!("{line}");
                }
            }
            Message::Session(SessionMessage::TimelineUpdated(markers)) => {
                if !markers.is_empty() {
                    println!("{}", render_timeline(&markers));
                }
            }
            Message::Session(SessionMessage::Notice(notice)) => match notice.kind {
                NoticeKind::Connectivity => warn!("{}", notice.message),
                _ => println!("! {}", notice.message),
            },
            Message::Session(SessionMessage::Shutdown) => return false,
            Message::Audio(AudioFeedbackMessage::SetPaused(paused)) => {
                debug!("ConsoleRenderer: binaural audio paused={}", paused);
            }
            Message::Transport(_) | Message::SeekBar(_) | Message::Playlist(_) => {}
        }
        true
    }

    fn drain_bus(&mut self) -> bool {
        loop {
            match self.bus_consumer.try_recv() {
                Ok(message) => {
                    if !self.handle_message(message) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("ConsoleRenderer: bus lagged by {} messages", skipped);
                }
                Err(TryRecvError::Closed) => return false,
            }
        }
    }

    pub fn run(&mut self) {
        while self.drain_bus() {
            let revision = self.progress.revision();
            if self.last_revision != Some(revision) {
                self.last_revision = Some(revision);
                let active = self
                    .snapshot
                    .as_ref()
                    .is_some_and(|snapshot| snapshot.lifecycle != SessionLifecycleState::Inactive);
                if active {
                    println!(
                        "{}",
                        render_progress_line(&self.progress.snapshot(), self.snapshot.as_ref())
                    );
                }
            }
            thread::sleep(RENDER_INTERVAL);
        }
    }
}
