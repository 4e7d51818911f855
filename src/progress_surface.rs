//! Retained output handle for the progress indicator.
//!
//! The frame loop and the drag controller write here directly, outside the
//! bus-driven view updates, so a 60 Hz animation never turns into 60 state
//! snapshots per second.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// What the progress indicator shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressFrame {
    pub percent: f64,
    pub elapsed_label: String,
    pub total_label: String,
    pub dragging: bool,
}

impl ProgressFrame {
    pub fn at(percent: f64, total_duration_sec: f64, dragging: bool) -> Self {
        let percent = percent.clamp(0.0, 100.0);
        let total = total_duration_sec.max(0.0);
        Self {
            percent,
            elapsed_label: format_clock(percent / 100.0 * total),
            total_label: format_clock(total),
            dragging,
        }
    }
}

/// Formats seconds as `m:ss`.
pub fn format_clock(seconds: f64) -> String {
    let seconds = if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    };
    let mins = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{mins}:{secs:02}")
}

/// Output surface written by the extrapolator and the drag controller.
pub trait ProgressSurface: Send + Sync {
    fn write(&self, frame: ProgressFrame);
}

/// Shared in-memory surface read by renderers at their own cadence.
#[derive(Clone, Default)]
pub struct RetainedProgressHandle {
    frame: Arc<Mutex<ProgressFrame>>,
    revision: Arc<AtomicU64>,
}

impl RetainedProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressFrame {
        match self.frame.lock() {
            Ok(frame) => frame.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Incremented on every write; lets renderers skip unchanged frames.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

impl ProgressSurface for RetainedProgressHandle {
    fn write(&self, frame: ProgressFrame) {
        {
            let mut current = match self.frame.lock() {
                Ok(current) => current,
                Err(poisoned) => poisoned.into_inner(),
            };
            *current = frame;
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}
