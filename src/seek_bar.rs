//! Drag-to-seek gesture tracking for the progress track.
//!
//! A gesture is `pointer_down -> pointer_move* -> pointer_up`. Moves never touch
//! the network; only the release produces a seek, so one gesture yields at most
//! one seek request. A plain click is a down immediately followed by an up.

use crate::protocol::TrackGeometry;

/// Exists only while a pointer gesture is in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    pub active: bool,
    pub percent: f64,
}

/// Seek produced by releasing a gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekCommit {
    pub percent: f64,
    pub seek_sec: f64,
}

#[derive(Debug, Default)]
pub struct SeekBar {
    drag: Option<DragState>,
}

impl SeekBar {
    pub fn drag(&self) -> Option<DragState> {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some_and(|drag| drag.active)
    }

    /// Starts a gesture and returns the percent to display.
    ///
    /// A second down during a gesture only moves the knob.
    pub fn pointer_down(&mut self, pointer_x: f64, track: TrackGeometry) -> Option<f64> {
        let percent = track.percent_at(pointer_x)?;
        self.drag = Some(DragState {
            active: true,
            percent,
        });
        Some(percent)
    }

    /// Updates the knob while dragging. Ignored outside a gesture.
    pub fn pointer_move(&mut self, pointer_x: f64, track: TrackGeometry) -> Option<f64> {
        let drag = self.drag.as_mut().filter(|drag| drag.active)?;
        let percent = track.percent_at(pointer_x)?;
        drag.percent = percent;
        Some(percent)
    }

    /// Ends the gesture. Returns the seek to issue, if the duration is known.
    pub fn pointer_up(&mut self, total_duration_sec: f64) -> Option<SeekCommit> {
        let drag = self.drag.take().filter(|drag| drag.active)?;
        if !(total_duration_sec > 0.0) {
            return None;
        }
        Some(SeekCommit {
            percent: drag.percent,
            seek_sec: drag.percent / 100.0 * total_duration_sec,
        })
    }

    /// Drops the gesture without seeking. Returns `true` if one was active.
    pub fn cancel(&mut self) -> bool {
        self.drag.take().is_some()
    }
}
