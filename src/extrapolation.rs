//! Anchor store and local position extrapolation.
//!
//! Between authoritative status readings the displayed position is projected
//! from the last trusted anchor using elapsed wall-clock time and the current
//! speed multiplier. The drift this introduces is bounded by the poll interval
//! times the speed, and disappears every time a trusted anchor arrives.

use std::time::Instant;

/// Last trusted `{percent, time}` pair used as the extrapolation base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub percent: f64,
    pub captured_at_ms: f64,
}

/// Projects `anchor` forward to `now_ms`, capped at 100 percent.
///
/// Returns the anchor percent unchanged when the duration is unknown or the
/// clock went backwards.
pub fn project(anchor: &Anchor, now_ms: f64, speed: f64, total_duration_sec: f64) -> f64 {
    if !(total_duration_sec > 0.0) {
        return anchor.percent;
    }
    let elapsed_sec = ((now_ms - anchor.captured_at_ms) / 1000.0).max(0.0);
    let increment = (elapsed_sec * speed / total_duration_sec) * 100.0;
    (anchor.percent + increment).min(100.0)
}

/// Holds the current anchor together with the logical recency of its source.
///
/// An anchor only replaces the current one when its sequence number is newer,
/// so a response that resolves late can never roll the anchor back.
#[derive(Debug, Clone, Default)]
pub struct AnchorStore {
    anchor: Option<Anchor>,
    seq: u64,
}

impl AnchorStore {
    pub fn current(&self) -> Option<Anchor> {
        self.anchor
    }

    /// Replaces the anchor if `seq` is newer than the current one.
    pub fn offer(&mut self, anchor: Anchor, seq: u64) -> bool {
        if seq < self.seq || (self.anchor.is_some() && seq == self.seq) {
            return false;
        }
        self.anchor = Some(Anchor {
            percent: anchor.percent.clamp(0.0, 100.0),
            captured_at_ms: anchor.captured_at_ms,
        });
        self.seq = seq;
        true
    }

    /// Drops the anchor but keeps the recency watermark.
    pub fn clear(&mut self) {
        self.anchor = None;
    }
}

/// Everything the frame loop needs to project a position without touching the
/// session state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrapolationPlan {
    pub anchor: Anchor,
    pub speed: f64,
    pub total_duration_sec: f64,
}

impl ExtrapolationPlan {
    pub fn project(&self, now_ms: f64) -> f64 {
        project(&self.anchor, now_ms, self.speed, self.total_duration_sec)
    }

    pub fn elapsed_sec(&self, now_ms: f64) -> f64 {
        self.project(now_ms) / 100.0 * self.total_duration_sec
    }
}

/// Millisecond clock shared by the controller and its frame loop.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
