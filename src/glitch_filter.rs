//! Plausibility check applied to every status reading before it is trusted.
//!
//! The backend occasionally reports a transient "paused at zero" frame while it
//! is still mid-playback. Accepting that frame would scrub the progress bar back
//! to the start, so it is dropped and the previous reading stays authoritative.

use crate::config::GlitchConfig;
use crate::protocol::PlaybackStatus;

/// Returns `false` when `next` looks like a spurious reset-to-zero of a session
/// that `prev` reported as playing well past the start.
pub fn accept(prev: Option<&PlaybackStatus>, next: &PlaybackStatus, config: &GlitchConfig) -> bool {
    let Some(prev) = prev else {
        return true;
    };
    let spurious_reset = !next.is_playing
        && next.current_position_sec < config.reset_position_ceiling_sec
        && prev.is_playing
        && prev.current_position_sec > config.playing_position_floor_sec;
    !spurious_reset
}
