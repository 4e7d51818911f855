//! Pause/resume signal for the binaural audio collaborator.

use tokio::sync::broadcast::Sender;

use crate::protocol::{AudioFeedbackMessage, Message};

/// Receives the paused flag every time the transport changes it.
pub trait AudioFeedbackSink: Send + Sync {
    fn set_paused(&self, paused: bool);
}

/// Forwards the paused flag onto the event bus.
pub struct BusAudioFeedback {
    bus_producer: Sender<Message>,
}

impl BusAudioFeedback {
    pub fn new(bus_producer: Sender<Message>) -> Self {
        Self { bus_producer }
    }
}

impl AudioFeedbackSink for BusAudioFeedback {
    fn set_paused(&self, paused: bool) {
        let _ = self
            .bus_producer
            .send(Message::Audio(AudioFeedbackMessage::SetPaused(paused)));
    }
}
