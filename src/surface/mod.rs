//! Control surface I/O
//!
//! The surface is split into an [`EventSource`] (inbound knob samples and
//! button presses) and a [`FeedbackSink`] (LED rings and button LEDs), so the
//! worker loop can block on input while the mapper owns the output side.

#[cfg(test)]
pub mod mock;
pub mod port;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{trace, warn};

use crate::midi::MidiMessage;

/// Number of lit segments on an encoder LED ring
pub const LED_RING_SEGMENTS: u8 = 11;

/// Errors from the MIDI transport
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("MIDI {direction} port matching '{pattern}' not found")]
    PortNotFound {
        direction: &'static str,
        pattern: String,
    },

    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("MIDI input closed")]
    Closed,
}

/// Kind of physical control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Knob,
    Button,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKind::Knob => write!(f, "knob"),
            ControlKind::Button => write!(f, "button"),
        }
    }
}

/// Semantic event from the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Knob moved by a resolved, non-zero delta
    Knob { id: u8, delta: i32 },
    /// Button pressed
    Button { id: u8, velocity: u8 },
}

impl SurfaceEvent {
    pub fn kind(&self) -> ControlKind {
        match self {
            SurfaceEvent::Knob { .. } => ControlKind::Knob,
            SurfaceEvent::Button { .. } => ControlKind::Button,
        }
    }

    pub fn id(&self) -> u8 {
        match *self {
            SurfaceEvent::Knob { id, .. } | SurfaceEvent::Button { id, .. } => id,
        }
    }
}

/// Blocking source of inbound MIDI
pub trait EventSource {
    /// Wait up to `timeout` for the next message; `Ok(None)` on timeout
    fn receive(&mut self, timeout: Duration) -> Result<Option<MidiMessage>, SurfaceError>;

    /// Discard everything already buffered, returning how many were dropped
    fn drain_pending(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(Some(_)) = self.receive(Duration::ZERO) {
            dropped += 1;
        }
        dropped
    }
}

/// Outbound MIDI to the surface
pub trait FeedbackSink {
    fn send(&mut self, message: MidiMessage) -> Result<(), SurfaceError>;
}

/// LED feedback on one MIDI channel
///
/// Send failures are logged and swallowed: feedback is cosmetic and must not
/// stall the event loop.
pub struct Feedback {
    sink: Box<dyn FeedbackSink>,
    channel: u8,
}

impl Feedback {
    /// `channel` is 1-based (1-16) as written in the config
    pub fn new(sink: Box<dyn FeedbackSink>, channel: u8) -> Self {
        Self {
            sink,
            channel: channel.clamp(1, 16) - 1,
        }
    }

    /// Light `position` segments (0-11) of the ring around knob `cc`
    pub fn set_led_ring(&mut self, cc: u8, position: u8) {
        self.send(MidiMessage::ControlChange {
            channel: self.channel,
            cc,
            value: position.min(LED_RING_SEGMENTS),
        });
    }

    pub fn set_button_led(&mut self, note: u8, on: bool) {
        let message = if on {
            MidiMessage::NoteOn { channel: self.channel, note, velocity: 127 }
        } else {
            MidiMessage::NoteOff { channel: self.channel, note, velocity: 0 }
        };
        self.send(message);
    }

    fn send(&mut self, message: MidiMessage) {
        trace!("LED -> {}", message);
        if let Err(e) = self.sink.send(message) {
            warn!("Failed to send LED feedback ({}): {}", message, e);
        }
    }
}
