//! Worker session
//!
//! Owns the inbound half of the surface, the encoder history and the mapper.
//! Runs a blocking receive-then-dispatch loop until the shell asks it to stop
//! or reconfigure, or the input goes away.

use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::BehaviorConfig;
use crate::encoder::EncoderTracker;
use crate::mapper::ControlMapper;
use crate::midi::MidiMessage;
use crate::shell::{ShellCommand, ShellSignal};
use crate::surface::{EventSource, SurfaceError, SurfaceEvent};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Stopped,
    Reconfigure,
}

pub struct Session {
    source: Box<dyn EventSource>,
    tracker: EncoderTracker,
    mapper: ControlMapper,
    signal: ShellSignal,
    timeout: Duration,
}

impl Session {
    pub fn new(
        source: Box<dyn EventSource>,
        mapper: ControlMapper,
        signal: ShellSignal,
        behavior: &BehaviorConfig,
    ) -> Self {
        Self {
            source,
            tracker: EncoderTracker::new(behavior.sensitivity),
            mapper,
            signal,
            timeout: Duration::from_millis(behavior.receive_timeout_ms),
        }
    }

    /// Resync, then dispatch events until signalled
    ///
    /// The signal is checked before every receive, so it is observed within
    /// one event or one receive timeout.
    pub fn run(&mut self) -> Result<SessionExit, SurfaceError> {
        let dropped = self.source.drain_pending();
        if dropped > 0 {
            debug!("Discarded {} stale MIDI message(s)", dropped);
        }
        self.tracker.reset();
        self.mapper.initialize();

        info!("🎛️  Ready - listening for controls");

        loop {
            match self.signal.poll() {
                Some(ShellCommand::Stop) => {
                    info!("Session stopping");
                    return Ok(SessionExit::Stopped);
                }
                Some(ShellCommand::Reconfigure) => {
                    info!("Session ending for reconfigure");
                    return Ok(SessionExit::Reconfigure);
                }
                None => {}
            }

            let Some(message) = self.source.receive(self.timeout)? else {
                continue;
            };
            trace!("MIDI in: {}", message);

            if let Some(event) = self.translate(message) {
                debug!("Event: {:?}", event);
                self.mapper.handle_event(event);
            }
        }
    }

    /// Turn a raw message into a semantic event
    ///
    /// Knob samples go through the encoder history; a zero delta (first
    /// sample, or truncated by sensitivity) yields nothing. Releases are
    /// dropped.
    pub fn translate(&mut self, message: MidiMessage) -> Option<SurfaceEvent> {
        match message {
            MidiMessage::ControlChange { cc, value, .. } => {
                let delta = self.tracker.resolve(cc, value);
                (delta != 0).then_some(SurfaceEvent::Knob { id: cc, delta })
            }
            MidiMessage::NoteOn { note, velocity, .. } if velocity > 0 => {
                Some(SurfaceEvent::Button { id: note, velocity })
            }
            _ => None,
        }
    }

    pub fn mapper(&self) -> &ControlMapper {
        &self.mapper
    }

    pub fn tracker(&self) -> &EncoderTracker {
        &self.tracker
    }
}
