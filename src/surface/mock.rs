//! Scripted surface for tests

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::{EventSource, FeedbackSink, SurfaceError};
use crate::midi::MidiMessage;
use crate::shell::{ShellCommand, ShellHandle};

#[derive(Default)]
struct MockState {
    stale: VecDeque<MidiMessage>,
    inbound: VecDeque<MidiMessage>,
    sent: Vec<MidiMessage>,
    fail_sends: bool,
    close_when_empty: bool,
    on_empty: Option<(ShellHandle, ShellCommand)>,
    receive_calls: usize,
}

/// Both halves of a fake surface; clones share state
#[derive(Clone, Default)]
pub struct MockSurface {
    state: Arc<Mutex<MockState>>,
}

impl MockSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message that arrives after any drain
    pub fn push(&self, message: MidiMessage) {
        self.state.lock().inbound.push_back(message);
    }

    /// Queue a message that was already buffered before listening started
    pub fn push_stale(&self, message: MidiMessage) {
        self.state.lock().stale.push_back(message);
    }

    pub fn push_cc(&self, cc: u8, value: u8) {
        self.push(MidiMessage::ControlChange { channel: 0, cc, value });
    }

    pub fn push_note(&self, note: u8, velocity: u8) {
        self.push(MidiMessage::NoteOn { channel: 0, note, velocity });
    }

    pub fn sent(&self) -> Vec<MidiMessage> {
        self.state.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Report the input as closed once the queue runs dry
    pub fn close_when_empty(&self) {
        self.state.lock().close_when_empty = true;
    }

    /// Deliver `command` once the queue runs dry
    pub fn signal_when_empty(&self, handle: ShellHandle, command: ShellCommand) {
        self.state.lock().on_empty = Some((handle, command));
    }

    pub fn receive_calls(&self) -> usize {
        self.state.lock().receive_calls
    }
}

impl EventSource for MockSurface {
    fn receive(&mut self, _timeout: Duration) -> Result<Option<MidiMessage>, SurfaceError> {
        let mut state = self.state.lock();
        state.receive_calls += 1;

        if let Some(message) = state.stale.pop_front().or_else(|| state.inbound.pop_front()) {
            return Ok(Some(message));
        }
        if let Some((handle, command)) = state.on_empty.take() {
            handle.send(command);
        }
        if state.close_when_empty {
            return Err(SurfaceError::Closed);
        }
        Ok(None)
    }

    fn drain_pending(&mut self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.stale.len();
        state.stale.clear();
        dropped
    }
}

impl FeedbackSink for MockSurface {
    fn send(&mut self, message: MidiMessage) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(SurfaceError::Backend("simulated send fault".to_string()));
        }
        state.sent.push(message);
        Ok(())
    }
}
