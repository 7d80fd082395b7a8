//! MIDI ports via midir
//!
//! Inbound messages are parsed in the midir callback and queued on a
//! crossbeam channel; the worker drains it with a bounded wait.

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use midir::{MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::time::Duration;
use tracing::{debug, info, trace};

use super::{EventSource, FeedbackSink, SurfaceError};
use crate::midi::{format_hex, MidiMessage};

const CLIENT_NAME: &str = "Monitor-GW";
const INPUT_QUEUE: usize = 1000;

/// Open MIDI input port
pub struct MidirInput {
    _conn: MidiInputConnection<()>,
    rx: Receiver<MidiMessage>,
    port_name: String,
}

/// Open MIDI output port
pub struct MidirOutput {
    conn: MidiOutputConnection,
    port_name: String,
}

/// Connect both directions of the surface matching `pattern`
pub fn connect(pattern: &str) -> Result<(MidirInput, MidirOutput), SurfaceError> {
    info!("Connecting to control surface '{}'", pattern);
    let input = MidirInput::connect(pattern)?;
    let output = MidirOutput::connect(pattern)?;
    info!("Control surface connected: in='{}' out='{}'", input.port_name, output.port_name);
    Ok((input, output))
}

/// Find a port by case-insensitive substring match
fn find_port<T: MidiIO>(io: &T, pattern: &str) -> Option<(T::Port, String)> {
    let pattern = pattern.to_lowercase();
    io.ports().into_iter().find_map(|port| {
        let name = io.port_name(&port).ok()?;
        if name.to_lowercase().contains(&pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some((port, name))
        } else {
            None
        }
    })
}

fn backend(e: impl std::fmt::Display) -> SurfaceError {
    SurfaceError::Backend(e.to_string())
}

impl MidirInput {
    pub fn connect(pattern: &str) -> Result<Self, SurfaceError> {
        let midi_in = MidiInput::new(&format!("{}-Input", CLIENT_NAME)).map_err(backend)?;
        debug!("Found {} MIDI input ports", midi_in.port_count());

        let (port, port_name) =
            find_port(&midi_in, pattern).ok_or_else(|| SurfaceError::PortNotFound {
                direction: "input",
                pattern: pattern.to_string(),
            })?;

        let (tx, rx) = channel::bounded(INPUT_QUEUE);
        let conn = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |_timestamp, data, _| match MidiMessage::parse(data) {
                    // Never block the backend thread; drop on overflow
                    Some(message) => {
                        let _ = tx.try_send(message);
                    }
                    None => trace!("Ignoring MIDI: {}", format_hex(data)),
                },
                (),
            )
            .map_err(backend)?;

        Ok(Self {
            _conn: conn,
            rx,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl EventSource for MidirInput {
    fn receive(&mut self, timeout: Duration) -> Result<Option<MidiMessage>, SurfaceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SurfaceError::Closed),
        }
    }

    fn drain_pending(&mut self) -> usize {
        self.rx.try_iter().count()
    }
}

impl MidirOutput {
    pub fn connect(pattern: &str) -> Result<Self, SurfaceError> {
        let midi_out = MidiOutput::new(&format!("{}-Output", CLIENT_NAME)).map_err(backend)?;
        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (port, port_name) =
            find_port(&midi_out, pattern).ok_or_else(|| SurfaceError::PortNotFound {
                direction: "output",
                pattern: pattern.to_string(),
            })?;

        let conn = midi_out.connect(&port, CLIENT_NAME).map_err(backend)?;

        Ok(Self { conn, port_name })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl FeedbackSink for MidirOutput {
    fn send(&mut self, message: MidiMessage) -> Result<(), SurfaceError> {
        let data = message.encode();
        self.conn.send(&data).map_err(backend)?;
        trace!("Sent: {} | {}", format_hex(&data), message);
        Ok(())
    }
}

/// Port discovery utilities
pub mod discovery {
    use super::*;
    use colored::*;

    fn port_names<T: MidiIO>(io: &T) -> Vec<String> {
        io.ports()
            .iter()
            .filter_map(|port| io.port_name(port).ok())
            .collect()
    }

    pub fn list_input_ports() -> Result<Vec<String>, SurfaceError> {
        let midi_in = MidiInput::new(&format!("{}-Scanner", CLIENT_NAME)).map_err(backend)?;
        Ok(port_names(&midi_in))
    }

    pub fn list_output_ports() -> Result<Vec<String>, SurfaceError> {
        let midi_out = MidiOutput::new(&format!("{}-Scanner", CLIENT_NAME)).map_err(backend)?;
        Ok(port_names(&midi_out))
    }

    /// Print discovered ports
    pub fn print_ports() -> Result<(), SurfaceError> {
        for (title, ports) in [
            ("MIDI Input Ports", list_input_ports()?),
            ("MIDI Output Ports", list_output_ports()?),
        ] {
            println!("\n{}", format!("=== {} ===", title).bold().cyan());
            if ports.is_empty() {
                println!("  {}", "(none)".dimmed());
            }
            for (i, name) in ports.iter().enumerate() {
                println!("  {}: {}", i, name.green());
            }
        }
        println!();
        Ok(())
    }
}
