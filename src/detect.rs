//! Control detection
//!
//! Finds which physical controls the operator wants to use by watching the
//! input while they turn a knob or press a button, and produces a `controls:`
//! block ready to paste into the config.

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{ControlBinding, ControlMap, Function};
use crate::midi::MidiMessage;
use crate::surface::{ControlKind, EventSource, SurfaceError};

/// Upper bound for a single receive while watching
const POLL: Duration = Duration::from_millis(50);
/// Samples a CC must send before it counts as a knob
const KNOB_SAMPLES: u32 = 2;

/// A control the operator touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedControl {
    pub kind: ControlKind,
    pub id: u8,
}

impl DetectedControl {
    pub fn binding(&self) -> ControlBinding {
        ControlBinding {
            kind: self.kind,
            id: self.id,
        }
    }

    fn matches(&self, message: &MidiMessage) -> bool {
        match (self.kind, *message) {
            (ControlKind::Knob, MidiMessage::ControlChange { cc, .. }) => cc == self.id,
            (ControlKind::Button, MidiMessage::NoteOn { note, velocity, .. }) => {
                note == self.id && velocity > 0
            }
            _ => false,
        }
    }
}

impl fmt::Display for DetectedControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ControlKind::Knob => write!(f, "Knob CC{}", self.id),
            ControlKind::Button => write!(f, "Button Note{}", self.id),
        }
    }
}

/// Every control seen during a scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlScan {
    pub knobs: BTreeSet<u8>,
    pub buttons: BTreeSet<u8>,
}

/// Feed messages to `inspect` until it yields a value or `within` elapses
fn watch<T>(
    source: &mut dyn EventSource,
    within: Duration,
    mut inspect: impl FnMut(MidiMessage) -> Option<T>,
) -> Result<Option<T>, SurfaceError> {
    let deadline = Instant::now() + within;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }

        if let Some(message) = source.receive(remaining.min(POLL))? {
            debug!("Detector saw: {}", message);
            if let Some(found) = inspect(message) {
                return Ok(Some(found));
            }
        }
    }
}

fn drain(source: &mut dyn EventSource) {
    let dropped = source.drain_pending();
    if dropped > 0 {
        debug!("Cleared {} buffered message(s)", dropped);
    }
}

/// Wait for a knob turn: the first CC number seen twice
///
/// A lone CC (a fader nudge, a stray controller message) is not enough.
pub fn listen_for_knob(
    source: &mut dyn EventSource,
    timeout: Duration,
) -> Result<Option<DetectedControl>, SurfaceError> {
    drain(source);

    let mut seen: BTreeMap<u8, u32> = BTreeMap::new();
    watch(source, timeout, |message| match message {
        MidiMessage::ControlChange { cc, .. } => {
            let count = seen.entry(cc).or_default();
            *count += 1;
            (*count >= KNOB_SAMPLES).then_some(DetectedControl {
                kind: ControlKind::Knob,
                id: cc,
            })
        }
        _ => None,
    })
}

/// Wait for a button press (note on with non-zero velocity)
pub fn listen_for_button(
    source: &mut dyn EventSource,
    timeout: Duration,
) -> Result<Option<DetectedControl>, SurfaceError> {
    drain(source);

    watch(source, timeout, |message| match message {
        MidiMessage::NoteOn { note, velocity, .. } if velocity > 0 => Some(DetectedControl {
            kind: ControlKind::Button,
            id: note,
        }),
        _ => None,
    })
}

/// Collect every knob and button touched within `duration`
pub fn scan_controls(
    source: &mut dyn EventSource,
    duration: Duration,
) -> Result<ControlScan, SurfaceError> {
    let mut scan = ControlScan::default();
    watch(source, duration, |message| {
        match message {
            MidiMessage::ControlChange { cc, .. } => {
                scan.knobs.insert(cc);
            }
            MidiMessage::NoteOn { note, velocity, .. } if velocity > 0 => {
                scan.buttons.insert(note);
            }
            _ => {}
        }
        None::<()>
    })?;
    Ok(scan)
}

/// Check that `control` responds within `duration`
pub fn wait_for_control(
    source: &mut dyn EventSource,
    control: DetectedControl,
    duration: Duration,
) -> Result<bool, SurfaceError> {
    let found = watch(source, duration, |message| control.matches(&message).then_some(()))?;
    Ok(found.is_some())
}

/// Walk through every function and ask for its control
///
/// Functions that time out, or whose control is already taken, are left
/// unbound.
pub fn run_wizard(
    source: &mut dyn EventSource,
    timeout: Duration,
) -> Result<BTreeMap<String, ControlBinding>, SurfaceError> {
    let mut map = ControlMap::default();

    for function in Function::ALL {
        let (verb, kind) = match function.kind() {
            ControlKind::Knob => ("Turn the knob", "knob"),
            ControlKind::Button => ("Press the button", "button"),
        };
        println!(
            "\n{} {} for {} ({}s timeout)",
            "▶".cyan(),
            verb,
            function.name().bold(),
            timeout.as_secs()
        );

        let detected = match function.kind() {
            ControlKind::Knob => listen_for_knob(source, timeout)?,
            ControlKind::Button => listen_for_button(source, timeout)?,
        };

        let Some(control) = detected else {
            println!("  {} No {} detected, leaving {} unbound", "✗".red(), kind, function);
            continue;
        };

        match map.insert(function, control.binding()) {
            Ok(()) => println!("  {} {} -> {}", "✓".green(), function, control),
            Err(e) => println!("  {} {}", "✗".red(), e),
        }
    }

    Ok(map
        .iter()
        .map(|(function, binding)| (function.name().to_string(), binding))
        .collect())
}

/// Render bindings as a `controls:` YAML block
pub fn controls_yaml(controls: &BTreeMap<String, ControlBinding>) -> Result<String> {
    #[derive(Serialize)]
    struct ControlsBlock<'a> {
        controls: &'a BTreeMap<String, ControlBinding>,
    }

    serde_yaml::to_string(&ControlsBlock { controls }).context("Failed to render controls block")
}
