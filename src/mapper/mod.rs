//! Control mapper
//!
//! Routes surface events to the display through virtual knobs. The brightness
//! knob writes through on every tick; the night-mode knob is quantized into
//! discrete color-temperature steps and only writes when the step changes.
//! LED rings always follow the unquantized knob position.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{BehaviorConfig, ControlMap, Function};
use crate::display::DisplayDriver;
use crate::knob::KnobState;
use crate::surface::{Feedback, SurfaceEvent, LED_RING_SEGMENTS};

#[cfg(test)]
mod tests;

const INITIAL_BRIGHTNESS: i32 = 75;
const CALIBRATED: i32 = 100;

/// User-facing feedback raised by the mapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Night-mode knob pushed against its neutral end stop
    Calibrated,
    /// Brightness knob pushed past a bound
    BrightnessLimit { position: i32 },
    /// Night mode moved to a new step
    NightModeStep {
        step: i32,
        label: Option<&'static str>,
    },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Calibrated => write!(f, "🔵 Calibrated (hard stop reached)"),
            Notification::BrightnessLimit { position } => {
                write!(f, "Brightness limit reached ({})", position)
            }
            Notification::NightModeStep { label: Some(label), .. } => {
                write!(f, "Night mode: {}", label)
            }
            Notification::NightModeStep { step, label: None } => {
                write!(f, "Night mode: step {}", step)
            }
        }
    }
}

/// Notification subscriber
pub type NotifyCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Subscriber that writes notifications to the log
pub fn log_notifications() -> NotifyCallback {
    Arc::new(|notification| info!("{}", notification))
}

/// Color temperature name for a night-mode step
pub fn step_label(step: i32) -> Option<&'static str> {
    match step {
        100 => Some("Calibrated (6500K)"),
        75 => Some("Slightly Warm (5500K)"),
        50 => Some("Warm (4500K)"),
        25 => Some("Very Warm (3500K)"),
        0 => Some("Candlelight (2700K)"),
        _ => None,
    }
}

/// Nearest step to `value`; on a tie the lower step wins
///
/// `steps` must be ascending. An empty slice yields `value` unchanged.
pub fn nearest_step(steps: &[i32], value: i32) -> i32 {
    let mut best = None;
    for &step in steps {
        let distance = (i64::from(step) - i64::from(value)).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((step, distance)),
        }
    }
    best.map_or(value, |(step, _)| step)
}

/// LED ring segment for a 0-100 knob position
pub fn led_ring_position(position: i32) -> u8 {
    let lit = position.clamp(0, 100) * i32::from(LED_RING_SEGMENTS) / 100;
    lit as u8
}

/// Maps control surface gestures to display state
pub struct ControlMapper {
    feedback: Feedback,
    display: DisplayDriver,
    controls: ControlMap,
    behavior: BehaviorConfig,
    brightness: KnobState,
    night_mode: KnobState,
    /// Step last sent to the display
    night_mode_step: i32,
    local_dimming: bool,
    hdr: bool,
    notify: NotifyCallback,
}

impl ControlMapper {
    pub fn new(
        feedback: Feedback,
        display: DisplayDriver,
        controls: ControlMap,
        behavior: BehaviorConfig,
    ) -> Self {
        Self {
            feedback,
            display,
            controls,
            behavior,
            brightness: KnobState::new("Brightness", INITIAL_BRIGHTNESS, 0, 100),
            night_mode: KnobState::new("Night Mode", CALIBRATED, 0, 100),
            night_mode_step: CALIBRATED,
            local_dimming: true,
            hdr: false,
            notify: log_notifications(),
        }
    }

    /// Replace the notification subscriber
    pub fn with_notifier(mut self, notify: NotifyCallback) -> Self {
        self.notify = notify;
        self
    }

    /// Sync virtual state with the display and push every LED
    pub fn initialize(&mut self) {
        info!("Initializing control mapper...");

        if let Some(brightness) = self.display.get_brightness() {
            let position = self.brightness.set(i32::from(brightness));
            info!("  Brightness: {}", position);
        }

        if self.behavior.always_start_calibrated {
            self.night_mode.set(CALIBRATED);
            self.display.set_night_mode(CALIBRATED);
            self.night_mode_step = CALIBRATED;
            info!("  Night mode: {} (reset to calibrated)", CALIBRATED);
        } else if let Some(blue) = self.display.get_blue_gain() {
            // Blue gain is taken as the intensity itself, not inverted from the
            // gain curve, so the warmest steps resync one step cooler.
            let step = nearest_step(&self.behavior.night_mode_steps, i32::from(blue));
            self.night_mode.set(step);
            self.night_mode_step = step;
            info!("  Night mode: {} (blue gain {})", step, blue);
        }

        match self.display.get_local_dimming() {
            Some(enabled) => {
                self.local_dimming = enabled;
                info!("  Local dimming: {}", on_off(enabled));
            }
            None => {
                self.local_dimming = true;
                self.display.set_local_dimming(true);
                info!("  Local dimming: ON (default)");
            }
        }

        self.hdr = self.display.get_hdr().unwrap_or(false);
        if self.display.codes().hdr.is_some() {
            info!("  HDR: {}", on_off(self.hdr));
        }

        self.update_leds();
        info!("Control mapper initialized");
    }

    /// Route a surface event to its function handler
    pub fn handle_event(&mut self, event: SurfaceEvent) {
        let Some(function) = self.controls.lookup(event.kind(), event.id()) else {
            debug!("Unmapped {} {}", event.kind(), event.id());
            return;
        };

        match (function, event) {
            (_, SurfaceEvent::Knob { delta: 0, .. }) => {}
            (Function::Brightness, SurfaceEvent::Knob { id, delta }) => {
                self.handle_brightness(id, delta)
            }
            (Function::NightMode, SurfaceEvent::Knob { id, delta }) => {
                self.handle_night_mode(id, delta)
            }
            (_, SurfaceEvent::Button { velocity: 0, .. }) => {}
            (Function::LocalDimming, SurfaceEvent::Button { id, .. }) => {
                let enabled = self.apply_toggle("Local dimming", !self.local_dimming, |d, on| {
                    d.set_local_dimming(on)
                });
                self.local_dimming = enabled;
                self.feedback.set_button_led(id, enabled);
            }
            (Function::Hdr, SurfaceEvent::Button { id, .. }) => {
                let enabled = self.apply_toggle("HDR", !self.hdr, |d, on| d.set_hdr(on));
                self.hdr = enabled;
                self.feedback.set_button_led(id, enabled);
            }
            (function, event) => debug!("Ignoring {:?} for {}", event, function),
        }
    }

    fn handle_brightness(&mut self, id: u8, delta: i32) {
        let (value, hit_limit) = self.brightness.adjust(delta);
        debug!("{}", self.brightness);

        self.display.set_brightness(value);
        self.feedback.set_led_ring(id, led_ring_position(value));

        if hit_limit && self.behavior.notify_on_limit {
            self.emit(Notification::BrightnessLimit { position: value });
        }
    }

    fn handle_night_mode(&mut self, id: u8, delta: i32) {
        let (value, hit_limit) = self.night_mode.adjust(delta);
        debug!("{}", self.night_mode);

        let step = nearest_step(&self.behavior.night_mode_steps, value);
        if step != self.night_mode_step {
            self.display.set_night_mode(step);
            self.night_mode_step = step;
            self.emit(Notification::NightModeStep {
                step,
                label: step_label(step),
            });
        }

        self.feedback.set_led_ring(id, led_ring_position(value));

        if hit_limit && self.night_mode.at_max() {
            self.emit(Notification::Calibrated);
        }
    }

    /// Write a toggle and return the state to keep
    fn apply_toggle(
        &mut self,
        what: &str,
        wanted: bool,
        write: impl FnOnce(&mut DisplayDriver, bool) -> bool,
    ) -> bool {
        if write(&mut self.display, wanted) {
            info!("{}: {}", what, on_off(wanted));
            wanted
        } else if self.behavior.revert_toggle_on_failure {
            warn!("{}: write failed, staying {}", what, on_off(!wanted));
            !wanted
        } else {
            warn!("{}: write failed, assuming {}", what, on_off(wanted));
            wanted
        }
    }

    fn update_leds(&mut self) {
        for (function, binding) in self.controls.iter() {
            match function {
                Function::Brightness => self
                    .feedback
                    .set_led_ring(binding.id, led_ring_position(self.brightness.position())),
                Function::NightMode => self
                    .feedback
                    .set_led_ring(binding.id, led_ring_position(self.night_mode.position())),
                Function::LocalDimming => {
                    self.feedback.set_button_led(binding.id, self.local_dimming)
                }
                Function::Hdr => self.feedback.set_button_led(binding.id, self.hdr),
            }
        }
    }

    fn emit(&self, notification: Notification) {
        (self.notify)(notification);
    }

    pub fn brightness(&self) -> &KnobState {
        &self.brightness
    }

    pub fn night_mode(&self) -> &KnobState {
        &self.night_mode
    }

    /// Step last sent to the display
    pub fn night_mode_step(&self) -> i32 {
        self.night_mode_step
    }

    pub fn local_dimming_enabled(&self) -> bool {
        self.local_dimming
    }

    pub fn hdr_enabled(&self) -> bool {
        self.hdr
    }

    pub fn display(&self) -> &DisplayDriver {
        &self.display
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}
