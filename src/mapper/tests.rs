//! Tests for the control mapper

use super::*;
use crate::config::ControlBinding;
use crate::display::{FeatureCodes, SimulatedBus};
use crate::midi::MidiMessage;
use crate::surface::mock::MockSurface;
use crate::surface::ControlKind;
use parking_lot::Mutex;

const BRIGHTNESS_CODE: u8 = 0x10;
const RED_CODE: u8 = 0x16;
const GREEN_CODE: u8 = 0x18;
const BLUE_CODE: u8 = 0x1A;
const DIMMING_CODE: u8 = 0xE0;

const BRIGHTNESS_KNOB: u8 = 1;
const NIGHT_KNOB: u8 = 2;
const DIMMING_BUTTON: u8 = 1;
const HDR_BUTTON: u8 = 0;

struct Harness {
    mapper: ControlMapper,
    sim: SimulatedBus,
    surface: MockSurface,
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl Harness {
    fn new() -> Self {
        Self::build(BehaviorConfig::default(), FeatureCodes::default(), |_| {})
    }

    fn with_behavior(behavior: BehaviorConfig) -> Self {
        Self::build(behavior, FeatureCodes::default(), |_| {})
    }

    /// `prepare` runs against the simulated display before anything is read
    fn build(
        behavior: BehaviorConfig,
        codes: FeatureCodes,
        prepare: impl FnOnce(&SimulatedBus),
    ) -> Self {
        let sim = SimulatedBus::new();
        prepare(&sim);

        let mut display = DisplayDriver::new(Box::new(sim.clone()), 0, codes);
        display.connect().unwrap();

        let surface = MockSurface::new();
        let feedback = Feedback::new(Box::new(surface.clone()), 1);

        let notifications = Arc::new(Mutex::new(Vec::new()));
        let sink = notifications.clone();
        let mapper = ControlMapper::new(feedback, display, test_controls(), behavior)
            .with_notifier(Arc::new(move |n| sink.lock().push(n)));

        sim.clear_log();
        Self {
            mapper,
            sim,
            surface,
            notifications,
        }
    }

    /// Initialize, then forget everything that happened during it
    fn initialized(mut self) -> Self {
        self.mapper.initialize();
        self.reset_observations();
        self
    }

    fn reset_observations(&self) {
        self.sim.clear_log();
        self.surface.clear_sent();
        self.notifications.lock().clear();
    }

    fn turn(&mut self, id: u8, delta: i32) {
        self.mapper.handle_event(SurfaceEvent::Knob { id, delta });
    }

    fn press(&mut self, id: u8) {
        self.mapper.handle_event(SurfaceEvent::Button { id, velocity: 127 });
    }

    fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

fn test_controls() -> ControlMap {
    let mut map = ControlMap::default();
    let knob = |id| ControlBinding { kind: ControlKind::Knob, id };
    let button = |id| ControlBinding { kind: ControlKind::Button, id };
    map.insert(Function::Brightness, knob(BRIGHTNESS_KNOB)).unwrap();
    map.insert(Function::NightMode, knob(NIGHT_KNOB)).unwrap();
    map.insert(Function::LocalDimming, button(DIMMING_BUTTON)).unwrap();
    map.insert(Function::Hdr, button(HDR_BUTTON)).unwrap();
    map
}

fn ring(cc: u8, value: u8) -> MidiMessage {
    MidiMessage::ControlChange { channel: 0, cc, value }
}

fn led_on(note: u8) -> MidiMessage {
    MidiMessage::NoteOn { channel: 0, note, velocity: 127 }
}

fn led_off(note: u8) -> MidiMessage {
    MidiMessage::NoteOff { channel: 0, note, velocity: 0 }
}

// ---- pure helpers -------------------------------------------------------

#[test]
fn test_nearest_step() {
    let steps = [0, 25, 50, 75, 100];
    assert_eq!(nearest_step(&steps, 62), 50);
    assert_eq!(nearest_step(&steps, 63), 75);
    assert_eq!(nearest_step(&steps, 37), 25);
    assert_eq!(nearest_step(&steps, 0), 0);
    assert_eq!(nearest_step(&steps, 100), 100);
    assert_eq!(nearest_step(&steps, 88), 100);
}

#[test]
fn test_nearest_step_tie_goes_to_lower() {
    assert_eq!(nearest_step(&[0, 10], 5), 0);
    assert_eq!(nearest_step(&[20, 40], 30), 20);
    assert_eq!(nearest_step(&[20, 40], 31), 40);
}

#[test]
fn test_nearest_step_empty() {
    assert_eq!(nearest_step(&[], 42), 42);
}

#[test]
fn test_led_ring_position() {
    assert_eq!(led_ring_position(0), 0);
    assert_eq!(led_ring_position(9), 0);
    assert_eq!(led_ring_position(50), 5);
    assert_eq!(led_ring_position(99), 10);
    assert_eq!(led_ring_position(100), 11);
    assert_eq!(led_ring_position(150), 11);
    assert_eq!(led_ring_position(-5), 0);
}

#[test]
fn test_step_labels() {
    assert_eq!(step_label(0), Some("Candlelight (2700K)"));
    assert_eq!(step_label(100), Some("Calibrated (6500K)"));
    assert_eq!(step_label(60), None);
    assert_eq!(
        Notification::NightModeStep { step: 60, label: None }.to_string(),
        "Night mode: step 60"
    );
}

// ---- initialize ---------------------------------------------------------

#[test]
fn test_initialize_calibrated() {
    let mut h = Harness::build(BehaviorConfig::default(), FeatureCodes::default(), |sim| {
        sim.set_register(BRIGHTNESS_CODE, 42);
        sim.set_register(BLUE_CODE, 60);
    });
    h.mapper.initialize();

    assert_eq!(h.mapper.brightness().position(), 42);
    assert_eq!(h.mapper.night_mode().position(), 100);
    assert_eq!(h.mapper.night_mode_step(), 100);
    assert!(h.mapper.local_dimming_enabled());
    assert!(!h.mapper.hdr_enabled());

    // Night mode forced to neutral; local dimming was readable so untouched
    assert_eq!(
        h.sim.log().writes,
        vec![(RED_CODE, 100), (GREEN_CODE, 100), (BLUE_CODE, 100)]
    );

    assert_eq!(
        h.surface.sent(),
        vec![
            ring(BRIGHTNESS_KNOB, 4),
            ring(NIGHT_KNOB, 11),
            led_on(DIMMING_BUTTON),
            led_off(HDR_BUTTON),
        ]
    );
}

#[test]
fn test_initialize_from_blue_gain() {
    let behavior = BehaviorConfig {
        always_start_calibrated: false,
        ..BehaviorConfig::default()
    };
    let mut h = Harness::build(behavior, FeatureCodes::default(), |sim| {
        sim.set_register(BLUE_CODE, 62);
    });
    h.mapper.initialize();

    assert_eq!(h.mapper.night_mode().position(), 50);
    assert_eq!(h.mapper.night_mode_step(), 50);
    assert!(h.sim.writes_to(BLUE_CODE).is_empty());
}

#[test]
fn test_initialize_resyncs_written_steps_from_blue_gain() {
    let behavior = BehaviorConfig {
        always_start_calibrated: false,
        ..BehaviorConfig::default()
    };
    // (step written on a previous run, step restored on the next start)
    let cases = [(0, 25), (25, 50), (50, 50), (75, 75), (100, 100)];

    for (written, restored) in cases {
        let (_, _, blue) = crate::display::night_mode_gains(written);
        let mut h = Harness::build(behavior.clone(), FeatureCodes::default(), |sim| {
            sim.set_register(BLUE_CODE, blue);
        });
        h.mapper.initialize();

        assert_eq!(h.mapper.night_mode_step(), restored, "written step {}", written);
        assert_eq!(h.mapper.night_mode().position(), restored);
    }
}

#[test]
fn test_initialize_unreadable_brightness_keeps_default() {
    let mut h = Harness::build(BehaviorConfig::default(), FeatureCodes::default(), |sim| {
        sim.make_unreadable(BRIGHTNESS_CODE);
    });
    h.mapper.initialize();
    assert_eq!(h.mapper.brightness().position(), 75);
}

#[test]
fn test_initialize_unreadable_local_dimming_defaults_on() {
    let mut h = Harness::build(BehaviorConfig::default(), FeatureCodes::default(), |sim| {
        sim.set_register(DIMMING_CODE, 0);
        sim.make_unreadable(DIMMING_CODE);
    });
    h.mapper.initialize();

    assert!(h.mapper.local_dimming_enabled());
    assert_eq!(h.sim.writes_to(DIMMING_CODE), vec![1]);
    assert!(h.surface.sent().contains(&led_on(DIMMING_BUTTON)));
}

#[test]
fn test_initialize_mirrors_local_dimming_off() {
    let mut h = Harness::build(BehaviorConfig::default(), FeatureCodes::default(), |sim| {
        sim.set_register(DIMMING_CODE, 0);
    });
    h.mapper.initialize();

    assert!(!h.mapper.local_dimming_enabled());
    assert!(h.sim.writes_to(DIMMING_CODE).is_empty());
    assert!(h.surface.sent().contains(&led_off(DIMMING_BUTTON)));
}

#[test]
fn test_initialize_mirrors_hdr_when_supported() {
    let codes = FeatureCodes {
        hdr: Some(0xF0),
        ..FeatureCodes::default()
    };
    let mut h = Harness::build(BehaviorConfig::default(), codes, |sim| {
        sim.set_register(0xF0, 1);
    });
    h.mapper.initialize();

    assert!(h.mapper.hdr_enabled());
    assert!(h.surface.sent().contains(&led_on(HDR_BUTTON)));
}

// ---- brightness ---------------------------------------------------------

#[test]
fn test_brightness_writes_every_tick() {
    let mut h = Harness::new().initialized();

    h.turn(BRIGHTNESS_KNOB, 5);
    h.turn(BRIGHTNESS_KNOB, -2);

    assert_eq!(h.mapper.brightness().position(), 78);
    assert_eq!(h.sim.writes_to(BRIGHTNESS_CODE), vec![80, 78]);
    assert_eq!(
        h.surface.sent(),
        vec![ring(BRIGHTNESS_KNOB, 8), ring(BRIGHTNESS_KNOB, 8)]
    );
    assert!(h.notifications().is_empty());
}

#[test]
fn test_brightness_limit_notification() {
    let mut h = Harness::build(BehaviorConfig::default(), FeatureCodes::default(), |sim| {
        sim.set_register(BRIGHTNESS_CODE, 98);
    })
    .initialized();

    h.turn(BRIGHTNESS_KNOB, 5);

    assert_eq!(h.mapper.brightness().position(), 100);
    assert_eq!(h.sim.writes_to(BRIGHTNESS_CODE), vec![100]);
    assert_eq!(
        h.notifications(),
        vec![Notification::BrightnessLimit { position: 100 }]
    );
}

#[test]
fn test_brightness_limit_notification_disabled() {
    let behavior = BehaviorConfig {
        notify_on_limit: false,
        ..BehaviorConfig::default()
    };
    let mut h = Harness::with_behavior(behavior).initialized();

    h.turn(BRIGHTNESS_KNOB, -200);

    assert_eq!(h.mapper.brightness().position(), 0);
    assert!(h.notifications().is_empty());
}

#[test]
fn test_brightness_recovers_from_transient_fault() {
    let mut h = Harness::new().initialized();
    h.sim.fail_next_writes(1);

    h.turn(BRIGHTNESS_KNOB, 1);

    assert_eq!(h.sim.writes_to(BRIGHTNESS_CODE), vec![76]);
    assert_eq!(h.mapper.display().reconnects(), 1);
}

#[test]
fn test_brightness_failed_write_keeps_presumed_state() {
    let mut h = Harness::new().initialized();
    h.sim.fail_next_writes(2);

    h.turn(BRIGHTNESS_KNOB, 10);

    assert_eq!(h.mapper.brightness().position(), 85);
    assert!(h.sim.writes_to(BRIGHTNESS_CODE).is_empty());
    assert_eq!(h.surface.sent(), vec![ring(BRIGHTNESS_KNOB, 9)]);

    h.turn(BRIGHTNESS_KNOB, 1);
    assert_eq!(h.sim.writes_to(BRIGHTNESS_CODE), vec![86]);
}

// ---- night mode ---------------------------------------------------------

#[test]
fn test_night_mode_within_step_writes_nothing() {
    let mut h = Harness::new().initialized();

    h.turn(NIGHT_KNOB, -20);
    assert_eq!(h.mapper.night_mode_step(), 75);
    h.reset_observations();

    h.turn(NIGHT_KNOB, -10);

    assert_eq!(h.mapper.night_mode().position(), 70);
    assert_eq!(h.mapper.night_mode_step(), 75);
    assert!(h.sim.log().writes.is_empty());
    assert!(h.notifications().is_empty());
    assert_eq!(h.surface.sent(), vec![ring(NIGHT_KNOB, 7)]);
}

#[test]
fn test_night_mode_crossing_step_writes_once() {
    let mut h = Harness::new().initialized();

    h.turn(NIGHT_KNOB, -10);
    assert_eq!(h.mapper.night_mode().position(), 90);
    assert!(h.sim.log().writes.is_empty());

    h.turn(NIGHT_KNOB, -20);

    assert_eq!(h.mapper.night_mode_step(), 75);
    assert_eq!(
        h.sim.log().writes,
        vec![(RED_CODE, 100), (GREEN_CODE, 90), (BLUE_CODE, 80)]
    );
    assert_eq!(
        h.notifications(),
        vec![Notification::NightModeStep {
            step: 75,
            label: Some("Slightly Warm (5500K)"),
        }]
    );
}

#[test]
fn test_night_mode_led_follows_unquantized_position() {
    let mut h = Harness::new().initialized();

    for _ in 0..3 {
        h.turn(NIGHT_KNOB, -9);
    }

    assert_eq!(
        h.surface.sent(),
        vec![ring(NIGHT_KNOB, 10), ring(NIGHT_KNOB, 9), ring(NIGHT_KNOB, 8)]
    );
    // 91 and 82 round to 100 and 75, 73 stays at 75
    assert_eq!(h.sim.writes_to(BLUE_CODE), vec![80]);
}

#[test]
fn test_night_mode_calibrated_at_hard_stop() {
    let mut h = Harness::new().initialized();

    h.turn(NIGHT_KNOB, 5);

    assert_eq!(h.mapper.night_mode().position(), 100);
    assert!(h.sim.log().writes.is_empty());
    assert_eq!(h.notifications(), vec![Notification::Calibrated]);
    assert_eq!(h.surface.sent(), vec![ring(NIGHT_KNOB, 11)]);
}

#[test]
fn test_night_mode_return_to_calibrated() {
    let mut h = Harness::new().initialized();

    h.turn(NIGHT_KNOB, -100);
    assert_eq!(h.mapper.night_mode_step(), 0);
    h.reset_observations();

    h.turn(NIGHT_KNOB, 120);

    assert_eq!(h.mapper.night_mode_step(), 100);
    assert_eq!(h.sim.writes_to(BLUE_CODE), vec![100]);
    assert_eq!(
        h.notifications(),
        vec![
            Notification::NightModeStep {
                step: 100,
                label: Some("Calibrated (6500K)"),
            },
            Notification::Calibrated,
        ]
    );
}

#[test]
fn test_night_mode_custom_steps() {
    let behavior = BehaviorConfig {
        night_mode_steps: vec![0, 50],
        ..BehaviorConfig::default()
    };
    let mut h = Harness::with_behavior(behavior).initialized();

    h.turn(NIGHT_KNOB, -20);

    assert_eq!(h.mapper.night_mode_step(), 50);
    assert_eq!(h.sim.writes_to(BLUE_CODE), vec![60]);
}

// ---- toggles ------------------------------------------------------------

#[test]
fn test_local_dimming_toggle() {
    let mut h = Harness::new().initialized();

    h.press(DIMMING_BUTTON);
    assert!(!h.mapper.local_dimming_enabled());
    assert_eq!(h.sim.writes_to(DIMMING_CODE), vec![0]);

    h.press(DIMMING_BUTTON);
    assert!(h.mapper.local_dimming_enabled());
    assert_eq!(h.sim.writes_to(DIMMING_CODE), vec![0, 1]);

    assert_eq!(
        h.surface.sent(),
        vec![led_off(DIMMING_BUTTON), led_on(DIMMING_BUTTON)]
    );
}

#[test]
fn test_release_does_not_toggle() {
    let mut h = Harness::new().initialized();

    h.mapper.handle_event(SurfaceEvent::Button { id: DIMMING_BUTTON, velocity: 0 });

    assert!(h.mapper.local_dimming_enabled());
    assert!(h.sim.log().writes.is_empty());
    assert!(h.surface.sent().is_empty());
}

#[test]
fn test_failed_toggle_reverts() {
    let mut h = Harness::new().initialized();
    h.sim.fail_next_writes(2);

    h.press(DIMMING_BUTTON);

    assert!(h.mapper.local_dimming_enabled());
    assert!(h.sim.writes_to(DIMMING_CODE).is_empty());
    assert_eq!(h.surface.sent(), vec![led_on(DIMMING_BUTTON)]);
    assert_eq!(h.mapper.display().reconnects(), 1);
}

#[test]
fn test_failed_toggle_kept_without_revert() {
    let behavior = BehaviorConfig {
        revert_toggle_on_failure: false,
        ..BehaviorConfig::default()
    };
    let mut h = Harness::with_behavior(behavior).initialized();
    h.sim.fail_next_writes(2);

    h.press(DIMMING_BUTTON);

    assert!(!h.mapper.local_dimming_enabled());
    assert_eq!(h.surface.sent(), vec![led_off(DIMMING_BUTTON)]);
}

#[test]
fn test_hdr_unsupported_stays_off() {
    let mut h = Harness::new().initialized();

    h.press(HDR_BUTTON);

    assert!(!h.mapper.hdr_enabled());
    assert!(h.sim.log().writes.is_empty());
    assert_eq!(h.sim.log().sessions_opened, 0);
    assert_eq!(h.surface.sent(), vec![led_off(HDR_BUTTON)]);
}

#[test]
fn test_hdr_toggle_with_feature_code() {
    let codes = FeatureCodes {
        hdr: Some(0xF0),
        ..FeatureCodes::default()
    };
    let mut h = Harness::build(BehaviorConfig::default(), codes, |sim| {
        sim.set_register(0xF0, 0);
    })
    .initialized();

    h.press(HDR_BUTTON);

    assert!(h.mapper.hdr_enabled());
    assert_eq!(h.sim.writes_to(0xF0), vec![1]);
    assert_eq!(h.surface.sent(), vec![led_on(HDR_BUTTON)]);
}

// ---- routing ------------------------------------------------------------

#[test]
fn test_unmapped_controls_are_dropped() {
    let mut h = Harness::new().initialized();

    h.turn(9, 5);
    h.press(9);
    // Button 0 is bound, knob 0 is not
    h.turn(HDR_BUTTON, 5);

    assert!(h.sim.log().writes.is_empty());
    assert!(h.surface.sent().is_empty());
    assert_eq!(h.mapper.brightness().position(), 75);
}

#[test]
fn test_zero_delta_is_ignored() {
    let mut h = Harness::new().initialized();

    h.turn(BRIGHTNESS_KNOB, 0);

    assert!(h.sim.log().writes.is_empty());
    assert!(h.surface.sent().is_empty());
}
