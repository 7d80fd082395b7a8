//! Monitor GW
//!
//! Turns knob and button gestures on a MIDI control surface into monitor
//! settings over DDC/CI: brightness, night mode (warm color shift), local
//! dimming and HDR, with LED feedback on the surface.

pub mod config;
pub mod detect;
pub mod display;
pub mod encoder;
pub mod knob;
pub mod mapper;
pub mod midi;
pub mod paths;
pub mod session;
pub mod shell;
pub mod surface;
