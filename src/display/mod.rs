//! Display driver
//!
//! Idempotent get/set operations over the monitor's control-value protocol.
//! Writes that fail get exactly one reconnect-and-retry; reads never
//! reconnect and simply report `None`.

pub mod bus;
#[cfg(feature = "ddc")]
pub mod ddc;
pub mod mock;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub use bus::{DisplayBus, DisplayInfo, FeatureValue, ScopedSession};
pub use mock::{BusLog, SimulatedBus};

/// Errors raised by the display bus and driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisplayError {
    /// No display at the configured index.
    #[error("No display at index {index} ({available} available)")]
    NotFound { index: usize, available: usize },

    /// An operation was attempted while disconnected.
    #[error("Display not connected")]
    NotConnected,

    /// A single feature read or write failed.
    #[error("Feature 0x{code:02X} failed: {message}")]
    Protocol { code: u8, message: String },

    /// The display has no feature code configured for this function.
    #[error("Display does not expose {0}")]
    Unsupported(&'static str),

    /// Enumeration or handle-level failure.
    #[error("Display bus error: {0}")]
    Bus(String),

    /// No hardware backend compiled into this build.
    #[error("Built without the `ddc` feature; pass --simulate or rebuild with --features ddc")]
    BackendUnavailable,
}

/// Open the simulated bus or the DDC/CI bus
pub fn open_bus(simulate: bool) -> Result<Box<dyn DisplayBus>, DisplayError> {
    if simulate {
        info!("Using simulated display");
        return Ok(Box::new(SimulatedBus::new()));
    }
    hardware_bus()
}

#[cfg(feature = "ddc")]
fn hardware_bus() -> Result<Box<dyn DisplayBus>, DisplayError> {
    Ok(Box::new(ddc::DdcBus::new()))
}

#[cfg(not(feature = "ddc"))]
fn hardware_bus() -> Result<Box<dyn DisplayBus>, DisplayError> {
    Err(DisplayError::BackendUnavailable)
}

/// Feature codes used by the driver
///
/// Brightness and gains are standard MCCS codes. Local dimming and HDR live in
/// the manufacturer range and differ between models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeatureCodes {
    #[serde(default = "default_brightness_code")]
    pub brightness: u8,
    #[serde(default = "default_red_gain_code")]
    pub red_gain: u8,
    #[serde(default = "default_green_gain_code")]
    pub green_gain: u8,
    #[serde(default = "default_blue_gain_code")]
    pub blue_gain: u8,
    #[serde(default = "default_sharpness_code")]
    pub sharpness: u8,
    #[serde(default = "default_local_dimming_code")]
    pub local_dimming: u8,
    #[serde(default)]
    pub hdr: Option<u8>,
}

impl Default for FeatureCodes {
    fn default() -> Self {
        Self {
            brightness: default_brightness_code(),
            red_gain: default_red_gain_code(),
            green_gain: default_green_gain_code(),
            blue_gain: default_blue_gain_code(),
            sharpness: default_sharpness_code(),
            local_dimming: default_local_dimming_code(),
            hdr: None,
        }
    }
}

fn default_brightness_code() -> u8 { 0x10 }
fn default_red_gain_code() -> u8 { 0x16 }
fn default_green_gain_code() -> u8 { 0x18 }
fn default_blue_gain_code() -> u8 { 0x1A }
fn default_sharpness_code() -> u8 { 0x87 }
fn default_local_dimming_code() -> u8 { 0xE0 }

/// Point-in-time readout of the display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub brightness: Option<u16>,
    pub red_gain: Option<u16>,
    pub green_gain: Option<u16>,
    pub blue_gain: Option<u16>,
    pub sharpness: Option<u16>,
    pub local_dimming: Option<bool>,
    pub hdr: Option<bool>,
}

/// Red/green/blue gains for a night-mode intensity (0 = warmest, 100 = neutral)
pub fn night_mode_gains(intensity: i32) -> (u16, u16, u16) {
    let i = percent(intensity);
    (100, 60 + i * 4 / 10, 20 + i * 8 / 10)
}

fn percent(value: i32) -> u16 {
    value.clamp(0, 100) as u16
}

fn flag(enabled: bool) -> u16 {
    u16::from(enabled)
}

/// Monitor driver with connect/reconnect/retry policy
pub struct DisplayDriver {
    bus: Box<dyn DisplayBus>,
    index: usize,
    codes: FeatureCodes,
    connected: Option<DisplayInfo>,
    reconnects: u32,
}

impl DisplayDriver {
    pub fn new(bus: Box<dyn DisplayBus>, index: usize, codes: FeatureCodes) -> Self {
        Self {
            bus,
            index,
            codes,
            connected: None,
            reconnects: 0,
        }
    }

    /// Enumerate displays and select the configured index
    pub fn connect(&mut self) -> Result<&DisplayInfo, DisplayError> {
        self.connected = None;

        let displays = self.bus.enumerate()?;
        debug!("Found {} display(s)", displays.len());

        let available = displays.len();
        let info = displays
            .into_iter()
            .nth(self.index)
            .ok_or(DisplayError::NotFound { index: self.index, available })?;

        info!("Display connected: {}", info.label());
        let info: &DisplayInfo = self.connected.insert(info);
        Ok(info)
    }

    pub fn disconnect(&mut self) {
        if let Some(info) = self.connected.take() {
            debug!("Display disconnected: {}", info.label());
        }
        self.bus.release();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    pub fn display(&self) -> Option<&DisplayInfo> {
        self.connected.as_ref()
    }

    /// Reconnect cycles performed since construction
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn codes(&self) -> &FeatureCodes {
        &self.codes
    }

    /// List displays on the bus without changing the selection
    pub fn list(&mut self) -> Result<Vec<DisplayInfo>, DisplayError> {
        self.bus.enumerate()
    }

    // ---- writes -------------------------------------------------------

    /// Set brightness (clamped to 0-100)
    pub fn set_brightness(&mut self, value: i32) -> bool {
        let (code, value) = (self.codes.brightness, percent(value));
        self.write_with_retry("brightness", |s| s.set_feature(code, value))
    }

    /// Set blue channel gain (clamped to 0-100)
    pub fn set_blue_gain(&mut self, value: i32) -> bool {
        let (code, value) = (self.codes.blue_gain, percent(value));
        self.write_with_retry("blue gain", |s| s.set_feature(code, value))
    }

    /// Apply a night-mode intensity as three gain writes in one session
    ///
    /// Channels already written are not rolled back if a later write fails;
    /// the retry re-issues all three absolute values.
    pub fn set_night_mode(&mut self, intensity: i32) -> bool {
        let (red, green, blue) = night_mode_gains(intensity);
        let codes = self.codes;
        debug!("Night mode {} -> R{} G{} B{}", intensity, red, green, blue);

        self.write_with_retry("night mode", |s| {
            s.set_feature(codes.red_gain, red)?;
            s.set_feature(codes.green_gain, green)?;
            s.set_feature(codes.blue_gain, blue)
        })
    }

    pub fn set_local_dimming(&mut self, enabled: bool) -> bool {
        let code = self.codes.local_dimming;
        self.write_with_retry("local dimming", |s| s.set_feature(code, flag(enabled)))
    }

    pub fn set_hdr(&mut self, enabled: bool) -> bool {
        let Some(code) = self.codes.hdr else {
            warn!("HDR toggle ignored: {}", DisplayError::Unsupported("HDR"));
            return false;
        };
        self.write_with_retry("HDR", |s| s.set_feature(code, flag(enabled)))
    }

    pub fn set_sharpness(&mut self, value: i32) -> bool {
        let (code, value) = (self.codes.sharpness, percent(value));
        self.write_with_retry("sharpness", |s| s.set_feature(code, value))
    }

    // ---- reads --------------------------------------------------------

    pub fn get_brightness(&mut self) -> Option<u16> {
        self.read("brightness", self.codes.brightness)
    }

    pub fn get_blue_gain(&mut self) -> Option<u16> {
        self.read("blue gain", self.codes.blue_gain)
    }

    pub fn get_local_dimming(&mut self) -> Option<bool> {
        self.read("local dimming", self.codes.local_dimming).map(|v| v != 0)
    }

    pub fn get_hdr(&mut self) -> Option<bool> {
        let code = self.codes.hdr?;
        self.read("HDR", code).map(|v| v != 0)
    }

    pub fn get_sharpness(&mut self) -> Option<u16> {
        self.read("sharpness", self.codes.sharpness)
    }

    /// Read every known feature
    pub fn snapshot(&mut self) -> DisplayState {
        DisplayState {
            brightness: self.get_brightness(),
            red_gain: self.read("red gain", self.codes.red_gain),
            green_gain: self.read("green gain", self.codes.green_gain),
            blue_gain: self.get_blue_gain(),
            sharpness: self.get_sharpness(),
            local_dimming: self.get_local_dimming(),
            hdr: self.get_hdr(),
        }
    }

    // ---- plumbing -----------------------------------------------------

    fn with_session<T>(
        &mut self,
        op: impl FnOnce(&mut ScopedSession<'_>) -> Result<T, DisplayError>,
    ) -> Result<T, DisplayError> {
        let index = self.connected.as_ref().ok_or(DisplayError::NotConnected)?.index;
        let mut session = ScopedSession::open(self.bus.as_mut(), index)?;
        op(&mut session)
    }

    fn read(&mut self, what: &str, code: u8) -> Option<u16> {
        match self.with_session(|s| s.get_feature(code)) {
            Ok(feature) => {
                debug!("Read {} = {}/{}", what, feature.value, feature.max);
                Some(feature.value)
            }
            Err(e) => {
                debug!("Read {} failed: {}", what, e);
                None
            }
        }
    }

    /// Run a write, reconnecting and retrying once on failure
    fn write_with_retry(
        &mut self,
        what: &str,
        op: impl Fn(&mut ScopedSession<'_>) -> Result<(), DisplayError>,
    ) -> bool {
        let first = match self.with_session(&op) {
            Ok(()) => return true,
            Err(e) => e,
        };

        warn!("Write {} failed ({}), reconnecting", what, first);
        self.disconnect();
        self.reconnects += 1;

        if let Err(e) = self.connect() {
            error!("Reconnect failed, {} not applied: {}", what, e);
            return false;
        }

        match self.with_session(&op) {
            Ok(()) => {
                info!("Write {} succeeded after reconnect", what);
                true
            }
            Err(e) => {
                error!("Write {} failed after reconnect: {}", what, e);
                false
            }
        }
    }
}
