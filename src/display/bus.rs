//! Display bus abstraction
//!
//! A bus enumerates attached displays and exposes feature-code reads and
//! writes inside an open session. Backends: [`super::SimulatedBus`] and, with
//! the `ddc` feature, [`super::ddc::DdcBus`].

use super::DisplayError;

/// A display found during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    /// Position in the enumeration order (what the config `index` selects)
    pub index: usize,
    /// Backend-specific identifier
    pub id: String,
    pub model: Option<String>,
}

impl DisplayInfo {
    pub fn label(&self) -> String {
        match &self.model {
            Some(model) => format!("{} ({})", model, self.id),
            None => self.id.clone(),
        }
    }
}

/// Current and maximum value of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureValue {
    pub value: u16,
    pub max: u16,
}

/// Low-level access to the monitor-control bus
///
/// `open`/`close` bracket one or more feature operations. Callers go through
/// [`ScopedSession`] so that `close` runs on every exit path.
pub trait DisplayBus {
    /// List attached displays, refreshing any cached handles
    fn enumerate(&mut self) -> Result<Vec<DisplayInfo>, DisplayError>;

    /// Acquire the display at `index` for a session
    fn open(&mut self, index: usize) -> Result<(), DisplayError>;

    /// Release the display acquired by `open`
    fn close(&mut self);

    fn get_feature(&mut self, code: u8) -> Result<FeatureValue, DisplayError>;

    fn set_feature(&mut self, code: u8, value: u16) -> Result<(), DisplayError>;

    /// Drop cached handles (called on disconnect)
    fn release(&mut self) {}
}

/// An open bus session, closed when dropped
pub struct ScopedSession<'a> {
    bus: &'a mut dyn DisplayBus,
}

impl<'a> ScopedSession<'a> {
    pub fn open(bus: &'a mut dyn DisplayBus, index: usize) -> Result<Self, DisplayError> {
        bus.open(index)?;
        Ok(Self { bus })
    }

    pub fn get_feature(&mut self, code: u8) -> Result<FeatureValue, DisplayError> {
        self.bus.get_feature(code)
    }

    pub fn set_feature(&mut self, code: u8, value: u16) -> Result<(), DisplayError> {
        self.bus.set_feature(code, value)
    }
}

impl Drop for ScopedSession<'_> {
    fn drop(&mut self) {
        self.bus.close();
    }
}
