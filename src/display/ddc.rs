//! DDC/CI backend (`ddc` feature)

use ddc_hi::{Ddc, Display};
use tracing::debug;

use super::bus::{DisplayBus, DisplayInfo, FeatureValue};
use super::DisplayError;

/// Display bus over DDC/CI via `ddc-hi`
#[derive(Default)]
pub struct DdcBus {
    displays: Vec<Display>,
    open: Option<usize>,
}

impl DdcBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> Result<&mut Display, DisplayError> {
        let index = self.open.ok_or(DisplayError::NotConnected)?;
        self.displays.get_mut(index).ok_or(DisplayError::NotConnected)
    }
}

impl DisplayBus for DdcBus {
    fn enumerate(&mut self) -> Result<Vec<DisplayInfo>, DisplayError> {
        self.open = None;
        self.displays = Display::enumerate();

        Ok(self
            .displays
            .iter()
            .enumerate()
            .map(|(index, display)| DisplayInfo {
                index,
                id: display.info.id.clone(),
                model: display.info.model_name.clone(),
            })
            .collect())
    }

    fn open(&mut self, index: usize) -> Result<(), DisplayError> {
        let available = self.displays.len();
        if index >= available {
            return Err(DisplayError::NotFound { index, available });
        }
        self.open = Some(index);
        Ok(())
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn get_feature(&mut self, code: u8) -> Result<FeatureValue, DisplayError> {
        let value = self
            .current()?
            .handle
            .get_vcp_feature(code)
            .map_err(|e| DisplayError::Protocol { code, message: e.to_string() })?;

        debug!("DDC get 0x{:02X} = {}/{}", code, value.value(), value.maximum());
        Ok(FeatureValue {
            value: value.value(),
            max: value.maximum(),
        })
    }

    fn set_feature(&mut self, code: u8, value: u16) -> Result<(), DisplayError> {
        debug!("DDC set 0x{:02X} = {}", code, value);
        self.current()?
            .handle
            .set_vcp_feature(code, value)
            .map_err(|e| DisplayError::Protocol { code, message: e.to_string() })
    }

    fn release(&mut self) {
        self.open = None;
        self.displays.clear();
    }
}
