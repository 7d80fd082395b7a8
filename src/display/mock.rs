//! Simulated display bus
//!
//! Keeps feature registers in memory and logs recent traffic. Used when no real
//! DDC/CI backend is compiled in (or `--simulate` is passed) and by the tests,
//! which script faults through the shared handle.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use super::bus::{DisplayBus, DisplayInfo, FeatureValue};
use super::{DisplayError, FeatureCodes};

/// Entries kept per traffic log; older ones are dropped first
pub const LOG_CAPACITY: usize = 256;

/// Record of bus traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusLog {
    /// Most recent successful writes, oldest first
    pub writes: VecDeque<(u8, u16)>,
    /// Most recent attempted reads, oldest first
    pub reads: VecDeque<u8>,
    pub enumerations: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

fn push_bounded<T>(log: &mut VecDeque<T>, entry: T) {
    if log.len() == LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(entry);
}

#[derive(Debug)]
struct SimState {
    displays: Vec<DisplayInfo>,
    registers: BTreeMap<u8, FeatureValue>,
    open: Option<usize>,
    unreadable: BTreeSet<u8>,
    writes_before_fault: usize,
    failing_writes: usize,
    failing_reads: usize,
    failing_enumerations: usize,
    log: BusLog,
}

/// In-memory display bus; clones share state
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    /// One display with factory-default registers
    pub fn new() -> Self {
        Self::with_display_count(1)
    }

    pub fn with_display_count(count: usize) -> Self {
        let codes = FeatureCodes::default();
        let registers = [
            (codes.brightness, 75),
            (codes.red_gain, 100),
            (codes.green_gain, 100),
            (codes.blue_gain, 100),
            (codes.sharpness, 50),
            (codes.local_dimming, 1),
        ]
        .into_iter()
        .map(|(code, value)| (code, FeatureValue { value, max: 100 }))
        .collect();

        let displays = (0..count)
            .map(|index| DisplayInfo {
                index,
                id: format!("sim-{}", index),
                model: Some("Simulated Display".to_string()),
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(SimState {
                displays,
                registers,
                open: None,
                unreadable: BTreeSet::new(),
                writes_before_fault: 0,
                failing_writes: 0,
                failing_reads: 0,
                failing_enumerations: 0,
                log: BusLog::default(),
            })),
        }
    }

    pub fn set_register(&self, code: u8, value: u16) {
        self.state
            .lock()
            .registers
            .insert(code, FeatureValue { value, max: 100 });
    }

    pub fn register(&self, code: u8) -> Option<u16> {
        self.state.lock().registers.get(&code).map(|f| f.value)
    }

    /// Make every read of `code` fail
    pub fn make_unreadable(&self, code: u8) {
        self.state.lock().unreadable.insert(code);
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes_after(0, count);
    }

    /// Let `skip` writes succeed, then fail the next `count`
    pub fn fail_writes_after(&self, skip: usize, count: usize) {
        let mut state = self.state.lock();
        state.writes_before_fault = skip;
        state.failing_writes = count;
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().failing_reads = count;
    }

    pub fn fail_next_enumerations(&self, count: usize) {
        self.state.lock().failing_enumerations = count;
    }

    /// Simulate the display being unplugged
    pub fn unplug_all(&self) {
        self.state.lock().displays.clear();
    }

    pub fn log(&self) -> BusLog {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log = BusLog::default();
    }

    /// Values successfully written to `code`
    pub fn writes_to(&self, code: u8) -> Vec<u16> {
        self.state
            .lock()
            .log
            .writes
            .iter()
            .filter(|(c, _)| *c == code)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayBus for SimulatedBus {
    fn enumerate(&mut self) -> Result<Vec<DisplayInfo>, DisplayError> {
        let mut state = self.state.lock();
        state.log.enumerations += 1;

        if state.failing_enumerations > 0 {
            state.failing_enumerations -= 1;
            return Err(DisplayError::Bus("simulated enumeration fault".to_string()));
        }

        Ok(state.displays.clone())
    }

    fn open(&mut self, index: usize) -> Result<(), DisplayError> {
        let mut state = self.state.lock();
        let available = state.displays.len();
        if index >= available {
            return Err(DisplayError::NotFound { index, available });
        }

        state.open = Some(index);
        state.log.sessions_opened += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.open.take().is_some() {
            state.log.sessions_closed += 1;
        }
    }

    fn get_feature(&mut self, code: u8) -> Result<FeatureValue, DisplayError> {
        let mut state = self.state.lock();
        if state.open.is_none() {
            return Err(DisplayError::NotConnected);
        }
        push_bounded(&mut state.log.reads, code);

        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(DisplayError::Protocol {
                code,
                message: "simulated read fault".to_string(),
            });
        }
        if state.unreadable.contains(&code) {
            return Err(DisplayError::Protocol {
                code,
                message: "feature not readable".to_string(),
            });
        }

        state.registers.get(&code).copied().ok_or(DisplayError::Protocol {
            code,
            message: "unknown feature".to_string(),
        })
    }

    fn set_feature(&mut self, code: u8, value: u16) -> Result<(), DisplayError> {
        let mut state = self.state.lock();
        let Some(index) = state.open else {
            return Err(DisplayError::NotConnected);
        };

        if state.failing_writes > 0 {
            if state.writes_before_fault > 0 {
                state.writes_before_fault -= 1;
            } else {
                state.failing_writes -= 1;
                debug!("🖥️  sim-{}: write 0x{:02X} = {} dropped", index, code, value);
                return Err(DisplayError::Protocol {
                    code,
                    message: "simulated write fault".to_string(),
                });
            }
        }

        let entry = state
            .registers
            .entry(code)
            .or_insert(FeatureValue { value: 0, max: 100 });
        entry.value = value;
        push_bounded(&mut state.log.writes, (code, value));

        info!("🖥️  sim-{}: VCP 0x{:02X} = {}", index, code, value);
        Ok(())
    }

    fn release(&mut self) {
        self.state.lock().open = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_registers() {
        let sim = SimulatedBus::new();
        let mut bus = sim.clone();

        bus.open(0).unwrap();
        bus.set_feature(0x10, 33).unwrap();
        bus.close();

        assert_eq!(sim.register(0x10), Some(33));
        assert_eq!(sim.log().sessions_closed, 1);
    }

    #[test]
    fn test_operations_require_open_session() {
        let mut bus = SimulatedBus::new();
        assert_eq!(bus.get_feature(0x10), Err(DisplayError::NotConnected));
        assert_eq!(bus.set_feature(0x10, 1), Err(DisplayError::NotConnected));
    }

    #[test]
    fn test_unreadable_feature() {
        let sim = SimulatedBus::new();
        let mut bus = sim.clone();
        sim.make_unreadable(0xE0);

        bus.open(0).unwrap();
        assert!(bus.get_feature(0xE0).is_err());
        assert_eq!(bus.get_feature(0x10).unwrap().value, 75);
    }

    #[test]
    fn test_traffic_log_is_bounded() {
        let sim = SimulatedBus::new();
        let mut bus = sim.clone();
        bus.open(0).unwrap();

        for value in 0..(LOG_CAPACITY as u16 + 50) {
            bus.set_feature(0x10, value % 101).unwrap();
            bus.get_feature(0x10).unwrap();
        }

        let log = sim.log();
        assert_eq!(log.writes.len(), LOG_CAPACITY);
        assert_eq!(log.reads.len(), LOG_CAPACITY);
        assert_eq!(log.writes.back(), Some(&(0x10, (LOG_CAPACITY as u16 + 49) % 101)));
        assert_eq!(log.writes.front(), Some(&(0x10, 50)));
    }

    #[test]
    fn test_unplug() {
        let sim = SimulatedBus::new();
        let mut bus = sim.clone();
        sim.unplug_all();
        assert!(bus.enumerate().unwrap().is_empty());
    }
}
