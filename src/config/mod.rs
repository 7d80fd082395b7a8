//! Configuration management for Monitor GW
//!
//! Handles loading, parsing, validation, and hot-reloading of the YAML (or
//! JSON) configuration file.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

use crate::display::FeatureCodes;
use crate::surface::ControlKind;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    /// Function name -> physical control
    #[serde(default)]
    pub controls: BTreeMap<String, ControlBinding>,
    #[serde(default)]
    pub behavior: BehaviorConfig,
}

/// MIDI transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Case-insensitive substring of the port name
    pub device: String,
    /// 1-16, used for LED feedback
    #[serde(default = "default_channel")]
    pub channel: u8,
}

/// Display selection and feature code overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub features: FeatureCodes,
}

/// Physical control bound to a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ControlBinding {
    #[serde(alias = "control_kind", alias = "control_type")]
    pub kind: ControlKind,
    #[serde(alias = "control_id")]
    pub id: u8,
}

/// Runtime behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Force night mode to neutral on every start
    #[serde(default = "default_true")]
    pub always_start_calibrated: bool,

    #[serde(default = "default_true")]
    pub notify_on_limit: bool,

    /// Undo a toggle whose display write failed
    #[serde(default = "default_true")]
    pub revert_toggle_on_failure: bool,

    #[serde(default = "default_night_mode_steps")]
    pub night_mode_steps: Vec<i32>,

    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            sensitivity: default_sensitivity(),
            always_start_calibrated: true,
            notify_on_limit: true,
            revert_toggle_on_failure: true,
            night_mode_steps: default_night_mode_steps(),
            receive_timeout_ms: default_receive_timeout_ms(),
        }
    }
}

/// Controllable function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Function {
    Brightness,
    NightMode,
    LocalDimming,
    Hdr,
}

impl Function {
    pub const ALL: [Function; 4] = [
        Function::Brightness,
        Function::NightMode,
        Function::LocalDimming,
        Function::Hdr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::Brightness => "brightness",
            Function::NightMode => "night_mode",
            Function::LocalDimming => "local_dimming",
            Function::Hdr => "hdr",
        }
    }

    /// Control kind the function must be bound to
    pub fn kind(&self) -> ControlKind {
        match self {
            Function::Brightness | Function::NightMode => ControlKind::Knob,
            Function::LocalDimming | Function::Hdr => ControlKind::Button,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Function {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brightness" => Ok(Function::Brightness),
            "night_mode" => Ok(Function::NightMode),
            "local_dimming" => Ok(Function::LocalDimming),
            "hdr" | "hdr_toggle" => Ok(Function::Hdr),
            _ => Err(ConfigError::UnknownFunction(s.to_string())),
        }
    }
}

/// Control map resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown function '{0}' (expected brightness, night_mode, local_dimming or hdr)")]
    UnknownFunction(String),

    #[error("Function '{function}' needs a {expected} control, not a {found}")]
    WrongKind {
        function: Function,
        expected: ControlKind,
        found: ControlKind,
    },

    #[error("Function '{0}' is bound more than once")]
    DuplicateFunction(Function),

    #[error("{kind} {id} is bound to both '{first}' and '{second}'")]
    DuplicateBinding {
        kind: ControlKind,
        id: u8,
        first: Function,
        second: Function,
    },

    #[error("Control id {id} for '{function}' is out of range (must be 0-127)")]
    InvalidId { function: Function, id: u8 },
}

/// Resolved, immutable control map
#[derive(Debug, Clone, Default)]
pub struct ControlMap {
    bindings: BTreeMap<Function, ControlBinding>,
    by_control: HashMap<(ControlKind, u8), Function>,
}

impl ControlMap {
    /// Resolve raw config entries, rejecting unknown names, kind mismatches
    /// and duplicates
    pub fn resolve(raw: &BTreeMap<String, ControlBinding>) -> Result<Self, ConfigError> {
        let mut map = ControlMap::default();
        for (name, binding) in raw {
            let function: Function = name.parse()?;
            map.insert(function, *binding)?;
        }
        Ok(map)
    }

    pub fn insert(&mut self, function: Function, binding: ControlBinding) -> Result<(), ConfigError> {
        if binding.kind != function.kind() {
            return Err(ConfigError::WrongKind {
                function,
                expected: function.kind(),
                found: binding.kind,
            });
        }
        if binding.id > 127 {
            return Err(ConfigError::InvalidId { function, id: binding.id });
        }
        if self.bindings.contains_key(&function) {
            return Err(ConfigError::DuplicateFunction(function));
        }
        if let Some(&first) = self.by_control.get(&(binding.kind, binding.id)) {
            return Err(ConfigError::DuplicateBinding {
                kind: binding.kind,
                id: binding.id,
                first,
                second: function,
            });
        }

        self.bindings.insert(function, binding);
        self.by_control.insert((binding.kind, binding.id), function);
        Ok(())
    }

    /// Function bound to a physical control
    pub fn lookup(&self, kind: ControlKind, id: u8) -> Option<Function> {
        self.by_control.get(&(kind, id)).copied()
    }

    pub fn binding(&self, function: Function) -> Option<ControlBinding> {
        self.bindings.get(&function).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Function, ControlBinding)> + '_ {
        self.bindings.iter().map(|(f, b)| (*f, *b))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// On-disk format, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents, ConfigFormat::from_path(path))
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self> {
        let config: AppConfig = match format {
            ConfigFormat::Yaml => {
                serde_yaml::from_str(contents).context("Failed to parse YAML config")?
            }
            ConfigFormat::Json => {
                serde_json::from_str(contents).context("Failed to parse JSON config")?
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Resolve the control map
    pub fn control_map(&self) -> Result<ControlMap, ConfigError> {
        ControlMap::resolve(&self.controls)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.device.trim().is_empty() {
            anyhow::bail!("MIDI device cannot be empty");
        }
        if self.midi.channel == 0 || self.midi.channel > 16 {
            anyhow::bail!("Invalid MIDI channel {} (must be 1-16)", self.midi.channel);
        }

        self.control_map().context("Invalid controls")?;

        let behavior = &self.behavior;
        if !behavior.sensitivity.is_finite() || behavior.sensitivity <= 0.0 {
            anyhow::bail!(
                "Invalid sensitivity {} (must be a positive number)",
                behavior.sensitivity
            );
        }
        if behavior.receive_timeout_ms == 0 {
            anyhow::bail!("receive_timeout_ms must be greater than 0");
        }

        let steps = &behavior.night_mode_steps;
        if steps.is_empty() {
            anyhow::bail!("night_mode_steps cannot be empty");
        }
        if let Some(step) = steps.iter().find(|s| !(0..=100).contains(*s)) {
            anyhow::bail!("Night mode step {} is out of range (must be 0-100)", step);
        }
        if steps.windows(2).any(|w| w[0] >= w[1]) {
            anyhow::bail!("night_mode_steps must be strictly ascending: {:?}", steps);
        }

        Ok(())
    }
}

// Default value functions
fn default_channel() -> u8 { 1 }
fn default_true() -> bool { true }
fn default_sensitivity() -> f64 { 1.0 }
fn default_night_mode_steps() -> Vec<i32> { vec![0, 25, 50, 75, 100] }
fn default_receive_timeout_ms() -> u64 { 250 }
