//! Application path management for portable and installed modes.
//!
//! - **Dev mode** (debug builds): `config.yaml` in the current directory wins.
//! - **Portable mode**: a `.portable` marker next to the executable keeps the
//!   config and logs in that directory.
//! - **Installed mode** (default): data lives in the platform data directory
//!   (`%APPDATA%\Monitor GW`, `~/.local/share/Monitor GW`, ...).

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Application name used for directories in installed mode
const APP_NAME: &str = "Monitor GW";
const CONFIG_FILE: &str = "config.yaml";
const EXAMPLE_CONFIG_FILE: &str = "config.example.yaml";

/// Application paths for config and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether everything lives in one self-contained directory
    pub is_portable: bool,
}

impl AppPaths {
    /// Config and logs side by side in `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            logs_dir: dir.join("logs"),
            is_portable: true,
        }
    }

    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = exe_dir();

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(CONFIG_FILE).exists() {
                eprintln!("[paths] Running in DEV mode (config.yaml in {})", cwd.display());
                return Self::in_dir(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::in_dir(&exe_dir);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no data directory, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode (data dir: {})", app_data.display());

        Self {
            config: app_data.join(CONFIG_FILE),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Directory holding the config file
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure all required directories exist.
    ///
    /// In installed mode, also seeds the config from `config.example.yaml`
    /// when none exists yet.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir).with_context(|| {
                format!("Failed to create logs directory: {}", self.logs_dir.display())
            })?;
        }

        if !self.is_portable {
            let base = self.base_dir();
            if !base.exists() {
                debug!("Creating config directory: {}", base.display());
                std::fs::create_dir_all(&base)?;
            }

            if !self.config.exists() {
                self.copy_example_config()?;
            }
        }

        Ok(())
    }

    fn copy_example_config(&self) -> anyhow::Result<()> {
        let candidates = [
            exe_dir().join(CONFIG_FILE),
            exe_dir().join(EXAMPLE_CONFIG_FILE),
            PathBuf::from(EXAMPLE_CONFIG_FILE),
        ];

        let Some(source) = candidates.iter().find(|p| p.exists()) else {
            info!("No config found, please create {}", self.config.display());
            return Ok(());
        };

        info!("Copying {} to {}", source.display(), self.config.display());
        std::fs::copy(source, &self.config).with_context(|| {
            format!(
                "Failed to copy config from {} to {}",
                source.display(),
                self.config.display()
            )
        })?;
        Ok(())
    }
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}
