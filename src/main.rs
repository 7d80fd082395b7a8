//! Monitor GW - Rust implementation
//!
//! Control monitor brightness, night mode, local dimming and HDR from a MIDI
//! control surface.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use monitor_gw::config::{AppConfig, ConfigWatcher};
use monitor_gw::detect;
use monitor_gw::display::{self, DisplayDriver, FeatureCodes};
use monitor_gw::mapper::ControlMapper;
use monitor_gw::paths::AppPaths;
use monitor_gw::session::{Session, SessionExit};
use monitor_gw::shell::{self, ShellSignal};
use monitor_gw::surface::{port, Feedback};

/// Monitor GW - Drive monitor settings from a MIDI control surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the app data location)
    #[arg(short, long, env = "MONITOR_GW_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// MIDI device name pattern, overriding the config
    #[arg(short, long, env = "MIDI_DEVICE")]
    device: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// List displays and their current settings
    #[arg(long)]
    list_displays: bool,

    /// Detect controls interactively and print a `controls:` block
    #[arg(long)]
    detect: bool,

    /// Seconds to wait for each control during --detect
    #[arg(long, default_value = "10")]
    detect_timeout: u64,

    /// Use the simulated display instead of DDC/CI
    #[arg(long)]
    simulate: bool,

    /// Start the interactive console
    #[arg(long)]
    console: bool,

    /// Do not reload when the config file changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect();
    paths.ensure_directories()?;
    let _log_guard = init_logging(&args.log_level, &paths.logs_dir)?;

    info!("Starting Monitor GW v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        port::discovery::print_ports()?;
        return Ok(());
    }

    if args.list_displays {
        list_displays(args.simulate)?;
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    info!("Configuration file: {}", config_path.display());

    if args.detect {
        let device = match &args.device {
            Some(device) => device.clone(),
            None => AppConfig::load(&config_path).await?.midi.device,
        };
        run_detect(&device, &config_path, Duration::from_secs(args.detect_timeout))?;
        return Ok(());
    }

    let mut config = AppConfig::load(&config_path).await?;
    if let Some(device) = &args.device {
        config.midi.device = device.clone();
    }
    info!("Configuration loaded successfully");

    let (handle, signal) = shell::shell_channel();

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                ctrl_c.stop();
            }
            Err(e) => error!("Failed to install CTRL+C signal handler: {}", e),
        }
    });

    let _watcher = if args.no_watch {
        None
    } else {
        match ConfigWatcher::new(&config_path, handle.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Config hot-reload disabled: {:#}", e);
                None
            }
        }
    };

    if args.console {
        shell::spawn_console(handle.clone()).context("Failed to start console")?;
    }

    run_app(config, &config_path, &args, signal).await?;

    info!("Monitor GW shutdown complete");
    Ok(())
}

/// Run sessions until stopped, rebuilding on reconfigure
async fn run_app(
    mut config: AppConfig,
    config_path: &Path,
    args: &Args,
    signal: ShellSignal,
) -> Result<()> {
    loop {
        let session_config = config.clone();
        let session_signal = signal.clone();
        let simulate = args.simulate;

        let exit = tokio::task::spawn_blocking(move || {
            run_session(session_config, simulate, session_signal)
        })
        .await
        .context("Worker thread panicked")??;

        match exit {
            SessionExit::Stopped => return Ok(()),
            SessionExit::Reconfigure => {
                info!("📝 Reloading configuration...");
                match AppConfig::load(config_path).await {
                    Ok(mut new_config) => {
                        if let Some(device) = &args.device {
                            new_config.midi.device = device.clone();
                        }
                        config = new_config;
                        info!("✅ Configuration reloaded");
                    }
                    Err(e) => {
                        warn!("⚠️  Failed to reload config (keeping old config): {:#}", e);
                    }
                }
            }
        }
    }
}

/// Build collaborators and run one session on the worker thread
fn run_session(config: AppConfig, simulate: bool, signal: ShellSignal) -> Result<SessionExit> {
    let controls = config.control_map()?;
    info!("{} control(s) mapped", controls.len());

    let (input, output) = port::connect(&config.midi.device)
        .context("Failed to connect to control surface")?;

    let bus = display::open_bus(simulate).context("Failed to open display bus")?;
    let mut display = DisplayDriver::new(
        bus,
        config.display.index,
        config.display.features,
    );
    display.connect().context("Failed to connect to display")?;

    let feedback = Feedback::new(Box::new(output), config.midi.channel);
    let mapper = ControlMapper::new(feedback, display, controls, config.behavior.clone());
    let mut session = Session::new(Box::new(input), mapper, signal, &config.behavior);

    Ok(session.run()?)
}

fn list_displays(simulate: bool) -> Result<()> {
    let codes = FeatureCodes::default();
    let bus = display::open_bus(simulate).context("Failed to open display bus")?;
    let displays = DisplayDriver::new(bus, 0, codes)
        .list()
        .context("Failed to enumerate displays")?;

    println!("\n{}", "=== Displays ===".bold().cyan());
    if displays.is_empty() {
        println!("  {}", "(none)".dimmed());
    }

    for info in displays {
        println!("  {}", info.label().green());

        let mut driver = DisplayDriver::new(display::open_bus(simulate)?, info.index, codes);
        if let Err(e) = driver.connect() {
            println!("    {}", e.to_string().red());
            continue;
        }

        let state = driver.snapshot();
        let show = |v: Option<u16>| v.map_or_else(|| "?".dimmed().to_string(), |v| v.to_string());
        println!("    Brightness:    {}", show(state.brightness));
        println!(
            "    RGB gain:      {} / {} / {}",
            show(state.red_gain),
            show(state.green_gain),
            show(state.blue_gain)
        );
        println!("    Sharpness:     {}", show(state.sharpness));
        println!(
            "    Local dimming: {}",
            state
                .local_dimming
                .map_or_else(|| "?".dimmed().to_string(), |on| on_off(on).to_string())
        );
    }
    println!();
    Ok(())
}

fn run_detect(device: &str, config_path: &Path, timeout: Duration) -> Result<()> {
    let mut input = port::MidirInput::connect(device)
        .with_context(|| format!("Failed to open MIDI input '{}'", device))?;

    println!("\n{}", "=== Control Detection ===".bold().cyan());
    println!("Listening on {}", input.port_name().green());

    let controls = detect::run_wizard(&mut input, timeout)?;
    if controls.is_empty() {
        println!("\n{}", "No controls detected".yellow());
        return Ok(());
    }

    println!(
        "\n{} Paste this into {}:\n",
        "✅".green(),
        config_path.display()
    );
    print!("{}", detect::controls_yaml(&controls)?);
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}

fn init_logging(level: &str, logs_dir: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(logs_dir, "monitor-gw.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}
