//! Control signals from the shell to the worker
//!
//! Ctrl+C, the console and the config watcher all hold a [`ShellHandle`];
//! the worker polls its [`ShellSignal`] between receives.

use crossbeam::channel::{self, Receiver, Sender};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    /// Shut down
    Stop,
    /// Tear down and rebuild from the current config
    Reconfigure,
}

/// Sending half, cheap to clone
#[derive(Debug, Clone)]
pub struct ShellHandle {
    tx: Sender<ShellCommand>,
}

impl ShellHandle {
    /// Returns false once the worker side is gone
    pub fn send(&self, command: ShellCommand) -> bool {
        debug!("Shell command: {:?}", command);
        self.tx.send(command).is_ok()
    }

    pub fn stop(&self) -> bool {
        self.send(ShellCommand::Stop)
    }

    pub fn reconfigure(&self) -> bool {
        self.send(ShellCommand::Reconfigure)
    }
}

/// Receiving half polled by the worker
#[derive(Debug, Clone)]
pub struct ShellSignal {
    rx: Receiver<ShellCommand>,
}

impl ShellSignal {
    /// Non-blocking check. Drains everything queued; `Stop` wins over
    /// `Reconfigure`.
    pub fn poll(&self) -> Option<ShellCommand> {
        let mut pending = None;
        for command in self.rx.try_iter() {
            if command == ShellCommand::Stop {
                return Some(ShellCommand::Stop);
            }
            pending = Some(command);
        }
        pending
    }
}

pub fn shell_channel() -> (ShellHandle, ShellSignal) {
    let (tx, rx) = channel::unbounded();
    (ShellHandle { tx }, ShellSignal { rx })
}

/// Interactive console on its own thread
///
/// Commands: `reload`, `quit`/`exit`, `help`. EOF and Ctrl+C in the prompt stop
/// the gateway.
pub fn spawn_console(handle: ShellHandle) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            if let Err(e) = run_console(&handle) {
                warn!("Console error: {}", e);
            }
        })
}

fn run_console(handle: &ShellHandle) -> rustyline::Result<()> {
    let mut rl = DefaultEditor::new()?;
    print_help();

    loop {
        match rl.readline("monitor-gw> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    "quit" | "exit" => {
                        handle.stop();
                        break;
                    }
                    "reload" => {
                        info!("Reload requested from console");
                        if !handle.reconfigure() {
                            break;
                        }
                    }
                    "help" => print_help(),
                    other => println!("Unknown command: {} (type 'help')", other),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                handle.stop();
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  reload      Reload the config and reconnect");
    println!("  quit, exit  Stop the gateway");
    println!("  help        Show this help");
}
