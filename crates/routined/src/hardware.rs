//! Device seams: display, buttons, actuators and icon loading.
//!
//! The console implementations let the daemon run on a workstation. Board
//! drivers implement the same traits.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("display error: {message}")]
    Display { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IconError {
    #[error("icon file not found: {path}")]
    Missing { path: PathBuf },
    #[error("failed to read icon {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Raw icon image handed to the display as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct IconLibrary {
    dir: PathBuf,
}

impl IconLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, name: &str) -> Result<Icon, IconError> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(IconError::Missing { path });
        }
        let bytes = fs::read(&path).map_err(|source| IconError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Icon {
            name: name.to_string(),
            bytes,
        })
    }
}

pub trait Display {
    fn init(&mut self) -> Result<(), HardwareError>;
    fn show(&mut self, icon: &Icon) -> Result<(), HardwareError>;
    fn clear(&mut self) -> Result<(), HardwareError>;
    fn set_backlight(&mut self, percent: u8) -> Result<(), HardwareError>;
    fn shutdown(&mut self) -> Result<(), HardwareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Confirm,
    Cancel,
    Select,
}

/// Debounced button levels. Debouncing is the implementation's job.
pub trait Buttons {
    fn is_pressed(&self, button: Button) -> bool;

    /// Forgets presses made before this call. Level-driven boards have
    /// nothing to forget.
    fn reset(&self) {}
}

/// Motor and buzzer outputs. Calls block for the whole activation, so callers
/// run them on a detached thread.
pub trait Actuator: Send + Sync {
    fn buzz(&self, duration: Duration);
    fn run_for(&self, minutes: u32);
    fn run_interval_cycle(&self, work_minutes: u32, rest_minutes: u32, repeat: u32);
}

/// The device set the main loop drives.
pub struct Devices {
    pub display: Box<dyn Display>,
    pub buttons: Box<dyn Buttons>,
    pub actuator: Arc<dyn Actuator>,
}

impl Devices {
    pub fn console() -> Self {
        Self {
            display: Box::new(ConsoleDisplay::new()),
            buttons: Box::new(ConsoleButtons::spawn()),
            actuator: Arc::new(LoggingActuator),
        }
    }
}

/// Display that logs every draw instead of driving a panel.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    initialized: bool,
    backlight: u8,
    showing: Option<String>,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn showing(&self) -> Option<&str> {
        self.showing.as_deref()
    }

    fn require_init(&self) -> Result<(), HardwareError> {
        if self.initialized {
            Ok(())
        } else {
            Err(HardwareError::Display {
                message: "display used before init".to_string(),
            })
        }
    }
}

impl Display for ConsoleDisplay {
    fn init(&mut self) -> Result<(), HardwareError> {
        self.initialized = true;
        tracing::info!("console display initialized");
        Ok(())
    }

    fn show(&mut self, icon: &Icon) -> Result<(), HardwareError> {
        self.require_init()?;
        tracing::info!(icon = %icon.name, bytes = icon.bytes.len(), "display show");
        self.showing = Some(icon.name.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), HardwareError> {
        self.require_init()?;
        tracing::debug!("display clear");
        self.showing = None;
        Ok(())
    }

    fn set_backlight(&mut self, percent: u8) -> Result<(), HardwareError> {
        self.require_init()?;
        self.backlight = percent.min(100);
        tracing::info!(percent = self.backlight, "display backlight");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        if self.initialized {
            tracing::info!("console display released");
        }
        self.initialized = false;
        self.showing = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Latches {
    confirm: AtomicBool,
    cancel: AtomicBool,
    select: AtomicBool,
}

impl Latches {
    fn latch(&self, button: Button) -> &AtomicBool {
        match button {
            Button::Confirm => &self.confirm,
            Button::Cancel => &self.cancel,
            Button::Select => &self.select,
        }
    }
}

/// Buttons driven by stdin lines: `c` confirm, `x` cancel, `s` select.
///
/// A key press is latched until it is read once.
#[derive(Debug, Clone)]
pub struct ConsoleButtons {
    latches: Arc<Latches>,
}

impl ConsoleButtons {
    /// Starts the stdin reader thread. The thread ends with stdin.
    pub fn spawn() -> Self {
        let latches = Arc::new(Latches::default());
        let reader = Arc::clone(&latches);
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if let Some(button) = parse_button_key(&line) {
                    reader.latch(button).store(true, Ordering::SeqCst);
                }
            }
        });
        Self { latches }
    }
}

impl Buttons for ConsoleButtons {
    fn is_pressed(&self, button: Button) -> bool {
        self.latches.latch(button).swap(false, Ordering::SeqCst)
    }

    fn reset(&self) {
        for button in [Button::Confirm, Button::Cancel, Button::Select] {
            if self.latches.latch(button).swap(false, Ordering::SeqCst) {
                tracing::debug!(button = ?button, "discarded stale button press");
            }
        }
    }
}

fn parse_button_key(line: &str) -> Option<Button> {
    match line.trim() {
        "c" | "confirm" => Some(Button::Confirm),
        "x" | "cancel" => Some(Button::Cancel),
        "s" | "select" => Some(Button::Select),
        _ => None,
    }
}

/// Actuator that logs activations and holds for their duration.
#[derive(Debug, Clone, Default)]
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    fn buzz(&self, duration: Duration) {
        tracing::info!(millis = duration.as_millis() as u64, "buzzer on");
        thread::sleep(duration);
        tracing::info!("buzzer off");
    }

    fn run_for(&self, minutes: u32) {
        tracing::info!(minutes, "motor routine started");
        thread::sleep(Duration::from_secs(u64::from(minutes) * 60));
        tracing::info!(minutes, "motor routine finished");
    }

    fn run_interval_cycle(&self, work_minutes: u32, rest_minutes: u32, repeat: u32) {
        for round in 1..=repeat {
            tracing::info!(round, repeat, work_minutes, "motor work phase");
            thread::sleep(Duration::from_secs(u64::from(work_minutes) * 60));
            tracing::info!(round, repeat, rest_minutes, "motor rest phase");
            thread::sleep(Duration::from_secs(u64::from(rest_minutes) * 60));
        }
        tracing::info!(repeat, "motor interval cycle finished");
    }
}
