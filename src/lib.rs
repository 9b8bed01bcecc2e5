//! polyterm - one terminal interface over POSIX ptys, the Windows
//! console and plain byte streams
//!
//! A [`Terminal`] offers the same surface whatever it runs on:
//! termios-style attributes with raw and cooked modes, signal handlers,
//! timed and peeking reads, and output driven by terminal capabilities.
//!
//! # Backends
//!
//! - **posix**: the process's own terminal through termios (or `stty`
//!   when termios is unavailable), or a fresh pty bridged to streams
//! - **windows**: the Windows console, with key and mouse records
//!   translated to escape sequences
//! - **stream**: any `Read`/`Write` pair, with the line discipline
//!   implemented in software
//!
//! # Quick Start
//!
//! ```no_run
//! use polyterm::{open_system, TerminalConfig};
//!
//! let terminal = open_system("main", &TerminalConfig::load())?;
//! let saved = terminal.enter_raw_mode()?;
//! let outcome = terminal.read()?;
//! terminal.set_attributes(&saved)?;
//! # let _ = outcome;
//! # Ok::<(), polyterm::TerminalError>(())
//! ```

pub mod backend;
pub mod config;
pub mod core;
pub mod error;

pub use crate::backend::stream::open_stream;
pub use crate::config::TerminalConfig;
pub use crate::core::attributes::{
    Attributes, ControlChar, ControlFlags, InputFlags, LocalFlags, OutputFlags, Size,
};
pub use crate::core::capabilities::{Capability, CapabilityStore};
pub use crate::core::nonblocking::ReadOutcome;
pub use crate::core::query::{Cursor, MouseButton, MouseEvent, MouseEventType, MouseModifiers, MouseTracking};
pub use crate::core::signals::{Signal, SignalHandler};
pub use crate::core::terminal::Terminal;
pub use crate::core::tparm::Param;
pub use crate::error::{Result, TerminalError};

#[cfg(unix)]
pub use crate::backend::posix::open_pty;

/// Open the terminal this process is attached to.
#[cfg(unix)]
pub fn open_system(name: &str, config: &TerminalConfig) -> Result<Terminal> {
    backend::posix::open_system(name, config)
}

/// Open the console this process is attached to.
#[cfg(windows)]
pub fn open_system(name: &str, config: &TerminalConfig) -> Result<Terminal> {
    backend::windows::open_windows(name, config)
}

#[cfg(not(any(unix, windows)))]
pub fn open_system(_name: &str, _config: &TerminalConfig) -> Result<Terminal> {
    Err(TerminalError::Unsupported("system terminal on this platform"))
}
