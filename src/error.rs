//! Error types shared by the core and every backend.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Terminal has been closed")]
    Closed,

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("Unable to apply terminal flags: {}", flags.join(" "))]
    PartialApply { flags: Vec<String> },

    #[error("Command `{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[source] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TerminalError>;

impl TerminalError {
    /// Whether this error came from a terminal that was already closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, TerminalError::Closed)
    }
}
