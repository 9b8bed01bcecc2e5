//! Configuration for polyterm.
//!
//! Settings are read from `~/.polyterm/config.toml`:
//!
//! ```toml
//! # Terminal type used for capability lookup (defaults to $TERM)
//! term_type = "xterm-256color"
//!
//! # Fail instead of warn when a closed terminal is used
//! strict_closed_checks = false
//!
//! # Register OS-level signal handlers
//! native_signals = true
//!
//! # Use the `stty` based pty even when the native one is available
//! prefer_exec_pty = false
//!
//! [commands]
//! stty = "stty"
//! infocmp = "infocmp"
//!
//! [stream]
//! paused = false
//! columns = 160
//! rows = 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TerminalError};

/// Environment variable that forces strict closed-terminal checks.
pub const STRICT_CLOSED_ENV: &str = "POLYTERM_STRICT_CLOSED";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Terminal type name
    pub term_type: String,
    /// Return errors instead of logging when a closed terminal is used
    pub strict_closed_checks: bool,
    /// Install process-wide signal handlers
    pub native_signals: bool,
    /// Skip the native pty probe
    pub prefer_exec_pty: bool,
    /// External tools
    pub commands: CommandConfig,
    /// Software line discipline settings
    pub stream: StreamConfig,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            term_type: default_term_type(),
            strict_closed_checks: false,
            native_signals: true,
            prefer_exec_pty: false,
            commands: CommandConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

/// External command configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub stty: String,
    pub infocmp: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            stty: "stty".to_string(),
            infocmp: "infocmp".to_string(),
        }
    }
}

/// Stream terminal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Start with the input pump paused
    pub paused: bool,
    pub columns: u16,
    pub rows: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            paused: false,
            columns: 160,
            rows: 50,
        }
    }
}

impl TerminalConfig {
    /// Load configuration from `~/.polyterm/config.toml`.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(TerminalError::Config)
    }

    fn apply_env(&mut self) {
        if std::env::var(STRICT_CLOSED_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            self.strict_closed_checks = true;
        }
    }

    /// Directory holding the config and log files.
    pub fn config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".polyterm"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }
}

fn default_term_type() -> String {
    match std::env::var("TERM") {
        Ok(term) if !term.is_empty() => term,
        _ => "ansi".to_string(),
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
