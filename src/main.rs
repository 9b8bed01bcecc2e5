//! polyterm - terminal diagnostics
//!
//! Opens the terminal this process runs in and reports what polyterm
//! sees: type, backend, attributes, size and key capabilities.
//!
//! # Quick Start
//!
//! ```text
//! polyterm                 # Print the terminal report
//! polyterm --raw-test      # Show each byte read in raw mode, q quits
//! polyterm -c my.toml      # Use an explicit config file
//! ```

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use polyterm::core::attributes::caret_notation;
use polyterm::{open_system, Capability, ReadOutcome, Terminal, TerminalConfig};

/// Command line options
#[derive(Default)]
struct Options {
    /// Echo raw input bytes until `q`
    raw_test: bool,
    /// Config file instead of ~/.polyterm/config.toml
    config_path: Option<PathBuf>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capabilities shown in the report
const REPORTED: &[Capability] = &[
    Capability::Columns,
    Capability::Lines,
    Capability::MaxColors,
    Capability::AutoRightMargin,
    Capability::ClearScreen,
    Capability::CursorAddress,
    Capability::KeyUp,
    Capability::KeyBackspace,
    Capability::KeyMouse,
    Capability::User6,
    Capability::User7,
];

fn print_version() {
    eprintln!("polyterm {}", VERSION);
}

fn print_help() {
    eprintln!("polyterm {} - terminal diagnostics", VERSION);
    eprintln!();
    eprintln!("Usage: polyterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -r, --raw-test        Print each byte read in raw mode (q quits)");
    eprintln!("  -c, --config <PATH>   Read configuration from PATH");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.polyterm/config.toml");
    eprintln!("Log file:      ~/.polyterm/polyterm.log (level from RUST_LOG)");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-r" | "--raw-test" => {
                options.raw_test = true;
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing config path".to_string());
                }
                options.config_path = Some(PathBuf::from(&args[i]));
            }
            arg => {
                return Err(format!("Unknown argument: {}", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

fn init_logging() {
    let log_path = TerminalConfig::config_dir()
        .map(|dir| dir.join("polyterm.log"))
        .unwrap_or_else(|| PathBuf::from("polyterm.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Printable form of an escape sequence.
fn escaped(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x1b => "\\E".to_string(),
            _ => caret_notation(b),
        })
        .collect()
}

fn report(terminal: &Terminal) -> anyhow::Result<()> {
    let mut out = terminal.writer();
    writeln!(out, "Name:       {}", terminal.name())?;
    writeln!(out, "Type:       {}", terminal.term_type())?;
    writeln!(out, "Backend:    {}", terminal.kind())?;
    match terminal.size() {
        Ok(size) => writeln!(out, "Size:       {}", size)?,
        Err(e) => writeln!(out, "Size:       unavailable ({})", e)?,
    }
    writeln!(out, "Mouse:      {}", terminal.has_mouse_support())?;
    writeln!(out, "Pausable:   {}", terminal.can_pause_resume())?;
    writeln!(out)?;
    let attributes = terminal.attributes().context("Unable to read terminal attributes")?;
    writeln!(out, "{}", attributes)?;
    writeln!(out)?;
    writeln!(out, "Capabilities:")?;
    for &cap in REPORTED {
        let value = if terminal.bool_capability(cap) {
            Some("true".to_string())
        } else if let Some(n) = terminal.int_capability(cap) {
            Some(n.to_string())
        } else {
            terminal.string_capability(cap).map(|s| escaped(s.as_bytes()))
        };
        writeln!(out, "  {:8} {}", cap.name(), value.as_deref().unwrap_or("-"))?;
    }
    out.flush()?;
    Ok(())
}

fn raw_test(terminal: &Terminal) -> anyhow::Result<()> {
    let saved = terminal.enter_raw_mode().context("Unable to enter raw mode")?;
    info!("Raw input test started");
    let mut out = terminal.writer();
    write!(out, "Press keys to see their bytes, q to quit\r\n")?;
    out.flush()?;

    let result = (|| -> anyhow::Result<()> {
        loop {
            match terminal.read()? {
                ReadOutcome::Byte(b'q') | ReadOutcome::Eof => return Ok(()),
                ReadOutcome::Byte(b) => {
                    write!(out, "{:3}  0x{:02x}  {}\r\n", b, b, caret_notation(b))?;
                    out.flush()?;
                }
                ReadOutcome::Expired => {}
            }
        }
    })();

    terminal
        .set_attributes(&saved)
        .context("Unable to restore terminal attributes")?;
    result
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("polyterm {} starting...", VERSION);

    let config = match &options.config_path {
        Some(path) => TerminalConfig::load_from(path)
            .with_context(|| format!("Unable to load config from {}", path.display()))?,
        None => TerminalConfig::load(),
    };

    let terminal = open_system("polyterm", &config).context("Unable to open the terminal")?;
    let result = if options.raw_test {
        raw_test(&terminal)
    } else {
        report(&terminal)
    };
    if let Err(e) = &result {
        error!("Diagnostics failed: {:#}", e);
    }
    terminal.close().context("Unable to close the terminal")?;
    result
}
