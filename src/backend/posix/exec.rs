//! Pty driven by the external `stty` tool.
//!
//! Used where termios calls are not available to us. Each get spawns
//! `stty -a`; each set spawns `stty` with the minimal argument diff.

use std::process::{Command, Stdio};

use tracing::{debug, warn};

use super::pty::Pty;
use super::stty::{flags_to_set, parse_attributes, parse_size};
use crate::core::attributes::{Attributes, Size};
use crate::error::{Result, TerminalError};

/// GNU stty reports this when only some of the changes took effect.
const PARTIAL_FAILURE: &str = "unable to perform all requested operations";

/// Runs an external command and returns its standard output.
pub trait CommandRunner: Send + Sync {
    /// `inherit_stdin` connects the child to our own terminal.
    fn run(&self, program: &str, args: &[String], inherit_stdin: bool) -> Result<String>;
}

pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], inherit_stdin: bool) -> Result<String> {
        let output = Command::new(program)
            .args(args)
            .stdin(if inherit_stdin { Stdio::inherit() } else { Stdio::null() })
            .output()?;
        if !output.status.success() {
            return Err(TerminalError::Command {
                command: format!("{} {}", program, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Option selecting the device operand of stty.
fn device_option() -> &'static str {
    if cfg!(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )) {
        "-f"
    } else {
        "-F"
    }
}

pub struct ExecPty {
    stty: String,
    /// `None` addresses the controlling terminal through stdin
    device: Option<String>,
    runner: Box<dyn CommandRunner>,
}

impl ExecPty {
    pub fn new(stty: impl Into<String>, device: Option<String>, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            stty: stty.into(),
            device,
            runner,
        }
    }

    /// Pty for the process's own terminal.
    pub fn system(stty: impl Into<String>) -> Self {
        Self::new(stty, None, Box::new(ProcessRunner))
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    fn stty(&self, mut args: Vec<String>) -> Result<String> {
        if let Some(device) = &self.device {
            args.insert(0, device.clone());
            args.insert(0, device_option().to_string());
        }
        debug!("Running {} {}", self.stty, args.join(" "));
        self.runner.run(&self.stty, &args, self.device.is_none())
    }

    fn config(&self) -> Result<String> {
        self.stty(vec!["-a".to_string()])
    }
}

impl Pty for ExecPty {
    fn get_attr(&self) -> Result<Attributes> {
        Ok(parse_attributes(&self.config()?))
    }

    fn set_attr(&self, attributes: &Attributes) -> Result<()> {
        let args = flags_to_set(attributes, &self.get_attr()?);
        if args.is_empty() {
            return Ok(());
        }
        match self.stty(args) {
            Ok(_) => Ok(()),
            Err(TerminalError::Command { stderr, .. }) if stderr.contains(PARTIAL_FAILURE) => {
                let remaining = flags_to_set(attributes, &self.get_attr()?);
                if remaining.is_empty() {
                    return Ok(());
                }
                warn!("stty left flags unapplied: {}", remaining.join(" "));
                Err(TerminalError::PartialApply { flags: remaining })
            }
            Err(e) => Err(e),
        }
    }

    fn get_size(&self) -> Result<Size> {
        Ok(parse_size(&self.config()?))
    }

    fn set_size(&self, size: Size) -> Result<()> {
        self.stty(vec![
            "columns".to_string(),
            size.columns.to_string(),
            "rows".to_string(),
            size.rows.to_string(),
        ])?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::attributes::{ControlChar, LocalFlags};
    use std::sync::{Arc, Mutex};

    const CONFIG: &str = "speed 38400 baud; rows 24; columns 80; line = 0;\n\
        intr = ^C; quit = ^\\; erase = ^?; kill = ^U; eof = ^D; min = 1; time = 0;\n\
        -ignbrk brkint icrnl ixon\nopost onlcr\ncs8 cread\n\
        isig icanon iexten echo echoe echok echoctl echoke\n";

    /// Serves `stty -a` from canned output and records every call.
    #[derive(Clone)]
    pub(crate) struct FakeStty {
        pub calls: Arc<Mutex<Vec<Vec<String>>>>,
        pub config: Arc<Mutex<String>>,
        pub fail_with: Arc<Mutex<Option<String>>>,
    }

    impl FakeStty {
        pub fn new(config: &str) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                config: Arc::new(Mutex::new(config.to_string())),
                fail_with: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl CommandRunner for FakeStty {
        fn run(&self, program: &str, args: &[String], _inherit_stdin: bool) -> Result<String> {
            self.calls.lock().unwrap().push(args.to_vec());
            if args.last().map(String::as_str) == Some("-a") {
                return Ok(self.config.lock().unwrap().clone());
            }
            if let Some(stderr) = self.fail_with.lock().unwrap().clone() {
                return Err(TerminalError::Command {
                    command: program.to_string(),
                    status: "exit status: 1".to_string(),
                    stderr,
                });
            }
            Ok(String::new())
        }
    }

    #[test]
    fn test_get_attr_and_size() {
        let fake = FakeStty::new(CONFIG);
        let pty = ExecPty::new("stty", None, Box::new(fake.clone()));
        let attrs = pty.get_attr().unwrap();
        assert!(attrs.local(LocalFlags::ICANON));
        assert_eq!(attrs.control_char(ControlChar::Intr), Some(3));
        assert_eq!(pty.get_size().unwrap(), Size::new(80, 24));
        assert_eq!(fake.calls.lock().unwrap()[0], vec!["-a".to_string()]);
    }

    #[test]
    fn test_device_option_precedes_arguments() {
        let fake = FakeStty::new(CONFIG);
        let pty = ExecPty::new("stty", Some("/dev/pts/7".to_string()), Box::new(fake.clone()));
        pty.set_size(Size::new(100, 30)).unwrap();
        let calls = fake.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![device_option(), "/dev/pts/7", "columns", "100", "rows", "30"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_set_attr_sends_only_changes() {
        let fake = FakeStty::new(CONFIG);
        let pty = ExecPty::new("stty", None, Box::new(fake.clone()));
        let mut attrs = pty.get_attr().unwrap();
        attrs.lflag.remove(LocalFlags::ECHO);
        pty.set_attr(&attrs).unwrap();
        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.last().unwrap(), &vec!["-echo".to_string()]);
    }

    #[test]
    fn test_set_attr_without_changes_runs_nothing() {
        let fake = FakeStty::new(CONFIG);
        let pty = ExecPty::new("stty", None, Box::new(fake.clone()));
        let attrs = pty.get_attr().unwrap();
        pty.set_attr(&attrs).unwrap();
        assert_eq!(fake.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_partial_failure_reports_remaining_flags() {
        let fake = FakeStty::new(CONFIG);
        *fake.fail_with.lock().unwrap() = Some(format!("stty: 'standard input': {}", PARTIAL_FAILURE));
        let pty = ExecPty::new("stty", None, Box::new(fake.clone()));
        let mut attrs = pty.get_attr().unwrap();
        attrs.lflag.remove(LocalFlags::ECHO | LocalFlags::ICANON);
        match pty.set_attr(&attrs) {
            Err(TerminalError::PartialApply { flags }) => assert_eq!(flags, vec!["-echo", "-icanon"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_other_failures_propagate() {
        let fake = FakeStty::new(CONFIG);
        *fake.fail_with.lock().unwrap() = Some("stty: invalid argument".to_string());
        let pty = ExecPty::new("stty", None, Box::new(fake));
        let mut attrs = pty.get_attr().unwrap();
        attrs.lflag.remove(LocalFlags::ECHO);
        assert!(matches!(pty.set_attr(&attrs), Err(TerminalError::Command { .. })));
    }
}
