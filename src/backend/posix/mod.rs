//! POSIX backend.
//!
//! Two ways to reach termios, one contract ([`Pty`]):
//! - **native**: `tcgetattr`/`tcsetattr` and `ioctl` through libc
//! - **exec**: the `stty` tool, for hosts where the native calls fail
//!
//! A *system* terminal talks to the process's own tty. A *bridged*
//! terminal owns a fresh pty pair and runs one copy pump per direction
//! between the caller's streams and the master side.

pub mod exec;
pub mod pty;
pub mod stty;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::attributes::{Attributes, Size};
use crate::core::pump::Pump;
use crate::error::Result;

pub use exec::ExecPty;
pub use pty::Pty;

pub struct PosixBackend {
    kind: &'static str,
    pty: Box<dyn Pty>,
    /// Attributes captured at open, put back on close
    original: Option<Attributes>,
    system: bool,
    /// Tells the terminal reader to stop waiting
    closed: Arc<AtomicBool>,
    /// Copy pumps: master to output, then input to master
    pumps: Vec<Pump>,
}

impl PosixBackend {
    fn new(kind: &'static str, pty: Box<dyn Pty>, system: bool, closed: Arc<AtomicBool>, pumps: Vec<Pump>) -> Self {
        let original = match pty.get_attr() {
            Ok(attributes) => Some(attributes),
            Err(e) => {
                debug!("Unable to capture original attributes: {}", e);
                None
            }
        };
        Self {
            kind,
            pty,
            original,
            system,
            closed,
            pumps,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn attributes(&self) -> Result<Attributes> {
        self.pty.get_attr()
    }

    pub fn set_attributes(&self, attributes: &Attributes) -> Result<()> {
        self.pty.set_attr(attributes)
    }

    pub fn size(&self) -> Result<Size> {
        self.pty.get_size()
    }

    pub fn set_size(&self, size: Size) -> Result<()> {
        self.pty.set_size(size)
    }

    /// Only bridged terminals have pumps to pause.
    pub fn can_pause_resume(&self) -> bool {
        !self.pumps.is_empty()
    }

    pub fn pause(&self, wait: bool) {
        for pump in &self.pumps {
            pump.pause(wait);
        }
    }

    pub fn resume(&self) -> Result<()> {
        for pump in &self.pumps {
            pump.resume()?;
        }
        Ok(())
    }

    pub fn paused(&self) -> bool {
        self.pumps.iter().any(Pump::paused)
    }

    /// The master pump polls and can be joined; the input pump may sit
    /// in a read on a foreign stream and is only told to stop.
    pub fn stop(&self) {
        for (i, pump) in self.pumps.iter().enumerate() {
            pump.pause(i == 0);
        }
    }

    pub fn restore(&self) -> Result<()> {
        match &self.original {
            Some(original) => self.pty.set_attr(original),
            None => Ok(()),
        }
    }

    pub fn release(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(unix)]
pub use unix::{open_pty, open_system};

#[cfg(unix)]
mod unix {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{AsFd, AsRawFd, OwnedFd};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Duration;

    use tracing::{debug, warn};

    use super::exec::ExecPty;
    use super::pty::{open_pair, poll_readable, NativePty, Pty, PtyReader};
    use super::PosixBackend;
    use crate::backend::Backend;
    use crate::config::TerminalConfig;
    use crate::core::discipline::shared_writer;
    use crate::core::pump::Pump;
    use crate::core::signals::SignalTable;
    use crate::core::terminal::{load_capabilities, Terminal, TerminalParts};
    use crate::error::Result;

    fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the process's own terminal.
    ///
    /// termios calls are tried first; `stty` is the fallback, or the only
    /// strategy when `prefer_exec_pty` is set.
    pub fn open_system(name: &str, config: &TerminalConfig) -> Result<Terminal> {
        let (kind, pty): (&'static str, Box<dyn Pty>) = match native_system(config) {
            Some(native) => ("posix", Box::new(native)),
            None => {
                let exec = ExecPty::system(config.commands.stty.clone());
                exec.get_attr()?;
                ("posix-exec", Box::new(exec))
            }
        };
        let closed = Arc::new(AtomicBool::new(false));
        let reader = PtyReader::new(io::stdin().as_fd().try_clone_to_owned()?, closed.clone());
        let backend = PosixBackend::new(kind, pty, true, closed, Vec::new());

        let term_type = config.term_type.clone();
        let capabilities = Arc::new(load_capabilities(&term_type, config));
        Ok(Terminal::assemble(
            TerminalParts {
                name: name.to_string(),
                term_type,
                capabilities,
                signals: Arc::new(SignalTable::new()),
                backend: Backend::Posix(backend),
                reader: Box::new(reader),
                writer: shared_writer(io::stdout()),
            },
            config,
        ))
    }

    fn native_system(config: &TerminalConfig) -> Option<NativePty> {
        if config.prefer_exec_pty {
            return None;
        }
        match NativePty::system() {
            Ok(native) => match native.get_attr() {
                Ok(_) => Some(native),
                Err(e) => {
                    debug!("termios unavailable, falling back to stty: {}", e);
                    None
                }
            },
            Err(e) => {
                debug!("No native tty on stdin, falling back to stty: {}", e);
                None
            }
        }
    }

    /// Open a terminal on a new pty pair, bridged to `input`/`output`.
    ///
    /// Bytes from `input` go to the master; whatever the line discipline
    /// sends back to the master goes to `output`. The application reads
    /// and writes the slave through the returned terminal.
    pub fn open_pty<R, W>(
        name: &str,
        term_type: Option<&str>,
        input: R,
        output: W,
        config: &TerminalConfig,
    ) -> Result<Terminal>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (master, slave) = open_pair()?;
        let pty = NativePty::from_fd(&slave)?;
        let closed = Arc::new(AtomicBool::new(false));
        let reader = PtyReader::new(slave.try_clone()?, closed.clone());
        let writer = shared_writer(File::from(slave));

        let master = Arc::new(master);
        let output_pump = master_to_output(master.clone(), output, closed.clone());
        let input_pump = input_to_master(master, input, closed.clone());
        let backend = PosixBackend::new("posix-pty", Box::new(pty), false, closed, vec![output_pump, input_pump]);

        let term_type = term_type.unwrap_or(&config.term_type).to_string();
        let capabilities = Arc::new(load_capabilities(&term_type, config));
        let terminal = Terminal::assemble(
            TerminalParts {
                name: name.to_string(),
                term_type,
                capabilities,
                signals: Arc::new(SignalTable::new()),
                backend: Backend::Posix(backend),
                reader: Box::new(reader),
                writer,
            },
            config,
        );
        if !config.stream.paused {
            terminal.resume()?;
        }
        Ok(terminal)
    }

    fn write_fd(fd: &OwnedFd, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            let rest = &bytes[written..];
            let n = unsafe { libc::write(fd.as_raw_fd(), rest.as_ptr() as *const libc::c_void, rest.len()) };
            if n < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }
            written += n as usize;
        }
        Ok(())
    }

    fn input_to_master<R>(master: Arc<OwnedFd>, input: R, closed: Arc<AtomicBool>) -> Pump
    where
        R: Read + Send + 'static,
    {
        let input = Mutex::new(input);
        Pump::new("polyterm-pty-input", move |ticket| {
            let mut buf = [0u8; 1024];
            while ticket.keep_running() {
                let read = lock(&input).read(&mut buf);
                match read {
                    Ok(0) => {
                        debug!("Pty input reached end of file");
                        closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(n) => {
                        if let Err(e) = write_fd(&master, &buf[..n]) {
                            warn!("Unable to write to pty master: {}", e);
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!("Pty input failed: {}", e);
                        closed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        })
    }

    fn master_to_output<W>(master: Arc<OwnedFd>, output: W, closed: Arc<AtomicBool>) -> Pump
    where
        W: Write + Send + 'static,
    {
        let output = Mutex::new(output);
        Pump::new("polyterm-pty-output", move |ticket| {
            let mut buf = [0u8; 1024];
            while ticket.keep_running() {
                match poll_readable(master.as_raw_fd(), Duration::from_millis(100)) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(e) => {
                        warn!("Polling pty master failed: {}", e);
                        break;
                    }
                }
                let n = unsafe { libc::read(master.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
                if n <= 0 {
                    let e = io::Error::last_os_error();
                    if n < 0 && e.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    // EIO once the slave side is gone
                    debug!("Pty master closed");
                    closed.store(true, Ordering::SeqCst);
                    break;
                }
                let mut out = lock(&output);
                if let Err(e) = out.write_all(&buf[..n as usize]).and_then(|_| out.flush()) {
                    warn!("Unable to write pty output: {}", e);
                    break;
                }
            }
        })
    }
}
