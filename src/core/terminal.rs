//! The terminal object shared by every backend.
//!
//! A [`Terminal`] owns the capability store, the signal table, mouse and
//! focus state, and one [`Backend`]. Everything backend-specific (how
//! attributes are applied, where bytes come from) is delegated; raw mode,
//! echo toggling, capability output, query helpers and the close
//! lifecycle live here once.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::attributes::{Attributes, LocalFlags, Size};
use super::capabilities::{resolve, BuiltinSource, Capability, CapabilityStore, InfocmpSource};
use super::discipline::SharedWriter;
use super::native_signals::{self, SignalToken};
use super::nonblocking::{NonBlockingReader, ReadOutcome};
use super::query::{read_cursor_reply, read_mouse_report, Cursor, CursorReply, MouseEvent, MouseTracking};
use super::signals::{Signal, SignalCallback, SignalHandler, SignalTable};
use super::tparm::{tparm, Param};
use crate::backend::Backend;
use crate::config::TerminalConfig;
use crate::error::{Result, TerminalError};

/// Resolve capabilities for `term_type`: built-in descriptions first,
/// then the system `infocmp`.
pub fn load_capabilities(term_type: &str, config: &TerminalConfig) -> CapabilityStore {
    let infocmp = InfocmpSource::new(config.commands.infocmp.clone());
    resolve(term_type, &[&BuiltinSource, &infocmp])
}

/// Pieces a backend hands over when a terminal is assembled.
pub struct TerminalParts {
    pub name: String,
    pub term_type: String,
    pub capabilities: Arc<CapabilityStore>,
    pub signals: Arc<SignalTable>,
    pub backend: Backend,
    pub reader: Box<dyn NonBlockingReader>,
    pub writer: SharedWriter,
}

#[derive(Default)]
struct MouseState {
    tracking: MouseTracking,
    last: MouseEvent,
}

pub struct Terminal {
    name: String,
    term_type: String,
    capabilities: Arc<CapabilityStore>,
    signals: Arc<SignalTable>,
    native: Mutex<HashMap<Signal, SignalToken>>,
    native_signals: bool,
    backend: Backend,
    reader: Mutex<Box<dyn NonBlockingReader>>,
    writer: SharedWriter,
    closed: AtomicBool,
    strict: bool,
    mouse: Mutex<MouseState>,
    focus: AtomicBool,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Terminal {
    /// Build the terminal around an opened backend.
    pub fn assemble(parts: TerminalParts, config: &TerminalConfig) -> Self {
        let native_signals = config.native_signals && parts.backend.is_system();
        let terminal = Self {
            name: parts.name,
            term_type: parts.term_type,
            capabilities: parts.capabilities,
            signals: parts.signals,
            native: Mutex::new(HashMap::new()),
            native_signals,
            backend: parts.backend,
            reader: Mutex::new(parts.reader),
            writer: parts.writer,
            closed: AtomicBool::new(false),
            strict: config.strict_closed_checks,
            mouse: Mutex::new(MouseState::default()),
            focus: AtomicBool::new(false),
        };
        if native_signals {
            for signal in Signal::ALL {
                terminal.register_native(signal, &SignalHandler::Default);
            }
        }
        info!(
            "Opened {} terminal '{}' (type {})",
            terminal.backend.kind(),
            terminal.name,
            terminal.term_type
        );
        terminal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Terminal type used for capability lookup.
    pub fn term_type(&self) -> &str {
        &self.term_type
    }

    /// Backend variant name.
    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closed-terminal policy: warn and carry on, or fail in strict mode.
    fn check_closed(&self, operation: &str) -> Result<()> {
        if !self.is_closed() {
            return Ok(());
        }
        if self.strict {
            return Err(TerminalError::Closed);
        }
        warn!("Accessing terminal '{}' after close ({})", self.name, operation);
        Ok(())
    }

    // Input

    /// Read one byte, blocking until data or end of input.
    pub fn read(&self) -> Result<ReadOutcome> {
        self.read_timeout(None, false)
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&self, timeout: Option<Duration>) -> Result<ReadOutcome> {
        self.read_timeout(timeout, true)
    }

    /// Read or peek one byte. `None` waits forever; zero polls.
    pub fn read_timeout(&self, timeout: Option<Duration>, peek: bool) -> Result<ReadOutcome> {
        if self.is_closed() {
            self.check_closed("read")?;
            return Ok(ReadOutcome::Eof);
        }
        let mut reader = lock(&self.reader);
        Ok(reader.read(timeout, peek)?)
    }

    /// Push bytes through the software line discipline as if they had
    /// arrived on the input. Only stream and console terminals have one.
    pub fn process_input(&self, bytes: &[u8]) -> Result<()> {
        self.check_closed("process_input")?;
        self.backend.process_input(bytes)
    }

    /// `io::Read` view of the input.
    pub fn reader(&self) -> TerminalReader<'_> {
        TerminalReader { terminal: self }
    }

    // Output

    /// `io::Write` view of the output.
    pub fn writer(&self) -> TerminalWriter<'_> {
        TerminalWriter { terminal: self }
    }

    fn write_all(&self, bytes: &[u8]) -> Result<()> {
        self.check_closed("write")?;
        let mut out = lock(&self.writer);
        out.write_all(bytes)?;
        out.flush()?;
        Ok(())
    }

    // Attributes

    pub fn attributes(&self) -> Result<Attributes> {
        self.check_closed("attributes")?;
        self.backend.attributes()
    }

    pub fn set_attributes(&self, attributes: &Attributes) -> Result<()> {
        self.check_closed("set_attributes")?;
        self.backend.set_attributes(attributes)
    }

    /// Switch to raw mode and return the previous attributes for restoring.
    pub fn enter_raw_mode(&self) -> Result<Attributes> {
        let previous = self.attributes()?;
        let mut raw = previous.clone();
        raw.make_raw();
        self.set_attributes(&raw)?;
        Ok(previous)
    }

    pub fn echo(&self) -> Result<bool> {
        Ok(self.attributes()?.local(LocalFlags::ECHO))
    }

    /// Toggle ECHO only. Returns the previous state.
    pub fn set_echo(&self, echo: bool) -> Result<bool> {
        let mut attributes = self.attributes()?;
        let previous = attributes.local(LocalFlags::ECHO);
        if previous != echo {
            attributes.lflag.set(LocalFlags::ECHO, echo);
            self.set_attributes(&attributes)?;
        }
        Ok(previous)
    }

    pub fn size(&self) -> Result<Size> {
        self.check_closed("size")?;
        self.backend.size()
    }

    pub fn set_size(&self, size: Size) -> Result<()> {
        self.check_closed("set_size")?;
        self.backend.set_size(size)
    }

    // Signals

    /// Install a handler, returning the previous one.
    ///
    /// With native signals on, a `Default` handler hands the OS signal back
    /// to the OS default action. A native WINCH then never reaches the
    /// hook from [`Terminal::set_winch_hook`]; only a WINCH raised in
    /// software (a stream resize, a console resize record, [`Terminal::raise`])
    /// does. Install a callback to observe native resizes.
    pub fn handle(&self, signal: Signal, handler: SignalHandler) -> SignalHandler {
        let previous = self.signals.handle(signal, handler.clone());
        if self.native_signals && !self.is_closed() {
            self.register_native(signal, &handler);
        }
        previous
    }

    /// Deliver a signal on the calling thread.
    pub fn raise(&self, signal: Signal) {
        self.signals.raise(signal);
    }

    /// Reaction of the default WINCH handler.
    pub fn set_winch_hook(&self, hook: Option<SignalCallback>) {
        self.signals.set_default_winch(hook);
    }

    fn register_native(&self, signal: Signal, handler: &SignalHandler) {
        let token = if handler.is_default() {
            native_signals::register_default(signal)
        } else {
            let table = Arc::downgrade(&self.signals);
            native_signals::register(
                signal,
                Arc::new(move |s| {
                    if let Some(table) = table.upgrade() {
                        table.raise(s);
                    }
                }),
            )
        };
        let mut native = lock(&self.native);
        let old = match token {
            Some(token) => native.insert(signal, token),
            None => native.remove(&signal),
        };
        if let Some(old) = old {
            native_signals::unregister(old);
        }
    }

    // Capabilities

    pub fn capabilities(&self) -> &CapabilityStore {
        &self.capabilities
    }

    pub fn bool_capability(&self, cap: Capability) -> bool {
        self.capabilities.get_bool(cap)
    }

    pub fn int_capability(&self, cap: Capability) -> Option<i32> {
        self.capabilities.get_int(cap)
    }

    pub fn string_capability(&self, cap: Capability) -> Option<&str> {
        self.capabilities.get_string(cap)
    }

    /// Write an expanded capability. Returns false when the terminal
    /// lacks it.
    pub fn puts(&self, cap: Capability, params: &[Param]) -> Result<bool> {
        match self.capabilities.render(cap, params) {
            Some(bytes) => {
                self.write_all(&bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // Queries

    /// Ask the terminal for the cursor position.
    ///
    /// Input read while waiting that is not part of the reply goes to
    /// `discard`. Returns `None` without `u6`/`u7` or when input ends.
    pub fn cursor_position(&self, discard: Option<&mut dyn FnMut(u8)>) -> Result<Option<Cursor>> {
        if let Some(cursor) = self.backend.cursor_position()? {
            return Ok(Some(cursor));
        }
        let (Some(u6), Some(u7)) = (
            self.capabilities.get_string(Capability::User6),
            self.capabilities.get_string(Capability::User7),
        ) else {
            return Ok(None);
        };
        let Some(reply) = CursorReply::from_template(u6) else {
            debug!("Unusable cursor reply template {:?}", u6);
            return Ok(None);
        };
        self.write_all(&tparm(u7, &[]))?;
        read_cursor_reply(&reply, || Ok(self.read()?.byte()), discard)
    }

    pub fn has_mouse_support(&self) -> bool {
        self.backend.has_mouse_support()
            || self.capabilities.get_string(Capability::KeyMouse).is_some()
    }

    /// Change mouse tracking. Returns false when unsupported.
    pub fn track_mouse(&self, tracking: MouseTracking) -> Result<bool> {
        if !self.has_mouse_support() {
            return Ok(false);
        }
        self.check_closed("track_mouse")?;
        if !self.backend.track_mouse(tracking)? {
            self.write_all(tracking.control_sequence())?;
        }
        lock(&self.mouse).tracking = tracking;
        Ok(true)
    }

    pub fn mouse_tracking(&self) -> MouseTracking {
        lock(&self.mouse).tracking
    }

    /// Decode the report following a mouse prefix already consumed
    /// from the input.
    pub fn read_mouse_event(&self) -> Result<Option<MouseEvent>> {
        let last = lock(&self.mouse).last;
        let event = read_mouse_report(|| Ok(self.read()?.byte()), &last)?;
        if let Some(event) = event {
            lock(&self.mouse).last = event;
        }
        Ok(event)
    }

    /// Enable or disable focus in/out reports. Returns false when
    /// unsupported.
    pub fn track_focus(&self, enabled: bool) -> Result<bool> {
        self.check_closed("track_focus")?;
        if self.backend.track_focus(enabled) {
            self.focus.store(enabled, Ordering::SeqCst);
            return Ok(true);
        }
        if !self.term_type.starts_with("xterm") {
            return Ok(false);
        }
        self.write_all(if enabled { b"\x1b[?1004h" } else { b"\x1b[?1004l" })?;
        self.focus.store(enabled, Ordering::SeqCst);
        Ok(true)
    }

    pub fn focus_tracking(&self) -> bool {
        self.focus.load(Ordering::SeqCst)
    }

    // Pump control

    pub fn can_pause_resume(&self) -> bool {
        self.backend.can_pause_resume()
    }

    /// Stop the input pump without waiting for it.
    pub fn pause(&self) {
        self.backend.pause(false);
    }

    /// Stop the input pump and wait until its thread has exited.
    pub fn pause_and_wait(&self) {
        self.backend.pause(true);
    }

    pub fn resume(&self) -> Result<()> {
        self.check_closed("resume")?;
        self.backend.resume()
    }

    pub fn paused(&self) -> bool {
        self.backend.paused()
    }

    // Lifecycle

    /// Close the terminal. Safe to call repeatedly and from any thread;
    /// only the first call does any work.
    ///
    /// Pumps are stopped and joined, then the original attributes are
    /// restored, then OS resources are released.
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        debug!("Closing terminal '{}'", self.name);

        let tokens: Vec<SignalToken> = lock(&self.native).drain().map(|(_, t)| t).collect();
        for token in tokens {
            native_signals::unregister(token);
        }

        self.backend.stop();
        let restored = self.backend.restore();
        let released = self.backend.release();
        restored.and(released)
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing terminal '{}': {}", self.name, e);
        }
    }
}

/// Blocking `io::Read` adapter: waits for the first byte, then returns
/// whatever else is already available.
pub struct TerminalReader<'a> {
    terminal: &'a Terminal,
}

impl Read for TerminalReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut n = 0;
        let mut timeout = None;
        while n < buf.len() {
            match self.terminal.read_timeout(timeout, false).map_err(io::Error::other)? {
                ReadOutcome::Byte(b) => {
                    buf[n] = b;
                    n += 1;
                    timeout = Some(Duration::ZERO);
                }
                ReadOutcome::Expired | ReadOutcome::Eof => break,
            }
        }
        Ok(n)
    }
}

pub struct TerminalWriter<'a> {
    terminal: &'a Terminal,
}

impl Write for TerminalWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.terminal.check_closed("write").map_err(io::Error::other)?;
        lock(&self.terminal.writer).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.terminal.writer).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stream::open_stream;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread::{self, ThreadId};

    struct CountingFlush {
        flushes: Arc<AtomicUsize>,
    }

    impl Write for CountingFlush {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        // release() flushes the output exactly once per close
        fn flush(&mut self) -> io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Input fed from a channel; records which thread performed each read.
    struct TrackedInput {
        chunks: mpsc::Receiver<Vec<u8>>,
        readers: Arc<Mutex<Vec<ThreadId>>>,
    }

    impl Read for TrackedInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let chunk = self.chunks.recv().unwrap_or_default();
            self.readers.lock().unwrap().push(thread::current().id());
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
    }

    fn raw_isig(terminal: &Terminal) {
        let mut attrs = terminal.attributes().unwrap();
        attrs.lflag.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        terminal.set_attributes(&attrs).unwrap();
    }

    fn config(strict: bool) -> TerminalConfig {
        let mut config = TerminalConfig::default();
        config.term_type = "ansi".to_string();
        config.strict_closed_checks = strict;
        config.native_signals = false;
        config.stream.paused = true;
        config
    }

    fn open(strict: bool) -> (Terminal, Arc<AtomicUsize>) {
        let flushes = Arc::new(AtomicUsize::new(0));
        let out = CountingFlush { flushes: flushes.clone() };
        let terminal = open_stream("lifecycle", None, io::empty(), out, &config(strict)).unwrap();
        (terminal, flushes)
    }

    #[test]
    fn test_set_then_get_attributes_round_trips() {
        let (terminal, _) = open(false);
        let mut attrs = terminal.attributes().unwrap();
        attrs.lflag.remove(LocalFlags::ECHO);
        attrs.set_control_char(crate::core::attributes::ControlChar::Intr, Some(0x18));
        terminal.set_attributes(&attrs).unwrap();
        assert_eq!(terminal.attributes().unwrap(), attrs);
    }

    #[test]
    fn test_raw_mode_returns_previous_attributes() {
        let (terminal, _) = open(false);
        let cooked = terminal.attributes().unwrap();
        let previous = terminal.enter_raw_mode().unwrap();
        assert_eq!(previous, cooked);
        let raw = terminal.attributes().unwrap();
        assert!(!raw.local(LocalFlags::ICANON));
        assert!(!raw.local(LocalFlags::ECHO));
        terminal.set_attributes(&previous).unwrap();
        assert_eq!(terminal.attributes().unwrap(), cooked);
    }

    #[test]
    fn test_set_echo_reports_previous_state() {
        let (terminal, _) = open(false);
        assert!(terminal.echo().unwrap());
        assert!(terminal.set_echo(false).unwrap());
        assert!(!terminal.echo().unwrap());
        assert!(!terminal.set_echo(true).unwrap());
    }

    #[test]
    fn test_close_twice_from_two_threads() {
        let (terminal, flushes) = open(false);
        let terminal = Arc::new(terminal);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let t = terminal.clone();
                std::thread::spawn(move || t.close())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(terminal.is_closed());
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        terminal.close().unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_terminal_lenient_mode() {
        let (terminal, _) = open(false);
        terminal.close().unwrap();
        assert_eq!(terminal.read().unwrap(), ReadOutcome::Eof);
        assert!(terminal.attributes().is_ok());
    }

    #[test]
    fn test_closed_terminal_strict_mode() {
        let (terminal, _) = open(true);
        terminal.close().unwrap();
        assert!(matches!(terminal.read(), Err(TerminalError::Closed)));
        assert!(matches!(terminal.attributes(), Err(TerminalError::Closed)));
        assert!(terminal.writer().write(b"x").is_err());
    }

    #[test]
    fn test_puts_missing_capability_returns_false() {
        let (terminal, _) = open(false);
        assert!(!terminal.puts(Capability::KeyMouse, &[]).unwrap());
        assert!(terminal.puts(Capability::CursorAddress, &[Param::from(1), Param::from(2)]).unwrap());
    }

    #[test]
    fn test_cursor_position_skips_unrelated_input() {
        let (terminal, _) = open(false);
        terminal.enter_raw_mode().unwrap();
        terminal.process_input(b"x\x1b[12;40R").unwrap();
        let mut skipped = Vec::new();
        let mut discard = |b: u8| skipped.push(b);
        let cursor = terminal.cursor_position(Some(&mut discard)).unwrap();
        assert_eq!(cursor, Some(Cursor { x: 39, y: 11 }));
        assert_eq!(skipped, b"x".to_vec());
    }

    #[test]
    fn test_raise_runs_installed_handler() {
        let (terminal, _) = open(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let previous = terminal.handle(
            Signal::Quit,
            SignalHandler::callback(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(previous.is_default());
        terminal.raise(Signal::Quit);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_handler_may_feed_input_back() {
        let (terminal, _) = open(false);
        let terminal = Arc::new(terminal);
        raw_isig(&terminal);
        let weak = Arc::downgrade(&terminal);
        terminal.handle(
            Signal::Int,
            SignalHandler::callback(move |_| {
                if let Some(t) = weak.upgrade() {
                    t.process_input(b"x").unwrap();
                }
            }),
        );

        let (done_tx, done_rx) = mpsc::channel();
        let feeder = {
            let terminal = terminal.clone();
            thread::spawn(move || {
                terminal.process_input(&[0x03]).unwrap();
                done_tx.send(()).unwrap();
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());
        feeder.join().unwrap();
        assert_eq!(terminal.read_timeout(Some(Duration::ZERO), false).unwrap(), ReadOutcome::Byte(b'x'));
    }

    #[test]
    fn test_pause_and_wait_outlives_pump_and_resume_starts_fresh_thread() {
        let (tx, rx) = mpsc::channel();
        let readers = Arc::new(Mutex::new(Vec::new()));
        let input = TrackedInput {
            chunks: rx,
            readers: readers.clone(),
        };
        let mut config = config(false);
        config.stream.paused = false;
        let terminal = Arc::new(open_stream("pump", None, input, io::sink(), &config).unwrap());
        raw_isig(&terminal);

        tx.send(b"a".to_vec()).unwrap();
        assert_eq!(terminal.read_timeout(Some(Duration::from_secs(2)), false).unwrap(), ReadOutcome::Byte(b'a'));
        let first = readers.lock().unwrap()[0];

        let waited = Arc::new(AtomicBool::new(false));
        let pauser = {
            let (terminal, waited) = (terminal.clone(), waited.clone());
            thread::spawn(move || {
                terminal.pause_and_wait();
                waited.store(true, Ordering::SeqCst);
            })
        };
        // The pump is blocked reading, so the pause cannot finish yet
        thread::sleep(Duration::from_millis(100));
        assert!(!waited.load(Ordering::SeqCst));
        assert!(terminal.paused());

        tx.send(b"b".to_vec()).unwrap();
        pauser.join().unwrap();
        assert!(waited.load(Ordering::SeqCst));
        assert_eq!(terminal.read_timeout(Some(Duration::from_secs(2)), false).unwrap(), ReadOutcome::Byte(b'b'));

        // Nothing reads once pause_and_wait has returned
        let reads = readers.lock().unwrap().len();
        tx.send(b"c".to_vec()).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(readers.lock().unwrap().len(), reads);
        assert_eq!(terminal.read_timeout(Some(Duration::ZERO), false).unwrap(), ReadOutcome::Expired);

        terminal.resume().unwrap();
        assert!(!terminal.paused());
        assert_eq!(terminal.read_timeout(Some(Duration::from_secs(2)), false).unwrap(), ReadOutcome::Byte(b'c'));
        let last = *readers.lock().unwrap().last().unwrap();
        assert_ne!(last, first);

        terminal.close().unwrap();
        drop(tx);
    }
}
