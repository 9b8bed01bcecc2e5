//! Terminal over the Windows console.
//!
//! Console mode bits are coarser than termios flags, so the backend
//! keeps a logical [`Attributes`] set and derives the input console mode
//! from it. Input records are read by one pump thread, translated to
//! the escape sequences a terminal would send, and fed through the
//! software [`LineDiscipline`].

pub mod console;
pub mod keymapper;

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::TerminalConfig;
use crate::core::attributes::{Attributes, ControlChar, LocalFlags, Size};
use crate::core::capabilities::CapabilityStore;
use crate::core::discipline::{default_attributes, feed, shared_writer, LineDiscipline, SharedWriter};
use crate::core::nonblocking::{byte_queue, QueueWriter};
use crate::core::pump::Pump;
use crate::core::query::{Cursor, MouseTracking};
use crate::core::signals::{Signal, SignalTable};
use crate::core::terminal::{load_capabilities, Terminal, TerminalParts};
use crate::error::Result;

use self::console::*;
use self::keymapper::{KeyEvent, KeyMapper, LEFT_ALT_PRESSED, LEFT_CTRL_PRESSED, RIGHT_ALT_PRESSED, RIGHT_CTRL_PRESSED, SHIFT_PRESSED};
use super::Backend;

pub use self::console::{ConsoleHandle, InputRecord};
#[cfg(windows)]
pub use self::console::WinConsole;

/// How long one wait for an input record may block the pump
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// dwButtonState bits
const FROM_LEFT_1ST_BUTTON_PRESSED: u32 = 0x0001;
const RIGHTMOST_BUTTON_PRESSED: u32 = 0x0002;
const FROM_LEFT_2ND_BUTTON_PRESSED: u32 = 0x0004;

// dwEventFlags bits
const MOUSE_MOVED: u32 = 0x0001;
const DOUBLE_CLICK: u32 = 0x0002;
const MOUSE_WHEELED: u32 = 0x0004;
const MOUSE_HWHEELED: u32 = 0x0008;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Input console mode for a set of attributes.
///
/// Echo only works together with line input. Mouse input replaces
/// quick edit, which would otherwise swallow the clicks.
fn input_mode(attributes: &Attributes, tracking: MouseTracking, original: u32) -> u32 {
    let mut mode = ENABLE_WINDOW_INPUT | ENABLE_EXTENDED_FLAGS | (original & ENABLE_INSERT_MODE);
    if attributes.local(LocalFlags::ICANON) {
        mode |= ENABLE_LINE_INPUT;
        if attributes.local(LocalFlags::ECHO) {
            mode |= ENABLE_ECHO_INPUT;
        }
    }
    if tracking != MouseTracking::Off {
        mode |= ENABLE_MOUSE_INPUT;
    } else {
        mode |= original & ENABLE_QUICK_EDIT_MODE;
    }
    mode
}

/// X10 report with UTF-8 coordinates for a console mouse record, or
/// `None` when the tracking level filters it out.
fn mouse_report(tracking: MouseTracking, x: i16, y: i16, buttons: u32, flags: u32, state: u32) -> Option<Vec<u8>> {
    let flags = flags & !DOUBLE_CLICK;
    let moved = flags & MOUSE_MOVED != 0;
    let held = buttons & 0xffff;
    match tracking {
        MouseTracking::Off => return None,
        MouseTracking::Normal if moved => return None,
        MouseTracking::Button if moved && held == 0 => return None,
        _ => {}
    }
    if flags & MOUSE_HWHEELED != 0 {
        return None;
    }

    let mut cb: u32 = if flags & MOUSE_WHEELED != 0 {
        // High word is the signed wheel delta
        if ((buttons >> 16) as u16 as i16) < 0 {
            65
        } else {
            64
        }
    } else if held & FROM_LEFT_1ST_BUTTON_PRESSED != 0 {
        0
    } else if held & FROM_LEFT_2ND_BUTTON_PRESSED != 0 {
        1
    } else if held & RIGHTMOST_BUTTON_PRESSED != 0 {
        2
    } else {
        3
    };
    if moved && flags & MOUSE_WHEELED == 0 {
        cb |= 32;
    }
    if state & SHIFT_PRESSED != 0 {
        cb |= 4;
    }
    if state & (LEFT_ALT_PRESSED | RIGHT_ALT_PRESSED) != 0 {
        cb |= 8;
    }
    if state & (LEFT_CTRL_PRESSED | RIGHT_CTRL_PRESSED) != 0 {
        cb |= 16;
    }

    let mut out = b"\x1b[M".to_vec();
    let mut buf = [0u8; 4];
    for value in [32 + cb, 33 + x.max(0) as u32, 33 + y.max(0) as u32] {
        let c = char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER);
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
    Some(out)
}

/// State the input pump shares with the backend.
struct InputState {
    console: Arc<dyn ConsoleHandle>,
    signals: Arc<SignalTable>,
    discipline: Arc<Mutex<LineDiscipline>>,
    queue: QueueWriter,
    keys: Mutex<KeyMapper>,
    tracking: Mutex<MouseTracking>,
    focus: AtomicBool,
}

impl InputState {
    fn process_record(&self, record: InputRecord) -> io::Result<()> {
        match record {
            InputRecord::Key {
                down,
                virtual_key,
                ch,
                control_state,
                repeat,
            } => {
                let bytes = lock(&self.keys).map(&KeyEvent {
                    key_down: down,
                    virtual_key,
                    ch,
                    control_state,
                    repeat,
                });
                if !bytes.is_empty() {
                    feed(&self.discipline, &bytes)?;
                }
            }
            InputRecord::Mouse {
                x,
                y,
                buttons,
                flags,
                control_state,
            } => {
                let tracking = *lock(&self.tracking);
                if let Some(report) = mouse_report(tracking, x, y, buttons, flags, control_state) {
                    self.queue.write(&report);
                }
            }
            InputRecord::Focus(gained) => {
                if self.focus.load(Ordering::SeqCst) {
                    self.queue.write(if gained { b"\x1b[I" } else { b"\x1b[O" });
                }
            }
            InputRecord::Resize => self.signals.raise(Signal::Winch),
        }
        Ok(())
    }
}

pub struct WindowsBackend {
    attributes: Arc<Mutex<Attributes>>,
    output: SharedWriter,
    input: Arc<InputState>,
    original_input_mode: u32,
    original_output_mode: u32,
    original_code_page: u32,
    pump: Pump,
}

impl WindowsBackend {
    fn new(
        console: Arc<dyn ConsoleHandle>,
        capabilities: Arc<CapabilityStore>,
        signals: Arc<SignalTable>,
        queue: QueueWriter,
        output: SharedWriter,
        original_output_mode: u32,
        original_code_page: u32,
    ) -> Result<Self> {
        let original_input_mode = console.input_mode()?;
        let mut initial = default_attributes();
        initial.lflag.set(LocalFlags::ICANON, original_input_mode & ENABLE_LINE_INPUT != 0);
        initial.lflag.set(LocalFlags::ECHO, original_input_mode & ENABLE_ECHO_INPUT != 0);
        // The console's Backspace key sends ^H
        initial.set_control_char(ControlChar::Erase, Some(0x08));
        let attributes = Arc::new(Mutex::new(initial));

        let discipline = Arc::new(Mutex::new(LineDiscipline::new(
            attributes.clone(),
            signals.clone(),
            queue.clone(),
            Some(output.clone()),
        )));
        let input = Arc::new(InputState {
            console,
            signals,
            discipline,
            queue,
            keys: Mutex::new(KeyMapper::new(capabilities)),
            tracking: Mutex::new(MouseTracking::Off),
            focus: AtomicBool::new(false),
        });

        let pump_input = input.clone();
        let pump = Pump::new("polyterm-console-input", move |ticket| {
            while ticket.keep_running() {
                match pump_input.console.read_record(POLL_INTERVAL) {
                    Ok(Some(record)) => {
                        if let Err(e) = pump_input.process_record(record) {
                            warn!("Unable to echo input: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Console input failed: {}", e);
                        lock(&pump_input.discipline).end_of_input();
                        break;
                    }
                }
            }
        });

        Ok(Self {
            attributes,
            output,
            input,
            original_input_mode,
            original_output_mode,
            original_code_page,
            pump,
        })
    }

    fn apply_mode(&self) -> Result<()> {
        let mode = {
            let attributes = lock(&self.attributes);
            input_mode(&attributes, *lock(&self.input.tracking), self.original_input_mode)
        };
        self.input.console.set_input_mode(mode)
    }

    pub fn attributes(&self) -> Attributes {
        lock(&self.attributes).clone()
    }

    pub fn set_attributes(&self, attributes: &Attributes) -> Result<()> {
        *lock(&self.attributes) = attributes.clone();
        self.apply_mode()
    }

    pub fn size(&self) -> Result<Size> {
        self.input.console.size()
    }

    pub fn cursor_position(&self) -> Result<Cursor> {
        self.input.console.cursor_position()
    }

    pub fn process_input(&self, bytes: &[u8]) -> Result<()> {
        feed(&self.input.discipline, bytes)?;
        Ok(())
    }

    pub fn track_mouse(&self, tracking: MouseTracking) -> Result<()> {
        *lock(&self.input.tracking) = tracking;
        self.apply_mode()
    }

    pub fn track_focus(&self, enabled: bool) {
        self.input.focus.store(enabled, Ordering::SeqCst);
    }

    pub fn pause(&self, wait: bool) {
        self.pump.pause(wait);
    }

    pub fn resume(&self) -> Result<()> {
        self.pump.resume()?;
        Ok(())
    }

    pub fn paused(&self) -> bool {
        self.pump.paused()
    }

    /// Record waits are bounded, so the pump is always joined.
    pub fn stop(&self) {
        self.pump.pause(true);
    }

    pub fn restore(&self) -> Result<()> {
        let console = &self.input.console;
        let input = console.set_input_mode(self.original_input_mode);
        let output = console.set_output_mode(self.original_output_mode);
        let code_page = if console.output_code_page() != self.original_code_page {
            console.set_output_code_page(self.original_code_page)
        } else {
            Ok(())
        };
        input.and(output).and(code_page)
    }

    pub fn release(&self) -> Result<()> {
        self.input.queue.close();
        lock(&self.output).flush()?;
        Ok(())
    }
}

/// Build a terminal on a console handle.
///
/// Probes virtual terminal processing to choose between the
/// `windows-vtp` and `windows` descriptions and switches the output
/// code page to UTF-8.
pub fn open_console<W>(
    name: &str,
    console: Arc<dyn ConsoleHandle>,
    output: W,
    config: &TerminalConfig,
) -> Result<Terminal>
where
    W: Write + Send + 'static,
{
    let original_output_mode = console.output_mode()?;
    let term_type = match console.set_output_mode(original_output_mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING) {
        Ok(()) => "windows-vtp",
        Err(e) => {
            debug!("Virtual terminal processing unavailable: {}", e);
            "windows"
        }
    };
    let original_code_page = console.output_code_page();
    if original_code_page != CP_UTF8 {
        if let Err(e) = console.set_output_code_page(CP_UTF8) {
            warn!("Unable to select the UTF-8 code page: {}", e);
        }
    }

    let capabilities = Arc::new(load_capabilities(term_type, config));
    let signals = Arc::new(SignalTable::new());
    let (queue_writer, queue) = byte_queue();
    let output = shared_writer(output);
    let backend = WindowsBackend::new(
        console,
        capabilities.clone(),
        signals.clone(),
        queue_writer,
        output.clone(),
        original_output_mode,
        original_code_page,
    )?;
    backend.apply_mode()?;

    let terminal = Terminal::assemble(
        TerminalParts {
            name: name.to_string(),
            term_type: term_type.to_string(),
            capabilities,
            signals,
            backend: Backend::Windows(backend),
            reader: Box::new(queue),
            writer: output,
        },
        config,
    );
    if !config.stream.paused {
        terminal.resume()?;
    }
    Ok(terminal)
}

/// Open the process's own console.
#[cfg(windows)]
pub fn open_windows(name: &str, config: &TerminalConfig) -> Result<Terminal> {
    let console = Arc::new(WinConsole::open()?);
    open_console(name, console, io::stdout(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nonblocking::ReadOutcome;
    use crate::core::signals::SignalHandler;
    use crate::error::TerminalError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    const ORIGINAL_INPUT: u32 = ENABLE_PROCESSED_INPUT
        | ENABLE_LINE_INPUT
        | ENABLE_ECHO_INPUT
        | ENABLE_INSERT_MODE
        | ENABLE_QUICK_EDIT_MODE
        | ENABLE_EXTENDED_FLAGS;

    struct FakeConsole {
        input_mode: Mutex<u32>,
        output_mode: Mutex<u32>,
        code_page: Mutex<u32>,
        vt: bool,
        records: Mutex<mpsc::Receiver<InputRecord>>,
    }

    impl ConsoleHandle for FakeConsole {
        fn input_mode(&self) -> Result<u32> {
            Ok(*lock(&self.input_mode))
        }

        fn set_input_mode(&self, mode: u32) -> Result<()> {
            *lock(&self.input_mode) = mode;
            Ok(())
        }

        fn output_mode(&self) -> Result<u32> {
            Ok(*lock(&self.output_mode))
        }

        fn set_output_mode(&self, mode: u32) -> Result<()> {
            if mode & ENABLE_VIRTUAL_TERMINAL_PROCESSING != 0 && !self.vt {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "parameter is incorrect").into());
            }
            *lock(&self.output_mode) = mode;
            Ok(())
        }

        fn size(&self) -> Result<Size> {
            Ok(Size::new(120, 30))
        }

        fn cursor_position(&self) -> Result<Cursor> {
            Ok(Cursor { x: 7, y: 3 })
        }

        fn output_code_page(&self) -> u32 {
            *lock(&self.code_page)
        }

        fn set_output_code_page(&self, page: u32) -> Result<()> {
            *lock(&self.code_page) = page;
            Ok(())
        }

        fn read_record(&self, timeout: Duration) -> Result<Option<InputRecord>> {
            match lock(&self.records).recv_timeout(timeout) {
                Ok(record) => Ok(Some(record)),
                Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(timeout);
                    Ok(None)
                }
            }
        }
    }

    /// Console output captured for assertions.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            lock(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn open(vt: bool) -> (Terminal, Arc<FakeConsole>, mpsc::Sender<InputRecord>, Capture) {
        let (tx, rx) = mpsc::channel();
        let console = Arc::new(FakeConsole {
            input_mode: Mutex::new(ORIGINAL_INPUT),
            output_mode: Mutex::new(0x0003),
            code_page: Mutex::new(437),
            vt,
            records: Mutex::new(rx),
        });
        let capture = Capture::default();
        let config = TerminalConfig {
            native_signals: false,
            ..TerminalConfig::default()
        };
        let terminal = open_console("test", console.clone(), capture.clone(), &config).unwrap();
        (terminal, console, tx, capture)
    }

    fn key(vk: u16, ch: char, state: u32) -> InputRecord {
        InputRecord::Key {
            down: true,
            virtual_key: vk,
            ch: ch as u16,
            control_state: state,
            repeat: 1,
        }
    }

    fn read_bytes(terminal: &Terminal, count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while out.len() < count && Instant::now() < deadline {
            if let ReadOutcome::Byte(b) = terminal.read_timeout(Some(Duration::from_millis(100)), false).unwrap() {
                out.push(b);
            }
        }
        out
    }

    #[test]
    fn test_open_probes_virtual_terminal_processing() {
        let (terminal, console, _tx, _capture) = open(true);
        assert_eq!(terminal.term_type(), "windows-vtp");
        assert_eq!(*lock(&console.code_page), CP_UTF8);
        drop(terminal);

        let (terminal, _console, _tx, _capture) = open(false);
        assert_eq!(terminal.term_type(), "windows");
    }

    #[test]
    fn test_initial_attributes_follow_console_mode() {
        let (terminal, _console, _tx, _capture) = open(true);
        let attrs = terminal.attributes().unwrap();
        assert!(attrs.local(LocalFlags::ICANON));
        assert!(attrs.local(LocalFlags::ECHO));
        assert!(attrs.local(LocalFlags::ISIG));
        assert_eq!(attrs.control_char(ControlChar::Erase), Some(0x08));
    }

    #[test]
    fn test_mode_recompute() {
        let (terminal, console, _tx, _capture) = open(true);
        terminal.enter_raw_mode().unwrap();
        let mode = *lock(&console.input_mode);
        assert_eq!(mode & (ENABLE_LINE_INPUT | ENABLE_ECHO_INPUT | ENABLE_PROCESSED_INPUT), 0);
        assert_ne!(mode & ENABLE_WINDOW_INPUT, 0);

        // Echo without line input is not a valid console mode
        terminal.set_echo(true).unwrap();
        assert_eq!(*lock(&console.input_mode) & ENABLE_ECHO_INPUT, 0);
    }

    #[test]
    fn test_mouse_tracking_replaces_quick_edit() {
        let (terminal, console, _tx, _capture) = open(true);
        assert_ne!(*lock(&console.input_mode) & ENABLE_QUICK_EDIT_MODE, 0);
        assert!(terminal.track_mouse(MouseTracking::Normal).unwrap());
        let mode = *lock(&console.input_mode);
        assert_ne!(mode & ENABLE_MOUSE_INPUT, 0);
        assert_eq!(mode & ENABLE_QUICK_EDIT_MODE, 0);

        terminal.track_mouse(MouseTracking::Off).unwrap();
        assert_ne!(*lock(&console.input_mode) & ENABLE_QUICK_EDIT_MODE, 0);
    }

    #[test]
    fn test_key_records_reach_reader() {
        let (terminal, _console, tx, _capture) = open(true);
        terminal.enter_raw_mode().unwrap();
        tx.send(key(0x25, '\0', 0)).unwrap();
        tx.send(key(0x25, '\0', SHIFT_PRESSED)).unwrap();
        assert_eq!(read_bytes(&terminal, 9), b"\x1b[D\x1b[1;2D");
    }

    #[test]
    fn test_cooked_input_echoes_and_completes_on_enter() {
        let (terminal, _console, tx, capture) = open(true);
        tx.send(key(0x48, 'h', 0)).unwrap();
        tx.send(key(0x49, 'i', 0)).unwrap();
        tx.send(key(0x0D, '\r', 0)).unwrap();
        assert_eq!(read_bytes(&terminal, 3), b"hi\n");
        assert_eq!(lock(&capture.0).as_slice(), b"hi\r\n");

        tx.send(key(0x41, 'a', 0)).unwrap();
        tx.send(key(0x42, 'b', 0)).unwrap();
        tx.send(key(0x08, '\x08', 0)).unwrap();
        tx.send(key(0x0D, '\r', 0)).unwrap();
        assert_eq!(read_bytes(&terminal, 2), b"a\n");
        assert_eq!(lock(&capture.0).as_slice(), b"hi\r\nab\x08 \x08\r\n");
    }

    #[test]
    fn test_ctrl_c_raises_int() {
        let (terminal, _console, tx, _capture) = open(true);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        terminal.handle(
            Signal::Int,
            SignalHandler::callback(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tx.send(InputRecord::Key {
            down: false,
            virtual_key: 0x43,
            ch: 3,
            control_state: LEFT_CTRL_PRESSED,
            repeat: 1,
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mouse_records_become_reports() {
        let (terminal, _console, tx, _capture) = open(true);
        terminal.enter_raw_mode().unwrap();
        terminal.track_mouse(MouseTracking::Normal).unwrap();
        // Motion is filtered at this level
        tx.send(InputRecord::Mouse {
            x: 1,
            y: 1,
            buttons: 0,
            flags: MOUSE_MOVED,
            control_state: 0,
        })
        .unwrap();
        tx.send(InputRecord::Mouse {
            x: 4,
            y: 2,
            buttons: FROM_LEFT_1ST_BUTTON_PRESSED,
            flags: 0,
            control_state: 0,
        })
        .unwrap();
        assert_eq!(read_bytes(&terminal, 6), b"\x1b[M %#");
    }

    #[test]
    fn test_mouse_report_encoding() {
        let wheel_down = 0xff88_0000;
        assert_eq!(
            mouse_report(MouseTracking::Normal, 0, 0, wheel_down, MOUSE_WHEELED, 0).unwrap(),
            b"\x1b[Ma!!"
        );
        assert_eq!(
            mouse_report(MouseTracking::Normal, 0, 0, 0x0078_0000, MOUSE_WHEELED, 0).unwrap(),
            b"\x1b[M`!!"
        );
        assert_eq!(
            mouse_report(MouseTracking::Normal, 2, 3, RIGHTMOST_BUTTON_PRESSED, DOUBLE_CLICK, SHIFT_PRESSED).unwrap(),
            b"\x1b[M&#$"
        );
        assert!(mouse_report(MouseTracking::Button, 5, 5, 0, MOUSE_MOVED, 0).is_none());
        assert_eq!(
            mouse_report(MouseTracking::Button, 5, 5, FROM_LEFT_1ST_BUTTON_PRESSED, MOUSE_MOVED, 0).unwrap(),
            b"\x1b[M@&&"
        );
        assert!(mouse_report(MouseTracking::Any, 0, 0, 0, MOUSE_HWHEELED, 0).is_none());
        // Columns past 94 need multi-byte code points
        assert_eq!(
            mouse_report(MouseTracking::Normal, 200, 0, FROM_LEFT_2ND_BUTTON_PRESSED, 0, 0).unwrap(),
            "\x1b[M!\u{e9}!".as_bytes()
        );
    }

    #[test]
    fn test_focus_reports_only_when_tracking() {
        let (terminal, _console, tx, _capture) = open(true);
        terminal.enter_raw_mode().unwrap();
        tx.send(InputRecord::Focus(true)).unwrap();
        assert_eq!(
            terminal.read_timeout(Some(Duration::from_millis(300)), false).unwrap(),
            ReadOutcome::Expired
        );
        assert!(terminal.track_focus(true).unwrap());
        tx.send(InputRecord::Focus(false)).unwrap();
        assert_eq!(read_bytes(&terminal, 3), b"\x1b[O");
    }

    #[test]
    fn test_resize_raises_winch() {
        let (terminal, _console, tx, _capture) = open(true);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        terminal.handle(
            Signal::Winch,
            SignalHandler::callback(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tx.send(InputRecord::Resize).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(terminal.size().unwrap(), Size::new(120, 30));
    }

    #[test]
    fn test_cursor_position_and_size_change() {
        let (terminal, _console, _tx, _capture) = open(true);
        assert_eq!(terminal.cursor_position(None).unwrap(), Some(Cursor { x: 7, y: 3 }));
        assert!(matches!(
            terminal.set_size(Size::new(80, 24)),
            Err(TerminalError::Unsupported(_))
        ));
    }

    #[test]
    fn test_close_restores_console() {
        let (terminal, console, _tx, _capture) = open(true);
        terminal.enter_raw_mode().unwrap();
        terminal.track_mouse(MouseTracking::Any).unwrap();
        terminal.close().unwrap();
        assert_eq!(*lock(&console.input_mode), ORIGINAL_INPUT);
        assert_eq!(*lock(&console.output_mode), 0x0003);
        assert_eq!(*lock(&console.code_page), 437);
        assert_eq!(terminal.read_timeout(None, false).unwrap(), ReadOutcome::Eof);
    }
}
