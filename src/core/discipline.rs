//! Software line discipline.
//!
//! Used wherever no OS line discipline sits between the input source and
//! the application: plain byte streams and the Windows console. It turns
//! control bytes into signals, applies the CR/NL translations selected by
//! the input flags, buffers lines in canonical mode, and echoes through the
//! output post-processing rules.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use super::attributes::{
    caret_notation, Attributes, ControlChar, ControlFlags, InputFlags, LocalFlags, OutputFlags,
};
use super::nonblocking::QueueWriter;
use super::signals::{Signal, SignalTable};

/// Output stream shared between the application writer and echo.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn shared_writer<W: Write + Send + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Attributes of a freshly opened cooked terminal.
pub fn default_attributes() -> Attributes {
    let mut attrs = Attributes::new();
    attrs.lflag = LocalFlags::ICANON
        | LocalFlags::ISIG
        | LocalFlags::IEXTEN
        | LocalFlags::ECHO
        | LocalFlags::ECHOE
        | LocalFlags::ECHOKE
        | LocalFlags::ECHOCTL
        | LocalFlags::PENDIN;
    attrs.iflag = InputFlags::ICRNL
        | InputFlags::IXON
        | InputFlags::IXANY
        | InputFlags::IMAXBEL
        | InputFlags::IUTF8
        | InputFlags::BRKINT;
    attrs.oflag = OutputFlags::OPOST | OutputFlags::ONLCR;
    attrs.cflag = ControlFlags::CREAD | ControlFlags::CS8 | ControlFlags::HUPCL;

    let chars = [
        (ControlChar::Eof, Some(4)),
        (ControlChar::Eol, None),
        (ControlChar::Eol2, None),
        (ControlChar::Erase, Some(0x7f)),
        (ControlChar::WErase, Some(0x17)),
        (ControlChar::Kill, Some(0x15)),
        (ControlChar::Reprint, Some(0x12)),
        (ControlChar::Intr, Some(0x03)),
        (ControlChar::Quit, Some(0x1c)),
        (ControlChar::Susp, Some(0x1a)),
        (ControlChar::DSusp, Some(0x19)),
        (ControlChar::Start, Some(0x11)),
        (ControlChar::Stop, Some(0x13)),
        (ControlChar::LNext, Some(0x16)),
        (ControlChar::Discard, Some(0x0f)),
        (ControlChar::Min, Some(1)),
        (ControlChar::Time, Some(0)),
        (ControlChar::Status, Some(0x14)),
    ];
    for (c, v) in chars {
        attrs.set_control_char(c, v);
    }
    attrs
}

/// Apply output post-processing to one byte.
pub fn process_output_byte(attrs: &Attributes, c: u8, out: &mut Vec<u8>) {
    if attrs.output(OutputFlags::OPOST) {
        if c == b'\n' && attrs.output(OutputFlags::ONLCR) {
            out.extend_from_slice(b"\r\n");
            return;
        }
        if c == b'\r' && attrs.output(OutputFlags::OCRNL) {
            out.push(b'\n');
            return;
        }
    }
    out.push(c);
}

/// Apply output post-processing to a buffer.
pub fn process_output(attrs: &Attributes, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        process_output_byte(attrs, b, &mut out);
    }
    out
}

#[derive(Default)]
struct Batch {
    input: Vec<u8>,
    echo: Vec<u8>,
}

/// Run `bytes` through a shared discipline.
///
/// Handlers run on the calling thread with the discipline unlocked, so a
/// handler may feed more input or change attributes.
pub fn feed(discipline: &Mutex<LineDiscipline>, bytes: &[u8]) -> io::Result<()> {
    let (result, signals, table) = {
        let mut guard = discipline.lock().unwrap_or_else(|e| e.into_inner());
        let result = guard.process_input(bytes);
        (result, guard.take_signals(), guard.signals.clone())
    };
    for signal in signals {
        table.raise(signal);
    }
    result
}

const SIGNAL_CHARS: [(ControlChar, Signal); 4] = [
    (ControlChar::Intr, Signal::Int),
    (ControlChar::Quit, Signal::Quit),
    (ControlChar::Susp, Signal::Tstp),
    (ControlChar::Status, Signal::Info),
];

pub struct LineDiscipline {
    attributes: Arc<Mutex<Attributes>>,
    signals: Arc<SignalTable>,
    queue: QueueWriter,
    echo: Option<SharedWriter>,
    /// Last byte was a CR turned into NL; a following LF is dropped
    skip_next_lf: bool,
    /// Pending canonical line
    line: Vec<u8>,
    literal_next: bool,
    /// Signals seen by `process_input`, not yet raised
    pending: Vec<Signal>,
}

impl LineDiscipline {
    pub fn new(
        attributes: Arc<Mutex<Attributes>>,
        signals: Arc<SignalTable>,
        queue: QueueWriter,
        echo: Option<SharedWriter>,
    ) -> Self {
        Self {
            attributes,
            signals,
            queue,
            echo,
            skip_next_lf: false,
            line: Vec::new(),
            literal_next: false,
            pending: Vec::new(),
        }
    }

    /// Process a chunk of raw input.
    ///
    /// The bytes preceding a signal character are delivered before the
    /// signal is recorded. Recorded signals wait in [`Self::take_signals`];
    /// [`feed`] raises them once the discipline is unlocked.
    pub fn process_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        let attrs = self.attributes.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut batch = Batch::default();
        for &b in bytes {
            if let Some(signal) = self.process_input_byte(&attrs, b, &mut batch) {
                self.flush(&mut batch)?;
                self.pending.push(signal);
            }
        }
        self.flush(&mut batch)
    }

    /// Signals recorded since the last call, in arrival order.
    pub fn take_signals(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.pending)
    }

    /// Deliver any partial line and signal end of input to the reader.
    pub fn end_of_input(&mut self) {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.queue.write(&line);
        }
        self.queue.close();
    }

    /// Echo goes out before the reader can see the bytes.
    fn flush(&mut self, batch: &mut Batch) -> io::Result<()> {
        let mut echoed = Ok(());
        if !batch.echo.is_empty() {
            if let Some(echo) = &self.echo {
                let mut out = echo.lock().unwrap_or_else(|e| e.into_inner());
                echoed = out.write_all(&batch.echo).and_then(|_| out.flush());
            }
            batch.echo.clear();
        }
        if !batch.input.is_empty() {
            self.queue.write(&batch.input);
            batch.input.clear();
        }
        echoed
    }

    fn process_input_byte(&mut self, attrs: &Attributes, c: u8, batch: &mut Batch) -> Option<Signal> {
        let mut c = c;
        if attrs.input(InputFlags::ISTRIP) {
            c &= 0x7f;
        }

        if self.literal_next {
            self.literal_next = false;
            self.accept(attrs, c, batch);
            return None;
        }

        if attrs.local(LocalFlags::ISIG) {
            for (cc, signal) in SIGNAL_CHARS {
                if attrs.is_char(cc, c) {
                    self.skip_next_lf = false;
                    if attrs.local(LocalFlags::ECHO) {
                        batch.echo.extend_from_slice(caret_notation(c).as_bytes());
                    }
                    return Some(signal);
                }
            }
        }

        if c == b'\r' {
            if attrs.input(InputFlags::INORMEOL)
                || (attrs.input(InputFlags::ICRNL) && !attrs.input(InputFlags::IGNCR))
            {
                c = b'\n';
                self.skip_next_lf = true;
            } else if attrs.input(InputFlags::IGNCR) {
                return None;
            } else {
                self.skip_next_lf = false;
            }
        } else if c == b'\n' {
            if self.skip_next_lf {
                self.skip_next_lf = false;
                return None;
            }
            if attrs.input(InputFlags::INLCR) {
                c = b'\r';
            }
        } else {
            self.skip_next_lf = false;
        }

        if attrs.local(LocalFlags::ICANON) {
            self.canonical(attrs, c, batch);
        } else {
            self.accept(attrs, c, batch);
        }
        None
    }

    fn canonical(&mut self, attrs: &Attributes, c: u8, batch: &mut Batch) {
        let echo = attrs.local(LocalFlags::ECHO);
        let extended = attrs.local(LocalFlags::IEXTEN);

        if extended && attrs.is_char(ControlChar::LNext, c) {
            self.literal_next = true;
            return;
        }
        if attrs.is_char(ControlChar::Erase, c) {
            if self.line.pop().is_some() && echo && attrs.local(LocalFlags::ECHOE) {
                batch.echo.extend_from_slice(b"\x08 \x08");
            }
            return;
        }
        if extended && attrs.is_char(ControlChar::WErase, c) {
            while self.line.last() == Some(&b' ') {
                self.erase_one(attrs, batch);
            }
            while self.line.last().is_some_and(|&b| b != b' ') {
                self.erase_one(attrs, batch);
            }
            return;
        }
        if attrs.is_char(ControlChar::Kill, c) {
            if echo {
                if attrs.local(LocalFlags::ECHOKE) {
                    for _ in 0..self.line.len() {
                        batch.echo.extend_from_slice(b"\x08 \x08");
                    }
                } else {
                    self.echo_byte(attrs, c, batch);
                    if attrs.local(LocalFlags::ECHOK) {
                        process_output_byte(attrs, b'\n', &mut batch.echo);
                    }
                }
            }
            self.line.clear();
            return;
        }
        if attrs.is_char(ControlChar::Eof, c) {
            if self.line.is_empty() {
                // Nothing to terminate: hand the byte itself to the reader
                batch.input.push(c);
            } else {
                batch.input.append(&mut self.line);
            }
            return;
        }

        self.line.push(c);
        if c == b'\n' {
            if echo || attrs.local(LocalFlags::ECHONL) {
                process_output_byte(attrs, c, &mut batch.echo);
            }
        } else if echo {
            self.echo_byte(attrs, c, batch);
        }
        if c == b'\n' || attrs.is_char(ControlChar::Eol, c) || attrs.is_char(ControlChar::Eol2, c) {
            batch.input.append(&mut self.line);
        }
    }

    fn erase_one(&mut self, attrs: &Attributes, batch: &mut Batch) {
        if self.line.pop().is_some() && attrs.local(LocalFlags::ECHO) && attrs.local(LocalFlags::ECHOE) {
            batch.echo.extend_from_slice(b"\x08 \x08");
        }
    }

    fn accept(&mut self, attrs: &Attributes, c: u8, batch: &mut Batch) {
        if attrs.local(LocalFlags::ICANON) {
            self.line.push(c);
        } else {
            batch.input.push(c);
        }
        if attrs.local(LocalFlags::ECHO) {
            self.echo_byte(attrs, c, batch);
        }
    }

    fn echo_byte(&self, attrs: &Attributes, c: u8, batch: &mut Batch) {
        let is_control = (c < 0x20 && c != b'\t' && c != b'\n' && c != b'\r') || c == 0x7f;
        let flow = attrs.is_char(ControlChar::Start, c) || attrs.is_char(ControlChar::Stop, c);
        if attrs.local(LocalFlags::ECHOCTL) && is_control && !flow {
            batch.echo.extend_from_slice(caret_notation(c).as_bytes());
        } else {
            process_output_byte(attrs, c, &mut batch.echo);
        }
    }
}
