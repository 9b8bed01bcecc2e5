//! Terminal over an arbitrary byte stream pair.
//!
//! Nothing below the stream knows about terminals (a socket, a pipe, an
//! in-memory buffer), so line discipline runs in software. One pump
//! thread reads the master input and feeds the [`LineDiscipline`];
//! application writes are post-processed by the output flags.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::TerminalConfig;
use crate::core::attributes::{Attributes, Size};
use crate::core::discipline::{default_attributes, feed, process_output, shared_writer, LineDiscipline, SharedWriter};
use crate::core::nonblocking::{byte_queue, QueueWriter};
use crate::core::pump::Pump;
use crate::core::signals::{Signal, SignalTable};
use crate::core::terminal::{load_capabilities, Terminal, TerminalParts};
use crate::error::Result;

use super::Backend;

type SharedReader = Arc<Mutex<Box<dyn Read + Send>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct StreamBackend {
    attributes: Arc<Mutex<Attributes>>,
    size: Mutex<Size>,
    signals: Arc<SignalTable>,
    discipline: Arc<Mutex<LineDiscipline>>,
    queue: QueueWriter,
    output: SharedWriter,
    pump: Pump,
}

impl StreamBackend {
    fn new(
        input: SharedReader,
        output: SharedWriter,
        signals: Arc<SignalTable>,
        queue: QueueWriter,
        size: Size,
    ) -> Self {
        let attributes = Arc::new(Mutex::new(default_attributes()));
        let discipline = Arc::new(Mutex::new(LineDiscipline::new(
            attributes.clone(),
            signals.clone(),
            queue.clone(),
            Some(output.clone()),
        )));

        let pump_discipline = discipline.clone();
        let pump = Pump::new("polyterm-stream-input", move |ticket| {
            let mut buf = [0u8; 1024];
            while ticket.keep_running() {
                let read = lock(&input).read(&mut buf);
                match read {
                    Ok(0) => {
                        debug!("Stream input reached end of file");
                        lock(&pump_discipline).end_of_input();
                        break;
                    }
                    Ok(n) => {
                        if let Err(e) = feed(&pump_discipline, &buf[..n]) {
                            warn!("Unable to echo input: {}", e);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!("Stream input failed: {}", e);
                        lock(&pump_discipline).end_of_input();
                        break;
                    }
                }
            }
        });

        Self {
            attributes,
            size: Mutex::new(size),
            signals,
            discipline,
            queue,
            output,
            pump,
        }
    }

    pub fn attributes(&self) -> Attributes {
        lock(&self.attributes).clone()
    }

    pub fn set_attributes(&self, attributes: &Attributes) {
        *lock(&self.attributes) = attributes.clone();
    }

    pub fn size(&self) -> Size {
        *lock(&self.size)
    }

    /// Record a new size; a change raises WINCH.
    pub fn set_size(&self, size: Size) {
        let changed = {
            let mut current = lock(&self.size);
            let changed = *current != size;
            *current = size;
            changed
        };
        if changed {
            self.signals.raise(Signal::Winch);
        }
    }

    pub fn process_input(&self, bytes: &[u8]) -> Result<()> {
        feed(&self.discipline, bytes)?;
        Ok(())
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

    /// A read blocked on the stream cannot be cancelled, so close does
    /// not wait for the pump.
    pub fn stop(&self) {
        self.pump.pause(false);
    }

    pub fn release(&self) -> Result<()> {
        self.queue.close();
        lock(&self.output).flush()?;
        Ok(())
    }
}

/// Application side writer applying OPOST processing.
struct ProcessedWriter {
    attributes: Arc<Mutex<Attributes>>,
    output: SharedWriter,
}

impl Write for ProcessedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let bytes = {
            let attributes = lock(&self.attributes);
            process_output(&attributes, buf)
        };
        lock(&self.output).write_all(&bytes)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.output).flush()
    }
}

/// Open a terminal on an input/output stream pair.
///
/// `term_type` defaults to the configured type. The input pump starts
/// unless the configuration asks for a paused terminal.
pub fn open_stream<R, W>(
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
    let term_type = term_type.unwrap_or(&config.term_type).to_string();
    let capabilities = Arc::new(load_capabilities(&term_type, config));
    let signals = Arc::new(SignalTable::new());
    let (queue_writer, queue) = byte_queue();
    let input: SharedReader = Arc::new(Mutex::new(Box::new(input)));
    let output = shared_writer(output);
    let size = Size::new(config.stream.columns, config.stream.rows);

    let backend = StreamBackend::new(input, output.clone(), signals.clone(), queue_writer, size);
    let writer = shared_writer(ProcessedWriter {
        attributes: backend.attributes.clone(),
        output,
    });

    let terminal = Terminal::assemble(
        TerminalParts {
            name: name.to_string(),
            term_type,
            capabilities,
            signals,
            backend: Backend::Stream(backend),
            reader: Box::new(queue),
            writer,
        },
        config,
    );
    if !config.stream.paused {
        terminal.resume()?;
    }
    Ok(terminal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attributes::LocalFlags;
    use crate::core::nonblocking::ReadOutcome;
    use crate::core::signals::SignalHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Input fed from a channel, one chunk per read.
    struct ChannelInput(mpsc::Receiver<Vec<u8>>);

    impl Read for ChannelInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn config(paused: bool) -> TerminalConfig {
        let mut config = TerminalConfig::default();
        config.term_type = "ansi".to_string();
        config.native_signals = false;
        config.stream.paused = paused;
        config
    }

    fn open(paused: bool) -> (Terminal, mpsc::Sender<Vec<u8>>, Capture) {
        let (tx, rx) = mpsc::channel();
        let capture = Capture::default();
        let terminal = open_stream("test", None, ChannelInput(rx), capture.clone(), &config(paused)).unwrap();
        (terminal, tx, capture)
    }

    #[test]
    fn test_raw_input_flows_through_pump() {
        let (terminal, tx, _out) = open(false);
        terminal.enter_raw_mode().unwrap();
        tx.send(b"hi".to_vec()).unwrap();
        assert_eq!(terminal.read().unwrap(), ReadOutcome::Byte(b'h'));
        assert_eq!(terminal.peek(None).unwrap(), ReadOutcome::Byte(b'i'));
        assert_eq!(terminal.read().unwrap(), ReadOutcome::Byte(b'i'));
    }

    #[test]
    fn test_zero_timeout_read_expires_quickly() {
        let (terminal, _tx, _out) = open(false);
        let start = Instant::now();
        let outcome = terminal.read_timeout(Some(Duration::ZERO), false).unwrap();
        assert_eq!(outcome, ReadOutcome::Expired);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_timed_read_receives_late_input() {
        let (terminal, tx, _out) = open(false);
        terminal.enter_raw_mode().unwrap();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            tx.send(b"k".to_vec()).unwrap();
            tx
        });
        let start = Instant::now();
        let outcome = terminal.read_timeout(Some(Duration::from_millis(200)), false).unwrap();
        assert_eq!(outcome, ReadOutcome::Byte(b'k'));
        assert!(start.elapsed() < Duration::from_millis(200));
        drop(sender.join().unwrap());
    }

    #[test]
    fn test_cooked_echo_and_output_processing() {
        let (terminal, tx, out) = open(false);
        tx.send(b"ok\r".to_vec()).unwrap();
        let mut line = Vec::new();
        for _ in 0..3 {
            line.push(terminal.read().unwrap().byte().unwrap());
        }
        assert_eq!(line, b"ok\n".to_vec());
        assert_eq!(out.0.lock().unwrap().as_slice(), b"ok\r\n");

        terminal.writer().write_all(b"x\n").unwrap();
        assert!(out.0.lock().unwrap().ends_with(b"x\r\n"));
    }

    #[test]
    fn test_intr_with_isig() {
        let (terminal, tx, _out) = open(false);
        let mut attrs = terminal.attributes().unwrap();
        attrs.lflag.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        terminal.set_attributes(&attrs).unwrap();

        let (seen_tx, seen_rx) = mpsc::channel();
        terminal.handle(Signal::Int, SignalHandler::callback(move |s| {
            seen_tx.send(s).unwrap();
        }));
        tx.send(vec![0x03]).unwrap();
        assert_eq!(seen_rx.recv_timeout(Duration::from_secs(2)).unwrap(), Signal::Int);
        assert!(seen_rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(terminal.read_timeout(Some(Duration::from_millis(50)), false).unwrap(), ReadOutcome::Expired);
    }

    #[test]
    fn test_eof_on_input_reaches_reader() {
        let (terminal, tx, _out) = open(false);
        terminal.enter_raw_mode().unwrap();
        tx.send(b"z".to_vec()).unwrap();
        drop(tx);
        assert_eq!(terminal.read().unwrap(), ReadOutcome::Byte(b'z'));
        assert_eq!(terminal.read().unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn test_paused_terminal_processes_nothing_until_resumed() {
        let (terminal, tx, _out) = open(true);
        assert!(terminal.paused());
        terminal.enter_raw_mode().unwrap();
        tx.send(b"q".to_vec()).unwrap();
        assert_eq!(terminal.read_timeout(Some(Duration::from_millis(50)), false).unwrap(), ReadOutcome::Expired);
        terminal.resume().unwrap();
        assert!(!terminal.paused());
        assert_eq!(terminal.read_timeout(Some(Duration::from_secs(2)), false).unwrap(), ReadOutcome::Byte(b'q'));
    }

    #[test]
    fn test_set_size_raises_winch_on_change() {
        let (terminal, _tx, _out) = open(true);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        terminal.handle(Signal::Winch, SignalHandler::callback(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        terminal.set_size(Size::new(100, 40)).unwrap();
        terminal.set_size(Size::new(100, 40)).unwrap();
        assert_eq!(terminal.size().unwrap(), Size::new(100, 40));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_direct_input_processing() {
        let (terminal, _tx, _out) = open(true);
        terminal.enter_raw_mode().unwrap();
        terminal.process_input(b"ab").unwrap();
        assert_eq!(terminal.read().unwrap(), ReadOutcome::Byte(b'a'));
        assert_eq!(terminal.read().unwrap(), ReadOutcome::Byte(b'b'));
    }
}
