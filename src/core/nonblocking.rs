//! Timed and peeking byte reads.
//!
//! [`NonBlockingReader`] is the single-consumer read contract every
//! backend implements. [`byte_queue`] builds the channel used when a pump
//! thread produces the bytes: pump threads hold [`QueueWriter`] clones,
//! the terminal owns the [`ByteQueue`].

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

/// Result of a single-byte read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Byte(u8),
    /// Nothing arrived within the timeout
    Expired,
    /// The source is exhausted or the terminal is closed
    Eof,
}

impl ReadOutcome {
    pub fn byte(self) -> Option<u8> {
        match self {
            ReadOutcome::Byte(b) => Some(b),
            _ => None,
        }
    }
}

pub trait NonBlockingReader: Send {
    /// Read or peek one byte.
    ///
    /// `timeout` of `None` blocks until data or end of input; a zero
    /// duration returns immediately. A peeked byte is returned again by
    /// the next read.
    fn read(&mut self, timeout: Option<Duration>, peek: bool) -> io::Result<ReadOutcome>;
}

enum Packet {
    Data(Vec<u8>),
    Eof,
}

/// Producer side of a [`ByteQueue`].
#[derive(Clone)]
pub struct QueueWriter {
    tx: Sender<Packet>,
}

impl QueueWriter {
    /// Queue bytes for the reader. Returns false once the reader is gone.
    pub fn write(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        self.tx.send(Packet::Data(bytes.to_vec())).is_ok()
    }

    /// Mark end of input. Bytes queued earlier are still delivered.
    pub fn close(&self) {
        let _ = self.tx.send(Packet::Eof);
    }
}

/// Consumer side: bytes produced by pump threads.
pub struct ByteQueue {
    rx: Receiver<Packet>,
    pending: VecDeque<u8>,
    eof: bool,
}

/// Create a connected writer/queue pair.
pub fn byte_queue() -> (QueueWriter, ByteQueue) {
    let (tx, rx) = mpsc::channel();
    (
        QueueWriter { tx },
        ByteQueue {
            rx,
            pending: VecDeque::new(),
            eof: false,
        },
    )
}

impl ByteQueue {
    fn accept(&mut self, packet: Packet) {
        match packet {
            Packet::Data(bytes) => self.pending.extend(bytes),
            Packet::Eof => self.eof = true,
        }
    }

    /// Number of bytes already received but not yet consumed.
    pub fn available(&mut self) -> usize {
        while let Ok(packet) = self.rx.try_recv() {
            self.accept(packet);
        }
        self.pending.len()
    }
}

impl NonBlockingReader for ByteQueue {
    fn read(&mut self, timeout: Option<Duration>, peek: bool) -> io::Result<ReadOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(&b) = self.pending.front() {
                if !peek {
                    self.pending.pop_front();
                }
                return Ok(ReadOutcome::Byte(b));
            }
            if self.eof {
                return Ok(ReadOutcome::Eof);
            }
            let packet = match deadline {
                None => self.rx.recv().ok(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        match self.rx.try_recv() {
                            Ok(packet) => Some(packet),
                            Err(TryRecvError::Empty) => return Ok(ReadOutcome::Expired),
                            Err(TryRecvError::Disconnected) => None,
                        }
                    } else {
                        match self.rx.recv_timeout(deadline - now) {
                            Ok(packet) => Some(packet),
                            Err(RecvTimeoutError::Timeout) => return Ok(ReadOutcome::Expired),
                            Err(RecvTimeoutError::Disconnected) => None,
                        }
                    }
                }
            };
            match packet {
                Some(packet) => self.accept(packet),
                // All writers dropped
                None => self.eof = true,
            }
        }
    }
}
