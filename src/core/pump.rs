//! Pausable background pump threads.
//!
//! A [`Pump`] owns at most one live thread running a copy loop. The
//! `paused` flag and the thread handle share one lock. A thread keeps its
//! handle until its body has returned, and [`Pump::resume`] waits out any
//! join in progress, so a new thread never overlaps the previous one.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::debug;

struct PumpState {
    paused: bool,
    thread: Option<JoinHandle<()>>,
    /// A `pause(true)` is joining the previous thread
    joining: bool,
    /// Incremented for every spawned thread
    generation: u64,
}

struct Shared {
    state: Mutex<PumpState>,
    joined: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PumpState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until no join is in progress.
    fn wait_joined<'a>(&self, mut state: MutexGuard<'a, PumpState>) -> MutexGuard<'a, PumpState> {
        while state.joining {
            state = self.joined.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state
    }
}

type PumpBody = Arc<dyn Fn(&PumpTicket) + Send + Sync>;

pub struct Pump {
    name: String,
    shared: Arc<Shared>,
    body: PumpBody,
}

/// Handed to the pump body; tells the loop when to stop.
pub struct PumpTicket {
    shared: Arc<Shared>,
    generation: u64,
}

impl PumpTicket {
    /// Check between reads. Returns false once paused or superseded.
    pub fn keep_running(&self) -> bool {
        let state = self.shared.lock();
        state.generation == self.generation && !state.paused
    }
}

/// Dropped when the body returns; the thread gives up its handle.
impl Drop for PumpTicket {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.generation == self.generation {
            state.thread = None;
        }
    }
}

impl Pump {
    /// Create a pump; no thread runs until [`Pump::resume`].
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&PumpTicket) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(PumpState {
                    paused: true,
                    thread: None,
                    joining: false,
                    generation: 0,
                }),
                joined: Condvar::new(),
            }),
            body: Arc::new(body),
        }
    }

    /// Clear the pause flag and start a thread if none is alive.
    ///
    /// A thread that is still running (paused without waiting but not yet
    /// at its next check) simply carries on.
    pub fn resume(&self) -> io::Result<()> {
        let mut state = self.shared.wait_joined(self.shared.lock());
        state.paused = false;
        if state.thread.is_some() {
            return Ok(());
        }
        state.generation += 1;
        let ticket = PumpTicket {
            shared: self.shared.clone(),
            generation: state.generation,
        };
        let body = self.body.clone();
        debug!("Starting {} pump (generation {})", self.name, state.generation);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || body(&ticket))?;
        state.thread = Some(handle);
        Ok(())
    }

    /// Ask the thread to stop. With `wait`, block until it has exited.
    ///
    /// Called from the pump thread itself, `wait` only sets the flag.
    pub fn pause(&self, wait: bool) {
        let handle = {
            let mut state = self.shared.lock();
            state.paused = true;
            if !wait {
                return;
            }
            let own = state
                .thread
                .as_ref()
                .is_some_and(|h| h.thread().id() == thread::current().id());
            if own {
                return;
            }
            let mut state = self.shared.wait_joined(state);
            state.paused = true;
            match state.thread.take() {
                Some(handle) => {
                    state.joining = true;
                    handle
                }
                None => return,
            }
        };
        if handle.join().is_err() {
            debug!("{} pump panicked", self.name);
        }
        debug!("Stopped {} pump", self.name);
        self.shared.lock().joining = false;
        self.shared.joined.notify_all();
    }

    pub fn paused(&self) -> bool {
        self.shared.lock().paused
    }

    /// Whether a pump thread is alive or being joined.
    pub fn is_running(&self) -> bool {
        let state = self.shared.lock();
        state.thread.is_some() || state.joining
    }

    /// Number of threads started so far.
    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }
}

/// A thread still blocked in a read is left to exit on its own.
impl Drop for Pump {
    fn drop(&mut self) {
        self.pause(false);
    }
}
