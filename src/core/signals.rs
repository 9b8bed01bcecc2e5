//! Per-terminal signal handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Signals a terminal can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    /// Interrupt (Ctrl+C)
    Int,
    /// Quit (Ctrl+\)
    Quit,
    /// Terminal stop (Ctrl+Z)
    Tstp,
    /// Continue after stop
    Cont,
    /// Status request (Ctrl+T)
    Info,
    /// Window size change
    Winch,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::Int,
        Signal::Quit,
        Signal::Tstp,
        Signal::Cont,
        Signal::Info,
        Signal::Winch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Tstp => "TSTP",
            Signal::Cont => "CONT",
            Signal::Info => "INFO",
            Signal::Winch => "WINCH",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback invoked when a signal is raised.
pub type SignalCallback = Arc<dyn Fn(Signal) + Send + Sync>;

/// What to do with a signal.
#[derive(Clone, Default)]
pub enum SignalHandler {
    /// Built-in reaction
    #[default]
    Default,
    /// Drop the signal
    Ignore,
    Callback(SignalCallback),
}

impl SignalHandler {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        SignalHandler::Callback(Arc::new(f))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, SignalHandler::Default)
    }
}

impl fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalHandler::Default => f.write_str("Default"),
            SignalHandler::Ignore => f.write_str("Ignore"),
            SignalHandler::Callback(_) => f.write_str("Callback"),
        }
    }
}

impl PartialEq for SignalHandler {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SignalHandler::Default, SignalHandler::Default) => true,
            (SignalHandler::Ignore, SignalHandler::Ignore) => true,
            (SignalHandler::Callback(a), SignalHandler::Callback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Signal to handler map shared between a terminal and its threads.
///
/// Handlers run on the thread that raised the signal, outside the lock.
pub struct SignalTable {
    handlers: Mutex<HashMap<Signal, SignalHandler>>,
    /// Built-in reaction to WINCH under the default handler
    on_winch: Mutex<Option<SignalCallback>>,
}

impl SignalTable {
    pub fn new() -> Self {
        let handlers = Signal::ALL.iter().map(|&s| (s, SignalHandler::Default)).collect();
        Self {
            handlers: Mutex::new(handlers),
            on_winch: Mutex::new(None),
        }
    }

    /// Install `handler` for `signal`, returning the previous one.
    pub fn handle(&self, signal: Signal, handler: SignalHandler) -> SignalHandler {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.insert(signal, handler).unwrap_or_default()
    }

    pub fn handler(&self, signal: Signal) -> SignalHandler {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.get(&signal).cloned().unwrap_or_default()
    }

    /// Set the reaction of the default WINCH handler.
    pub fn set_default_winch(&self, callback: Option<SignalCallback>) {
        *self.on_winch.lock().unwrap_or_else(|e| e.into_inner()) = callback;
    }

    /// Deliver `signal` synchronously on the calling thread.
    pub fn raise(&self, signal: Signal) {
        let handler = self.handler(signal);
        debug!("Raising {} ({:?})", signal, handler);
        match handler {
            SignalHandler::Default => {
                if signal == Signal::Winch {
                    let hook = self.on_winch.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    if let Some(hook) = hook {
                        hook(signal);
                    }
                }
            }
            SignalHandler::Ignore => {}
            SignalHandler::Callback(callback) => callback(signal),
        }
    }
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}
