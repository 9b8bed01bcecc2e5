//! Process-wide OS signal registration.
//!
//! Every signal keeps a stack of registrations; the most recent one
//! receives deliveries. A default registration hands the signal back to
//! the platform's own default action.
//!
//! On Unix delivery runs on a `signal-hook` iterator thread. On Windows
//! only INT is supported, through `ctrlc`.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use tracing::{debug, trace, warn};

use super::signals::{Signal, SignalCallback};

/// Identifies one registration.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SignalToken {
    signal: Signal,
    id: u64,
}

impl SignalToken {
    pub fn signal(&self) -> Signal {
        self.signal
    }
}

#[derive(Clone)]
enum Action {
    Callback(SignalCallback),
    Default,
}

struct Entry {
    id: u64,
    action: Action,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    stacks: HashMap<Signal, Vec<Entry>>,
    #[cfg(unix)]
    handle: Option<signal_hook::iterator::Handle>,
    #[cfg(unix)]
    installed: std::collections::HashSet<i32>,
    #[cfg(windows)]
    ctrlc_installed: bool,
}

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(|| Mutex::new(Registry::default()));

/// Route `signal` to `callback` until the token is unregistered.
///
/// Returns `None` when the platform cannot deliver this signal.
pub fn register(signal: Signal, callback: SignalCallback) -> Option<SignalToken> {
    push(signal, Action::Callback(callback))
}

/// Restore the platform default action for `signal` until unregistered.
pub fn register_default(signal: Signal) -> Option<SignalToken> {
    push(signal, Action::Default)
}

/// Remove a registration. Tokens may be released in any order.
pub fn unregister(token: SignalToken) {
    let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(stack) = registry.stacks.get_mut(&token.signal) {
        stack.retain(|entry| entry.id != token.id);
    }
    trace!("Unregistered native {} handler {}", token.signal, token.id);
}

fn push(signal: Signal, action: Action) -> Option<SignalToken> {
    let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    if !platform::install(&mut registry, signal) {
        trace!("Native {} is not supported on this platform", signal);
        return None;
    }
    registry.next_id += 1;
    let id = registry.next_id;
    registry.stacks.entry(signal).or_default().push(Entry { id, action });
    debug!("Registered native {} handler {}", signal, id);
    Some(SignalToken { signal, id })
}

/// Deliver a signal observed by the platform layer.
fn dispatch(signal: Signal) {
    let action = {
        let registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .stacks
            .get(&signal)
            .and_then(|stack| stack.last())
            .map(|entry| entry.action.clone())
    };
    match action {
        Some(Action::Callback(callback)) => callback(signal),
        Some(Action::Default) | None => platform::emulate_default(signal),
    }
}

#[cfg(unix)]
mod platform {
    use super::*;
    use signal_hook::iterator::Signals;

    pub(super) fn raw(signal: Signal) -> Option<i32> {
        match signal {
            Signal::Int => Some(libc::SIGINT),
            Signal::Quit => Some(libc::SIGQUIT),
            Signal::Tstp => Some(libc::SIGTSTP),
            Signal::Cont => Some(libc::SIGCONT),
            Signal::Winch => Some(libc::SIGWINCH),
            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            Signal::Info => Some(libc::SIGINFO),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    fn from_raw(raw_signal: i32) -> Option<Signal> {
        Signal::ALL.iter().copied().find(|&s| raw(s) == Some(raw_signal))
    }

    pub(super) fn install(registry: &mut Registry, signal: Signal) -> bool {
        let Some(sig) = raw(signal) else {
            return false;
        };
        if registry.installed.contains(&sig) {
            return true;
        }
        if registry.handle.is_none() {
            let mut signals = match Signals::new(std::iter::empty::<i32>()) {
                Ok(signals) => signals,
                Err(e) => {
                    warn!("Unable to start signal delivery thread: {}", e);
                    return false;
                }
            };
            registry.handle = Some(signals.handle());
            let spawned = std::thread::Builder::new()
                .name("polyterm-signals".to_string())
                .spawn(move || {
                    for sig in signals.forever() {
                        if let Some(signal) = from_raw(sig) {
                            dispatch(signal);
                        }
                    }
                });
            if let Err(e) = spawned {
                warn!("Unable to spawn signal delivery thread: {}", e);
                registry.handle = None;
                return false;
            }
        }
        let Some(handle) = registry.handle.as_ref() else {
            return false;
        };
        match handle.add_signal(sig) {
            Ok(()) => {
                registry.installed.insert(sig);
                true
            }
            Err(e) => {
                warn!("Unable to register native {}: {}", signal, e);
                false
            }
        }
    }

    pub(super) fn emulate_default(signal: Signal) {
        if let Some(sig) = raw(signal) {
            if let Err(e) = signal_hook::low_level::emulate_default_handler(sig) {
                warn!("Unable to apply default action for {}: {}", signal, e);
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::*;

    pub(super) fn install(registry: &mut Registry, signal: Signal) -> bool {
        if signal != Signal::Int {
            return false;
        }
        if registry.ctrlc_installed {
            return true;
        }
        match ctrlc::set_handler(|| dispatch(Signal::Int)) {
            Ok(()) => {
                registry.ctrlc_installed = true;
                true
            }
            Err(e) => {
                warn!("Unable to install Ctrl+C handler: {}", e);
                false
            }
        }
    }

    pub(super) fn emulate_default(signal: Signal) {
        if signal == Signal::Int {
            // STATUS_CONTROL_C_EXIT
            std::process::exit(0xC000013Au32 as i32);
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use super::*;

    pub(super) fn install(_registry: &mut Registry, _signal: Signal) -> bool {
        false
    }

    pub(super) fn emulate_default(_signal: Signal) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn top_is_callback(signal: Signal) -> Option<bool> {
        let registry = REGISTRY.lock().unwrap();
        registry
            .stacks
            .get(&signal)
            .and_then(|s| s.last())
            .map(|e| matches!(e.action, Action::Callback(_)))
    }

    #[cfg(unix)]
    #[test]
    fn test_stack_order_and_out_of_order_release() {
        let first = register(Signal::Cont, Arc::new(|_| {})).unwrap();
        let second = register_default(Signal::Cont).unwrap();
        assert_eq!(top_is_callback(Signal::Cont), Some(false));

        unregister(first);
        assert_eq!(top_is_callback(Signal::Cont), Some(false));
        unregister(second);
        assert_eq!(top_is_callback(Signal::Cont), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_native_winch_delivery() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let token = register(Signal::Winch, Arc::new(move |s| {
            assert_eq!(s, Signal::Winch);
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        unsafe {
            libc::raise(libc::SIGWINCH);
        }
        for _ in 0..100 {
            if count.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        unregister(token);
    }

    #[cfg(windows)]
    #[test]
    fn test_only_int_on_windows() {
        assert!(register_default(Signal::Winch).is_none());
    }
}
