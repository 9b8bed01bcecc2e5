//! Backends binding a [`Terminal`](crate::Terminal) to a concrete I/O
//! mechanism.
//!
//! - **posix**: a pty driven by termios syscalls or by the `stty` tool
//! - **windows**: the Windows console API, with key/mouse translation
//! - **stream**: any byte stream pair with a software line discipline
//!
//! ```text
//! Terminal
//! └── Backend
//!     ├── Posix   (Pty: NativePty | ExecPty, optional bridge pumps)
//!     ├── Windows (ConsoleHandle + input pump)
//!     └── Stream  (LineDiscipline + input pump)
//! ```

pub mod posix;
pub mod stream;
pub mod windows;

use crate::core::attributes::{Attributes, Size};
use crate::core::query::{Cursor, MouseTracking};
use crate::error::{Result, TerminalError};

pub use posix::PosixBackend;
pub use stream::StreamBackend;
pub use windows::WindowsBackend;

pub enum Backend {
    Posix(PosixBackend),
    Windows(WindowsBackend),
    Stream(StreamBackend),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Posix(b) => b.kind(),
            Backend::Windows(_) => "windows",
            Backend::Stream(_) => "stream",
        }
    }

    /// Whether this terminal is the process's own controlling terminal.
    pub fn is_system(&self) -> bool {
        match self {
            Backend::Posix(b) => b.is_system(),
            Backend::Windows(_) => true,
            Backend::Stream(_) => false,
        }
    }

    pub fn attributes(&self) -> Result<Attributes> {
        match self {
            Backend::Posix(b) => b.attributes(),
            Backend::Windows(b) => Ok(b.attributes()),
            Backend::Stream(b) => Ok(b.attributes()),
        }
    }

    pub fn set_attributes(&self, attributes: &Attributes) -> Result<()> {
        match self {
            Backend::Posix(b) => b.set_attributes(attributes),
            Backend::Windows(b) => b.set_attributes(attributes),
            Backend::Stream(b) => {
                b.set_attributes(attributes);
                Ok(())
            }
        }
    }

    pub fn size(&self) -> Result<Size> {
        match self {
            Backend::Posix(b) => b.size(),
            Backend::Windows(b) => b.size(),
            Backend::Stream(b) => Ok(b.size()),
        }
    }

    pub fn set_size(&self, size: Size) -> Result<()> {
        match self {
            Backend::Posix(b) => b.set_size(size),
            Backend::Windows(_) => Err(TerminalError::Unsupported("set_size on the Windows console")),
            Backend::Stream(b) => {
                b.set_size(size);
                Ok(())
            }
        }
    }

    pub fn can_pause_resume(&self) -> bool {
        match self {
            Backend::Posix(b) => b.can_pause_resume(),
            Backend::Windows(_) | Backend::Stream(_) => true,
        }
    }

    pub fn pause(&self, wait: bool) {
        match self {
            Backend::Posix(b) => b.pause(wait),
            Backend::Windows(b) => b.pause(wait),
            Backend::Stream(b) => b.pause(wait),
        }
    }

    pub fn resume(&self) -> Result<()> {
        match self {
            Backend::Posix(b) => b.resume(),
            Backend::Windows(b) => b.resume(),
            Backend::Stream(b) => b.resume(),
        }
    }

    pub fn paused(&self) -> bool {
        match self {
            Backend::Posix(b) => b.paused(),
            Backend::Windows(b) => b.paused(),
            Backend::Stream(b) => b.paused(),
        }
    }

    pub fn has_mouse_support(&self) -> bool {
        matches!(self, Backend::Windows(_))
    }

    /// Apply mouse tracking natively. Returns false when the caller
    /// should emit the escape sequences instead.
    pub fn track_mouse(&self, tracking: MouseTracking) -> Result<bool> {
        match self {
            Backend::Windows(b) => {
                b.track_mouse(tracking)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Apply focus tracking natively. Returns false when the caller
    /// should emit the escape sequences instead.
    pub fn track_focus(&self, enabled: bool) -> bool {
        match self {
            Backend::Windows(b) => {
                b.track_focus(enabled);
                true
            }
            _ => false,
        }
    }

    /// Cursor position known to the backend without a terminal query.
    pub fn cursor_position(&self) -> Result<Option<Cursor>> {
        match self {
            Backend::Windows(b) => b.cursor_position().map(Some),
            _ => Ok(None),
        }
    }

    /// Feed bytes through the software line discipline.
    pub fn process_input(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Backend::Stream(b) => b.process_input(bytes),
            Backend::Windows(b) => b.process_input(bytes),
            _ => Err(TerminalError::Unsupported("process_input without a software line discipline")),
        }
    }

    /// Stop pump threads as part of closing.
    pub fn stop(&self) {
        match self {
            Backend::Posix(b) => b.stop(),
            Backend::Windows(b) => b.stop(),
            Backend::Stream(b) => b.stop(),
        }
    }

    /// Put back whatever global state the terminal changed.
    pub fn restore(&self) -> Result<()> {
        match self {
            Backend::Posix(b) => b.restore(),
            Backend::Windows(b) => b.restore(),
            Backend::Stream(_) => Ok(()),
        }
    }

    /// Release OS resources and wake any blocked reader.
    pub fn release(&self) -> Result<()> {
        match self {
            Backend::Posix(b) => b.release(),
            Backend::Windows(b) => b.release(),
            Backend::Stream(b) => b.release(),
        }
    }
}
