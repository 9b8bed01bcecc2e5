//! Backend-independent terminal machinery.
//!
//! - **attributes**: termios-style flags, control characters and size
//! - **capabilities**: terminal descriptions and capability lookup
//! - **tparm**: the terminfo parameter language
//! - **discipline**: software line discipline for backends without one
//! - **signals** / **native_signals**: per-terminal and process-wide
//!   signal delivery
//! - **nonblocking** / **pump**: timed reads and the threads that feed them
//! - **query**: cursor position replies and mouse reports
//! - **terminal**: the [`Terminal`](terminal::Terminal) every backend
//!   is wrapped in
//!
//! # Architecture
//!
//! ```text
//! Terminal
//! ├── CapabilityStore (puts, cursor/mouse queries)
//! ├── SignalTable     (handlers, raise)
//! ├── NonBlockingReader
//! └── Backend
//!     ├── Pump threads
//!     └── LineDiscipline (stream and console backends)
//! ```

pub mod attributes;
pub mod capabilities;
pub mod discipline;
pub mod native_signals;
pub mod nonblocking;
pub mod pump;
pub mod query;
pub mod signals;
pub mod terminal;
pub mod tparm;
