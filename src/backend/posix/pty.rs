//! Pty contract and the termios implementation.
//!
//! [`Pty`] is the attribute/size surface both POSIX strategies share.
//! [`NativePty`] maps [`Attributes`] onto `struct termios` through libc;
//! [`PtyReader`] is the timed reader over a tty file descriptor.

use crate::core::attributes::{Attributes, Size};
use crate::error::Result;

/// Attribute and size access to one pty endpoint.
pub trait Pty: Send + Sync {
    fn get_attr(&self) -> Result<Attributes>;
    fn set_attr(&self, attributes: &Attributes) -> Result<()>;
    fn get_size(&self) -> Result<Size>;
    fn set_size(&self, size: Size) -> Result<()>;
}

#[cfg(unix)]
pub use native::{open_pair, poll_readable, NativePty, PtyReader};

#[cfg(unix)]
mod native {
    use std::collections::VecDeque;
    use std::io;
    use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use tracing::debug;

    use super::Pty;
    use crate::core::attributes::{
        Attributes, ControlChar, ControlFlags, InputFlags, LocalFlags, OutputFlags, Size,
    };
    use crate::core::nonblocking::{NonBlockingReader, ReadOutcome};
    use crate::error::{Result, TerminalError};

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const VDISABLE: libc::cc_t = 0;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const VDISABLE: libc::cc_t = 0xff;

    /// Longest single wait, so a closed reader notices promptly.
    const POLL_SLICE: Duration = Duration::from_millis(100);

    macro_rules! flag_table {
        ($name:ident, $ty:ty, [$($(#[$meta:meta])* $flag:ident),* $(,)?]) => {
            const $name: &[($ty, libc::tcflag_t)] = &[
                $($(#[$meta])* (<$ty>::$flag, libc::$flag as libc::tcflag_t)),*
            ];
        };
    }

    flag_table!(INPUT, InputFlags, [
        IGNBRK, BRKINT, IGNPAR, PARMRK, INPCK, ISTRIP, INLCR, IGNCR, ICRNL, IXON, IXOFF, IXANY,
        IMAXBEL,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        IUTF8,
    ]);

    flag_table!(OUTPUT, OutputFlags, [
        OPOST, ONLCR, OCRNL, ONOCR, ONLRET,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        OFILL,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        OFDEL,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        NLDLY,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        TABDLY,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        CRDLY,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        FFDLY,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        BSDLY,
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
        VTDLY,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        OXTABS,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        ONOEOT,
    ]);

    flag_table!(CONTROL, ControlFlags, [
        CSTOPB, CREAD, PARENB, PARODD, HUPCL, CLOCAL,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        CIGNORE,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        CCTS_OFLOW,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        CRTS_IFLOW,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        CDTR_IFLOW,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        CDSR_OFLOW,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        CCAR_OFLOW,
    ]);

    flag_table!(LOCAL, LocalFlags, [
        ECHOKE, ECHOE, ECHOK, ECHO, ECHONL, ECHOPRT, ECHOCTL, ISIG, ICANON, IEXTEN, TOSTOP,
        FLUSHO, PENDIN, NOFLSH,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        ALTWERASE,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        EXTPROC,
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        NOKERNINFO,
    ]);

    const CHAR_SIZES: [(ControlFlags, libc::tcflag_t); 4] = [
        (ControlFlags::CS5, libc::CS5 as libc::tcflag_t),
        (ControlFlags::CS6, libc::CS6 as libc::tcflag_t),
        (ControlFlags::CS7, libc::CS7 as libc::tcflag_t),
        (ControlFlags::CS8, libc::CS8 as libc::tcflag_t),
    ];

    fn cc_index(cc: ControlChar) -> Option<usize> {
        Some(match cc {
            ControlChar::Eof => libc::VEOF,
            ControlChar::Eol => libc::VEOL,
            ControlChar::Eol2 => libc::VEOL2,
            ControlChar::Erase => libc::VERASE,
            ControlChar::WErase => libc::VWERASE,
            ControlChar::Kill => libc::VKILL,
            ControlChar::Reprint => libc::VREPRINT,
            ControlChar::Intr => libc::VINTR,
            ControlChar::Quit => libc::VQUIT,
            ControlChar::Susp => libc::VSUSP,
            ControlChar::Start => libc::VSTART,
            ControlChar::Stop => libc::VSTOP,
            ControlChar::LNext => libc::VLNEXT,
            ControlChar::Discard => libc::VDISCARD,
            ControlChar::Min => libc::VMIN,
            ControlChar::Time => libc::VTIME,
            #[cfg(any(target_os = "macos", target_os = "ios"))]
            ControlChar::DSusp => libc::VDSUSP,
            #[cfg(any(target_os = "macos", target_os = "ios"))]
            ControlChar::Status => libc::VSTATUS,
            #[cfg(not(any(target_os = "macos", target_os = "ios")))]
            ControlChar::DSusp | ControlChar::Status => return None,
        })
    }

    pub(super) fn from_termios(t: &libc::termios) -> Attributes {
        let mut attributes = Attributes::new();
        for &(flag, native) in INPUT {
            attributes.iflag.set(flag, t.c_iflag & native != 0);
        }
        for &(flag, native) in OUTPUT {
            attributes.oflag.set(flag, t.c_oflag & native != 0);
        }
        for &(flag, native) in CONTROL {
            attributes.cflag.set(flag, t.c_cflag & native != 0);
        }
        let size = t.c_cflag & libc::CSIZE as libc::tcflag_t;
        for (flag, native) in CHAR_SIZES {
            attributes.cflag.set(flag, size == native);
        }
        for &(flag, native) in LOCAL {
            attributes.lflag.set(flag, t.c_lflag & native != 0);
        }
        for cc in ControlChar::ALL {
            if let Some(i) = cc_index(cc) {
                let value = t.c_cc[i];
                let value = if !cc.is_count() && value == VDISABLE { None } else { Some(value) };
                attributes.set_control_char(cc, value);
            }
        }
        attributes
    }

    /// Write `attributes` over `t`, leaving bits we do not model alone.
    pub(super) fn apply_termios(attributes: &Attributes, t: &mut libc::termios) {
        fn assign(word: &mut libc::tcflag_t, native: libc::tcflag_t, on: bool) {
            if on {
                *word |= native;
            } else {
                *word &= !native;
            }
        }
        for &(flag, native) in INPUT {
            assign(&mut t.c_iflag, native, attributes.input(flag));
        }
        for &(flag, native) in OUTPUT {
            assign(&mut t.c_oflag, native, attributes.output(flag));
        }
        for &(flag, native) in CONTROL {
            assign(&mut t.c_cflag, native, attributes.control(flag));
        }
        if let Some(&(_, native)) = CHAR_SIZES.iter().rev().find(|(flag, _)| attributes.control(*flag)) {
            t.c_cflag = (t.c_cflag & !(libc::CSIZE as libc::tcflag_t)) | native;
        }
        for &(flag, native) in LOCAL {
            assign(&mut t.c_lflag, native, attributes.local(flag));
        }
        for cc in ControlChar::ALL {
            if let Some(i) = cc_index(cc) {
                t.c_cc[i] = match attributes.control_char(cc) {
                    Some(v) => v,
                    None if cc.is_count() => 0,
                    None => VDISABLE,
                };
            }
        }
    }

    /// termios access through a tty file descriptor.
    pub struct NativePty {
        fd: OwnedFd,
    }

    impl NativePty {
        /// Pty on a duplicate of `fd`, which must refer to a terminal.
        pub fn from_fd(fd: impl AsFd) -> Result<Self> {
            let fd = fd.as_fd().try_clone_to_owned()?;
            if unsafe { libc::isatty(fd.as_raw_fd()) } != 1 {
                return Err(TerminalError::Unsupported("file descriptor is not a terminal"));
            }
            Ok(Self { fd })
        }

        /// Pty for the process's standard input.
        pub fn system() -> Result<Self> {
            Self::from_fd(io::stdin())
        }

        pub fn raw_fd(&self) -> RawFd {
            self.fd.as_raw_fd()
        }

        pub fn try_clone_fd(&self) -> Result<OwnedFd> {
            Ok(self.fd.try_clone()?)
        }

        fn termios(&self) -> Result<libc::termios> {
            let mut t: libc::termios = unsafe { std::mem::zeroed() };
            if unsafe { libc::tcgetattr(self.raw_fd(), &mut t) } != 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(t)
        }
    }

    impl Pty for NativePty {
        fn get_attr(&self) -> Result<Attributes> {
            Ok(from_termios(&self.termios()?))
        }

        fn set_attr(&self, attributes: &Attributes) -> Result<()> {
            let mut t = self.termios()?;
            apply_termios(attributes, &mut t);
            if unsafe { libc::tcsetattr(self.raw_fd(), libc::TCSANOW, &t) } != 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(())
        }

        fn get_size(&self) -> Result<Size> {
            let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
            if unsafe { libc::ioctl(self.raw_fd(), libc::TIOCGWINSZ, &mut ws as *mut libc::winsize) } < 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(Size::new(ws.ws_col, ws.ws_row))
        }

        fn set_size(&self, size: Size) -> Result<()> {
            let ws = libc::winsize {
                ws_row: size.rows,
                ws_col: size.columns,
                ws_xpixel: 0,
                ws_ypixel: 0,
            };
            if unsafe { libc::ioctl(self.raw_fd(), libc::TIOCSWINSZ, &ws as *const libc::winsize) } < 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(())
        }
    }

    /// Open a new pseudoterminal, returning `(master, slave)`.
    pub fn open_pair() -> Result<(OwnedFd, OwnedFd)> {
        let mut master: libc::c_int = -1;
        let mut slave: libc::c_int = -1;
        let r = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if r != 0 {
            return Err(io::Error::last_os_error().into());
        }
        debug!("Opened pty pair (master {}, slave {})", master, slave);
        Ok(unsafe { (OwnedFd::from_raw_fd(master), OwnedFd::from_raw_fd(slave)) })
    }

    /// Wait up to `timeout` for `fd` to become readable.
    pub fn poll_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let r = unsafe { libc::poll(&mut pfd, 1, ms) };
        if r < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(e);
        }
        Ok(r > 0)
    }

    /// Timed reads from a tty descriptor.
    ///
    /// The descriptor is polled in short slices so that setting `closed`
    /// ends a blocked read.
    pub struct PtyReader {
        fd: OwnedFd,
        closed: Arc<AtomicBool>,
        pending: VecDeque<u8>,
    }

    impl PtyReader {
        pub fn new(fd: OwnedFd, closed: Arc<AtomicBool>) -> Self {
            Self {
                fd,
                closed,
                pending: VecDeque::new(),
            }
        }

        fn fill(&mut self) -> io::Result<Option<ReadOutcome>> {
            let mut buf = [0u8; 1024];
            let n = unsafe {
                libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n < 0 {
                let e = io::Error::last_os_error();
                return match e.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(None),
                    _ if e.raw_os_error() == Some(libc::EIO) => Ok(Some(ReadOutcome::Eof)),
                    _ => Err(e),
                };
            }
            if n == 0 {
                // End of file, or an EOF character on an empty canonical line
                return Ok(Some(ReadOutcome::Eof));
            }
            self.pending.extend(&buf[..n as usize]);
            Ok(None)
        }
    }

    impl NonBlockingReader for PtyReader {
        fn read(&mut self, timeout: Option<Duration>, peek: bool) -> io::Result<ReadOutcome> {
            let deadline = timeout.map(|t| Instant::now() + t);
            loop {
                if let Some(&b) = self.pending.front() {
                    if !peek {
                        self.pending.pop_front();
                    }
                    return Ok(ReadOutcome::Byte(b));
                }
                if self.closed.load(Ordering::SeqCst) {
                    return Ok(ReadOutcome::Eof);
                }
                let wait = match deadline {
                    None => POLL_SLICE,
                    Some(d) => d.saturating_duration_since(Instant::now()).min(POLL_SLICE),
                };
                if poll_readable(self.fd.as_raw_fd(), wait)? {
                    if let Some(outcome) = self.fill()? {
                        return Ok(outcome);
                    }
                    continue;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Ok(ReadOutcome::Expired);
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::native::{apply_termios, from_termios};
    use super::*;
    use crate::core::attributes::{ControlChar, ControlFlags, InputFlags, LocalFlags};
    use crate::core::nonblocking::{NonBlockingReader, ReadOutcome};
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_termios_mapping_round_trips() {
        let mut attrs = Attributes::new();
        attrs.iflag = InputFlags::ICRNL | InputFlags::IXON;
        attrs.lflag = LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG;
        attrs.cflag = ControlFlags::CS7 | ControlFlags::CREAD;
        attrs.set_control_char(ControlChar::Intr, Some(3));
        attrs.set_control_char(ControlChar::Min, Some(1));
        attrs.set_control_char(ControlChar::Time, Some(0));

        let mut t: libc::termios = unsafe { std::mem::zeroed() };
        apply_termios(&attrs, &mut t);
        let back = from_termios(&t);
        assert_eq!(back.iflag, attrs.iflag);
        assert_eq!(back.lflag, attrs.lflag);
        assert!(back.control(ControlFlags::CS7));
        assert!(!back.control(ControlFlags::CS8));
        assert_eq!(back.control_char(ControlChar::Intr), Some(3));
        assert_eq!(back.control_char(ControlChar::Erase), None);
        assert_eq!(back.control_char(ControlChar::Time), Some(0));
    }

    #[test]
    fn test_native_pty_on_openpty_pair() {
        let (master, slave) = open_pair().unwrap();
        let pty = NativePty::from_fd(&slave).unwrap();
        pty.set_size(Size::new(90, 33)).unwrap();
        assert_eq!(pty.get_size().unwrap(), Size::new(90, 33));

        let mut attrs = pty.get_attr().unwrap();
        attrs.make_raw();
        pty.set_attr(&attrs).unwrap();
        let read_back = pty.get_attr().unwrap();
        assert!(!read_back.local(LocalFlags::ICANON));
        assert_eq!(read_back.control_char(ControlChar::Min), Some(0));

        let closed = Arc::new(AtomicBool::new(false));
        let mut reader = PtyReader::new(pty.try_clone_fd().unwrap(), closed.clone());
        assert_eq!(reader.read(Some(Duration::ZERO), false).unwrap(), ReadOutcome::Expired);

        let mut master_file = std::fs::File::from(master);
        master_file.write_all(b"yo").unwrap();
        assert_eq!(reader.read(Some(Duration::from_secs(2)), true).unwrap(), ReadOutcome::Byte(b'y'));
        assert_eq!(reader.read(None, false).unwrap(), ReadOutcome::Byte(b'y'));
        assert_eq!(reader.read(None, false).unwrap(), ReadOutcome::Byte(b'o'));

        closed.store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(reader.read(None, false).unwrap(), ReadOutcome::Eof);
    }
}
