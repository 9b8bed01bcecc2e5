//! Line discipline settings.
//!
//! [`Attributes`] is a backend-neutral snapshot of what termios calls the
//! `c_iflag`, `c_oflag`, `c_cflag`, `c_lflag` words and the `c_cc` table.
//! Bit values are private to this crate; each backend maps them onto its
//! own representation.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Input processing flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct InputFlags: u32 {
        const IGNBRK   = 1 << 0;
        const BRKINT   = 1 << 1;
        const IGNPAR   = 1 << 2;
        const PARMRK   = 1 << 3;
        const INPCK    = 1 << 4;
        const ISTRIP   = 1 << 5;
        const INLCR    = 1 << 6;
        const IGNCR    = 1 << 7;
        const ICRNL    = 1 << 8;
        const IXON     = 1 << 9;
        const IXOFF    = 1 << 10;
        const IXANY    = 1 << 11;
        const IMAXBEL  = 1 << 12;
        const IUTF8    = 1 << 13;
        /// Map a lone CR to NL and swallow the LF of a CR LF pair.
        const INORMEOL = 1 << 14;
    }
}

bitflags! {
    /// Output processing flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OutputFlags: u32 {
        const OPOST  = 1 << 0;
        const ONLCR  = 1 << 1;
        const OXTABS = 1 << 2;
        const ONOEOT = 1 << 3;
        const OCRNL  = 1 << 4;
        const ONOCR  = 1 << 5;
        const ONLRET = 1 << 6;
        const OFILL  = 1 << 7;
        const NLDLY  = 1 << 8;
        const TABDLY = 1 << 9;
        const CRDLY  = 1 << 10;
        const FFDLY  = 1 << 11;
        const BSDLY  = 1 << 12;
        const VTDLY  = 1 << 13;
        const OFDEL  = 1 << 14;
    }
}

bitflags! {
    /// Hardware control flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u32 {
        const CIGNORE    = 1 << 0;
        const CS5        = 1 << 1;
        const CS6        = 1 << 2;
        const CS7        = 1 << 3;
        const CS8        = 1 << 4;
        const CSTOPB     = 1 << 5;
        const CREAD      = 1 << 6;
        const PARENB     = 1 << 7;
        const PARODD     = 1 << 8;
        const HUPCL      = 1 << 9;
        const CLOCAL     = 1 << 10;
        const CCTS_OFLOW = 1 << 11;
        const CRTS_IFLOW = 1 << 12;
        const CDTR_IFLOW = 1 << 13;
        const CDSR_OFLOW = 1 << 14;
        const CCAR_OFLOW = 1 << 15;
    }
}

bitflags! {
    /// Local mode flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LocalFlags: u32 {
        const ECHOKE     = 1 << 0;
        const ECHOE      = 1 << 1;
        const ECHOK      = 1 << 2;
        const ECHO       = 1 << 3;
        const ECHONL     = 1 << 4;
        const ECHOPRT    = 1 << 5;
        const ECHOCTL    = 1 << 6;
        const ISIG       = 1 << 7;
        const ICANON     = 1 << 8;
        const ALTWERASE  = 1 << 9;
        const IEXTEN     = 1 << 10;
        const EXTPROC    = 1 << 11;
        const TOSTOP     = 1 << 12;
        const FLUSHO     = 1 << 13;
        const NOKERNINFO = 1 << 14;
        const PENDIN     = 1 << 15;
        const NOFLSH     = 1 << 16;
    }
}

/// Symbolic slots of the control character table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlChar {
    Eof,
    Eol,
    Eol2,
    Erase,
    WErase,
    Kill,
    Reprint,
    Intr,
    Quit,
    Susp,
    DSusp,
    Start,
    Stop,
    LNext,
    Discard,
    /// Minimum byte count for a non-canonical read
    Min,
    /// Non-canonical read timeout, in tenths of a second
    Time,
    Status,
}

impl ControlChar {
    pub const ALL: [ControlChar; 18] = [
        ControlChar::Eof,
        ControlChar::Eol,
        ControlChar::Eol2,
        ControlChar::Erase,
        ControlChar::WErase,
        ControlChar::Kill,
        ControlChar::Reprint,
        ControlChar::Intr,
        ControlChar::Quit,
        ControlChar::Susp,
        ControlChar::DSusp,
        ControlChar::Start,
        ControlChar::Stop,
        ControlChar::LNext,
        ControlChar::Discard,
        ControlChar::Min,
        ControlChar::Time,
        ControlChar::Status,
    ];

    /// The name `stty` uses for this slot.
    pub fn name(self) -> &'static str {
        match self {
            ControlChar::Eof => "eof",
            ControlChar::Eol => "eol",
            ControlChar::Eol2 => "eol2",
            ControlChar::Erase => "erase",
            ControlChar::WErase => "werase",
            ControlChar::Kill => "kill",
            ControlChar::Reprint => "reprint",
            ControlChar::Intr => "intr",
            ControlChar::Quit => "quit",
            ControlChar::Susp => "susp",
            ControlChar::DSusp => "dsusp",
            ControlChar::Start => "start",
            ControlChar::Stop => "stop",
            ControlChar::LNext => "lnext",
            ControlChar::Discard => "discard",
            ControlChar::Min => "min",
            ControlChar::Time => "time",
            ControlChar::Status => "status",
        }
    }

    /// MIN and TIME hold counts rather than characters.
    pub fn is_count(self) -> bool {
        matches!(self, ControlChar::Min | ControlChar::Time)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Terminal window size in character cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub columns: u16,
    pub rows: u16,
}

impl Size {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

/// Snapshot of line discipline configuration.
///
/// `None` in the control character table means the slot is disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    pub iflag: InputFlags,
    pub oflag: OutputFlags,
    pub cflag: ControlFlags,
    pub lflag: LocalFlags,
    cc: [Option<u8>; 18],
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control_char(&self, c: ControlChar) -> Option<u8> {
        self.cc[c.index()]
    }

    pub fn set_control_char(&mut self, c: ControlChar, value: Option<u8>) {
        self.cc[c.index()] = value;
    }

    /// Whether `byte` is the value configured for `c`.
    pub fn is_char(&self, c: ControlChar, byte: u8) -> bool {
        !c.is_count() && self.cc[c.index()] == Some(byte)
    }

    pub fn input(&self, flag: InputFlags) -> bool {
        self.iflag.contains(flag)
    }

    pub fn output(&self, flag: OutputFlags) -> bool {
        self.oflag.contains(flag)
    }

    pub fn control(&self, flag: ControlFlags) -> bool {
        self.cflag.contains(flag)
    }

    pub fn local(&self, flag: LocalFlags) -> bool {
        self.lflag.contains(flag)
    }

    /// Switch to raw mode in place.
    ///
    /// Clears canonical input, echo, extended processing, signal generation
    /// and input translation, and makes reads return after at most one
    /// tenth of a second.
    pub fn make_raw(&mut self) {
        self.lflag
            .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::IEXTEN | LocalFlags::ISIG);
        self.iflag.remove(InputFlags::IXON | InputFlags::ICRNL | InputFlags::INLCR);
        self.cc[ControlChar::Min.index()] = Some(0);
        self.cc[ControlChar::Time.index()] = Some(1);
    }

    /// Iterate over every control character slot.
    pub fn control_chars(&self) -> impl Iterator<Item = (ControlChar, Option<u8>)> + '_ {
        ControlChar::ALL.iter().map(move |&c| (c, self.cc[c.index()]))
    }
}

/// Render a control character value the way `stty` prints it.
pub fn display_control_char(c: ControlChar, value: Option<u8>) -> String {
    match value {
        None => "<undef>".to_string(),
        Some(v) if c.is_count() => v.to_string(),
        Some(v) => caret_notation(v),
    }
}

/// `^C`, `^?`, `M-a` style rendering of a byte.
pub fn caret_notation(byte: u8) -> String {
    let mut out = String::new();
    let mut b = byte;
    if b >= 128 {
        out.push_str("M-");
        b -= 128;
    }
    if b == 127 {
        out.push_str("^?");
    } else if b < 32 {
        out.push('^');
        out.push((b + b'@') as char);
    } else {
        out.push(b as char);
    }
    out
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names<I: Iterator<Item = (&'static str, u32)>>(iter: I) -> String {
            iter.map(|(n, _)| n.to_lowercase()).collect::<Vec<_>>().join(" ")
        }
        writeln!(f, "iflags: {}", names(self.iflag.iter_names().map(|(n, v)| (n, v.bits()))))?;
        writeln!(f, "oflags: {}", names(self.oflag.iter_names().map(|(n, v)| (n, v.bits()))))?;
        writeln!(f, "cflags: {}", names(self.cflag.iter_names().map(|(n, v)| (n, v.bits()))))?;
        writeln!(f, "lflags: {}", names(self.lflag.iter_names().map(|(n, v)| (n, v.bits()))))?;
        let cchars = self
            .control_chars()
            .map(|(c, v)| format!("{} = {}", c.name(), display_control_char(c, v)))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "cchars: {};", cchars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_mode_clears_cooked_flags() {
        let mut attrs = Attributes::new();
        attrs.lflag = LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::IEXTEN | LocalFlags::ISIG | LocalFlags::ECHOE;
        attrs.iflag = InputFlags::ICRNL | InputFlags::IXON | InputFlags::INLCR | InputFlags::IUTF8;
        attrs.set_control_char(ControlChar::Min, Some(1));
        attrs.set_control_char(ControlChar::Intr, Some(3));

        attrs.make_raw();

        assert_eq!(attrs.lflag, LocalFlags::ECHOE);
        assert_eq!(attrs.iflag, InputFlags::IUTF8);
        assert_eq!(attrs.control_char(ControlChar::Min), Some(0));
        assert_eq!(attrs.control_char(ControlChar::Time), Some(1));
        assert_eq!(attrs.control_char(ControlChar::Intr), Some(3));
    }

    #[test]
    fn test_is_char_ignores_counts() {
        let mut attrs = Attributes::new();
        attrs.set_control_char(ControlChar::Min, Some(3));
        attrs.set_control_char(ControlChar::Intr, Some(3));
        assert!(attrs.is_char(ControlChar::Intr, 3));
        assert!(!attrs.is_char(ControlChar::Min, 3));
        assert!(!attrs.is_char(ControlChar::Quit, 3));
    }

    #[test]
    fn test_caret_notation() {
        assert_eq!(caret_notation(3), "^C");
        assert_eq!(caret_notation(127), "^?");
        assert_eq!(caret_notation(b'a'), "a");
        assert_eq!(caret_notation(0x81), "M-^A");
        assert_eq!(display_control_char(ControlChar::Time, Some(5)), "5");
        assert_eq!(display_control_char(ControlChar::Eol, None), "<undef>");
    }

    #[test]
    fn test_display_lists_flags() {
        let mut attrs = Attributes::new();
        attrs.lflag = LocalFlags::ICANON | LocalFlags::ECHO;
        attrs.set_control_char(ControlChar::Intr, Some(3));
        let text = attrs.to_string();
        assert!(text.contains("lflags: echo icanon"));
        assert!(text.contains("intr = ^C"));
    }
}
