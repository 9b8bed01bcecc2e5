//! Terminal capability lookup.
//!
//! A [`CapabilityStore`] holds the boolean, numeric and string
//! capabilities of one terminal type. Descriptions come from a
//! [`CapabilitySource`]: the built-in table or the system `infocmp`.
//! Resolution never fails; an unknown type gets the `ansi` description.

use std::collections::{HashMap, HashSet};
use std::process::Command;

use tracing::{debug, warn};

use super::tparm::{tparm, Param};

/// Value type of a capability
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityKind {
    Bool,
    Int,
    Str,
}

macro_rules! capabilities {
    ($($variant:ident => $name:literal, $kind:ident;)*) => {
        /// Known capabilities, by terminfo short name.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Capability {
            $($variant,)*
        }

        impl Capability {
            pub const ALL: &'static [Capability] = &[$(Capability::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Capability::$variant => $name,)*
                }
            }

            pub fn kind(self) -> CapabilityKind {
                match self {
                    $(Capability::$variant => CapabilityKind::$kind,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Capability::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

capabilities! {
    AutoRightMargin => "am", Bool;
    BackColorErase => "bce", Bool;
    EatNewlineGlitch => "xenl", Bool;
    HasMetaKey => "km", Bool;
    MoveInsertMode => "mir", Bool;
    MoveStandoutMode => "msgr", Bool;
    XonXoff => "xon", Bool;
    CanChange => "ccc", Bool;
    GenericType => "gn", Bool;
    HardCopy => "hc", Bool;

    Columns => "cols", Int;
    Lines => "lines", Int;
    MaxColors => "colors", Int;
    MaxPairs => "pairs", Int;
    InitTabs => "it", Int;
    NoColorVideo => "ncv", Int;

    Bell => "bel", Str;
    CarriageReturn => "cr", Str;
    Newline => "nel", Str;
    Tab => "ht", Str;
    BackTab => "cbt", Str;
    ClearScreen => "clear", Str;
    ClrEol => "el", Str;
    ClrBol => "el1", Str;
    ClrEos => "ed", Str;
    CursorAddress => "cup", Str;
    CursorHome => "home", Str;
    CursorUp => "cuu1", Str;
    CursorDown => "cud1", Str;
    CursorLeft => "cub1", Str;
    CursorRight => "cuf1", Str;
    ParmUpCursor => "cuu", Str;
    ParmDownCursor => "cud", Str;
    ParmLeftCursor => "cub", Str;
    ParmRightCursor => "cuf", Str;
    ColumnAddress => "hpa", Str;
    RowAddress => "vpa", Str;
    CursorInvisible => "civis", Str;
    CursorNormal => "cnorm", Str;
    CursorVisible => "cvvis", Str;
    SaveCursor => "sc", Str;
    RestoreCursor => "rc", Str;
    DeleteCharacter => "dch1", Str;
    ParmDch => "dch", Str;
    ParmIch => "ich", Str;
    DeleteLine => "dl1", Str;
    ParmDeleteLine => "dl", Str;
    InsertLine => "il1", Str;
    ParmInsertLine => "il", Str;
    EraseChars => "ech", Str;
    ChangeScrollRegion => "csr", Str;
    ScrollForward => "ind", Str;
    ScrollReverse => "ri", Str;
    ParmIndex => "indn", Str;
    ParmRindex => "rin", Str;
    EnterAltCharsetMode => "smacs", Str;
    ExitAltCharsetMode => "rmacs", Str;
    EnterBlinkMode => "blink", Str;
    EnterBoldMode => "bold", Str;
    EnterDimMode => "dim", Str;
    EnterItalicsMode => "sitm", Str;
    ExitItalicsMode => "ritm", Str;
    EnterReverseMode => "rev", Str;
    EnterSecureMode => "invis", Str;
    EnterStandoutMode => "smso", Str;
    ExitStandoutMode => "rmso", Str;
    EnterUnderlineMode => "smul", Str;
    ExitUnderlineMode => "rmul", Str;
    ExitAttributeMode => "sgr0", Str;
    EnterCaMode => "smcup", Str;
    ExitCaMode => "rmcup", Str;
    EnterAmMode => "smam", Str;
    ExitAmMode => "rmam", Str;
    KeypadXmit => "smkx", Str;
    KeypadLocal => "rmkx", Str;
    FlashScreen => "flash", Str;
    OrigPair => "op", Str;
    SetAForeground => "setaf", Str;
    SetABackground => "setab", Str;
    SetForeground => "setf", Str;
    SetBackground => "setb", Str;
    KeyBackspace => "kbs", Str;
    KeyBtab => "kcbt", Str;
    KeyDc => "kdch1", Str;
    KeyIc => "kich1", Str;
    KeyHome => "khome", Str;
    KeyEnd => "kend", Str;
    KeyPpage => "kpp", Str;
    KeyNpage => "knp", Str;
    KeyUp => "kcuu1", Str;
    KeyDown => "kcud1", Str;
    KeyLeft => "kcub1", Str;
    KeyRight => "kcuf1", Str;
    KeyEnter => "kent", Str;
    KeyF1 => "kf1", Str;
    KeyF2 => "kf2", Str;
    KeyF3 => "kf3", Str;
    KeyF4 => "kf4", Str;
    KeyF5 => "kf5", Str;
    KeyF6 => "kf6", Str;
    KeyF7 => "kf7", Str;
    KeyF8 => "kf8", Str;
    KeyF9 => "kf9", Str;
    KeyF10 => "kf10", Str;
    KeyF11 => "kf11", Str;
    KeyF12 => "kf12", Str;
    KeyMouse => "kmous", Str;
    User6 => "u6", Str;
    User7 => "u7", Str;
    User8 => "u8", Str;
    User9 => "u9", Str;
}

/// Boolean, numeric and string capabilities of one terminal type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityStore {
    names: Vec<String>,
    bools: HashSet<Capability>,
    ints: HashMap<Capability, i32>,
    strings: HashMap<Capability, String>,
}

impl CapabilityStore {
    /// Parse a description in terminfo source form, as printed by `infocmp`.
    ///
    /// Unknown capability names and cancelled (`name@`) entries are skipped.
    pub fn parse(source: &str) -> Self {
        let body: String = source
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n");

        let mut store = CapabilityStore::default();
        let mut fields = split_fields(&body).into_iter();
        if let Some(header) = fields.next() {
            store.names = header.trim().split('|').map(|s| s.trim().to_string()).collect();
        }

        for field in fields {
            let field = field.trim();
            if field.is_empty() || field.ends_with('@') {
                continue;
            }
            let eq = field.find('=');
            let hash = field.find('#');
            match (eq, hash) {
                (Some(e), h) if h.map_or(true, |h| e < h) => {
                    if let Some(cap) = lookup(&field[..e], CapabilityKind::Str) {
                        store.strings.insert(cap, field[e + 1..].to_string());
                    }
                }
                (_, Some(h)) => {
                    if let (Some(cap), Some(value)) =
                        (lookup(&field[..h], CapabilityKind::Int), parse_number(&field[h + 1..]))
                    {
                        store.ints.insert(cap, value);
                    }
                }
                _ => {
                    if let Some(cap) = lookup(field, CapabilityKind::Bool) {
                        store.bools.insert(cap);
                    }
                }
            }
        }
        store
    }

    /// Primary terminal name of the description.
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.bools.is_empty() && self.ints.is_empty() && self.strings.is_empty()
    }

    pub fn get_bool(&self, cap: Capability) -> bool {
        self.bools.contains(&cap)
    }

    pub fn get_int(&self, cap: Capability) -> Option<i32> {
        self.ints.get(&cap).copied()
    }

    /// Raw template of a string capability.
    pub fn get_string(&self, cap: Capability) -> Option<&str> {
        self.strings.get(&cap).map(String::as_str)
    }

    /// Expand a string capability with parameters.
    pub fn render(&self, cap: Capability, params: &[Param]) -> Option<Vec<u8>> {
        self.get_string(cap).map(|template| tparm(template, params))
    }

    pub fn bools(&self) -> impl Iterator<Item = Capability> + '_ {
        self.bools.iter().copied()
    }

    pub fn ints(&self) -> impl Iterator<Item = (Capability, i32)> + '_ {
        self.ints.iter().map(|(c, v)| (*c, *v))
    }

    pub fn strings(&self) -> impl Iterator<Item = (Capability, &str)> + '_ {
        self.strings.iter().map(|(c, v)| (*c, v.as_str()))
    }
}

fn lookup(name: &str, kind: CapabilityKind) -> Option<Capability> {
    Capability::from_name(name.trim()).filter(|cap| cap.kind() == kind)
}

fn parse_number(text: &str) -> Option<i32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i32::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        i32::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// Split on commas that are not escaped with a backslash.
fn split_fields(body: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        fields.push(current);
    }
    fields
}

/// Where terminal descriptions come from.
pub trait CapabilitySource {
    /// Description text for `term_type`, or `None` when unknown.
    fn lookup(&self, term_type: &str) -> Option<String>;
}

/// Descriptions compiled into the crate.
pub struct BuiltinSource;

impl CapabilitySource for BuiltinSource {
    fn lookup(&self, term_type: &str) -> Option<String> {
        builtin(term_type).map(str::to_string)
    }
}

/// Descriptions obtained by running `infocmp -x <type>`.
pub struct InfocmpSource {
    command: String,
}

impl InfocmpSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl CapabilitySource for InfocmpSource {
    fn lookup(&self, term_type: &str) -> Option<String> {
        let output = match Command::new(&self.command).arg("-x").arg(term_type).output() {
            Ok(output) => output,
            Err(e) => {
                debug!("Unable to run {}: {}", self.command, e);
                return None;
            }
        };
        if !output.status.success() {
            debug!("{} -x {} exited with {}", self.command, term_type, output.status);
            return None;
        }
        String::from_utf8(output.stdout).ok()
    }
}

/// Resolve the description of `term_type` from the first source that knows it.
///
/// Falls back to the built-in `ansi` description and logs a warning.
pub fn resolve(term_type: &str, sources: &[&dyn CapabilitySource]) -> CapabilityStore {
    for source in sources {
        if let Some(text) = source.lookup(term_type) {
            let store = CapabilityStore::parse(&text);
            if !store.is_empty() {
                debug!("Loaded capabilities for {}", term_type);
                return store;
            }
        }
    }
    warn!("Unable to retrieve capabilities for terminal type '{}', using ansi", term_type);
    CapabilityStore::parse(ANSI)
}

/// Built-in description text for a terminal type.
pub fn builtin(term_type: &str) -> Option<&'static str> {
    match term_type {
        "ansi" => Some(ANSI),
        "dumb" => Some(DUMB),
        "xterm" => Some(XTERM),
        "xterm-256color" => Some(XTERM_256COLOR),
        "screen" => Some(SCREEN),
        "windows" => Some(WINDOWS),
        "windows-vtp" => Some(WINDOWS_VTP),
        _ => None,
    }
}

pub const ANSI: &str = r"ansi|ansi/pc-term compatible with color,
	am, mir, msgr,
	colors#8, cols#80, it#8, lines#24, ncv#3, pairs#64,
	bel=^G, blink=\E[5m, bold=\E[1m, cbt=\E[Z, clear=\E[H\E[J,
	cr=^M, cub=\E[%p1%dD, cub1=\E[D, cud=\E[%p1%dB, cud1=\E[B,
	cuf=\E[%p1%dC, cuf1=\E[C, cup=\E[%i%p1%d;%p2%dH,
	cuu=\E[%p1%dA, cuu1=\E[A, dch=\E[%p1%dP, dch1=\E[P,
	dl=\E[%p1%dM, dl1=\E[M, ech=\E[%p1%dX, ed=\E[J, el=\E[K,
	el1=\E[1K, home=\E[H, hpa=\E[%i%p1%dG, ht=\E[I,
	ich=\E[%p1%d@, il=\E[%p1%dL, il1=\E[L, ind=^J,
	indn=\E[%p1%dS, invis=\E[8m, kbs=^H, kcbt=\E[Z, kcub1=\E[D,
	kcud1=\E[B, kcuf1=\E[C, kcuu1=\E[A, khome=\E[H, kich1=\E[L,
	nel=\r\E[S, op=\E[39;49m, rev=\E[7m, ri=\E[T, rin=\E[%p1%dT,
	rmacs=\E[10m, rmso=\E[m, rmul=\E[m, setab=\E[4%p1%dm,
	setaf=\E[3%p1%dm, sgr0=\E[0;10m, smacs=\E[11m, smso=\E[7m,
	smul=\E[4m, u6=\E[%i%d;%dR, u7=\E[6n, u8=\E[?%[;0123456789]c,
	u9=\E[c, vpa=\E[%i%p1%dd,
";

pub const DUMB: &str = r"dumb|80-column dumb tty,
	am,
	cols#80,
	bel=^G, cr=^M, cud1=^J, ind=^J,
";

macro_rules! xterm_common {
    () => {
        r"am, bce, km, mir, msgr, xenl,
	cols#80, it#8, lines#24,
	bel=^G, blink=\E[5m, bold=\E[1m, cbt=\E[Z, civis=\E[?25l,
	clear=\E[H\E[2J, cnorm=\E[?12l\E[?25h, cr=^M,
	csr=\E[%i%p1%d;%p2%dr, cub=\E[%p1%dD, cub1=^H,
	cud=\E[%p1%dB, cud1=^J, cuf=\E[%p1%dC, cuf1=\E[C,
	cup=\E[%i%p1%d;%p2%dH, cuu=\E[%p1%dA, cuu1=\E[A,
	cvvis=\E[?12;25h, dch=\E[%p1%dP, dch1=\E[P, dim=\E[2m,
	dl=\E[%p1%dM, dl1=\E[M, ech=\E[%p1%dX, ed=\E[J, el=\E[K,
	el1=\E[1K, flash=\E[?5h$<100/>\E[?5l, home=\E[H,
	hpa=\E[%i%p1%dG, ht=^I, ich=\E[%p1%d@, il=\E[%p1%dL,
	il1=\E[L, ind=^J, indn=\E[%p1%dS, invis=\E[8m,
	kbs=^?, kcbt=\E[Z, kcub1=\EOD, kcud1=\EOB, kcuf1=\EOC,
	kcuu1=\EOA, kdch1=\E[3~, kend=\EOF, kent=\EOM, kf1=\EOP,
	kf10=\E[21~, kf11=\E[23~, kf12=\E[24~, kf2=\EOQ,
	kf3=\EOR, kf4=\EOS, kf5=\E[15~, kf6=\E[17~, kf7=\E[18~,
	kf8=\E[19~, kf9=\E[20~, khome=\EOH, kich1=\E[2~,
	kmous=\E[M, knp=\E[6~, kpp=\E[5~, nel=\EE, rc=\E8, rev=\E[7m,
	ri=\EM, rin=\E[%p1%dT, ritm=\E[23m, rmacs=\E(B, rmam=\E[?7l,
	rmcup=\E[?1049l\E[23;0;0t, rmkx=\E[?1l\E>, rmso=\E[27m,
	rmul=\E[24m, sc=\E7, sgr0=\E(B\E[m, sitm=\E[3m, smacs=\E(0,
	smam=\E[?7h, smcup=\E[?1049h\E[22;0;0t, smkx=\E[?1h\E=,
	smso=\E[7m, smul=\E[4m, u6=\E[%i%d;%dR, u7=\E[6n,
	u8=\E[?%[;0123456789]c, u9=\E[c, vpa=\E[%i%p1%dd,
	op=\E[39;49m,
"
    };
}

pub const XTERM: &str = concat!(
    "xterm|xterm terminal emulator (X Window System),\n\t",
    xterm_common!(),
    r"	colors#8, pairs#64,
	setab=\E[4%p1%dm, setaf=\E[3%p1%dm,
	setb=\E[4%?%p1%{1}%=%t4%e%p1%{3}%=%t6%e%p1%{4}%=%t1%e%p1%{6}%=%t3%e%p1%d%;m,
	setf=\E[3%?%p1%{1}%=%t4%e%p1%{3}%=%t6%e%p1%{4}%=%t1%e%p1%{6}%=%t3%e%p1%d%;m,
"
);

pub const XTERM_256COLOR: &str = concat!(
    "xterm-256color|xterm with 256 colors,\n\t",
    xterm_common!(),
    r"	ccc, colors#256, pairs#65536,
	setab=\E[%?%p1%{8}%<%t4%p1%d%e%p1%{16}%<%t10%p1%{8}%-%d%e48;5;%p1%d%;m,
	setaf=\E[%?%p1%{8}%<%t3%p1%d%e%p1%{16}%<%t9%p1%{8}%-%d%e38;5;%p1%d%;m,
"
);

pub const SCREEN: &str = r"screen|VT 100/ANSI X3.64 virtual terminal,
	am, km, mir, msgr, xenl,
	colors#8, cols#80, it#8, lines#24, pairs#64,
	bel=^G, blink=\E[5m, bold=\E[1m, cbt=\E[Z, civis=\E[?25l,
	clear=\E[H\E[J, cnorm=\E[34h\E[?25h, cr=^M,
	csr=\E[%i%p1%d;%p2%dr, cub=\E[%p1%dD, cub1=^H,
	cud=\E[%p1%dB, cud1=^J, cuf=\E[%p1%dC, cuf1=\E[C,
	cup=\E[%i%p1%d;%p2%dH, cuu=\E[%p1%dA, cuu1=\EM,
	cvvis=\E[34l, dch=\E[%p1%dP, dch1=\E[P, dim=\E[2m,
	dl=\E[%p1%dM, dl1=\E[M, ed=\E[J, el=\E[K, el1=\E[1K,
	flash=\Eg, home=\E[H, ht=^I, ich=\E[%p1%d@, il=\E[%p1%dL,
	il1=\E[L, ind=^J, kbs=^H, kcbt=\E[Z, kcub1=\EOD, kcud1=\EOB,
	kcuf1=\EOC, kcuu1=\EOA, kdch1=\E[3~, kend=\E[4~, kf1=\EOP,
	kf10=\E[21~, kf11=\E[23~, kf12=\E[24~, kf2=\EOQ, kf3=\EOR,
	kf4=\EOS, kf5=\E[15~, kf6=\E[17~, kf7=\E[18~, kf8=\E[19~,
	kf9=\E[20~, khome=\E[1~, kich1=\E[2~, kmous=\E[M, knp=\E[6~,
	kpp=\E[5~, nel=\EE, op=\E[39;49m, rc=\E8, rev=\E[7m, ri=\EM,
	rmacs=^O, rmcup=\E[?1049l, rmkx=\E[?1l\E>, rmso=\E[23m,
	rmul=\E[24m, sc=\E7, setab=\E[4%p1%dm, setaf=\E[3%p1%dm,
	sgr0=\E[m^O, smacs=^N, smcup=\E[?1049h, smkx=\E[?1h\E=,
	smso=\E[3m, smul=\E[4m, u6=\E[%i%d;%dR, u7=\E[6n,
";

macro_rules! windows_common {
    () => {
        r"am, mir, msgr,
	cols#80, it#8, lines#24, ncv#3,
	bel=^G, blink=\E[5m, bold=\E[1m, cbt=\E[Z, clear=\E[H\E[J,
	cr=^M, cub=\E[%p1%dD, cub1=\E[D, cud=\E[%p1%dB, cud1=\E[B,
	cuf=\E[%p1%dC, cuf1=\E[C, cup=\E[%i%p1%d;%p2%dH,
	cuu=\E[%p1%dA, cuu1=\E[A, dl=\E[%p1%dM, dl1=\E[M,
	ech=\E[%p1%dX, ed=\E[J, el=\E[K, el1=\E[1K, home=\E[H,
	hpa=\E[%i%p1%dG, ht=^I, il=\E[%p1%dL, il1=\E[L, ind=^J,
	invis=\E[8m, kbs=^H, kcbt=\E[Z, kcub1=\E[D, kcud1=\E[B,
	kcuf1=\E[C, kcuu1=\E[A, kdch1=\E[3~, kend=\E[F, kf1=\EOP,
	kf10=\E[21~, kf11=\E[23~, kf12=\E[24~, kf2=\EOQ, kf3=\EOR,
	kf4=\EOS, kf5=\E[15~, kf6=\E[17~, kf7=\E[18~, kf8=\E[19~,
	kf9=\E[20~, khome=\E[H, kich1=\E[2~, kmous=\E[M, knp=\E[6~,
	kpp=\E[5~, op=\E[39;49m, rc=\E[u, rev=\E[7m, ri=\E[T,
	rin=\E[%p1%dT, rmso=\E[27m, rmul=\E[24m, sc=\E[s,
	sgr0=\E[0m, smso=\E[7m, smul=\E[4m, u6=\E[%i%d;%dR,
	u7=\E[6n, vpa=\E[%i%p1%dd,
"
    };
}

pub const WINDOWS: &str = concat!(
    "windows|windows console,\n\t",
    windows_common!(),
    r"	colors#16, pairs#256,
	setab=\E[%?%p1%{8}%<%t4%p1%d%e10%p1%{8}%-%d%;m,
	setaf=\E[%?%p1%{8}%<%t3%p1%d%e9%p1%{8}%-%d%;m,
"
);

pub const WINDOWS_VTP: &str = concat!(
    "windows-vtp|windows console with virtual terminal processing,\n\t",
    windows_common!(),
    r"	bce, ccc, colors#256, pairs#65536,
	civis=\E[?25l, cnorm=\E[?25h, csr=\E[%i%p1%d;%p2%dr,
	dch=\E[%p1%dP, dch1=\E[P, ich=\E[%p1%d@, indn=\E[%p1%dS,
	rmcup=\E[?1049l, smcup=\E[?1049h, sitm=\E[3m, ritm=\E[23m,
	setab=\E[%?%p1%{8}%<%t4%p1%d%e%p1%{16}%<%t10%p1%{8}%-%d%e48;5;%p1%d%;m,
	setaf=\E[%?%p1%{8}%<%t3%p1%d%e%p1%{16}%<%t9%p1%{8}%-%d%e38;5;%p1%d%;m,
"
);

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl CapabilitySource for Fixed {
        fn lookup(&self, _term_type: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    struct Missing;

    impl CapabilitySource for Missing {
        fn lookup(&self, _term_type: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_parse_infocmp_output() {
        let text = "#\tReconstructed via infocmp from file: /usr/share/terminfo/x/xterm\n\
                    xterm|xterm terminal,\n\tam, cols#80, colors#0x10, it#010,\n\tbel=^G, kbs=\\177, u6=\\E[%i%d;%dR, km@,\n";
        let store = CapabilityStore::parse(text);
        assert_eq!(store.name(), "xterm");
        assert!(store.get_bool(Capability::AutoRightMargin));
        assert!(!store.get_bool(Capability::HasMetaKey));
        assert_eq!(store.get_int(Capability::Columns), Some(80));
        assert_eq!(store.get_int(Capability::MaxColors), Some(16));
        assert_eq!(store.get_int(Capability::InitTabs), Some(8));
        assert_eq!(store.get_string(Capability::User6), Some("\\E[%i%d;%dR"));
        assert_eq!(store.render(Capability::KeyBackspace, &[]), Some(vec![0x7f]));
        assert_eq!(store.render(Capability::Bell, &[]), Some(vec![7]));
    }

    #[test]
    fn test_escaped_comma_stays_in_value() {
        let store = CapabilityStore::parse("t|test,\n\tcr=a\\,b, bel=^G,\n");
        assert_eq!(store.get_string(Capability::CarriageReturn), Some("a\\,b"));
        assert_eq!(store.render(Capability::CarriageReturn, &[]), Some(b"a,b".to_vec()));
        assert!(store.get_string(Capability::Bell).is_some());
    }

    #[test]
    fn test_wrong_kind_is_ignored() {
        let store = CapabilityStore::parse("t|test,\n\tcols, am#3, lines#24,\n");
        assert!(!store.get_bool(Capability::Columns));
        assert_eq!(store.get_int(Capability::AutoRightMargin), None);
        assert_eq!(store.get_int(Capability::Lines), Some(24));
    }

    #[test]
    fn test_unknown_type_falls_back_to_ansi() {
        let store = resolve("no-such-terminal", &[&Missing, &BuiltinSource]);
        assert_eq!(store.name(), "ansi");
        assert_eq!(store.render(Capability::User7, &[]), Some(b"\x1b[6n".to_vec()));
    }

    #[test]
    fn test_garbage_description_falls_back() {
        let store = resolve("junk", &[&Fixed("not a terminfo description")]);
        assert_eq!(store.name(), "ansi");
    }

    #[test]
    fn test_builtins_parse() {
        for name in ["ansi", "dumb", "xterm", "xterm-256color", "screen", "windows", "windows-vtp"] {
            let store = resolve(name, &[&BuiltinSource]);
            assert_eq!(store.name(), name);
        }
        let xterm = resolve("xterm-256color", &[&BuiltinSource]);
        assert_eq!(xterm.get_int(Capability::MaxColors), Some(256));
        assert_eq!(
            xterm.render(Capability::SetAForeground, &[Param::from(9)]),
            Some(b"\x1b[91m".to_vec())
        );
        let windows = resolve("windows", &[&BuiltinSource]);
        assert_eq!(windows.render(Capability::KeyLeft, &[]), Some(b"\x1b[D".to_vec()));
    }
}
