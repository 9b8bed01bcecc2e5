//! `stty -a` output parsing and the reverse direction: the argument list
//! that moves a terminal from one set of attributes to another.
//!
//! The parser accepts the layouts printed by GNU coreutils, busybox, the
//! BSDs, macOS, Solaris, AIX and HP-UX.

use regex::Regex;

use crate::core::attributes::{Attributes, ControlChar, ControlFlags, InputFlags, LocalFlags, OutputFlags, Size};

/// Whether `cfg` mentions `name` as a flag, and if so whether it is set.
///
/// Tokens are separated by whitespace or `;`; a leading `-` means off.
fn flag_state(cfg: &str, name: &str) -> Option<bool> {
    cfg.split(|c: char| c.is_whitespace() || c == ';').find_map(|token| {
        if token == name {
            Some(true)
        } else if token.strip_prefix('-') == Some(name) {
            Some(false)
        } else {
            None
        }
    })
}

/// Fill one flag word from `cfg`, keeping flags stty does not mention off.
macro_rules! parse_flags {
    ($cfg:expr, $ty:ty) => {{
        let mut flags = <$ty>::empty();
        for (name, flag) in <$ty>::all().iter_names() {
            if flag_state($cfg, &name.to_ascii_lowercase()) == Some(true) {
                flags.insert(flag);
            }
        }
        flags
    }};
}

/// Parse attributes from `stty -a` output.
pub fn parse_attributes(cfg: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.iflag = parse_flags!(cfg, InputFlags);
    attributes.oflag = parse_flags!(cfg, OutputFlags);
    attributes.cflag = parse_flags!(cfg, ControlFlags);
    attributes.lflag = parse_flags!(cfg, LocalFlags);

    for cc in ControlChar::ALL {
        let name = match cc {
            ControlChar::Reprint => "(?:reprint|rprnt)",
            ControlChar::Discard => "(?:discard|flush)",
            other => other.name(),
        };
        let pattern = format!(r"[\s;]{}\s*=\s*(.+?)[\s;]", name);
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        // Leading space so a name at the very start still matches.
        let padded = format!(" {}", cfg);
        if let Some(value) = re.captures(&padded).and_then(|c| c.get(1)) {
            if let Some(parsed) = parse_control_char(value.as_str()) {
                attributes.set_control_char(cc, parsed);
            }
        }
    }
    attributes
}

/// Decode one control character value as stty prints it.
///
/// Returns `Some(None)` for a disabled slot and `None` when the text is
/// not understood. Only the letter after `^` is case-folded; a plain
/// character keeps its case. `<undef>`, Solaris `-^?` and HP-UX `^-` all
/// mean disabled.
pub fn parse_control_char(text: &str) -> Option<Option<u8>> {
    let bytes = text.as_bytes();
    let first = *bytes.first()?;
    if text.eq_ignore_ascii_case("<undef>") || text == "-^?" || text == "^-" {
        return Some(None);
    }
    if text.eq_ignore_ascii_case("DEL") {
        return Some(Some(0x7f));
    }
    let value = match first {
        b'0' => u32::from_str_radix(text, 8).ok()?,
        b'1'..=b'9' => text.parse::<u32>().ok()?,
        b'^' => caret_value(*bytes.get(1)?),
        b'M' if bytes.get(1) == Some(&b'-') => match *bytes.get(2)? {
            b'^' => caret_value(*bytes.get(3)?) + 128,
            c => c as u32 + 128,
        },
        c => c as u32,
    };
    u8::try_from(value).ok().map(Some)
}

fn caret_value(c: u8) -> u32 {
    if c == b'?' {
        0x7f
    } else {
        (c.to_ascii_uppercase() as u32).wrapping_sub(64) & 0xff
    }
}

/// Parse the window size; missing dimensions read as 0.
pub fn parse_size(cfg: &str) -> Size {
    Size::new(parse_int(cfg, "columns"), parse_int(cfg, "rows"))
}

fn parse_int(cfg: &str, name: &str) -> u16 {
    let patterns = [
        format!(r"\b([0-9]+)\s+{}\b", name),
        format!(r"\b{}\s+([0-9]+)\b", name),
        format!(r"\b{}\s*=\s*([0-9]+)\b", name),
    ];
    for pattern in &patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Some(value) = re.captures(cfg).and_then(|c| c.get(1)) {
            return value.as_str().parse().unwrap_or(0);
        }
    }
    0
}

macro_rules! diff_flags {
    ($args:expr, $target:expr, $current:expr, $ty:ty, $skip:expr) => {
        for (name, flag) in <$ty>::all().iter_names() {
            if $skip.contains(&name) {
                continue;
            }
            let wanted = $target.contains(flag);
            if wanted != $current.contains(flag) {
                let name = name.to_ascii_lowercase();
                $args.push(if wanted { name } else { format!("-{}", name) });
            }
        }
    };
}

/// Flags with no stty spelling.
const SOFTWARE_ONLY: [&str; 1] = ["INORMEOL"];

/// The stty arguments that turn `current` into `target`.
pub fn flags_to_set(target: &Attributes, current: &Attributes) -> Vec<String> {
    let mut args = Vec::new();
    diff_flags!(args, target.iflag, current.iflag, InputFlags, SOFTWARE_ONLY);
    diff_flags!(args, target.oflag, current.oflag, OutputFlags, [""; 0]);
    diff_flags!(args, target.cflag, current.cflag, ControlFlags, [""; 0]);
    diff_flags!(args, target.lflag, current.lflag, LocalFlags, [""; 0]);

    for cc in ControlChar::ALL {
        let wanted = target.control_char(cc);
        if wanted == current.control_char(cc) {
            continue;
        }
        if cc.is_count() {
            if let Some(v) = wanted {
                args.push(cc.name().to_string());
                args.push(v.to_string());
            }
            continue;
        }
        args.push(cc.name().to_string());
        args.push(match wanted {
            None | Some(0) => "undef".to_string(),
            Some(v) => format_control_char(v),
        });
    }
    args
}

/// Spell a control character the way stty accepts it: `^C`, `^?`, `M-a`.
pub fn format_control_char(value: u8) -> String {
    let mut text = String::new();
    let mut v = value;
    if v >= 128 {
        v -= 128;
        text.push_str("M-");
    }
    if v < 32 || v == 127 {
        v ^= 0x40;
        text.push('^');
    }
    text.push(v as char);
    text
}
