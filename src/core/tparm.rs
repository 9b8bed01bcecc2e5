//! Parameterized capability rendering.
//!
//! Capability strings are kept in terminfo source form (`\E[%i%p1%d;%p2%dH`).
//! [`tparm`] resolves escapes and runs the `%` stack language in one pass:
//!
//! - `\E`, `^X`, octal and the other backslash escapes
//! - `%d %o %x %X %s %c` with printf flags, width and precision
//! - `%p1`..`%p9`, `%Pa`/`%ga` variables, `%'c'` and `%{n}` constants
//! - arithmetic, bitwise and logical operators, `%l`, `%i`
//! - `%? .. %t .. %e .. %;` conditionals
//!
//! `$<..>` padding specifications are dropped.

/// A capability parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Str(String),
}

impl Param {
    fn as_int(&self) -> i64 {
        match self {
            Param::Int(n) => *n,
            Param::Str(_) => 0,
        }
    }
}

impl Default for Param {
    fn default() -> Self {
        Param::Int(0)
    }
}

macro_rules! int_param {
    ($($t:ty),*) => {
        $(impl From<$t> for Param {
            fn from(v: $t) -> Self {
                Param::Int(v as i64)
            }
        })*
    };
}

int_param!(i32, i64, u8, u16, u32, usize);

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Str(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Str(v)
    }
}

/// Expand a capability template with `params` into raw bytes.
pub fn tparm(template: &str, params: &[Param]) -> Vec<u8> {
    let mut params: Vec<Param> = params.to_vec();
    params.resize(9, Param::default());
    let mut stack: Vec<Param> = Vec::new();
    let mut dynamic: [i64; 26] = [0; 26];
    let mut statics: [i64; 26] = [0; 26];
    let mut out = Vec::new();

    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        match c {
            b'\\' => i = unescape_at(bytes, i, &mut out),
            b'^' if i < bytes.len() => {
                out.push(bytes[i] & 0x1f);
                i += 1;
            }
            b'$' if bytes.get(i) == Some(&b'<') => {
                while i < bytes.len() && bytes[i] != b'>' {
                    i += 1;
                }
                i += 1;
            }
            b'%' if i < bytes.len() => {
                let op = bytes[i];
                i += 1;
                match op {
                    b'%' => out.push(b'%'),
                    b'c' => {
                        let v = pop(&mut stack).as_int();
                        out.push(v as u8);
                    }
                    b'p' => {
                        if let Some(d) = bytes.get(i) {
                            let idx = d.wrapping_sub(b'1') as usize;
                            if idx < 9 {
                                stack.push(params[idx].clone());
                            }
                            i += 1;
                        }
                    }
                    b'P' | b'g' => {
                        if let Some(&name) = bytes.get(i) {
                            i += 1;
                            let slot = match name {
                                b'a'..=b'z' => Some(&mut dynamic[(name - b'a') as usize]),
                                b'A'..=b'Z' => Some(&mut statics[(name - b'A') as usize]),
                                _ => None,
                            };
                            if let Some(slot) = slot {
                                if op == b'P' {
                                    *slot = pop(&mut stack).as_int();
                                } else {
                                    stack.push(Param::Int(*slot));
                                }
                            }
                        }
                    }
                    b'\'' => {
                        if let Some(&ch) = bytes.get(i) {
                            stack.push(Param::Int(ch as i64));
                            i += 1;
                        }
                        if bytes.get(i) == Some(&b'\'') {
                            i += 1;
                        }
                    }
                    b'{' => {
                        let start = i;
                        while i < bytes.len() && bytes[i] != b'}' {
                            i += 1;
                        }
                        let n = std::str::from_utf8(&bytes[start..i])
                            .ok()
                            .and_then(|s| s.trim().parse::<i64>().ok())
                            .unwrap_or(0);
                        stack.push(Param::Int(n));
                        i += 1;
                    }
                    b'l' => {
                        let len = match pop(&mut stack) {
                            Param::Str(s) => s.len() as i64,
                            Param::Int(_) => 0,
                        };
                        stack.push(Param::Int(len));
                    }
                    b'i' => {
                        for p in params.iter_mut().take(2) {
                            if let Param::Int(n) = p {
                                *n += 1;
                            }
                        }
                    }
                    b'+' | b'-' | b'*' | b'/' | b'm' | b'&' | b'|' | b'^' | b'=' | b'>' | b'<'
                    | b'A' | b'O' => {
                        let b = pop(&mut stack).as_int();
                        let a = pop(&mut stack).as_int();
                        stack.push(Param::Int(binary(op, a, b)));
                    }
                    b'!' => {
                        let a = pop(&mut stack).as_int();
                        stack.push(Param::Int((a == 0) as i64));
                    }
                    b'~' => {
                        let a = pop(&mut stack).as_int();
                        stack.push(Param::Int(!a));
                    }
                    b'?' | b';' => {}
                    b't' => {
                        if pop(&mut stack).as_int() == 0 {
                            i = skip_branch(bytes, i, true);
                        }
                    }
                    b'e' => i = skip_branch(bytes, i, false),
                    _ => {
                        // printf-style conversion, possibly with flags
                        let (spec, next) = parse_format(bytes, i - 1);
                        i = next;
                        if let Some(spec) = spec {
                            let value = pop(&mut stack);
                            out.extend_from_slice(spec.render(&value).as_bytes());
                        }
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Resolve backslash and caret escapes without running `%` operators.
pub fn unescape(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        match c {
            b'\\' => i = unescape_at(bytes, i, &mut out),
            b'^' if i < bytes.len() => {
                out.push(bytes[i] & 0x1f);
                i += 1;
            }
            _ => out.push(c),
        }
    }
    out
}

fn unescape_at(bytes: &[u8], mut i: usize, out: &mut Vec<u8>) -> usize {
    let Some(&e) = bytes.get(i) else {
        out.push(b'\\');
        return i;
    };
    i += 1;
    match e {
        b'E' | b'e' => out.push(0x1b),
        b'n' | b'l' => out.push(b'\n'),
        b'r' => out.push(b'\r'),
        b't' => out.push(b'\t'),
        b'b' => out.push(0x08),
        b'f' => out.push(0x0c),
        b's' => out.push(b' '),
        b'0'..=b'7' => {
            let mut value: u32 = (e - b'0') as u32;
            let mut digits = 1;
            while digits < 3 {
                match bytes.get(i) {
                    Some(&d @ b'0'..=b'7') => {
                        value = value * 8 + (d - b'0') as u32;
                        i += 1;
                        digits += 1;
                    }
                    _ => break,
                }
            }
            out.push(if value == 0 { 0x80 } else { value as u8 });
        }
        other => out.push(other),
    }
    i
}

fn pop(stack: &mut Vec<Param>) -> Param {
    stack.pop().unwrap_or_default()
}

fn binary(op: u8, a: i64, b: i64) -> i64 {
    match op {
        b'+' => a.wrapping_add(b),
        b'-' => a.wrapping_sub(b),
        b'*' => a.wrapping_mul(b),
        b'/' => {
            if b == 0 {
                0
            } else {
                a / b
            }
        }
        b'm' => {
            if b == 0 {
                0
            } else {
                a % b
            }
        }
        b'&' => a & b,
        b'|' => a | b,
        b'^' => a ^ b,
        b'=' => (a == b) as i64,
        b'>' => (a > b) as i64,
        b'<' => (a < b) as i64,
        b'A' => (a != 0 && b != 0) as i64,
        b'O' => (a != 0 || b != 0) as i64,
        _ => 0,
    }
}

/// Skip to the end of the current branch.
///
/// With `to_else`, stops after a `%e` at the same nesting level; always
/// stops after the matching `%;`.
fn skip_branch(bytes: &[u8], mut i: usize, to_else: bool) -> usize {
    let mut level = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        i += 1;
        match bytes.get(i) {
            Some(b'?') => level += 1,
            Some(b';') => {
                if level == 0 {
                    return i + 1;
                }
                level -= 1;
            }
            Some(b'e') if level == 0 && to_else => return i + 1,
            _ => {}
        }
        i += 1;
    }
    i
}

#[derive(Debug, Default)]
struct FormatSpec {
    left: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
    conversion: u8,
}

/// Parse `[:][flags][width][.precision]conv` starting at `start`.
fn parse_format(bytes: &[u8], start: usize) -> (Option<FormatSpec>, usize) {
    let mut spec = FormatSpec::default();
    let mut i = start;
    if bytes.get(i) == Some(&b':') {
        i += 1;
    }
    while let Some(&f) = bytes.get(i) {
        match f {
            b'-' => spec.left = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'#' => spec.alternate = true,
            _ => break,
        }
        i += 1;
    }
    while let Some(d @ b'0'..=b'9') = bytes.get(i).copied() {
        spec.width = spec.width * 10 + (d - b'0') as usize;
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let mut precision = 0;
        while let Some(d @ b'0'..=b'9') = bytes.get(i).copied() {
            precision = precision * 10 + (d - b'0') as usize;
            i += 1;
        }
        spec.precision = Some(precision);
    }
    match bytes.get(i) {
        Some(&conv @ (b'd' | b'o' | b'x' | b'X' | b's')) => {
            spec.conversion = conv;
            (Some(spec), i + 1)
        }
        // Unknown operator: emit nothing and resume after it
        _ => (None, start + 1),
    }
}

impl FormatSpec {
    fn render(&self, value: &Param) -> String {
        let body = match self.conversion {
            b's' => {
                let s = match value {
                    Param::Str(s) => s.clone(),
                    Param::Int(n) => n.to_string(),
                };
                match self.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            conv => {
                let n = value.as_int();
                let mut digits = match conv {
                    b'o' => format!("{:o}", n.unsigned_abs()),
                    b'x' => format!("{:x}", n.unsigned_abs()),
                    b'X' => format!("{:X}", n.unsigned_abs()),
                    _ => n.unsigned_abs().to_string(),
                };
                if let Some(p) = self.precision {
                    while digits.len() < p {
                        digits.insert(0, '0');
                    }
                }
                let prefix = match conv {
                    b'o' if self.alternate && !digits.starts_with('0') => "0",
                    b'x' if self.alternate && n != 0 => "0x",
                    b'X' if self.alternate && n != 0 => "0X",
                    _ => "",
                };
                let sign = if n < 0 {
                    "-"
                } else if conv == b'd' && self.plus {
                    "+"
                } else if conv == b'd' && self.space {
                    " "
                } else {
                    ""
                };
                format!("{}{}{}", sign, prefix, digits)
            }
        };
        if body.len() >= self.width {
            body
        } else if self.left {
            format!("{:<width$}", body, width = self.width)
        } else {
            format!("{:>width$}", body, width = self.width)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(template: &str, params: &[Param]) -> String {
        String::from_utf8_lossy(&tparm(template, params)).into_owned()
    }

    #[test]
    fn test_cursor_address() {
        let out = render("\\E[%i%p1%d;%p2%dH", &[Param::from(4), Param::from(9)]);
        assert_eq!(out, "\x1b[5;10H");
    }

    #[test]
    fn test_escapes_and_padding() {
        assert_eq!(tparm("^G", &[]), vec![7]);
        assert_eq!(tparm("\\E[H\\E[2J$<50>", &[]), b"\x1b[H\x1b[2J".to_vec());
        assert_eq!(tparm("a\\,b\\^c\\072", &[]), b"a,b^c:".to_vec());
        assert_eq!(unescape("\\E[%i%d;%dR"), b"\x1b[%i%d;%dR".to_vec());
    }

    #[test]
    fn test_conditional_color() {
        let setaf = "\\E[%?%p1%{8}%<%t3%p1%d%e%p1%{16}%<%t9%p1%{8}%-%d%e38;5;%p1%d%;m";
        assert_eq!(render(setaf, &[Param::from(1)]), "\x1b[31m");
        assert_eq!(render(setaf, &[Param::from(12)]), "\x1b[94m");
        assert_eq!(render(setaf, &[Param::from(200)]), "\x1b[38;5;200m");
    }

    #[test]
    fn test_variables_and_chars() {
        assert_eq!(render("%p1%Pa%ga%ga%+%d", &[Param::from(21)]), "42");
        assert_eq!(render("%'A'%c%{66}%c", &[]), "AB");
        assert_eq!(render("%p1%l%d", &[Param::from("hello")]), "5");
        assert_eq!(render("%p1%!%d %p2%~%d", &[Param::from(0), Param::from(0)]), "1 -1");
    }

    #[test]
    fn test_printf_flags() {
        assert_eq!(render("%p1%3d|", &[Param::from(7)]), "  7|");
        assert_eq!(render("%p1%:-3d|", &[Param::from(7)]), "7  |");
        assert_eq!(render("%p1%.3d", &[Param::from(7)]), "007");
        assert_eq!(render("%p1%x %p1%#X", &[Param::from(255)]), "ff 0XFF");
        assert_eq!(render("%p1%s", &[Param::from("abc")]), "abc");
        assert_eq!(render("100%%", &[]), "100%");
    }
}
