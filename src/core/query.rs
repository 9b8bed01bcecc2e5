//! Cursor position and mouse report codecs.

use bitflags::bitflags;
use regex::bytes::Regex;

use crate::error::Result;

/// Zero-based cursor location
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReplyToken {
    Literal(u8),
    Number,
}

/// Matcher for the reply described by the `u6` capability.
#[derive(Debug)]
pub struct CursorReply {
    regex: Regex,
    tokens: Vec<ReplyToken>,
    one_based: bool,
}

impl CursorReply {
    /// Compile a reply template such as `\E[%i%d;%dR`.
    ///
    /// The first number is the row, the second the column.
    pub fn from_template(template: &str) -> Option<Self> {
        let bytes = template.as_bytes();
        let mut tokens = Vec::new();
        let mut one_based = false;
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];
            i += 1;
            match c {
                b'\\' => {
                    let Some(&e) = bytes.get(i) else {
                        tokens.push(ReplyToken::Literal(b'\\'));
                        break;
                    };
                    i += 1;
                    tokens.push(ReplyToken::Literal(match e {
                        b'E' | b'e' => 0x1b,
                        other => other,
                    }));
                }
                b'%' => {
                    let Some(&op) = bytes.get(i) else {
                        break;
                    };
                    i += 1;
                    match op {
                        b'i' => one_based = true,
                        b'd' => tokens.push(ReplyToken::Number),
                        b'%' => tokens.push(ReplyToken::Literal(b'%')),
                        // %p1, %p2: parameter order is fixed
                        b'p' => i += 1,
                        _ => return None,
                    }
                }
                _ => tokens.push(ReplyToken::Literal(c)),
            }
        }
        let numbers = tokens.iter().filter(|t| **t == ReplyToken::Number).count();
        if numbers != 2 {
            return None;
        }

        let mut pattern = String::from("(?-u)^");
        for token in &tokens {
            match token {
                ReplyToken::Number => pattern.push_str("([0-9]+)"),
                ReplyToken::Literal(b) => pattern.push_str(&format!("\\x{:02x}", b)),
            }
        }
        pattern.push('$');
        let regex = Regex::new(&pattern).ok()?;
        Some(Self {
            regex,
            tokens,
            one_based,
        })
    }

    /// Parse a complete reply.
    pub fn matches(&self, buf: &[u8]) -> Option<Cursor> {
        let caps = self.regex.captures(buf)?;
        let number = |i: usize| -> Option<i64> {
            std::str::from_utf8(caps.get(i)?.as_bytes()).ok()?.parse().ok()
        };
        let (mut y, mut x) = (number(1)?, number(2)?);
        if self.one_based {
            y -= 1;
            x -= 1;
        }
        Some(Cursor {
            x: x.clamp(0, u16::MAX as i64) as u16,
            y: y.clamp(0, u16::MAX as i64) as u16,
        })
    }

    /// Whether more bytes could still turn `buf` into a reply.
    pub fn could_match(&self, buf: &[u8]) -> bool {
        let mut pos = 0;
        for (idx, token) in self.tokens.iter().enumerate() {
            match token {
                ReplyToken::Literal(b) => match buf.get(pos) {
                    None => return true,
                    Some(c) if c == b => pos += 1,
                    Some(_) => return false,
                },
                ReplyToken::Number => {
                    let start = pos;
                    while buf.get(pos).is_some_and(u8::is_ascii_digit) {
                        pos += 1;
                    }
                    if pos == buf.len() {
                        return true;
                    }
                    if pos == start {
                        return false;
                    }
                    if idx + 1 == self.tokens.len() {
                        return false;
                    }
                }
            }
        }
        pos >= buf.len()
    }
}

/// Read bytes until a cursor report arrives.
///
/// Bytes that turn out not to belong to the reply are passed to
/// `discard`, in order. Returns `None` if input ends first.
pub fn read_cursor_reply<R>(
    reply: &CursorReply,
    mut read_byte: R,
    mut discard: Option<&mut dyn FnMut(u8)>,
) -> Result<Option<Cursor>>
where
    R: FnMut() -> Result<Option<u8>>,
{
    let mut buf = Vec::new();
    let mut start = 0;
    loop {
        let Some(b) = read_byte()? else {
            return Ok(None);
        };
        buf.push(b);
        if let Some(cursor) = reply.matches(&buf[start..]) {
            if let Some(discard) = discard.as_mut() {
                for &d in &buf[..start] {
                    discard(d);
                }
            }
            return Ok(Some(cursor));
        }
        while start < buf.len() && !reply.could_match(&buf[start..]) {
            start += 1;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseEventType {
    Released,
    Pressed,
    Wheel,
    Moved,
    Dragged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    NoButton,
    Button1,
    Button2,
    Button3,
    WheelUp,
    WheelDown,
}

bitflags! {
    /// Modifier keys held during a mouse event
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MouseModifiers: u8 {
        const SHIFT   = 0b0001;
        const ALT     = 0b0010;
        const CONTROL = 0b0100;
    }
}

/// Decoded mouse report with zero-based coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventType,
    pub button: MouseButton,
    pub modifiers: MouseModifiers,
    pub x: i32,
    pub y: i32,
}

impl Default for MouseEvent {
    fn default() -> Self {
        Self {
            kind: MouseEventType::Moved,
            button: MouseButton::NoButton,
            modifiers: MouseModifiers::empty(),
            x: 0,
            y: 0,
        }
    }
}

/// Which mouse events the terminal reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MouseTracking {
    /// No reports
    #[default]
    Off,
    /// Presses and releases
    Normal,
    /// Also motion while a button is held
    Button,
    /// All motion
    Any,
}

impl MouseTracking {
    /// DEC private mode sequence selecting this tracking level.
    pub fn control_sequence(self) -> &'static [u8] {
        match self {
            MouseTracking::Off => b"\x1b[?1000l\x1b[?1002l\x1b[?1003l\x1b[?1005l",
            MouseTracking::Normal => b"\x1b[?1005h\x1b[?1000h",
            MouseTracking::Button => b"\x1b[?1005h\x1b[?1002h",
            MouseTracking::Any => b"\x1b[?1005h\x1b[?1003h",
        }
    }
}

fn is_held(last: &MouseEvent) -> bool {
    matches!(last.kind, MouseEventType::Pressed | MouseEventType::Dragged)
}

/// Decode a button byte with the 32 offset removed.
///
/// `last` disambiguates a repeated button code (drag) and the shared
/// release code.
pub fn decode_mouse_event(cb: u32, x: i32, y: i32, last: &MouseEvent) -> MouseEvent {
    let mut modifiers = MouseModifiers::empty();
    if cb & 4 != 0 {
        modifiers |= MouseModifiers::SHIFT;
    }
    if cb & 8 != 0 {
        modifiers |= MouseModifiers::ALT;
    }
    if cb & 16 != 0 {
        modifiers |= MouseModifiers::CONTROL;
    }

    let (kind, button) = if cb & 64 != 0 {
        let button = if cb & 1 != 0 {
            MouseButton::WheelDown
        } else {
            MouseButton::WheelUp
        };
        (MouseEventType::Wheel, button)
    } else {
        let button = match cb & 3 {
            0 => Some(MouseButton::Button1),
            1 => Some(MouseButton::Button2),
            2 => Some(MouseButton::Button3),
            _ => None,
        };
        match button {
            Some(button) => {
                let dragging = cb & 32 != 0 || (last.button == button && is_held(last));
                let kind = if dragging {
                    MouseEventType::Dragged
                } else {
                    MouseEventType::Pressed
                };
                (kind, button)
            }
            None if is_held(last) => (MouseEventType::Released, last.button),
            None => (MouseEventType::Moved, MouseButton::NoButton),
        }
    };

    MouseEvent {
        kind,
        button,
        modifiers,
        x,
        y,
    }
}

/// Read one UTF-8 encoded code point.
fn read_code_point<R>(read_byte: &mut R) -> Result<Option<u32>>
where
    R: FnMut() -> Result<Option<u8>>,
{
    let Some(first) = read_byte()? else {
        return Ok(None);
    };
    let (extra, init) = match first {
        0x00..=0x7f => return Ok(Some(first as u32)),
        0xc0..=0xdf => (1, (first & 0x1f) as u32),
        0xe0..=0xef => (2, (first & 0x0f) as u32),
        0xf0..=0xf7 => (3, (first & 0x07) as u32),
        // Stray byte: take it at face value
        _ => return Ok(Some(first as u32)),
    };
    let mut value = init;
    for _ in 0..extra {
        let Some(b) = read_byte()? else {
            return Ok(None);
        };
        value = (value << 6) | (b & 0x3f) as u32;
    }
    Ok(Some(value))
}

/// Read the three fields following a `kmous` prefix (X10 layout with
/// UTF-8 extended coordinates).
pub fn read_mouse_report<R>(mut read_byte: R, last: &MouseEvent) -> Result<Option<MouseEvent>>
where
    R: FnMut() -> Result<Option<u8>>,
{
    let mut fields = [0i64; 3];
    for field in fields.iter_mut() {
        match read_code_point(&mut read_byte)? {
            Some(v) => *field = v as i64,
            None => return Ok(None),
        }
    }
    let cb = (fields[0] - 32).max(0) as u32;
    let x = (fields[1] - 32 - 1) as i32;
    let y = (fields[2] - 32 - 1) as i32;
    Ok(Some(decode_mouse_event(cb, x, y, last)))
}

/// Decode an SGR (1006) report body such as `0;12;5M`, without the
/// leading `ESC [ <`.
pub fn decode_sgr_mouse(body: &[u8], last: &MouseEvent) -> Option<MouseEvent> {
    let (&terminator, params) = body.split_last()?;
    if terminator != b'M' && terminator != b'm' {
        return None;
    }
    let text = std::str::from_utf8(params).ok()?;
    let mut parts = text.split(';').map(|p| p.parse::<i64>().ok());
    let cb = parts.next()??;
    let x = parts.next()??;
    let y = parts.next()??;
    if parts.next().is_some() || cb < 0 {
        return None;
    }
    let (x, y) = ((x - 1) as i32, (y - 1) as i32);
    if terminator == b'm' && cb & 64 == 0 {
        let mut event = decode_mouse_event((cb as u32) | 3, x, y, last);
        event.kind = MouseEventType::Released;
        event.button = match cb & 3 {
            0 => MouseButton::Button1,
            1 => MouseButton::Button2,
            2 => MouseButton::Button3,
            _ => last.button,
        };
        return Some(event);
    }
    Some(decode_mouse_event(cb as u32, x, y, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder(bytes: &[u8]) -> impl FnMut() -> Result<Option<u8>> + '_ {
        let mut iter = bytes.iter();
        move || Ok(iter.next().copied())
    }

    #[test]
    fn test_cursor_reply_with_noise() {
        let reply = CursorReply::from_template("\\E[%i%d;%dR").unwrap();
        let mut discarded = Vec::new();
        let mut sink = |b: u8| discarded.push(b);
        let cursor = read_cursor_reply(&reply, feeder(b"ab\x1b[x\x1b[12;40R"), Some(&mut sink)).unwrap();
        assert_eq!(cursor, Some(Cursor { x: 39, y: 11 }));
        assert_eq!(discarded, b"ab\x1b[x".to_vec());
    }

    #[test]
    fn test_cursor_reply_eof() {
        let reply = CursorReply::from_template("\\E[%i%d;%dR").unwrap();
        assert_eq!(read_cursor_reply(&reply, feeder(b"\x1b[3;"), None).unwrap(), None);
    }

    #[test]
    fn test_cursor_reply_zero_based_template() {
        let reply = CursorReply::from_template("\\E[%p1%d;%p2%dR").unwrap();
        assert_eq!(reply.matches(b"\x1b[4;7R"), Some(Cursor { x: 7, y: 4 }));
        assert!(reply.could_match(b"\x1b[4"));
        assert!(!reply.could_match(b"\x1b[;"));
        assert!(CursorReply::from_template("\\E[6n").is_none());
    }

    #[test]
    fn test_drag_after_press() {
        let last = MouseEvent::default();
        let pressed = decode_mouse_event(0, 5, 3, &last);
        assert_eq!(pressed.kind, MouseEventType::Pressed);
        assert_eq!(pressed.button, MouseButton::Button1);

        let dragged = decode_mouse_event(0, 6, 3, &pressed);
        assert_eq!(dragged.kind, MouseEventType::Dragged);

        let released = decode_mouse_event(3, 6, 3, &dragged);
        assert_eq!(released.kind, MouseEventType::Released);
        assert_eq!(released.button, MouseButton::Button1);

        let again = decode_mouse_event(0, 6, 3, &released);
        assert_eq!(again.kind, MouseEventType::Pressed);

        let moved = decode_mouse_event(3, 1, 1, &MouseEvent::default());
        assert_eq!(moved.kind, MouseEventType::Moved);
        assert_eq!(moved.button, MouseButton::NoButton);
    }

    #[test]
    fn test_modifiers_and_wheel() {
        let last = MouseEvent::default();
        let event = decode_mouse_event(2 | 4 | 16, 0, 0, &last);
        assert_eq!(event.button, MouseButton::Button3);
        assert_eq!(event.modifiers, MouseModifiers::SHIFT | MouseModifiers::CONTROL);

        assert_eq!(decode_mouse_event(64, 0, 0, &last).button, MouseButton::WheelUp);
        let down = decode_mouse_event(65 | 8, 0, 0, &last);
        assert_eq!(down.kind, MouseEventType::Wheel);
        assert_eq!(down.button, MouseButton::WheelDown);
        assert_eq!(down.modifiers, MouseModifiers::ALT);
    }

    #[test]
    fn test_x10_report() {
        let event = read_mouse_report(feeder(&[32, 32 + 6, 32 + 4]), &MouseEvent::default())
            .unwrap()
            .unwrap();
        assert_eq!((event.x, event.y), (5, 3));
        assert_eq!(event.kind, MouseEventType::Pressed);

        // Column 300 in UTF-8 extended mode
        let mut bytes = vec![32 + 3];
        let mut utf8 = [0u8; 4];
        bytes.extend_from_slice(char::from_u32(32 + 301).unwrap().encode_utf8(&mut utf8).as_bytes());
        bytes.push(32 + 1);
        let event = read_mouse_report(feeder(&bytes), &MouseEvent::default()).unwrap().unwrap();
        assert_eq!((event.x, event.y), (300, 0));
        assert_eq!(event.kind, MouseEventType::Moved);
    }

    #[test]
    fn test_sgr_report() {
        let last = MouseEvent::default();
        let press = decode_sgr_mouse(b"0;12;5M", &last).unwrap();
        assert_eq!((press.kind, press.x, press.y), (MouseEventType::Pressed, 11, 4));
        let release = decode_sgr_mouse(b"0;12;5m", &press).unwrap();
        assert_eq!(release.kind, MouseEventType::Released);
        assert_eq!(release.button, MouseButton::Button1);
        assert!(decode_sgr_mouse(b"0;12M", &last).is_none());
    }

    #[test]
    fn test_tracking_sequences() {
        assert_eq!(MouseTracking::Normal.control_sequence(), b"\x1b[?1005h\x1b[?1000h");
        assert!(MouseTracking::Off.control_sequence().ends_with(b"\x1b[?1005l"));
    }
}
