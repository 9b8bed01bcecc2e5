//! Key mapping for console input
//!
//! Converts console key records to the byte sequences a terminal of
//! the same type would send, using the key capabilities of the
//! terminal description.

use std::sync::Arc;

use bitflags::bitflags;

use crate::core::capabilities::{Capability, CapabilityStore};
use crate::core::tparm::{tparm, Param};

// dwControlKeyState bits
pub const RIGHT_ALT_PRESSED: u32 = 0x0001;
pub const LEFT_ALT_PRESSED: u32 = 0x0002;
pub const RIGHT_CTRL_PRESSED: u32 = 0x0004;
pub const LEFT_CTRL_PRESSED: u32 = 0x0008;
pub const SHIFT_PRESSED: u32 = 0x0010;

const ALT_STATE: u32 = RIGHT_ALT_PRESSED | LEFT_ALT_PRESSED;
const CTRL_STATE: u32 = RIGHT_CTRL_PRESSED | LEFT_CTRL_PRESSED;
/// Windows reports AltGr as right Alt plus left Ctrl
const ALT_GR: u32 = RIGHT_ALT_PRESSED | LEFT_CTRL_PRESSED;

const VK_MENU: u16 = 0x12;
const VK_OEM_2: u16 = 0xBF;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
    }
}

impl Modifiers {
    pub fn from_state(state: u32) -> Self {
        let mut result = Modifiers::empty();
        if state & SHIFT_PRESSED != 0 {
            result |= Modifiers::SHIFT;
        }
        if state & ALT_STATE != 0 {
            result |= Modifiers::ALT;
        }
        if state & CTRL_STATE != 0 {
            result |= Modifiers::CTRL;
        }
        result
    }

    /// Whether the modifier state is exactly AltGr.
    fn is_alt_gr(state: u32) -> bool {
        state & (ALT_STATE | CTRL_STATE) == ALT_GR
    }
}

/// Parameter of the `CSI 1;<m>` modified key forms.
fn modifier_code(mods: Modifiers) -> i64 {
    1 + mods.bits() as i64
}

/// One console key record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_down: bool,
    pub virtual_key: u16,
    /// UTF-16 code unit, 0 when the key produces no character
    pub ch: u16,
    pub control_state: u32,
    pub repeat: u16,
}

/// Key mapper for converting console key records to bytes
pub struct KeyMapper {
    capabilities: Arc<CapabilityStore>,
    /// High surrogate waiting for its pair
    pending_high: Option<u16>,
}

impl KeyMapper {
    pub fn new(capabilities: Arc<CapabilityStore>) -> Self {
        Self {
            capabilities,
            pending_high: None,
        }
    }

    /// Map a key record to the bytes it produces.
    pub fn map(&mut self, event: &KeyEvent) -> Vec<u8> {
        if !event.key_down {
            return self.map_key_up(event);
        }
        if event.ch == 3 {
            // Ctrl+C is delivered on key up
            return Vec::new();
        }
        let once = self.map_key_down(event);
        once.repeat(event.repeat.max(1) as usize)
    }

    fn map_key_up(&mut self, event: &KeyEvent) -> Vec<u8> {
        if event.ch == 3 {
            return vec![3];
        }
        // Alt+numpad composition completes on release of Alt
        if event.virtual_key == VK_MENU && event.ch > 0 {
            return self.encode_unit(event.ch);
        }
        Vec::new()
    }

    fn map_key_down(&mut self, event: &KeyEvent) -> Vec<u8> {
        let state = event.control_state;
        let mut mods = Modifiers::from_state(state);
        if event.ch > 0 && Modifiers::is_alt_gr(state) {
            mods.remove(Modifiers::ALT | Modifiers::CTRL);
        }

        if mods.contains(Modifiers::SHIFT) && event.ch == b'\t' as u16 {
            if let Some(seq) = self.capabilities.render(Capability::KeyBtab, &[]) {
                return seq;
            }
        }
        if let Some(seq) = self.escape_sequence(event.virtual_key, mods) {
            return seq;
        }

        let mut out = Vec::new();
        if event.ch > 0 {
            let alt = mods.contains(Modifiers::ALT);
            if mods.contains(Modifiers::CTRL) && ![b' ' as u16, b'\n' as u16, 0x7f].contains(&event.ch) {
                if alt {
                    out.push(0x1b);
                }
                out.push(ctrl_char(event.ch));
                return out;
            }
            let encoded = self.encode_unit(event.ch);
            if alt && !encoded.is_empty() {
                out.push(0x1b);
            }
            out.extend(encoded);
        } else if mods.contains(Modifiers::CTRL) {
            let code = match event.virtual_key {
                vk @ 0x41..=0x5A => Some((vk - 0x40) as u8),
                VK_OEM_2 => Some(0x7f),
                _ => None,
            };
            if let Some(code) = code {
                if mods.contains(Modifiers::ALT) {
                    out.push(0x1b);
                }
                out.push(code);
            }
        }
        out
    }

    /// Sequence for a navigation or function key, if `vk` is one.
    fn escape_sequence(&self, vk: u16, mods: Modifiers) -> Option<Vec<u8>> {
        let (cap, modified) = match vk {
            0x08 => (Capability::KeyBackspace, mods.contains(Modifiers::ALT).then_some("\\E^H")),
            0x21 => (Capability::KeyPpage, Some("\\E[5;%p1%d~")),
            0x22 => (Capability::KeyNpage, Some("\\E[6;%p1%d~")),
            0x23 => (Capability::KeyEnd, Some("\\E[1;%p1%dF")),
            0x24 => (Capability::KeyHome, Some("\\E[1;%p1%dH")),
            0x25 => (Capability::KeyLeft, Some("\\E[1;%p1%dD")),
            0x26 => (Capability::KeyUp, Some("\\E[1;%p1%dA")),
            0x27 => (Capability::KeyRight, Some("\\E[1;%p1%dC")),
            0x28 => (Capability::KeyDown, Some("\\E[1;%p1%dB")),
            0x2D => (Capability::KeyIc, Some("\\E[2;%p1%d~")),
            0x2E => (Capability::KeyDc, Some("\\E[3;%p1%d~")),
            0x70..=0x7B => return self.function_key((vk - 0x70 + 1) as u8, mods),
            _ => return None,
        };
        match modified {
            Some(template) if !mods.is_empty() => Some(tparm(template, &[Param::Int(modifier_code(mods))])),
            _ => self.capabilities.render(cap, &[]),
        }
    }

    fn function_key(&self, n: u8, mods: Modifiers) -> Option<Vec<u8>> {
        const CAPS: [Capability; 12] = [
            Capability::KeyF1,
            Capability::KeyF2,
            Capability::KeyF3,
            Capability::KeyF4,
            Capability::KeyF5,
            Capability::KeyF6,
            Capability::KeyF7,
            Capability::KeyF8,
            Capability::KeyF9,
            Capability::KeyF10,
            Capability::KeyF11,
            Capability::KeyF12,
        ];
        if mods.is_empty() {
            return self.capabilities.render(CAPS[(n - 1) as usize], &[]);
        }
        let code = modifier_code(mods);
        let template = match n {
            1..=4 => format!("\\E[1;%p1%d{}", (b'P' + n - 1) as char),
            _ => {
                let num = match n {
                    5 => 15,
                    6 => 17,
                    7 => 18,
                    8 => 19,
                    9 => 20,
                    10 => 21,
                    11 => 23,
                    _ => 24,
                };
                format!("\\E[{};%p1%d~", num)
            }
        };
        Some(tparm(&template, &[Param::Int(code)]))
    }

    /// UTF-8 for one UTF-16 unit, holding a high surrogate until its
    /// low half arrives.
    fn encode_unit(&mut self, unit: u16) -> Vec<u8> {
        let units: Vec<u16> = match (self.pending_high.take(), unit) {
            (_, 0xD800..=0xDBFF) => {
                self.pending_high = Some(unit);
                return Vec::new();
            }
            (Some(high), 0xDC00..=0xDFFF) => vec![high, unit],
            (None, 0xDC00..=0xDFFF) => return Vec::new(),
            (_, unit) => vec![unit],
        };
        char::decode_utf16(units)
            .filter_map(|c| c.ok())
            .collect::<String>()
            .into_bytes()
    }
}

fn ctrl_char(ch: u16) -> u8 {
    if ch == b'?' as u16 {
        return 0x7f;
    }
    let byte = (ch & 0xff) as u8;
    byte.to_ascii_uppercase() & 0x1f
}
