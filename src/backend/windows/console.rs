//! Access to the Windows console.
//!
//! [`ConsoleHandle`] is the seam between the backend and the console
//! API; [`WinConsole`] implements it with the `windows` crate.

use std::time::Duration;

use crate::core::attributes::Size;
use crate::core::query::Cursor;
use crate::error::Result;

// Input console modes
pub const ENABLE_PROCESSED_INPUT: u32 = 0x0001;
pub const ENABLE_LINE_INPUT: u32 = 0x0002;
pub const ENABLE_ECHO_INPUT: u32 = 0x0004;
pub const ENABLE_WINDOW_INPUT: u32 = 0x0008;
pub const ENABLE_MOUSE_INPUT: u32 = 0x0010;
pub const ENABLE_INSERT_MODE: u32 = 0x0020;
pub const ENABLE_QUICK_EDIT_MODE: u32 = 0x0040;
pub const ENABLE_EXTENDED_FLAGS: u32 = 0x0080;

// Output console modes
pub const ENABLE_VIRTUAL_TERMINAL_PROCESSING: u32 = 0x0004;

pub const CP_UTF8: u32 = 65001;

/// One record from the console input buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRecord {
    Key {
        down: bool,
        virtual_key: u16,
        ch: u16,
        control_state: u32,
        repeat: u16,
    },
    Mouse {
        x: i16,
        y: i16,
        buttons: u32,
        flags: u32,
        control_state: u32,
    },
    Focus(bool),
    Resize,
}

pub trait ConsoleHandle: Send + Sync {
    fn input_mode(&self) -> Result<u32>;
    fn set_input_mode(&self, mode: u32) -> Result<()>;
    fn output_mode(&self) -> Result<u32>;
    fn set_output_mode(&self, mode: u32) -> Result<()>;
    /// Visible window size
    fn size(&self) -> Result<Size>;
    fn cursor_position(&self) -> Result<Cursor>;
    fn output_code_page(&self) -> u32;
    fn set_output_code_page(&self, page: u32) -> Result<()>;
    /// Next input record, or `None` when `timeout` passes first.
    fn read_record(&self, timeout: Duration) -> Result<Option<InputRecord>>;
}

#[cfg(windows)]
pub use self::win32::WinConsole;

#[cfg(windows)]
mod win32 {
    use std::io;

    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Console::{
        GetConsoleMode, GetConsoleOutputCP, GetConsoleScreenBufferInfo, GetStdHandle, ReadConsoleInputW,
        SetConsoleMode, SetConsoleOutputCP, CONSOLE_MODE, CONSOLE_SCREEN_BUFFER_INFO, INPUT_RECORD,
        STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
    };
    use windows::Win32::System::Threading::WaitForSingleObject;

    use super::*;

    const KEY_EVENT: u16 = 0x0001;
    const MOUSE_EVENT: u16 = 0x0002;
    const WINDOW_BUFFER_SIZE_EVENT: u16 = 0x0004;
    const FOCUS_EVENT: u16 = 0x0010;

    fn win_error(e: windows::core::Error) -> io::Error {
        io::Error::other(e)
    }

    /// The process's own console. Handles are kept as integers so the
    /// type can cross threads.
    pub struct WinConsole {
        input: isize,
        output: isize,
    }

    impl WinConsole {
        pub fn open() -> Result<Self> {
            let input = unsafe { GetStdHandle(STD_INPUT_HANDLE) }.map_err(win_error)?;
            let output = unsafe { GetStdHandle(STD_OUTPUT_HANDLE) }.map_err(win_error)?;
            Ok(Self {
                input: input.0 as isize,
                output: output.0 as isize,
            })
        }

        fn input(&self) -> HANDLE {
            HANDLE(self.input as *mut _)
        }

        fn output(&self) -> HANDLE {
            HANDLE(self.output as *mut _)
        }

        fn mode(handle: HANDLE) -> Result<u32> {
            let mut mode = CONSOLE_MODE(0);
            unsafe { GetConsoleMode(handle, &mut mode) }.map_err(win_error)?;
            Ok(mode.0)
        }

        fn screen_info(&self) -> Result<CONSOLE_SCREEN_BUFFER_INFO> {
            let mut info = CONSOLE_SCREEN_BUFFER_INFO::default();
            unsafe { GetConsoleScreenBufferInfo(self.output(), &mut info) }.map_err(win_error)?;
            Ok(info)
        }
    }

    impl ConsoleHandle for WinConsole {
        fn input_mode(&self) -> Result<u32> {
            Self::mode(self.input())
        }

        fn set_input_mode(&self, mode: u32) -> Result<()> {
            unsafe { SetConsoleMode(self.input(), CONSOLE_MODE(mode)) }.map_err(win_error)?;
            Ok(())
        }

        fn output_mode(&self) -> Result<u32> {
            Self::mode(self.output())
        }

        fn set_output_mode(&self, mode: u32) -> Result<()> {
            unsafe { SetConsoleMode(self.output(), CONSOLE_MODE(mode)) }.map_err(win_error)?;
            Ok(())
        }

        fn size(&self) -> Result<Size> {
            let window = self.screen_info()?.srWindow;
            Ok(Size::new(
                (window.Right - window.Left + 1).max(0) as u16,
                (window.Bottom - window.Top + 1).max(0) as u16,
            ))
        }

        fn cursor_position(&self) -> Result<Cursor> {
            let position = self.screen_info()?.dwCursorPosition;
            Ok(Cursor {
                x: position.X.max(0) as u16,
                y: position.Y.max(0) as u16,
            })
        }

        fn output_code_page(&self) -> u32 {
            unsafe { GetConsoleOutputCP() }
        }

        fn set_output_code_page(&self, page: u32) -> Result<()> {
            unsafe { SetConsoleOutputCP(page) }.map_err(win_error)?;
            Ok(())
        }

        fn read_record(&self, timeout: Duration) -> Result<Option<InputRecord>> {
            let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
            // WAIT_OBJECT_0 is zero
            if unsafe { WaitForSingleObject(self.input(), millis) }.0 != 0 {
                return Ok(None);
            }
            let mut records = [INPUT_RECORD::default(); 1];
            let mut read = 0u32;
            unsafe { ReadConsoleInputW(self.input(), &mut records, &mut read) }.map_err(win_error)?;
            if read == 0 {
                return Ok(None);
            }
            let record = &records[0];
            let converted = unsafe {
                match record.EventType {
                    KEY_EVENT => {
                        let key = record.Event.KeyEvent;
                        Some(InputRecord::Key {
                            down: key.bKeyDown.as_bool(),
                            virtual_key: key.wVirtualKeyCode,
                            ch: key.uChar.UnicodeChar,
                            control_state: key.dwControlKeyState,
                            repeat: key.wRepeatCount,
                        })
                    }
                    MOUSE_EVENT => {
                        let mouse = record.Event.MouseEvent;
                        Some(InputRecord::Mouse {
                            x: mouse.dwMousePosition.X,
                            y: mouse.dwMousePosition.Y,
                            buttons: mouse.dwButtonState,
                            flags: mouse.dwEventFlags,
                            control_state: mouse.dwControlKeyState,
                        })
                    }
                    FOCUS_EVENT => Some(InputRecord::Focus(record.Event.FocusEvent.bSetFocus.as_bool())),
                    WINDOW_BUFFER_SIZE_EVENT => Some(InputRecord::Resize),
                    // Menu events
                    _ => None,
                }
            };
            Ok(converted)
        }
    }
}
