use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use std::io;

/// Enable raw mode for the terminal
pub fn enable_raw() -> io::Result<()> {
    enable_raw_mode()
}

/// Disable raw mode for the terminal
pub fn disable_raw() -> io::Result<()> {
    disable_raw_mode()
}

/// Check if raw mode is enabled
pub fn get_raw_mode() -> io::Result<bool> {
    is_raw_mode_enabled()
}

/// Read one keystroke without waiting for a newline. Used by KEY when the
/// input source is the console. Non-character keys are ignored except Enter,
/// which reads as '\n'.
pub fn read_key() -> io::Result<u8> {
    enable_raw()?;
    let result = loop {
        match event::read() {
            Ok(Event::Key(key)) => match key.code {
                KeyCode::Char(c) => break Ok(c as u8),
                KeyCode::Enter => break Ok(b'\n'),
                KeyCode::Tab => break Ok(b'\t'),
                KeyCode::Backspace => break Ok(8),
                KeyCode::Esc => break Ok(27),
                _ => continue,
            },
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };
    disable_raw()?;
    result
}
