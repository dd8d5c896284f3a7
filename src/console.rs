//! # Console Module
//!
//! Operator terminal helpers: window title and the quit key.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::SetTitle;
use crossterm::tty::IsTty;

/// Set the terminal title; failures are ignored
///
/// Nothing is written when stdout is redirected, since stdout then carries
/// only the captured text.
pub fn set_title(title: &str) {
    let mut stdout = io::stdout();
    let is_terminal = stdout.is_tty();
    let _ = write_title(&mut stdout, is_terminal, title);
}

fn write_title<W: Write>(out: &mut W, is_terminal: bool, title: &str) -> io::Result<()> {
    if is_terminal {
        execute!(out, SetTitle(title))?;
    }
    Ok(())
}

/// Check, without blocking, whether the quit key (`q`/`Q`) was pressed
///
/// Any other pending input is read and discarded.
///
/// # Errors
///
/// Returns error if the terminal cannot be polled (e.g. no TTY attached)
pub fn quit_key_pressed() -> io::Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Release
                && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q'))
            {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_skipped_when_not_a_terminal() {
        let mut out = Vec::new();
        write_title(&mut out, false, "/dev/ttyUSB0->capture.log").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_title_written_to_terminal() {
        let mut out = Vec::new();
        write_title(&mut out, true, "/dev/ttyUSB0->capture.log").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("/dev/ttyUSB0->capture.log"));
    }
}
