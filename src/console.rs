//! Terminal collaborator for the pager.
//!
//! The control loop talks to the terminal only through the [`Console`]
//! trait: geometry queries, blocking key scans, prompt-line input, cursor
//! movement, clearing, and styled text. The crossterm-backed implementation
//! lives here; tests substitute a scripted console.

use anyhow::Result;
use crossterm::{
    cursor::MoveLeft,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    style::{Print, PrintStyledContent, Stylize},
    terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use std::io::{self, Stdout, Write};

/// A single scanned key, reduced to what the pager dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Char(char),
    Ctrl(char),
    Enter,
    Other,
}

/// Terminal capabilities the control loop depends on. Geometry is polled
/// at state transitions, never pushed.
pub trait Console {
    /// Current (width, height) in cells.
    fn size(&self) -> Result<(usize, usize)>;
    /// Blocks until one key is pressed.
    fn scan_key(&mut self) -> Result<KeyPress>;
    /// Reads a line of input, echoing as it goes; the terminating Enter is
    /// swallowed.
    fn read_line(&mut self) -> Result<String>;
    fn cursor_left(&mut self, cols: usize) -> Result<()>;
    fn clear_line(&mut self) -> Result<()>;
    fn clear_screen(&mut self) -> Result<()>;
    fn print_bold(&mut self, text: &str) -> Result<()>;
    fn print_error(&mut self, text: &str) -> Result<()>;
}

/// Puts the terminal into raw mode and returns the crossterm console.
pub fn init() -> Result<CrosstermConsole> {
    enable_raw_mode()?;
    Ok(CrosstermConsole::new())
}

/// Leaves raw mode. Called on every exit path.
pub fn restore() -> Result<()> {
    disable_raw_mode()?;
    Ok(())
}

pub struct CrosstermConsole {
    out: Stdout,
}

impl CrosstermConsole {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Console for CrosstermConsole {
    fn size(&self) -> Result<(usize, usize)> {
        let (width, height) = terminal::size()?;
        Ok((width as usize, height as usize))
    }

    fn scan_key(&mut self) -> Result<KeyPress> {
        loop {
            // Resize and mouse events are ignored; geometry is re-sampled
            // when the next command executes.
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                return Ok(match key.code {
                    KeyCode::Enter => KeyPress::Enter,
                    KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        KeyPress::Ctrl(c)
                    }
                    KeyCode::Char(c) => KeyPress::Char(c),
                    _ => KeyPress::Other,
                });
            }
        }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Enter => break,
                KeyCode::Backspace => {
                    if line.pop().is_some() {
                        execute!(self.out, MoveLeft(1), Clear(ClearType::UntilNewLine))?;
                    }
                }
                KeyCode::Char(c) => {
                    line.push(c);
                    execute!(self.out, Print(c))?;
                }
                _ => {}
            }
        }
        Ok(line)
    }

    fn cursor_left(&mut self, cols: usize) -> Result<()> {
        if cols > 0 {
            execute!(self.out, MoveLeft(cols.min(u16::MAX as usize) as u16))?;
        }
        Ok(())
    }

    fn clear_line(&mut self) -> Result<()> {
        execute!(self.out, Clear(ClearType::CurrentLine))?;
        Ok(())
    }

    fn clear_screen(&mut self) -> Result<()> {
        execute!(
            self.out,
            Clear(ClearType::All),
            crossterm::cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }

    fn print_bold(&mut self, text: &str) -> Result<()> {
        execute!(self.out, PrintStyledContent(text.bold()))?;
        Ok(())
    }

    fn print_error(&mut self, text: &str) -> Result<()> {
        execute!(self.out, PrintStyledContent(text.red()))?;
        Ok(())
    }
}

/// Output sink wrapper that expands `\n` to `\r\n` so content renders
/// correctly while the terminal is in raw mode.
pub struct RawModeWriter<W> {
    inner: W,
}

impl<W: Write> RawModeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for RawModeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if byte == b'\n' {
                self.inner.write_all(b"\r\n")?;
            } else {
                self.inner.write_all(&[byte])?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
