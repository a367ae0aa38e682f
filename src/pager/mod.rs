//! Pager control loop.
//!
//! An explicit state machine drives one paging session: `Streaming` echoes
//! bytes from the line buffer to the output sink until the viewport fills,
//! `AtPageBoundary` scans one command key, `SearchPrompt` reads a pattern
//! and runs the buffer search, `PatternNotFound` shows the miss until any
//! key, and `Terminated` ends the session. Terminal geometry is re-sampled
//! once per transition that resumes streaming, never polled while bytes are
//! flowing.

mod command;

pub use command::Command;

use anyhow::Result;
use std::io::{Read, Write};
use tracing::{debug, trace};

use crate::buffer::{LineBuffer, LineEnd, WrapCounter};
use crate::console::Console;
use command::command_for;

const MORE_PROMPT: &str = "--[SPACE:PageDn U:PageUp ENT:LineDn J:LineUp Q:Quit]--";
const SEARCH_FORWARD_PROMPT: &str = "Search-Forward: ";
const SEARCH_BACKWARD_PROMPT: &str = "Search-Backwards: ";
const PATTERN_NOT_FOUND: &str = "-- Pattern not found: ";

#[derive(Debug)]
enum State {
    Streaming,
    AtPageBoundary,
    SearchPrompt { backward: bool },
    PatternNotFound { pattern: String, erase: usize },
    Terminated,
}

/// One interactive paging session over a byte source.
pub struct Pager<'a, R, W, C> {
    buffer: LineBuffer<R>,
    console: &'a mut C,
    out: W,
    /// Display-side boundary accounting; kept in lockstep with the width
    /// the buffer uses for seeks.
    counter: WrapCounter,
    /// Viewport height in lines (terminal height minus the prompt row).
    height: usize,
    /// Lines emitted on the current screen.
    y: usize,
}

impl<'a, R: Read, W: Write, C: Console> Pager<'a, R, W, C> {
    pub fn new(source: R, console: &'a mut C, out: W) -> Result<Self> {
        let (width, height) = console.size()?;
        Ok(Self {
            buffer: LineBuffer::new(source, width),
            counter: WrapCounter::new(width),
            height: height.saturating_sub(1).max(1),
            y: 0,
            console,
            out,
        })
    }

    /// Runs the session to completion (quit key or end of stream).
    pub fn run(mut self) -> Result<()> {
        let mut state = State::Streaming;
        loop {
            trace!(?state, "pager transition");
            state = match state {
                State::Streaming => self.stream()?,
                State::AtPageBoundary => self.page_prompt()?,
                State::SearchPrompt { backward } => self.search_prompt(backward)?,
                State::PatternNotFound { pattern, erase } => {
                    self.pattern_not_found(&pattern, erase)?
                }
                State::Terminated => break,
            };
        }
        self.out.flush()?;
        Ok(())
    }

    /// Echoes bytes until the viewport fills or the stream ends.
    fn stream(&mut self) -> Result<State> {
        while let Some(byte) = self.buffer.read_next()? {
            let end = self.counter.feed(byte);
            if end != LineEnd::None {
                self.buffer.line_seen();
                self.y += 1;
                if let LineEnd::Hard { swallow: true } = end {
                    // CRLF partner: consumed, never echoed.
                    let _ = self.buffer.read_next()?;
                }
                if self.y >= self.height {
                    // The boundary byte is not echoed; the pause newline
                    // stands in for it. Exact at a terminator; at a wrap
                    // the byte is content and is traded for the newline.
                    self.out.write_all(b"\n")?;
                    self.out.flush()?;
                    return Ok(State::AtPageBoundary);
                }
            }
            self.out.write_all(&[byte])?;
        }
        self.out.flush()?;
        Ok(State::Terminated)
    }

    /// Prints the boundary prompt, scans one key, and dispatches it.
    fn page_prompt(&mut self) -> Result<State> {
        let prompt = format!("{MORE_PROMPT}[line:{}]--", self.buffer.current_line());
        self.console.print_bold(&prompt)?;

        let key = self.console.scan_key()?;
        let Some(cmd) = command_for(key) else {
            self.console.clear_line()?;
            self.console.cursor_left(prompt.len())?;
            return Ok(State::AtPageBoundary);
        };
        debug!(?cmd, line = self.buffer.current_line(), "boundary command");

        match cmd {
            Command::LineDown => {
                self.y = self.y.saturating_sub(1);
                self.refresh_geometry()?;
                self.console.cursor_left(prompt.len())?;
                self.console.clear_line()?;
                Ok(State::Streaming)
            }
            Command::LineUp => {
                self.refresh_geometry()?;
                let target = self.buffer.current_line().saturating_sub(1);
                let resume = self.buffer.rewind(self.height, target);
                self.redraw(resume)?;
                Ok(State::Streaming)
            }
            Command::PageUp => {
                self.refresh_geometry()?;
                let target = self.buffer.current_line().saturating_sub(self.height);
                let resume = self.buffer.rewind(self.height, target);
                self.redraw(resume)?;
                Ok(State::Streaming)
            }
            Command::PageDown => {
                self.refresh_geometry()?;
                self.y = 0;
                self.console.clear_line()?;
                self.console.cursor_left(prompt.len())?;
                Ok(State::Streaming)
            }
            Command::Quit => {
                self.out.write_all(b"\n")?;
                self.out.flush()?;
                Ok(State::Terminated)
            }
            Command::SearchForward | Command::SearchBackward => {
                self.console.clear_line()?;
                self.console.cursor_left(prompt.len())?;
                Ok(State::SearchPrompt {
                    backward: cmd == Command::SearchBackward,
                })
            }
        }
    }

    /// Reads a pattern and runs the buffer search.
    fn search_prompt(&mut self, backward: bool) -> Result<State> {
        let label = if backward {
            SEARCH_BACKWARD_PROMPT
        } else {
            SEARCH_FORWARD_PROMPT
        };
        self.console.print_bold(label)?;
        let pattern = self.console.read_line()?.trim().to_string();

        match self.buffer.search(&pattern, backward)? {
            Some(line) => {
                self.refresh_geometry()?;
                let resume = self.buffer.rewind(self.height, line);
                self.redraw(resume)?;
                Ok(State::Streaming)
            }
            None => Ok(State::PatternNotFound {
                erase: label.len() + pattern.len(),
                pattern,
            }),
        }
    }

    /// Shows the miss message until any key, then returns to the prompt.
    fn pattern_not_found(&mut self, pattern: &str, erase: usize) -> Result<State> {
        self.console.clear_line()?;
        self.console.cursor_left(erase)?;
        let message = format!("{PATTERN_NOT_FOUND}{pattern}");
        self.console.print_error(&message)?;

        let _ = self.console.scan_key()?;
        self.console.clear_line()?;
        self.console.cursor_left(message.len())?;
        Ok(State::AtPageBoundary)
    }

    /// Re-samples terminal geometry and feeds the new width to the buffer
    /// and the display counter.
    fn refresh_geometry(&mut self) -> Result<()> {
        let (width, height) = self.console.size()?;
        self.height = height.saturating_sub(1).max(1);
        self.buffer.set_line_width(width);
        self.counter.set_width(width);
        Ok(())
    }

    /// Clears the screen and restarts display accounting from the rewound
    /// cursor, resuming the boundary countdown the buffer reports there.
    fn redraw(&mut self, counter: WrapCounter) -> Result<()> {
        self.y = 0;
        self.counter = counter;
        self.console.clear_screen()?;
        Ok(())
    }
}
