//! Key-to-command mapping for the page-boundary prompt.

use crate::console::KeyPress;

/// Navigation and search commands available while paused at a page
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Advance the view by a single line.
    LineDown,
    /// Scroll the view back by a single line and redraw.
    LineUp,
    /// Continue with the next full screen.
    PageDown,
    /// Scroll back a full screen and redraw.
    PageUp,
    Quit,
    SearchForward,
    SearchBackward,
}

/// Maps a scanned key to its command; unmapped keys re-prompt.
pub fn command_for(key: KeyPress) -> Option<Command> {
    match key {
        KeyPress::Enter | KeyPress::Char('y' | 'Y' | 'k' | 'K') | KeyPress::Ctrl('n') => {
            Some(Command::LineDown)
        }
        KeyPress::Char('e' | 'E' | 'j' | 'J') | KeyPress::Ctrl('p') => Some(Command::LineUp),
        KeyPress::Char(' ') => Some(Command::PageDown),
        KeyPress::Char('u' | 'U') => Some(Command::PageUp),
        KeyPress::Char('q' | 'Q') => Some(Command::Quit),
        KeyPress::Char('/') => Some(Command::SearchForward),
        KeyPress::Char('?') => Some(Command::SearchBackward),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_keys_map_to_commands() {
        assert_eq!(command_for(KeyPress::Enter), Some(Command::LineDown));
        assert_eq!(command_for(KeyPress::Char('k')), Some(Command::LineDown));
        assert_eq!(command_for(KeyPress::Ctrl('n')), Some(Command::LineDown));
        assert_eq!(command_for(KeyPress::Char('j')), Some(Command::LineUp));
        assert_eq!(command_for(KeyPress::Ctrl('p')), Some(Command::LineUp));
        assert_eq!(command_for(KeyPress::Char(' ')), Some(Command::PageDown));
        assert_eq!(command_for(KeyPress::Char('U')), Some(Command::PageUp));
        assert_eq!(command_for(KeyPress::Char('q')), Some(Command::Quit));
        assert_eq!(command_for(KeyPress::Char('/')), Some(Command::SearchForward));
        assert_eq!(command_for(KeyPress::Char('?')), Some(Command::SearchBackward));
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        assert_eq!(command_for(KeyPress::Char('z')), None);
        assert_eq!(command_for(KeyPress::Other), None);
    }
}
