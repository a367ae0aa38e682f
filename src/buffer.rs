//! Line buffer engine: presents a byte stream as a seekable, line-indexed
//! character stream.
//!
//! Bytes pulled from the source are accumulated in an append-only buffer so
//! the pager can rewind without seeking the source itself. Logical line
//! boundaries (explicit terminators or width wraps) are counted as bytes are
//! first read, and every `INDEX_MARK_SIZE` lines the buffer offset is
//! recorded in a sparse index so later seeks can skip ahead instead of
//! rescanning from byte zero. Seeks always re-derive boundaries with the
//! current line width, which keeps navigation correct when the terminal is
//! resized mid-session.

use std::io::{self, Read};

use tracing::{debug, trace};

/// One sparse index mark is recorded per this many logical lines.
pub const INDEX_MARK_SIZE: usize = 50;

/// How a byte completed a logical line, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
    /// The byte did not end a line.
    None,
    /// The width countdown ran out; the byte is ordinary content.
    Wrap,
    /// An explicit terminator. `swallow` is set for `\r`, which consumes
    /// the following byte unconditionally (assumed to be the `\n` of a
    /// CRLF pair). Callers must pull that byte and feed it to nothing.
    Hard { swallow: bool },
}

/// Re-derives logical line boundaries from a flat byte stream.
///
/// This is the only place that knows where lines end. The streaming
/// accounting, seek rescans, search rescans, and the display loop all feed
/// bytes through their own `WrapCounter`, so every consumer derives the
/// same boundaries for the same bytes and width.
#[derive(Debug, Clone)]
pub struct WrapCounter {
    width: usize,
    remaining: usize,
}

impl WrapCounter {
    pub fn new(width: usize) -> Self {
        let width = width.max(2);
        Self {
            width,
            remaining: width,
        }
    }

    /// Counter state just past a hard terminator, which has already spent
    /// one count of the line that follows.
    pub fn after_terminator(width: usize) -> Self {
        let width = width.max(2);
        Self {
            width,
            remaining: width - 1,
        }
    }

    /// Returns the wrap width currently in effect.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Changes the wrap width for boundaries not yet derived. The countdown
    /// for the line in progress is left alone; it resets at the next
    /// boundary.
    pub fn set_width(&mut self, width: usize) {
        self.width = width.max(2);
    }

    /// Feeds one byte and reports whether it completed a logical line.
    ///
    /// Terminators reset the countdown before it is decremented for the
    /// terminator byte itself, so a terminated line holds up to `width - 1`
    /// content bytes while a line following a wrap holds up to `width`.
    pub fn feed(&mut self, byte: u8) -> LineEnd {
        let mut end = LineEnd::None;
        match byte {
            b'\r' => {
                end = LineEnd::Hard { swallow: true };
                self.remaining = self.width;
            }
            b'\n' => {
                end = LineEnd::Hard { swallow: false };
                self.remaining = self.width;
            }
            _ => {}
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.remaining = self.width;
            if end == LineEnd::None {
                end = LineEnd::Wrap;
            }
        }
        end
    }
}

/// Sparse index entry: where a mark line begins, and whether the previous
/// line ended at a hard terminator. A terminator spends one count of the
/// line that follows, so seeks resuming at the mark must seed the countdown
/// accordingly.
#[derive(Debug, Clone, Copy)]
struct IndexMark {
    offset: usize,
    after_hard: bool,
}

impl IndexMark {
    fn resume(&self, width: usize) -> WrapCounter {
        if self.after_hard {
            WrapCounter::after_terminator(width)
        } else {
            WrapCounter::new(width)
        }
    }
}

/// Accumulating line buffer over a sequential byte source.
///
/// One instance exists per paging session. The buffer grows monotonically
/// and is never truncated; rewinds move only the read cursor.
pub struct LineBuffer<R> {
    source: R,
    buf: Vec<u8>,
    /// Read cursor: next byte to deliver. Always within `0..=buf.len()`.
    pos: usize,
    /// Logical line number at the read cursor, advanced via `line_seen`.
    line: usize,
    /// Sparse index: `index[k]` marks the buffer offset at the start of
    /// logical line `(k + 1) * INDEX_MARK_SIZE`, plus how the line before
    /// it ended. Append-only.
    index: Vec<IndexMark>,
    /// Boundary accounting for bytes as they are first pulled from the
    /// source. Never consulted for re-reads of buffered bytes.
    counter: WrapCounter,
    total_lines: usize,
    /// Set after a fresh `\r`: the next fresh byte is the swallowed CRLF
    /// partner and must not be counted.
    swallow_pending: bool,
    /// Set when a mark lands on a `\r`: the index entry waits for the
    /// swallowed partner so it records the true start of the next line.
    mark_pending: bool,
}

impl<R: Read> LineBuffer<R> {
    pub fn new(source: R, line_width: usize) -> Self {
        Self {
            source,
            buf: Vec::new(),
            pos: 0,
            line: 0,
            index: Vec::new(),
            counter: WrapCounter::new(line_width),
            total_lines: 0,
            swallow_pending: false,
            mark_pending: false,
        }
    }

    /// Returns the next byte, or `None` at end of stream.
    ///
    /// Bytes behind the buffer end are re-delivered without touching the
    /// source. Fresh bytes are appended to the buffer and run through the
    /// boundary accounting that maintains the sparse index.
    pub fn read_next(&mut self) -> io::Result<Option<u8>> {
        if self.pos < self.buf.len() {
            let byte = self.buf[self.pos];
            self.pos += 1;
            return Ok(Some(byte));
        }

        let Some(byte) = self.pull_source()? else {
            if self.mark_pending {
                self.mark_pending = false;
                self.push_mark(true);
            }
            return Ok(None);
        };
        self.buf.push(byte);
        self.pos += 1;

        if self.swallow_pending {
            self.swallow_pending = false;
            if self.mark_pending {
                self.mark_pending = false;
                self.push_mark(true);
            }
        } else {
            let end = self.counter.feed(byte);
            if let LineEnd::Hard { swallow } = end {
                self.swallow_pending = swallow;
            }
            if end != LineEnd::None {
                self.line_ended(end);
            }
        }
        Ok(Some(byte))
    }

    /// Records that the consumer crossed a logical line boundary while
    /// streaming.
    pub fn line_seen(&mut self) {
        self.line += 1;
    }

    /// Logical line number at the read cursor.
    pub fn current_line(&self) -> usize {
        self.line
    }

    /// Wrap width used for boundary derivation from this point on. Lines
    /// already counted are not renumbered; seeks re-derive with the new
    /// width.
    pub fn set_line_width(&mut self, width: usize) {
        self.counter.set_width(width);
    }

    /// Buffer offset at which logical line `target` begins under the
    /// current width.
    ///
    /// Seeds the scan from the nearest sparse index mark at or below the
    /// target, then rescans linearly. A target whose index bucket does not
    /// exist yet clamps to the last buffered byte; a target past the end of
    /// buffered content returns the buffer length.
    pub fn locate_line(&self, target: usize) -> usize {
        self.seek(target).0
    }

    /// Scan half of `locate_line`; also returns the counter state at the
    /// returned offset so callers can resume boundary derivation from it.
    /// The scan seeds the countdown recorded with the mark, so it lands
    /// where streaming counted.
    fn seek(&self, target: usize) -> (usize, WrapCounter) {
        let width = self.counter.width();
        let bucket = target / INDEX_MARK_SIZE;
        if bucket > self.index.len() {
            return (self.buf.len().saturating_sub(1), WrapCounter::new(width));
        }

        let (mut cursor, mut counter) = if bucket == 0 {
            (0, WrapCounter::new(width))
        } else {
            let mark = self.index[bucket - 1];
            (mark.offset, mark.resume(width))
        };
        let mut line = bucket * INDEX_MARK_SIZE;

        while cursor < self.buf.len() && line != target {
            match counter.feed(self.buf[cursor]) {
                LineEnd::None => {}
                LineEnd::Wrap => line += 1,
                LineEnd::Hard { swallow } => {
                    line += 1;
                    if swallow {
                        // The CRLF partner belongs to no line.
                        cursor += 1;
                    }
                }
            }
            cursor += 1;
        }
        (cursor.min(self.buf.len()), counter)
    }

    /// Repositions the read cursor `viewport_height` logical lines above
    /// `target_line`, clamped at the buffer start. Returns the counter
    /// state at the new cursor so the display can resume from it.
    pub fn rewind(&mut self, viewport_height: usize, target_line: usize) -> WrapCounter {
        let from = target_line.saturating_sub(viewport_height);
        let counter = if from == 0 {
            self.pos = 0;
            self.line = 0;
            WrapCounter::new(self.counter.width())
        } else {
            let (pos, counter) = self.seek(from);
            self.pos = pos;
            self.line = from;
            counter
        };
        trace!(from, pos = self.pos, "rewound buffer");
        counter
    }

    /// Scans logical lines for an unanchored substring match.
    ///
    /// Forward search starts at the beginning of the current line; backward
    /// search starts at the buffer's absolute start but still scans toward
    /// the end of the stream (the historical behavior of this pager, kept
    /// deliberately). The scan pulls further bytes from the source as
    /// needed, extending the buffer and the sparse index. The read cursor
    /// and line counter are restored before returning, match or not.
    pub fn search(&mut self, pattern: &str, backward: bool) -> io::Result<Option<usize>> {
        let saved_pos = self.pos;
        let saved_line = self.line;

        let mut counter = if backward {
            self.pos = 0;
            self.line = 0;
            WrapCounter::new(self.counter.width())
        } else {
            let (pos, counter) = self.seek(self.line);
            self.pos = pos;
            counter
        };

        let mut line = self.line;
        let mut start = self.pos;
        let mut found = None;

        while let Some(byte) = self.read_next()? {
            match counter.feed(byte) {
                LineEnd::None => {}
                LineEnd::Wrap => {
                    if line_matches(&self.buf[start..self.pos], pattern) {
                        found = Some(line);
                        break;
                    }
                    line += 1;
                    start = self.pos;
                }
                LineEnd::Hard { swallow } => {
                    if line_matches(&self.buf[start..self.pos - 1], pattern) {
                        found = Some(line);
                        break;
                    }
                    line += 1;
                    if swallow {
                        let _ = self.read_next()?;
                    }
                    start = self.pos;
                }
            }
        }

        // The final line may end at the stream instead of a boundary.
        if found.is_none() && start < self.buf.len() && line_matches(&self.buf[start..], pattern) {
            found = Some(line);
        }

        debug!(pattern, backward, ?found, "pattern scan finished");
        self.pos = saved_pos;
        self.line = saved_line;
        Ok(found)
    }

    /// Streaming accounting for a completed line. A mark landing on a `\r`
    /// waits for the swallowed partner byte so the recorded offset is the
    /// true start of the next line.
    fn line_ended(&mut self, end: LineEnd) {
        self.total_lines += 1;
        if self.total_lines % INDEX_MARK_SIZE != 0 {
            return;
        }
        match end {
            LineEnd::Hard { swallow: true } => self.mark_pending = true,
            LineEnd::Hard { swallow: false } => self.push_mark(true),
            _ => self.push_mark(false),
        }
    }

    fn push_mark(&mut self, after_hard: bool) {
        self.index.push(IndexMark {
            offset: self.buf.len(),
            after_hard,
        });
        trace!(
            total_lines = self.total_lines,
            offset = self.buf.len(),
            "recorded sparse index mark"
        );
    }

    fn pull_source(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.source.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn index_marks(&self) -> Vec<usize> {
        self.index.iter().map(|mark| mark.offset).collect()
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.pos
    }

    #[cfg(test)]
    pub(crate) fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

fn line_matches(text: &[u8], pattern: &str) -> bool {
    String::from_utf8_lossy(text).contains(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn buffer(content: &str, width: usize) -> LineBuffer<Cursor<Vec<u8>>> {
        LineBuffer::new(Cursor::new(content.as_bytes().to_vec()), width)
    }

    fn drain<R: Read>(buf: &mut LineBuffer<R>) {
        while buf.read_next().unwrap().is_some() {}
    }

    #[test]
    fn wrap_and_terminator_boundaries() {
        // Width 4 wraps after 3 content bytes on terminated lines:
        // "abc", "def", "gh", "ij".
        let mut buf = buffer("abc\ndefgh\nij", 4);
        drain(&mut buf);

        assert_eq!(buf.locate_line(0), 0);
        assert_eq!(buf.locate_line(1), 4);
        assert_eq!(buf.locate_line(2), 7);
        assert_eq!(buf.locate_line(3), 10);
    }

    #[test]
    fn read_next_replays_buffered_bytes() {
        let mut buf = buffer("hello\nworld\n", 80);
        drain(&mut buf);

        buf.rewind(0, 0);
        let mut replay = Vec::new();
        while let Some(b) = buf.read_next().unwrap() {
            replay.push(b);
        }
        assert_eq!(replay, b"hello\nworld\n");
    }

    #[test]
    fn sparse_index_one_mark_per_fifty_lines() {
        // 120 two-byte lines: marks at lines 50 and 100, nothing for the
        // trailing 20.
        let content = "x\n".repeat(120);
        let mut buf = buffer(&content, 80);
        drain(&mut buf);

        assert_eq!(buf.index_marks(), &[100, 200]);
    }

    #[test]
    fn sparse_index_ignores_partial_bucket() {
        let content = "x\n".repeat(57);
        let mut buf = buffer(&content, 80);
        drain(&mut buf);

        assert_eq!(buf.index_marks(), &[100]);
    }

    #[test]
    fn locate_line_agrees_with_streamed_count() {
        // 130 eight-byte lines cross two index buckets; every line start
        // must land exactly where streaming put it.
        let content = "0123456\n".repeat(130);
        let mut buf = buffer(&content, 80);
        drain(&mut buf);

        for n in 0..130 {
            assert_eq!(buf.locate_line(n), n * 8, "line {n}");
        }
    }

    #[test]
    fn rewind_is_idempotent() {
        let content = "0123456\n".repeat(130);
        let mut buf = buffer(&content, 80);
        drain(&mut buf);

        buf.rewind(5, 60);
        let first = buf.cursor();
        assert_eq!(first, buf.locate_line(55));
        assert_eq!(buf.current_line(), 55);

        buf.rewind(5, 60);
        assert_eq!(buf.cursor(), first);
    }

    #[test]
    fn width_change_rederives_boundaries_at_seek_time() {
        // Indexed under width 80 (no wraps), then re-sought under width 5.
        let content = "aaaaaaaa\n".repeat(60);
        let mut buf = buffer(&content, 80);
        drain(&mut buf);
        assert_eq!(buf.index_marks(), &[450]);

        // The mark follows a terminator, so line 50 holds four bytes and
        // wraps; each nine-byte source line then splits into a four-byte
        // wrapped segment and a five-byte terminated one.
        buf.set_line_width(5);
        assert_eq!(buf.locate_line(50), 450);
        assert_eq!(buf.locate_line(51), 454);
        assert_eq!(buf.locate_line(52), 459);
        assert_eq!(buf.locate_line(53), 463);
        assert_eq!(buf.locate_line(54), 468);
        assert_eq!(buf.locate_line(55), 472);
    }

    #[test]
    fn width_change_applies_below_old_boundaries() {
        let mut buf = buffer("abc\ndefgh\nij", 10);
        drain(&mut buf);

        // Two lines under width 10, four under width 4.
        buf.set_line_width(4);
        assert_eq!(buf.locate_line(2), 7);
    }

    #[test]
    fn search_forward_finds_first_matching_line() {
        let mut buf = buffer("abc\ndefgh\nij", 4);
        drain(&mut buf);
        buf.rewind(0, 0);

        assert_eq!(buf.search("def", false).unwrap(), Some(1));
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.current_line(), 0);
    }

    #[test]
    fn search_miss_restores_cursor() {
        let mut buf = buffer("abc\ndefgh\nij", 4);
        drain(&mut buf);
        buf.rewind(0, 2);
        let pos = buf.cursor();

        assert_eq!(buf.search("xyz", false).unwrap(), None);
        assert_eq!(buf.cursor(), pos);
        assert_eq!(buf.current_line(), 2);
    }

    #[test]
    fn search_tests_trailing_unterminated_line() {
        let mut buf = buffer("abc\ndefgh\nij", 4);
        drain(&mut buf);
        buf.rewind(0, 0);

        assert_eq!(buf.search("ij", false).unwrap(), Some(3));
    }

    #[test]
    fn backward_search_rescans_from_buffer_start() {
        let mut buf = buffer("abc\ndefgh\nij", 4);
        drain(&mut buf);
        buf.rewind(0, 2);

        // Forward from line 2 cannot see "abc"; backward rescans from the
        // top (and still scans toward the end of the stream).
        assert_eq!(buf.search("abc", false).unwrap(), None);
        assert_eq!(buf.search("abc", true).unwrap(), Some(0));
        assert_eq!(buf.current_line(), 2);
    }

    #[test]
    fn index_mark_waits_for_a_swallowed_partner() {
        // Line 49 ends in \r exactly at the mark; the recorded offset is
        // the start of line 50, past the swallowed byte.
        let content = "a\r\n".repeat(60);
        let mut buf = buffer(&content, 80);
        drain(&mut buf);

        assert_eq!(buf.index_marks(), &[150]);
        assert_eq!(buf.locate_line(50), 150);
        assert_eq!(buf.locate_line(51), 153);
    }

    #[test]
    fn seek_resumes_the_countdown_recorded_at_a_mark() {
        // Fifty terminated lines, then a run that only wraps. The
        // terminator at the mark already spent one count of line 50, so it
        // holds four bytes and every wrapped line after it lands where
        // streaming counted it.
        let content = format!("{}{}", "x\n".repeat(50), "y".repeat(260));
        let mut buf = buffer(&content, 5);
        drain(&mut buf);

        assert_eq!(buf.index_marks(), &[100, 349]);
        assert_eq!(buf.locate_line(50), 100);
        assert_eq!(buf.locate_line(51), 104);
        assert_eq!(buf.locate_line(99), 344);
    }

    #[test]
    fn carriage_return_swallows_following_byte() {
        let mut buf = buffer("ab\rXcd\n", 10);
        drain(&mut buf);

        // "X" is consumed as the CRLF partner: seeks skip it and no
        // reconstructed line contains it.
        assert_eq!(buf.locate_line(1), 4);
        buf.rewind(0, 0);
        assert_eq!(buf.search("ab", false).unwrap(), Some(0));
        assert_eq!(buf.search("cd", false).unwrap(), Some(1));
        assert_eq!(buf.search("X", false).unwrap(), None);
    }

    #[test]
    fn search_pulls_unread_source_and_extends_index() {
        let content = "y\n".repeat(60);
        let mut buf = buffer(&content, 80);
        for _ in 0..20 {
            buf.read_next().unwrap();
        }
        assert!(buf.index_marks().is_empty());

        assert_eq!(buf.search("nosuch", false).unwrap(), None);
        assert_eq!(buf.cursor(), 20);
        assert_eq!(buf.buffered_len(), 120);
        assert_eq!(buf.index_marks(), &[100]);
    }

    #[test]
    fn seek_past_end_is_clamped() {
        let mut buf = buffer("a\nb\nc\n", 80);
        drain(&mut buf);

        // Missing index bucket clamps to the last byte; an exhausted scan
        // within an existing bucket stops at the buffer end.
        assert_eq!(buf.locate_line(250), 5);
        assert_eq!(buf.locate_line(10), 6);

        // Rewinding past the end leaves at most the final byte to deliver.
        buf.rewind(2, 500);
        assert_eq!(buf.read_next().unwrap(), Some(b'\n'));
        assert_eq!(buf.read_next().unwrap(), None);
    }

    #[test]
    fn pages_from_a_real_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..200 {
            writeln!(file, "line {i:04}").unwrap();
        }
        let handle = std::fs::File::open(file.path()).unwrap();

        let mut buf = LineBuffer::new(handle, 80);
        drain(&mut buf);
        assert_eq!(buf.index_marks().len(), 4);
        assert_eq!(buf.locate_line(150), 150 * 10);
    }
}
