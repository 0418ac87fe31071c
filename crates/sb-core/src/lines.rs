//! Line-coalescing buffer for terminal output
//!
//! Shell output arrives in chunks of arbitrary size that rarely line up with
//! line boundaries. The buffer keeps an ordered list of lines where every
//! element except the last is complete; the last element stays open and is
//! extended by the next chunk until a line break closes it.

/// Append a chunk of terminal output to `lines`.
///
/// The chunk is split on `\r?\n`. Its first part continues the open last
/// line (or starts a new one when `lines` is empty), every further part is
/// pushed verbatim. A chunk ending in a line break therefore leaves an empty
/// open line behind.
///
/// Rejoining the elements with the separators that were removed reproduces
/// the input stream exactly. A `\r\n` pair split across two chunks keeps its
/// `\r` on the first line, since the split only looks at one chunk.
pub fn append_terminal_data(lines: &mut Vec<String>, chunk: &str) {
    let mut parts: Vec<&str> = chunk.split('\n').collect();
    let last = parts.len() - 1;
    for part in &mut parts[..last] {
        *part = part.strip_suffix('\r').unwrap_or(part);
    }

    let mut parts = parts.into_iter();
    let first = parts.next().unwrap_or_default();

    match lines.last_mut() {
        Some(open) if !open.ends_with('\n') => open.push_str(first),
        _ => lines.push(first.to_string()),
    }

    lines.extend(parts.map(str::to_string));
}

/// Ordered list of logical lines built from terminal output chunks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, coalescing partial lines
    pub fn push(&mut self, chunk: &str) {
        append_terminal_data(&mut self.lines, chunk);
    }

    /// All lines, the last one possibly still open
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines known to be complete (everything but the open last line)
    pub fn complete_lines(&self) -> &[String] {
        match self.lines.len() {
            0 => &[],
            n => &self.lines[..n - 1],
        }
    }

    /// The line still waiting for its terminator
    pub fn open_line(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// Number of lines, including the open one
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drop all lines
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Take the lines out of the buffer
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl Extend<String> for LineBuffer {
    fn extend<I: IntoIterator<Item = String>>(&mut self, chunks: I) {
        for chunk in chunks {
            self.push(&chunk);
        }
    }
}
