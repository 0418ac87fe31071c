//! ANSI escape sequence removal for plain-text log views

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Single-character escapes (`ESC @` .. `ESC _`) and CSI sequences
/// (`ESC [` params, intermediates, final byte)
const ANSI_PATTERN: &str = r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])";

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(ANSI_PATTERN).expect("ANSI pattern is valid"))
}

/// Remove ANSI escape sequences from terminal text.
///
/// Borrows the input unchanged when it contains no escapes.
pub fn strip_ansi(input: &str) -> Cow<'_, str> {
    if !input.contains('\x1b') {
        return Cow::Borrowed(input);
    }
    ansi_regex().replace_all(input, "")
}
