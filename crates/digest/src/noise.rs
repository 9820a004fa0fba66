//! Noise filtering for agent output.
//!
//! Agents interleave useful prose with tool chatter: file paths they
//! touched, echoed shell commands, log lines and terminal escapes.
//! [`is_content_line`] is the single predicate deciding what survives.

use std::sync::OnceLock;

use regex::RegexSet;

fn noise_patterns() -> &'static RegexSet {
    static CACHED: OnceLock<RegexSet> = OnceLock::new();
    CACHED.get_or_init(|| {
        RegexSet::new([
            // ANSI escape sequences anywhere in the line.
            r"\x1b\[[0-9;?]*[A-Za-z]",
            // Shell prompts and echoed commands.
            r"^\s*[$%]\s+\S",
            r"^\s*[\w.-]+@[\w.-]+:\S*\s*[$#]\s",
            // Bracketed timestamps and log-level markers.
            r"^\s*\[\d{1,4}[-/:.]\d{1,2}",
            r"(?i)^\s*\[(trace|debug|info|warn|warning|error|fatal)\]",
            r"^\s*\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}",
            // Lines that are nothing but a path.
            r"^\s*(~|\.{1,2})?/\S*\s*$",
            r"^\s*[A-Za-z]:\\\S*\s*$",
            r"^\s*[\w.-]+(/[\w.-]+)+(:\d+){0,2}\s*$",
            // Lines that are nothing but a URL.
            r"^\s*https?://\S+\s*$",
        ])
        .expect("noise patterns must compile")
    })
}

/// `true` when the line carries prose rather than tool noise.
///
/// Blank lines are not content.
pub fn is_content_line(line: &str) -> bool {
    !line.trim().is_empty() && !noise_patterns().is_match(line)
}

/// Keep only content lines, joined with `\n`.
pub fn extract_key_information<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref())
        .filter(|l| is_content_line(l))
        .collect::<Vec<_>>()
        .join("\n")
}
