use serde::Serialize;

use crate::extract::{count_tokens, extract_action_items};

/// Summary returned for output that is empty after trimming.
pub const EMPTY_OUTPUT_SUMMARY: &str = "No output generated.";

/// Lines kept by [`summarize`]. Anything past this is dropped without a
/// marker.
pub const SUMMARY_MAX_LINES: usize = 10;

/// Bound raw output to its first [`SUMMARY_MAX_LINES`] lines.
pub fn summarize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return EMPTY_OUTPUT_SUMMARY.to_string();
    }
    trimmed
        .lines()
        .take(SUMMARY_MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Everything the gateway derives from one run's output.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub summary: String,
    pub action_items: Vec<String>,
    pub token_estimate: usize,
}

pub fn digest(raw: &str) -> Digest {
    Digest {
        summary: summarize(raw),
        action_items: extract_action_items(raw),
        token_estimate: count_tokens(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_gets_placeholder() {
        assert_eq!(summarize(""), EMPTY_OUTPUT_SUMMARY);
        assert_eq!(summarize("  \n\t\n "), EMPTY_OUTPUT_SUMMARY);
    }

    #[test]
    fn short_output_is_unchanged() {
        assert_eq!(summarize("one\ntwo\nthree"), "one\ntwo\nthree");
    }

    #[test]
    fn keeps_exactly_first_ten_lines() {
        let raw: String = (1..=25).map(|i| format!("line {i}\n")).collect();
        let out = summarize(&raw);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "line 1");
        assert_eq!(lines[9], "line 10");
        assert!(!out.contains("line 11"));
    }

    #[test]
    fn ten_lines_exactly_are_kept_whole() {
        let raw: String = (1..=10).map(|i| format!("l{i}\n")).collect();
        assert_eq!(summarize(&raw), raw.trim_end());
    }

    #[test]
    fn digest_combines_all_three() {
        let d = digest("done\nTODO: write docs\n");
        assert_eq!(d.summary, "done\nTODO: write docs");
        assert_eq!(d.action_items, vec!["TODO: write docs".to_string()]);
        assert_eq!(d.token_estimate, "done\nTODO: write docs\n".chars().count() / 4);
    }
}
