/// Pull action items out of agent output.
///
/// A line is an action item when it starts with `TODO:` (case-sensitive)
/// or contains an unchecked checkbox (`[ ]`, which also covers `- [ ]`).
/// Lines are returned verbatim, in order.
pub fn extract_action_items(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| line.starts_with("TODO:") || line.contains("[ ]"))
        .map(str::to_string)
        .collect()
}

/// Rough token estimate: one token per four characters, rounded down.
pub fn count_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todo_prefix_and_checkboxes() {
        let raw = "Intro\nTODO: fix the parser\n- [ ] add tests\n[ ] bare box\n- [x] done already\nnothing here";
        assert_eq!(
            extract_action_items(raw),
            vec![
                "TODO: fix the parser".to_string(),
                "- [ ] add tests".to_string(),
                "[ ] bare box".to_string(),
            ]
        );
    }

    #[test]
    fn todo_match_is_case_sensitive_and_anchored() {
        let raw = "todo: lowercase\nNote TODO: later\nTODO:tight";
        assert_eq!(extract_action_items(raw), vec!["TODO:tight".to_string()]);
    }

    #[test]
    fn no_items_yields_empty() {
        assert!(extract_action_items("all good\n").is_empty());
        assert!(extract_action_items("").is_empty());
    }

    #[test]
    fn token_estimate_rounds_down() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("abc"), 0);
        assert_eq!(count_tokens("hello world"), 2);
        assert_eq!(count_tokens("abcdefgh"), 2);
    }

    #[test]
    fn token_estimate_counts_chars_not_bytes() {
        assert_eq!(count_tokens("ééééé"), 1);
    }
}
