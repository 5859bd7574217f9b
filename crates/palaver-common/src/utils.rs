//! Shared string and time helpers.

use chrono::{DateTime, Utc};

/// Formats a timestamp for display.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%d.%m.%Y %H:%M").to_string()
}

/// Truncates a string to at most `max_chars` characters, appending an ellipsis
/// when something was cut. Counts characters, not bytes.
pub fn truncate_string(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        input.to_string()
    } else {
        let kept: String = input.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Byte ranges of every `@username` mention in `text`, ignoring ASCII case.
/// A match followed by another username character is a different user.
fn mention_spans(text: &str, username: &str) -> Vec<(usize, usize)> {
    if username.is_empty() {
        return Vec::new();
    }
    let needle = format!("@{}", username.to_ascii_lowercase());
    // ASCII lowercasing keeps byte offsets aligned with the original text.
    let lowered = text.to_ascii_lowercase();
    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(found) = lowered[cursor..].find(&needle) {
        let start = cursor + found;
        let end = start + needle.len();
        let continues = lowered[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if !continues {
            spans.push((start, end));
        }
        cursor = end;
    }
    spans
}

/// Whether `text` mentions `@username`, ignoring ASCII case.
pub fn contains_mention(text: &str, username: &str) -> bool {
    !mention_spans(text, username).is_empty()
}

/// Removes every `@username` mention from `text` and trims the result.
/// Line breaks inside the text are kept.
pub fn strip_mention(text: &str, username: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in mention_spans(text, username) {
        result.push_str(&text[cursor..start]);
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(timestamp), "01.01.2024 12:00");
    }

    #[test]
    fn test_truncate_string() {
        let input = "This is a very long string that should be truncated";
        assert_eq!(truncate_string(input, 20), "This is a very lo...");
        assert_eq!(truncate_string("Short", 20), "Short");
        assert_eq!(truncate_string("привет мир", 6), "при...");
    }

    #[test]
    fn test_mentions() {
        assert!(contains_mention("hey @Palaver_Bot what's up", "palaver_bot"));
        assert!(contains_mention("hey @palaver_bot, hi", "palaver_bot"));
        assert!(!contains_mention("hey there", "palaver_bot"));
        assert!(!contains_mention("hey @someone", ""));

        assert_eq!(strip_mention("@Palaver_Bot  what is rust?", "palaver_bot"), "what is rust?");
        assert_eq!(strip_mention("@palaver_bot", "palaver_bot"), "");
        assert_eq!(strip_mention("привет @palaver_bot!", "palaver_bot"), "привет !");
    }

    #[test]
    fn test_longer_usernames_are_not_mentions() {
        assert!(!contains_mention("hey @palaver_bot_fan, hi", "palaver_bot"));
        assert!(!contains_mention("ask @palaver_bots", "palaver_bot"));
        assert!(!contains_mention("ask @Palaver_Bot2", "palaver_bot"));
        assert!(contains_mention("@palaver_bot_fan and @palaver_bot", "palaver_bot"));

        assert_eq!(
            strip_mention("@palaver_bot_fan says hi", "palaver_bot"),
            "@palaver_bot_fan says hi"
        );
        assert_eq!(
            strip_mention("@palaver_bot_fan asks @palaver_bot.", "palaver_bot"),
            "@palaver_bot_fan asks ."
        );
    }

    #[test]
    fn test_strip_mention_keeps_line_breaks() {
        let text = "@palaver_bot review this:\nfn main() {\n    println!(\"hi\");\n}\n";
        assert_eq!(
            strip_mention(text, "palaver_bot"),
            "review this:\nfn main() {\n    println!(\"hi\");\n}"
        );
        assert_eq!(strip_mention("list:\n- a\n- b", "palaver_bot"), "list:\n- a\n- b");
    }
}
