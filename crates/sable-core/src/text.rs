//! Text truncation helpers for summaries and audit entries.

/// Truncate `s` to at most `max` characters, appending an ellipsis marker
/// when anything was cut. Char-boundary safe.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}...")
}

/// Serialize a JSON value and truncate the result to `max` characters.
#[must_use]
pub fn summarize_json(value: &serde_json::Value, max: usize) -> String {
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    truncate_chars(&raw, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_strings_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn long_strings_cut_with_marker() {
        assert_eq!(truncate_chars("abcdefgh", 4), "abcd...");
    }

    #[test]
    fn exact_length_untouched() {
        assert_eq!(truncate_chars("abcd", 4), "abcd");
    }

    #[test]
    fn multibyte_safe() {
        let s = "héllo wörld";
        let t = truncate_chars(s, 4);
        assert_eq!(t, "héll...");
    }

    #[test]
    fn summarize_object() {
        let v = json!({"token": "BTC", "amount": 5});
        let s = summarize_json(&v, 500);
        assert!(s.contains("BTC"));
    }

    #[test]
    fn summarize_plain_string_not_quoted() {
        let v = json!("price check");
        assert_eq!(summarize_json(&v, 500), "price check");
    }

    #[test]
    fn summarize_truncates() {
        let long = "x".repeat(600);
        let v = json!({ "data": long });
        let s = summarize_json(&v, 500);
        assert_eq!(s.chars().count(), 503);
    }
}
