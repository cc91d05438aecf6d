use chrono::Utc;

/// RFC3339 timestamp in UTC (for logs/reports).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    format!("{}...", text.chars().take(max_chars).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn timestamp_is_rfc3339() {
        assert!(chrono::DateTime::parse_from_rfc3339(&iso_timestamp_utc()).is_ok());
    }
}
