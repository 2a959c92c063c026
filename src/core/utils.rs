//! Shared utility functions
//! JSON cleanup, word counts and blank-string handling

/// Clean markdown code blocks from AI responses
/// Handles ```json and ``` wrappers commonly returned by LLMs
#[inline]
#[must_use]
pub fn clean_json_response(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Locate the outermost JSON object in a reply that wraps it in prose
pub fn extract_json_object(text: &str) -> Option<&str> {
    let cleaned = clean_json_response(text);
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    (end > start).then(|| &cleaned[start..=end])
}

/// Whitespace-separated word count, used for token estimates
#[inline]
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Treat empty or whitespace-only strings as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json_response() {
        assert_eq!(clean_json_response("```json\n{}\n```"), "{}");
        assert_eq!(clean_json_response("```\n{}\n```"), "{}");
        assert_eq!(clean_json_response("{}"), "{}");
        assert_eq!(clean_json_response("  {}  "), "{}");
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(
            extract_json_object("Here you go:\n{\"a\": 1}\nThanks"),
            Some("{\"a\": 1}")
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\tthree\nfour "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" 480V ".to_string())), Some("480V".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
