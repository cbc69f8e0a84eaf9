//! JSON extraction for generated stage payloads.
//!
//! Structured-output mode usually yields a bare JSON object, but some
//! providers still wrap it in a markdown fence or prepend a sentence. The
//! extraction strategies, in order:
//! 1. Content inside a ```` ```json ```` fence (or any fence)
//! 2. Content that already starts with `{`
//! 3. The first balanced `{...}` anywhere in the text
//!
//! ```
//! use verdict_forge::utils::json_extraction::extract_json_object;
//!
//! let content = "Here you go: {\"score\": 42}";
//! assert_eq!(extract_json_object(content).unwrap(), "{\"score\": 42}");
//! ```

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::ValidationError;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)\n?```").expect("Invalid regex for code fences")
});

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets")]
    Truncated {
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

impl From<JsonExtractionError> for ValidationError {
    fn from(err: JsonExtractionError) -> Self {
        ValidationError::Malformed(err.to_string())
    }
}

/// Brace/bracket balance of a JSON fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonBalance {
    pub unclosed_braces: usize,
    pub unclosed_brackets: usize,
    pub in_string: bool,
}

impl JsonBalance {
    pub fn is_truncated(&self) -> bool {
        self.unclosed_braces > 0 || self.unclosed_brackets > 0 || self.in_string
    }
}

/// Counts unclosed braces and brackets, ignoring string contents.
pub fn analyze_balance(s: &str) -> JsonBalance {
    let mut braces: usize = 0;
    let mut brackets: usize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => braces += 1,
            '}' if !in_string => braces = braces.saturating_sub(1),
            '[' if !in_string => brackets += 1,
            ']' if !in_string => brackets = brackets.saturating_sub(1),
            _ => {}
        }
    }

    JsonBalance {
        unclosed_braces: braces,
        unclosed_brackets: brackets,
        in_string,
    }
}

/// Finds the index of the `}` closing the object that starts at `s[0]`.
///
/// String literals and escape sequences are skipped.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = find_matching_brace(&s[start..])?;
    let candidate = &s[start..=start + end];
    serde_json::from_str::<serde_json::Value>(candidate)
        .is_ok()
        .then_some(candidate)
}

/// Extracts the JSON object from generated content.
///
/// # Errors
///
/// Returns `Truncated` when an object starts but never closes, `NotFound`
/// when there is no object at all.
pub fn extract_json_object(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    if let Some(inner) = FENCED_BLOCK
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
    {
        if let Some(obj) = balanced_object(inner) {
            return Ok(obj.to_string());
        }
    }

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    if let Some(obj) = balanced_object(trimmed) {
        return Ok(obj.to_string());
    }

    if let Some(start) = trimmed.find('{') {
        let balance = analyze_balance(&trimmed[start..]);
        if balance.is_truncated() {
            return Err(JsonExtractionError::Truncated {
                unclosed_braces: balance.unclosed_braces,
                unclosed_brackets: balance.unclosed_brackets,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: trimmed.chars().take(50).collect(),
    })
}

/// Extracts and deserializes a stage payload.
///
/// Every failure maps to a recoverable [`ValidationError`].
pub fn parse_payload<T: DeserializeOwned>(content: &str) -> Result<T, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyResponse);
    }
    let json = extract_json_object(content)?;
    Ok(serde_json::from_str(&json)?)
}
