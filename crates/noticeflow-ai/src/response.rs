//! Strict JSON decoding of model output.

use serde::de::DeserializeOwned;

use crate::OracleError;

const MAX_EXCERPT: usize = 200;

/// Decode a model response into `T`.
///
/// Tolerates surrounding whitespace and a Markdown code fence; anything
/// else that does not match `T` exactly is a
/// [`OracleError::MalformedResponse`].
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    let body = strip_fence(text.trim());
    serde_json::from_str(body).map_err(|e| {
        OracleError::MalformedResponse(format!("{e}; raw: {}", excerpt(text)))
    })
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.trim_end();
    let inner = rest.strip_suffix("```").unwrap_or(rest);
    let (first, body) = inner.split_once('\n').unwrap_or((inner, ""));
    let first = first.trim_start();
    if first.starts_with(['{', '[']) {
        // No language tag; JSON starts on the fence line.
        inner.trim()
    } else if body.trim().is_empty() {
        // Single line with a tag, like ```json {...}```.
        first
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim()
    } else {
        body.trim()
    }
}

fn excerpt(s: &str) -> &str {
    match s.char_indices().nth(MAX_EXCERPT) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
