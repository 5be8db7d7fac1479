//! Parsing of chat-completion responses and provider error bodies.

use serde_json::Value;

use crate::error::ProviderError;

const REASONING_OPEN: &str = "<think>";
const REASONING_CLOSE: &str = "</think>";

/// Extract `choices[0].message.content` from a successful response body
///
/// Reasoning blocks are removed and the result trimmed.
pub(crate) fn extract_content(body: &str) -> Result<String, ProviderError> {
    let json: Value = serde_json::from_str(body).map_err(|_| ProviderError::MalformedResponse)?;

    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(strip_reasoning)
        .ok_or(ProviderError::MalformedResponse)
}

/// Remove `<think>...</think>` blocks; an unterminated block runs to the end of the text
pub(crate) fn strip_reasoning(text: &str) -> String {
    let mut answer = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(REASONING_OPEN) {
        answer.push_str(&rest[..start]);
        match rest[start..].find(REASONING_CLOSE) {
            Some(end) => rest = &rest[start + end + REASONING_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    answer.push_str(rest);

    answer.trim().to_string()
}

/// Message for a non-success response
///
/// Prefers the provider's `error.message`; falls back to the status code and,
/// for bodies that are not JSON, their first 100 characters.
pub(crate) fn error_message(status: u16, body: &str) -> String {
    if body.trim().is_empty() {
        return format!("HTTP {}", status);
    }

    match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status)),
        Err(_) => format!(
            "HTTP {}: {}",
            status,
            body.chars().take(100).collect::<String>()
        ),
    }
}

/// Message for a failed connection probe
pub(crate) fn probe_error_message(status: u16, body: &str) -> String {
    match status {
        401 => "Invalid API key (HTTP 401)".to_string(),
        404 => "Model not found or invalid endpoint (HTTP 404)".to_string(),
        429 => "Rate limit exceeded (HTTP 429)".to_string(),
        _ => error_message(status, body),
    }
}
