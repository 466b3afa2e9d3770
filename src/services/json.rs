use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{PressError, Result};

const FENCE: &str = "```";

/// Returns the JSON value inside a model reply.
///
/// Clean JSON is returned as-is. A reply that opens with a markdown fence is
/// unwrapped up to the last closing fence. Otherwise the longest complete
/// value starting at a `{` or `[` is taken; values are read by the JSON
/// parser, so backticks and braces inside string literals never end one early.
pub fn extract_json(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return Ok(trimmed);
    }

    let body = strip_fence(trimmed);
    if body.len() != trimmed.len() && serde_json::from_str::<Value>(body).is_ok() {
        return Ok(body);
    }

    // A stray "[1]" in prose must not shadow the object after it.
    let mut best: Option<&str> = None;
    let mut search = 0;
    while let Some(offset) = body[search..].find(['{', '[']) {
        let open = search + offset;
        let mut values = serde_json::Deserializer::from_str(&body[open..]).into_iter::<Value>();
        if let Some(Ok(_)) = values.next() {
            let end = open + values.byte_offset();
            if best.is_none_or(|b| end - open > b.len()) {
                best = Some(&body[open..end]);
            }
            search = end;
        } else {
            search = open + 1;
        }
    }

    best.ok_or_else(|| PressError::MalformedResponse(preview(text)))
}

fn strip_fence(text: &str) -> &str {
    let Some(after_fence) = text.strip_prefix(FENCE) else {
        return text;
    };
    // Skip the info string ("json", "JSON", ...) up to the end of the line.
    let after_info = after_fence
        .find('\n')
        .map(|i| &after_fence[i + 1..])
        .unwrap_or(after_fence);
    match after_info.rfind(FENCE) {
        Some(end) => after_info[..end].trim(),
        None => after_info.trim(),
    }
}

pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json(text)?;
    serde_json::from_str(json)
        .map_err(|e| PressError::MalformedResponse(format!("{e}: {}", preview(text))))
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}
