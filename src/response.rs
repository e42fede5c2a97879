use log::{debug, log_enabled, trace, Level};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ChatError;

/// The text pulled out of a response, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnswer(pub String);

impl ParsedAnswer {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// The error envelope the API sends instead of `output` on failure.
#[derive(Debug, Deserialize, Clone)]
struct ErrorResponse {
    message: String,
    r#type: Option<String>,
    code: Option<Value>,
}

#[derive(Debug, Deserialize, Clone)]
struct ErrorResponseContainer {
    error: ErrorResponse,
}

/// Formats the API's error envelope if `json` is one.
pub fn api_error_message(json: &Value) -> Option<String> {
    let container = ErrorResponseContainer::deserialize(json).ok()?;
    let error = container.error;
    let mut message = error.message;
    if let Some(kind) = error.r#type {
        message = format!("{} (type: {})", message, kind);
    }
    if let Some(code) = error.code.filter(|c| !c.is_null()) {
        message = format!("{} (code: {})", message, code);
    }
    Some(message)
}

/// Parses a response body and returns the first generated text in it.
///
/// Items are visited in `output` order and, inside each, in `content` order;
/// the first string `text` field wins and the walk stops there. Output items
/// without a `content` array and content parts without a string `text` (tool
/// calls, reasoning summaries) are skipped.
pub fn extract(buffer: &[u8]) -> Result<ParsedAnswer, ChatError> {
    let json = parse(buffer)?;
    let output = output_items(&json)?;

    if log_enabled!(Level::Trace) {
        trace!("Response carries {} text parts", text_parts(output).count());
    }

    let first = text_parts(output).next();
    match first {
        Some(text) => {
            debug!("Extracted {} characters of answer text", text.chars().count());
            Ok(ParsedAnswer(text.to_string()))
        }
        None => Err(ChatError::ResponseShape(
            "no text found in any output content".to_string(),
        )),
    }
}

fn parse(buffer: &[u8]) -> Result<Value, ChatError> {
    serde_json::from_slice(buffer).map_err(|e| ChatError::ResponseParse {
        message: e.to_string(),
        raw: String::from_utf8_lossy(buffer).into_owned(),
    })
}

fn output_items(json: &Value) -> Result<&Vec<Value>, ChatError> {
    match json.get("output") {
        Some(Value::Array(items)) => {
            trace!("Response has {} output items", items.len());
            Ok(items)
        }
        Some(_) => Err(ChatError::ResponseShape(
            "\"output\" is not an array".to_string(),
        )),
        None => Err(ChatError::ResponseShape(match api_error_message(json) {
            Some(message) => format!("response has no \"output\"; API reported: {}", message),
            None => "response has no \"output\"".to_string(),
        })),
    }
}

fn text_parts(output: &[Value]) -> impl Iterator<Item = &str> {
    output
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
}
