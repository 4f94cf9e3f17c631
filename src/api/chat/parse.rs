use std::time::Duration;

use serde_json::Value;

use crate::error::RelayError;
use crate::protocol::canonical::{ChatMessage, ChatRequest, ChatRole, RelayMode};

fn parse_message(index: usize, raw: &Value) -> Result<ChatMessage, RelayError> {
    let Some(object) = raw.as_object() else {
        return Err(RelayError::invalid_messages(format!(
            "messages[{index}] must be an object"
        )));
    };
    let role = object
        .get("role")
        .and_then(Value::as_str)
        .and_then(ChatRole::from_wire)
        .ok_or_else(|| {
            RelayError::invalid_messages(format!(
                "messages[{index}].role must be one of user, assistant, system"
            ))
        })?;
    let content = object
        .get("content")
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            RelayError::invalid_messages(format!(
                "messages[{index}].content must be a non-empty string"
            ))
        })?;
    Ok(ChatMessage::new(role, content))
}

/// Validate a raw chat request. No side effects.
///
/// # Errors
///
/// Returns a [`RelayError::Validation`] naming the first problem found.
pub(crate) fn parse_chat_request(
    method: &http::Method,
    body: &[u8],
    deadline: Duration,
) -> Result<ChatRequest, RelayError> {
    if *method != http::Method::POST {
        return Err(RelayError::method_not_allowed());
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::malformed_body(format!("Invalid JSON body: {e}")))?;

    let raw_messages = value
        .get("messages")
        .and_then(Value::as_array)
        .filter(|messages| !messages.is_empty())
        .ok_or_else(|| RelayError::invalid_messages("messages must be a non-empty array"))?;
    let messages = raw_messages
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_message(index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mode = RelayMode::from_wire(value.get("mode").and_then(Value::as_str));
    let stream = value
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(mode == RelayMode::Direct);

    Ok(ChatRequest {
        messages,
        mode,
        stream,
        deadline,
    })
}
