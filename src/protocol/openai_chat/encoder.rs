use crate::config::DirectConfig;
use crate::error::RelayError;
use crate::protocol::canonical::{ChatMessage, ChatRole};

use super::{OpenAiChatRequest, OpenAiMessage};

/// Build the streamed Chat Completions request for a conversation.
///
/// The configured system prompt is prepended only when the conversation
/// does not already open with a system turn.
#[must_use]
pub fn build_openai_chat_request<'a>(
    config: &'a DirectConfig,
    messages: &'a [ChatMessage],
) -> OpenAiChatRequest<'a> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .filter(|prompt| !prompt.trim().is_empty())
        .filter(|_| messages.first().map(|m| m.role) != Some(ChatRole::System));

    let mut wire_messages =
        Vec::with_capacity(messages.len() + usize::from(system_prompt.is_some()));
    if let Some(prompt) = system_prompt {
        wire_messages.push(OpenAiMessage {
            role: ChatRole::System.as_str(),
            content: prompt,
        });
    }
    wire_messages.extend(messages.iter().map(|message| OpenAiMessage {
        role: message.role.as_str(),
        content: &message.content,
    }));

    OpenAiChatRequest {
        model: &config.model,
        messages: wire_messages,
        stream: true,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Serialize the request body sent to the direct provider.
///
/// # Errors
///
/// Returns [`RelayError::UpstreamFailure`] if serialization fails.
pub fn encode_openai_chat_body(
    config: &DirectConfig,
    messages: &[ChatMessage],
) -> Result<bytes::Bytes, RelayError> {
    let request = build_openai_chat_request(config, messages);
    serde_json::to_vec(&request)
        .map(bytes::Bytes::from)
        .map_err(|e| RelayError::UpstreamFailure(format!("Failed to encode chat request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> DirectConfig {
        DirectConfig {
            model: "gpt-4o-mini".to_string(),
            system_prompt: Some("be nice".to_string()),
            ..DirectConfig::default()
        }
    }

    #[test]
    fn test_prepends_system_prompt() {
        let messages = vec![ChatMessage::new(ChatRole::User, "Hi")];
        let body = encode_openai_chat_body(&config(), &messages).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4o-mini",
                "stream": true,
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "Hi"}
                ]
            })
        );
    }

    #[test]
    fn test_keeps_client_system_turn() {
        let messages = vec![
            ChatMessage::new(ChatRole::System, "custom"),
            ChatMessage::new(ChatRole::User, "Hi"),
        ];
        let config = config();
        let request = build_openai_chat_request(&config, &messages);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "custom");
    }

    #[test]
    fn test_generation_params_passthrough() {
        let mut config = config();
        config.system_prompt = None;
        config.temperature = Some(0.7);
        config.max_tokens = Some(1000);
        let messages = vec![ChatMessage::new(ChatRole::User, "Hi")];
        let body = encode_openai_chat_body(&config, &messages).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["temperature"], 0.7);
        assert_eq!(value["max_tokens"], 1000);
        assert_eq!(value["messages"].as_array().unwrap().len(), 1);
    }
}
