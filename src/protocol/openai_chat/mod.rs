pub mod encoder;
pub mod stream;

use serde::{Deserialize, Serialize};

/// `OpenAI` Chat Completion request wire type, streaming only.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<OpenAiMessage<'a>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

/// `OpenAI` message wire type.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// One `data:` payload of a streamed completion.
///
/// Every field is optional so unfamiliar but well-formed chunks (usage-only
/// frames, keep-alives) decode to "no text" rather than an error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiStreamChunk {
    pub choices: Vec<OpenAiStreamChoice>,
    pub error: Option<serde_json::Value>,
}

/// A choice within a stream chunk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiStreamChoice {
    pub delta: OpenAiDelta,
    pub finish_reason: Option<String>,
}

/// Delta content within a stream choice.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiDelta {
    pub role: Option<String>,
    pub content: Option<String>,
}
