//! Wire payloads for the server's OpenAI-compatible HTTP surface.

use serde::{Deserialize, Serialize};

/// One message in a conversation. The role is passed through verbatim; the
/// server understands `system`, `user`, and `assistant`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Separate request type for the streaming call. Keeping `stream` off the
/// non-streaming request entirely avoids sending a null or false field that
/// some servers mishandle.
#[derive(Serialize, Debug)]
pub struct StreamingChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub stream: bool,
}

#[derive(Deserialize, Debug)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: Option<u32>,
    pub message: ChatMessage,
}

#[derive(Deserialize, Debug)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: Option<u32>,
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One streamed event. Only `choices[0].delta.content` drives the stream;
/// everything else is advisory.
#[derive(Deserialize, Debug)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub owned_by: Option<String>,
}

impl ModelInfo {
    /// Humanizes the raw model id for display, e.g.
    /// `llama-3.2-3b-instruct-4bit` becomes `Llama 3.2 3b Instruct (4-bit)`.
    pub fn display_name(&self) -> String {
        self.id
            .replace("llama-", "Llama ")
            .replace('-', " ")
            .replace("instruct", "Instruct")
            .replace("4bit", "(4-bit)")
            .replace("8bit", "(8-bit)")
            .replace("fp16", "(FP16)")
    }
}

#[derive(Deserialize, Debug)]
pub struct ModelsResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub data: Vec<ModelInfo>,
}

/// Sorts models alphabetically by id for stable display.
pub fn sort_models(models: &mut [ModelInfo]) {
    models.sort_by(|a, b| a.id.cmp(&b.id));
}
