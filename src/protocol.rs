//! Wire types for the Ollama HTTP API.
//!
//! Requests are JSON bodies; streamed responses are one JSON record per line.

use serde::{Deserialize, Serialize};

/// Which endpoint a request targets. Decides where the text fragment lives in
/// each streamed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /api/generate`, single turn.
    Generate,
    /// `POST /api/chat`, full history on every call.
    Chat,
}

impl Endpoint {
    /// Request path relative to the server base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Generate => "/api/generate",
            Endpoint::Chat => "/api/chat",
        }
    }
}

/// Decoding parameters forwarded verbatim to the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub min_p: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            num_ctx: default_num_ctx(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            min_p: 0.0,
        }
    }
}

fn default_temperature() -> f32 {
    0.6
}

fn default_num_ctx() -> u32 {
    8192
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    1.0
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: Options,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: String,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    pub options: Options,
}

/// Role of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged conversation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One decoded line of a streamed response.
///
/// Only the terminal record carries the evaluation counters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<RecordMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: Option<u64>,
    /// Nanoseconds.
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

/// Nested `message` object of a chat record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordMessage {
    #[serde(default)]
    pub content: String,
}

impl StreamRecord {
    /// The text fragment carried by this record, empty when there is none.
    pub fn fragment(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Generate => self.response.as_deref().unwrap_or_default(),
            Endpoint::Chat => self
                .message
                .as_ref()
                .map(|m| m.content.as_str())
                .unwrap_or_default(),
        }
    }

    /// Generated tokens per second, if the counters allow computing it.
    pub fn tokens_per_second(&self) -> Option<f64> {
        let count = self.eval_count?;
        let duration = self.eval_duration?;
        if duration == 0 {
            return None;
        }
        Some(count as f64 / (duration as f64 / 1_000_000_000.0))
    }
}
