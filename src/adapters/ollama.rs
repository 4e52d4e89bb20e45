use super::http::{build_client, send_json};
use super::{AdapterError, Classifier};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded image files attached to the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

impl ChatResponse {
    /// Reply text, empty if the server sent no message
    pub fn content(self) -> String {
        self.message.map(|m| m.content).unwrap_or_default()
    }
}

/// Vision-language classifier served by an Ollama-compatible `/api/chat`
pub struct OllamaClassifier {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClassifier {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Request body for asking `question` about the image bytes
    pub fn build_request<'a>(&'a self, image_bytes: &[u8], question: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: question.to_string(),
                images: vec![STANDARD.encode(image_bytes)],
            }],
            stream: false,
        }
    }
}

impl Classifier for OllamaClassifier {
    fn classify(&self, artifact: &Path, question: &str) -> Result<String, AdapterError> {
        let bytes = std::fs::read(artifact)?;
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let body = self.build_request(&bytes, question);

        tracing::debug!("Asking {} about {}", self.model, artifact.display());
        let response: ChatResponse = send_json(self.client.post(&url).json(&body), &url)?;
        Ok(response.content())
    }
}
