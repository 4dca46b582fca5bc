use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::{
    error::ProxyError,
    model::{InsightRequest, InsightResponse},
    provider::{ChatProvider, endpoint},
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// OpenAI chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    http: Client,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }
}

/// Optional system message followed by the user prompt.
pub fn build_messages(request: &InsightRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system_instruction.as_deref().filter(|s| !s.is_empty()) {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: request.prompt.clone(),
    });
    messages
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, request: &InsightRequest) -> Result<InsightResponse, ProxyError> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: build_messages(request),
        };
        info!("Sending {} message(s) to {}", payload.messages.len(), self.model);

        let res = self
            .http
            .post(endpoint(&self.base_url, "/v1/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            let details =
                serde_json::from_str::<Value>(&body).unwrap_or_else(|_| Value::String(body));
            error!("OpenAI API error ({status}): {details}");
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                message: "OpenAI API error".to_string(),
                details: Some(details),
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(InsightResponse { text })
    }
}
