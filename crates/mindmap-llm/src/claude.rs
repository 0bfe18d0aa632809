//! Anthropic Claude API integration.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use mindmap_core::error::{MindmapError, ModelError, Result};
use mindmap_core::message::{Message, UsageMetadata};
use mindmap_core::model::{CallOptions, ChatModel, ChatResult, ChatStream, ChatStreamEvent};

use crate::sse::{sse_data_stream, truncated_stream_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

// ---------------------------------------------------------------------------
// Anthropic Messages API request/response types
// ---------------------------------------------------------------------------

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "is_false")]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<AnthropicResponseContent>,
    pub usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicError {
    pub error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicErrorDetail {
    pub message: String,
}

/// One decoded event of the Messages streaming protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum AnthropicSseEvent {
    Text(String),
    InputTokens(u64),
    OutputTokens(u64),
    Stop,
    Error(String),
}

// ---------------------------------------------------------------------------
// ClaudeChatModel
// ---------------------------------------------------------------------------

pub struct ClaudeChatModel {
    api_key: String,
    model_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeChatModel {
    pub fn new(api_key: String, model_id: String) -> Self {
        Self {
            api_key,
            model_id,
            base_url: DEFAULT_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Anthropic has no JSON mode; `response_format` is left to the prompt.
    pub fn build_request(&self, messages: &[Message], options: &CallOptions) -> AnthropicRequest {
        let mut system: Option<String> = None;
        let mut api_messages: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg {
                Message::System { content } => {
                    system = Some(match system.take() {
                        Some(prev) => format!("{prev}\n\n{content}"),
                        None => content.clone(),
                    });
                }
                Message::User { content } => api_messages.push(AnthropicMessage {
                    role: "user".into(),
                    content: content.clone(),
                }),
                Message::AI { content } => api_messages.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: content.clone(),
                }),
            }
        }

        AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: api_messages,
            temperature: options.temperature,
            stream: false,
        }
    }

    async fn send(&self, request_body: &AnthropicRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request_body)
            .send()
            .await
            .map_err(|e| MindmapError::Model(ModelError::ApiRequest(e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response body".into());
        let error_msg = serde_json::from_str::<AnthropicError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        tracing::warn!(model = %self.model_id, %status, "messages request rejected");
        Err(MindmapError::Model(match status.as_u16() {
            401 | 403 => ModelError::Auth(error_msg),
            429 => ModelError::RateLimited { retry_after_secs },
            _ => ModelError::ApiRequest(format!("HTTP {status}: {error_msg}")),
        }))
    }
}

#[async_trait]
impl ChatModel for ClaudeChatModel {
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult> {
        let request_body = self.build_request(messages, options);
        let response = self.send(&request_body).await?;

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| MindmapError::Model(ModelError::InvalidResponse(e.to_string())))?;

        let text: String = api_response
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicResponseContent::Text { text } => Some(text.as_str()),
                AnthropicResponseContent::Other => None,
            })
            .collect();

        Ok(ChatResult {
            message: Message::ai(text),
            usage: Some(UsageMetadata::new(
                api_response.usage.input_tokens,
                api_response.usage.output_tokens,
            )),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<ChatStream> {
        let mut request_body = self.build_request(messages, options);
        request_body.stream = true;

        let response = self.send(&request_body).await?;
        let data_stream = sse_data_stream(response);

        let event_stream = async_stream::stream! {
            let mut data_stream = Box::pin(data_stream);
            let mut input_tokens = 0u64;
            let mut output_tokens = 0u64;

            let mut finished = false;

            while let Some(data) = data_stream.next().await {
                let data = match data {
                    Ok(data) => data,
                    Err(e) => {
                        yield Err(e);
                        finished = true;
                        break;
                    }
                };
                match parse_anthropic_sse_data(&data) {
                    Some(AnthropicSseEvent::Text(text)) => yield Ok(ChatStreamEvent::Token(text)),
                    Some(AnthropicSseEvent::InputTokens(n)) => input_tokens = n,
                    // message_delta carries a cumulative count
                    Some(AnthropicSseEvent::OutputTokens(n)) => output_tokens = n,
                    Some(AnthropicSseEvent::Stop) => {
                        yield Ok(ChatStreamEvent::Usage(UsageMetadata::new(input_tokens, output_tokens)));
                        yield Ok(ChatStreamEvent::Done);
                        finished = true;
                        break;
                    }
                    Some(AnthropicSseEvent::Error(message)) => {
                        yield Err(MindmapError::Model(ModelError::ApiRequest(message)));
                        finished = true;
                        break;
                    }
                    None => {}
                }
            }

            if !finished {
                yield Err(truncated_stream_error());
            }
        };

        Ok(Box::pin(event_stream))
    }
}

/// Parse a single SSE data payload from the Messages streaming API.
pub fn parse_anthropic_sse_data(data: &str) -> Option<AnthropicSseEvent> {
    let json: serde_json::Value = serde_json::from_str(data).ok()?;

    match json["type"].as_str()? {
        "message_start" => json["message"]["usage"]["input_tokens"]
            .as_u64()
            .map(AnthropicSseEvent::InputTokens),
        "content_block_delta" => {
            let text = json["delta"]["text"].as_str()?;
            (!text.is_empty()).then(|| AnthropicSseEvent::Text(text.to_string()))
        }
        "message_delta" => json["usage"]["output_tokens"]
            .as_u64()
            .map(AnthropicSseEvent::OutputTokens),
        "message_stop" => Some(AnthropicSseEvent::Stop),
        "error" => Some(AnthropicSseEvent::Error(
            json["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string(),
        )),
        _ => None,
    }
}
