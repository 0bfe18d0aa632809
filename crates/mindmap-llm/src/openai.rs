//! OpenAI-compatible Chat Completions API integration.
//!
//! xAI serves Grok through this wire format, so the same client talks to
//! `https://api.x.ai/v1` by swapping the base URL.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use mindmap_core::error::{MindmapError, ModelError, Result};
use mindmap_core::message::{Message, UsageMetadata};
use mindmap_core::model::{
    CallOptions, ChatModel, ChatResult, ChatStream, ChatStreamEvent, ResponseFormat,
};

use crate::sse::{sse_data_stream, truncated_stream_error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ---------------------------------------------------------------------------
// Chat Completions request/response types
// ---------------------------------------------------------------------------

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenAIResponseFormat>,
    #[serde(skip_serializing_if = "is_false")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAIStreamOptions>,
}

#[derive(Debug, Serialize)]
pub struct OpenAIStreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize)]
pub struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
    pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIError {
    pub error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIErrorDetail {
    pub message: String,
}

// ---------------------------------------------------------------------------
// OpenAIChatModel
// ---------------------------------------------------------------------------

pub struct OpenAIChatModel {
    api_key: String,
    model_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(api_key: String, model_id: String) -> Self {
        Self {
            api_key,
            model_id,
            base_url: DEFAULT_BASE_URL.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn build_request(&self, messages: &[Message], options: &CallOptions) -> OpenAIRequest {
        let api_messages = messages
            .iter()
            .map(|msg| {
                let role = match msg {
                    Message::System { .. } => "system",
                    Message::User { .. } => "user",
                    Message::AI { .. } => "assistant",
                };
                OpenAIMessage {
                    role: role.into(),
                    content: msg.content().to_string(),
                }
            })
            .collect();

        let response_format = match &options.response_format {
            Some(ResponseFormat::JsonObject) => Some(OpenAIResponseFormat {
                format_type: "json_object".into(),
            }),
            None => None,
        };

        OpenAIRequest {
            model: self.model_id.clone(),
            messages: api_messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            response_format,
            stream: false,
            stream_options: None,
        }
    }

    async fn send(&self, request_body: &OpenAIRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request_body)
            .send()
            .await
            .map_err(|e| MindmapError::Model(ModelError::ApiRequest(e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response body".into());
        let error_msg = serde_json::from_str::<OpenAIError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        tracing::warn!(model = %self.model_id, %status, "chat completion rejected");
        Err(MindmapError::Model(match status.as_u16() {
            401 | 403 => ModelError::Auth(error_msg),
            429 => ModelError::RateLimited {
                retry_after_secs: None,
            },
            _ => ModelError::ApiRequest(format!("HTTP {status}: {error_msg}")),
        }))
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult> {
        let request_body = self.build_request(messages, options);
        let response = self.send(&request_body).await?;

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| MindmapError::Model(ModelError::InvalidResponse(e.to_string())))?;

        let text = api_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = api_response.usage.map(|u| UsageMetadata {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ChatResult {
            message: Message::ai(text),
            usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<ChatStream> {
        let mut request_body = self.build_request(messages, options);
        request_body.stream = true;
        request_body.stream_options = Some(OpenAIStreamOptions {
            include_usage: true,
        });

        let response = self.send(&request_body).await?;
        let data_stream = sse_data_stream(response);

        let event_stream = async_stream::stream! {
            let mut data_stream = Box::pin(data_stream);

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
                if data == "[DONE]" {
                    yield Ok(ChatStreamEvent::Done);
                    finished = true;
                    break;
                }

                for event in parse_openai_sse_data(&data) {
                    yield Ok(event);
                }
            }

            if !finished {
                yield Err(truncated_stream_error());
            }
        };

        Ok(Box::pin(event_stream))
    }
}

/// Parse a single SSE data line into stream events.
pub fn parse_openai_sse_data(data: &str) -> Vec<ChatStreamEvent> {
    let mut events = Vec::new();
    let json: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return events,
    };

    // Usage arrives in a trailing chunk when stream_options.include_usage is set.
    if let Some(usage) = json.get("usage").filter(|u| u.is_object()) {
        let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
        let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
        let total = usage["total_tokens"].as_u64().unwrap_or(prompt + completion);
        events.push(ChatStreamEvent::Usage(UsageMetadata {
            input_tokens: prompt,
            output_tokens: completion,
            total_tokens: total,
        }));
    }

    if let Some(choices) = json["choices"].as_array() {
        for choice in choices {
            if let Some(text) = choice["delta"]["content"].as_str() {
                if !text.is_empty() {
                    events.push(ChatStreamEvent::Token(text.to_string()));
                }
            }
        }
    }

    events
}
