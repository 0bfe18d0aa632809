use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, UsageMetadata};

/// Output mode requested from the provider. Outline stages ask for
/// `JsonObject`; rendering leaves it unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonObject,
}

/// Per-call generation knobs, built from the request options of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// 0.0 to 2.0; validated before a run starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// A complete (non-streamed) completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub message: Message,

    /// Absent when the provider reports no usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

/// One item of a streamed completion. `Usage` may arrive at most once,
/// before `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Token(String),
    Usage(UsageMetadata),
    Done,
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

/// The one seam between the pipeline and a model provider.
///
/// Provider failures surface as [`ModelError`](crate::error::ModelError)
/// inside [`MindmapError::Model`](crate::error::MindmapError::Model).
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult>;

    /// Provider model id, e.g. `grok-3-mini`.
    fn model_name(&self) -> &str;

    /// Stream the completion. The default wraps a single `generate` call.
    async fn stream(&self, messages: &[Message], options: &CallOptions) -> Result<ChatStream> {
        let result = self.generate(messages, options).await?;
        let mut events: Vec<Result<ChatStreamEvent>> = Vec::new();
        let content = result.message.content().to_string();
        if !content.is_empty() {
            events.push(Ok(ChatStreamEvent::Token(content)));
        }
        if let Some(usage) = result.usage {
            events.push(Ok(ChatStreamEvent::Usage(usage)));
        }
        events.push(Ok(ChatStreamEvent::Done));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}
