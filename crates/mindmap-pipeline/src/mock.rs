//! Test doubles for running the pipeline without network access.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use mindmap_core::error::{MindmapError, ModelError, Result};
use mindmap_core::message::{Message, UsageMetadata};
use mindmap_core::model::{CallOptions, ChatModel, ChatResult, ChatStream, ChatStreamEvent};

use crate::enrichment::{Enricher, Enrichment, Snippet};

enum Reply {
    Text(String),
    Error(String),
}

/// A ChatModel that answers from a fixed script, one reply per call.
///
/// Streaming splits the reply into lines, optionally pausing between them.
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Vec<Message>>>,
    chunk_delay: Option<Duration>,
}

impl Default for ScriptedChatModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            chunk_delay: None,
        }
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Text(text.into()));
        self
    }

    /// Fail the next call as a provider error would.
    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Error(message.into()));
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Messages of every call so far, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_reply(&self, messages: &[Message]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Error(message)) => Err(MindmapError::Model(ModelError::ApiRequest(message))),
            None => Err(MindmapError::Model(ModelError::InvalidResponse(
                "scripted model has no replies left".into(),
            ))),
        }
    }
}

fn usage_for(messages: &[Message], reply: &str) -> UsageMetadata {
    let prompt: usize = messages.iter().map(|m| m.content().len()).sum();
    UsageMetadata::new((prompt / 4) as u64 + 1, (reply.len() / 4) as u64 + 1)
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn generate(&self, messages: &[Message], _options: &CallOptions) -> Result<ChatResult> {
        let text = self.next_reply(messages)?;
        Ok(ChatResult {
            usage: Some(usage_for(messages, &text)),
            message: Message::ai(text),
        })
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn stream(&self, messages: &[Message], _options: &CallOptions) -> Result<ChatStream> {
        let text = self.next_reply(messages)?;
        let usage = usage_for(messages, &text);

        let mut events: Vec<ChatStreamEvent> = text
            .split_inclusive('\n')
            .map(|line| ChatStreamEvent::Token(line.to_string()))
            .collect();
        events.push(ChatStreamEvent::Usage(usage));
        events.push(ChatStreamEvent::Done);

        let delay = self.chunk_delay;
        let stream = futures::stream::iter(events).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, MindmapError>(event)
        });
        Ok(Box::pin(stream))
    }
}

/// An Enricher serving fixed candidates through the real selection rules.
#[derive(Default)]
pub struct StaticEnricher {
    candidates: Vec<Snippet>,
    calls: AtomicUsize,
}

impl StaticEnricher {
    pub fn new(candidates: Vec<Snippet>) -> Self {
        Self {
            candidates,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Enricher for StaticEnricher {
    async fn fetch(&self, _topic: &str, budget: usize) -> Enrichment {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Enrichment::from_candidates(self.candidates.clone(), budget)
    }
}
