use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use mindmap_core::error::{MindmapError, PipelineError, Result};

use crate::enrichment::Snippet;
use crate::stage::Stage;
use crate::usage::UsageReport;

/// Frames emitted by a streaming pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PipelineEvent {
    Status { stage: Stage, message: String },
    Sources { sources: Vec<Snippet> },
    Text { text: String },
    Done { usage: UsageReport },
    Error { message: String },
}

impl PipelineEvent {
    pub fn status(stage: Stage) -> Self {
        PipelineEvent::Status {
            stage,
            message: stage.status_message().into(),
        }
    }
}

/// Where a run reports progress. The blocking path discards events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn channel(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Whether events reach a client.
    pub fn is_live(&self) -> bool {
        self.tx.is_some()
    }

    /// Deliver an event; a closed channel means the client went away.
    pub async fn send(&self, event: PipelineEvent) -> Result<()> {
        match &self.tx {
            None => Ok(()),
            Some(tx) => tx
                .send(event)
                .await
                .map_err(|_| MindmapError::Pipeline(PipelineError::Disconnected)),
        }
    }
}
