use thiserror::Error;

/// Top-level error type for the mindmap backend.
#[derive(Debug, Error)]
pub enum MindmapError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Outline error: {0}")]
    Outline(#[from] OutlineError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },
}

/// Structural violations of an [`Outline`](crate::outline::Outline).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("Unsupported depth {0}: expected 2, 3 or 4")]
    InvalidDepth(u8),

    #[error("Outline title is empty")]
    EmptyTitle,

    #[error("Outline has no branches")]
    NoBranches,

    #[error("Node at {path} has an empty name")]
    EmptyName { path: String },

    #[error("Node '{name}' has an empty summary")]
    EmptySummary { name: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Markdown rendering failed: {0}")]
    Render(String),

    #[error("Client disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, MindmapError>;
