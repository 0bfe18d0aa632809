pub mod error;
pub mod extract;
pub mod message;
pub mod model;
pub mod outline;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{
        MindmapError, ModelError, OutlineError, PipelineError, Result,
    };
    pub use crate::extract::{extract_as, extract_json};
    pub use crate::message::{Message, UsageMetadata};
    pub use crate::model::{
        CallOptions, ChatModel, ChatResult, ChatStream, ChatStreamEvent, ResponseFormat,
    };
    pub use crate::outline::{Depth, Node, Outline};
}
