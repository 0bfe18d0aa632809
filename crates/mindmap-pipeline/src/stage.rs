//! The outline-producing model stages.
//!
//! Each stage maps the current [`Outline`] to a new one. On
//! [`StageError::Parse`] the driver keeps the stage's input outline, which for
//! the first pass is the title-only seed; [`StageError::Upstream`] is a
//! provider failure and always aborts.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use mindmap_core::error::MindmapError;
use mindmap_core::extract::extract_json;
use mindmap_core::message::{Message, UsageMetadata};
use mindmap_core::model::ChatModel;
use mindmap_core::outline::{Depth, Outline};

use crate::options::PipelineOptions;
use crate::prompts;

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sources,
    Outline,
    Coverage,
    Leaves,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Sources => "sources",
            Stage::Outline => "outline",
            Stage::Coverage => "coverage",
            Stage::Leaves => "leaves",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

impl Stage {
    pub fn status_message(self) -> &'static str {
        match self {
            Stage::Sources => "Fetching sources",
            Stage::Outline => "Drafting outline",
            Stage::Coverage => "Improving coverage",
            Stage::Leaves => "Adding examples",
            Stage::Render => "Writing markdown",
        }
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    /// Output could not be turned into a valid outline.
    #[error("unusable model output: {reason}")]
    Parse {
        reason: String,
        usage: Option<UsageMetadata>,
    },

    #[error(transparent)]
    Upstream(#[from] MindmapError),
}

/// Inputs shared by every stage of one run.
pub struct StageContext<'a> {
    pub model: &'a dyn ChatModel,
    pub options: &'a PipelineOptions,
    /// Enrichment context block, when enrichment produced one.
    pub reference_context: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub outline: Outline,
    pub usage: Option<UsageMetadata>,
}

#[async_trait]
pub trait OutlineStage: Send + Sync {
    fn stage(&self) -> Stage;

    async fn apply(
        &self,
        outline: &Outline,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError>;
}

/// First pass: topic to outline. Reads the topic from the seed outline's title.
pub struct OutlineGenerator;

/// Second pass: checks the outline against a fixed rubric, optionally grounded.
pub struct CoverageImprover;

/// Third pass: fills leaves with examples; every summary must come back non-empty.
pub struct LeafEnricher;

#[async_trait]
impl OutlineStage for OutlineGenerator {
    fn stage(&self) -> Stage {
        Stage::Outline
    }

    async fn apply(
        &self,
        seed: &Outline,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let messages = prompts::outline_messages(&seed.title, ctx.options)?;
        request_outline(ctx, &messages, false).await
    }
}

#[async_trait]
impl OutlineStage for CoverageImprover {
    fn stage(&self) -> Stage {
        Stage::Coverage
    }

    async fn apply(
        &self,
        outline: &Outline,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let messages = prompts::coverage_messages(outline, ctx.options, ctx.reference_context)?;
        request_outline(ctx, &messages, false).await
    }
}

#[async_trait]
impl OutlineStage for LeafEnricher {
    fn stage(&self) -> Stage {
        Stage::Leaves
    }

    async fn apply(
        &self,
        outline: &Outline,
        ctx: &StageContext<'_>,
    ) -> Result<StageOutput, StageError> {
        let messages = prompts::leaf_messages(outline, ctx.options)?;
        request_outline(ctx, &messages, true).await
    }
}

/// Call the model and turn its reply into a validated outline at the requested depth.
async fn request_outline(
    ctx: &StageContext<'_>,
    messages: &[Message],
    require_summaries: bool,
) -> Result<StageOutput, StageError> {
    let result = ctx
        .model
        .generate(messages, &ctx.options.call_options(true))
        .await?;
    let usage = result.usage;
    let outline = parse_outline(result.message.content(), ctx.options.depth, require_summaries)
        .map_err(|reason| StageError::Parse { reason, usage })?;
    Ok(StageOutput { outline, usage })
}

/// Extract, force the depth, prune and validate. Errors are human-readable reasons.
pub fn parse_outline(
    text: &str,
    depth: Depth,
    require_summaries: bool,
) -> Result<Outline, String> {
    let mut value = extract_json(text).ok_or_else(|| "no JSON object in model output".to_string())?;
    if let Value::Object(map) = &mut value {
        map.insert("depth".into(), Value::from(depth.as_u8()));
    }

    let mut outline: Outline =
        serde_json::from_value(value).map_err(|e| format!("outline does not match schema: {e}"))?;
    let pruned = outline.prune_to_depth();
    if pruned > 0 {
        tracing::debug!(pruned, depth = %depth, "pruned nodes beyond requested depth");
    }
    outline
        .validate(require_summaries)
        .map_err(|e| format!("invalid outline: {e}"))?;
    Ok(outline)
}
