//! Sequences enrichment, the outline stages and the renderer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;

use mindmap_core::error::{MindmapError, PipelineError, Result};
use mindmap_core::model::ChatModel;
use mindmap_core::outline::Outline;

use crate::enrichment::{Enricher, Enrichment, Snippet};
use crate::event::{EventSink, PipelineEvent};
use crate::options::PipelineOptions;
use crate::render::{MarkdownRenderer, sources_appendix};
use crate::stage::{
    CoverageImprover, LeafEnricher, OutlineGenerator, OutlineStage, Stage, StageContext,
    StageError,
};
use crate::usage::UsageReport;

pub const DEFAULT_ENRICHMENT_BUDGET: usize = 2400;

const NO_SOURCES_WARNING: &str =
    "Web enrichment found no usable sources; the mindmap was generated without grounding.";

/// Final result of a blocking run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub markdown: String,
    pub usage: UsageReport,
    pub sources: Vec<Snippet>,
    pub warnings: Vec<String>,
}

/// Outcome of [`refine_outline`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedOutline {
    pub outline: Outline,
    pub usage: UsageReport,
    pub warnings: Vec<String>,
}

/// Apply `stages` in order, keeping the last good outline whenever a stage
/// that allows it produces unusable output.
pub async fn refine_outline(
    stages: &[&dyn OutlineStage],
    seed: Outline,
    ctx: &StageContext<'_>,
    sink: &EventSink,
) -> Result<RefinedOutline> {
    let mut current = seed;
    let mut usage = UsageReport::default();
    let mut warnings = Vec::new();

    for stage in stages {
        let name = stage.stage();
        sink.send(PipelineEvent::status(name)).await?;

        match stage.apply(&current, ctx).await {
            Ok(output) => {
                usage.record(name, output.usage);
                current = output.outline;
                tracing::debug!(stage = %name, nodes = current.node_count(), "stage complete");
            }
            Err(StageError::Parse { reason, usage: spent }) => {
                usage.record(name, spent);
                tracing::warn!(stage = %name, %reason, "stage output unusable, keeping previous outline");
                warnings.push(if current.branches.is_empty() {
                    format!("The {name} pass returned unusable output; later passes started from the topic alone.")
                } else {
                    format!("The {name} pass returned unusable output; the previous outline was kept.")
                });
            }
            Err(StageError::Upstream(e)) => return Err(e),
        }
    }

    Ok(RefinedOutline {
        outline: current,
        usage,
        warnings,
    })
}

/// Topic in, mindmap markdown out.
pub struct Pipeline {
    model: Arc<dyn ChatModel>,
    enricher: Arc<dyn Enricher>,
    enrichment_budget: usize,
}

impl Pipeline {
    pub fn new(model: Arc<dyn ChatModel>, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            model,
            enricher,
            enrichment_budget: DEFAULT_ENRICHMENT_BUDGET,
        }
    }

    pub fn with_enrichment_budget(mut self, budget: usize) -> Self {
        self.enrichment_budget = budget;
        self
    }

    pub async fn run(&self, topic: &str, options: &PipelineOptions) -> Result<PipelineOutput> {
        let span = self.span(topic);
        self.execute(topic, options, &EventSink::discard())
            .instrument(span)
            .await
    }

    /// Run with incremental delivery. Always ends the channel with `done` or
    /// `error`, unless the receiver is already gone.
    pub async fn run_streaming(
        &self,
        topic: &str,
        options: &PipelineOptions,
        tx: mpsc::Sender<PipelineEvent>,
    ) {
        let span = self.span(topic);
        let sink = EventSink::channel(tx);
        async {
            match self.execute(topic, options, &sink).await {
                Ok(output) => {
                    let done = PipelineEvent::Done {
                        usage: output.usage,
                    };
                    if sink.send(done).await.is_err() {
                        tracing::debug!("client disconnected before the done event");
                    }
                }
                Err(MindmapError::Pipeline(PipelineError::Disconnected)) => {
                    tracing::warn!("client disconnected, pipeline stopped");
                }
                Err(e) => {
                    tracing::error!(error = %e, "streaming pipeline failed");
                    let _ = sink
                        .send(PipelineEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        }
        .instrument(span)
        .await
    }

    fn span(&self, topic: &str) -> tracing::Span {
        tracing::info_span!(
            "pipeline",
            request_id = %uuid::Uuid::new_v4(),
            topic = %topic.trim(),
            model = %self.model.model_name(),
        )
    }

    async fn execute(
        &self,
        topic: &str,
        options: &PipelineOptions,
        sink: &EventSink,
    ) -> Result<PipelineOutput> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::InvalidTopic("topic is required".into()).into());
        }
        options.validate()?;
        tracing::info!(depth = %options.depth, enrichment = options.web_enrichment, "pipeline started");

        let mut warnings = Vec::new();
        let enrichment = if options.web_enrichment {
            Some(self.enrich(topic, sink, &mut warnings).await?)
        } else {
            None
        };

        let ctx = StageContext {
            model: self.model.as_ref(),
            options,
            reference_context: enrichment
                .as_ref()
                .filter(|e| !e.is_empty())
                .map(|e| e.context.as_str()),
        };
        let stages: [&dyn OutlineStage; 3] = [&OutlineGenerator, &CoverageImprover, &LeafEnricher];
        let refined =
            refine_outline(&stages, Outline::new(topic, options.depth), &ctx, sink).await?;
        let mut usage = refined.usage;
        warnings.extend(refined.warnings);

        sink.send(PipelineEvent::status(Stage::Render)).await?;
        let rendered = if sink.is_live() {
            MarkdownRenderer
                .render_stream(self.model.as_ref(), &refined.outline, options, sink)
                .await?
        } else {
            MarkdownRenderer
                .render(self.model.as_ref(), &refined.outline, options)
                .await?
        };
        usage.record(Stage::Render, rendered.usage);

        let sources = enrichment.map(|e| e.snippets).unwrap_or_default();
        let mut markdown = rendered.markdown;
        let appendix = sources_appendix(&sources);
        if !appendix.is_empty() {
            sink.send(PipelineEvent::Text {
                text: appendix.clone(),
            })
            .await?;
            markdown.push_str(&appendix);
        }

        tracing::info!(
            total_tokens = usage.total_tokens,
            sources = sources.len(),
            warnings = warnings.len(),
            "pipeline finished"
        );
        Ok(PipelineOutput {
            markdown,
            usage,
            sources,
            warnings,
        })
    }

    async fn enrich(
        &self,
        topic: &str,
        sink: &EventSink,
        warnings: &mut Vec<String>,
    ) -> Result<Enrichment> {
        sink.send(PipelineEvent::status(Stage::Sources)).await?;
        let enrichment = self.enricher.fetch(topic, self.enrichment_budget).await;

        if enrichment.is_empty() {
            tracing::warn!("enrichment requested but no sources were found");
            warnings.push(NO_SOURCES_WARNING.into());
            sink.send(PipelineEvent::Status {
                stage: Stage::Sources,
                message: NO_SOURCES_WARNING.into(),
            })
            .await?;
        } else {
            sink.send(PipelineEvent::Sources {
                sources: enrichment.snippets.clone(),
            })
            .await?;
        }
        Ok(enrichment)
    }
}
