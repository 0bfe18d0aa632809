//! Final stage: outline to markmap-compatible markdown.

use std::sync::LazyLock;

use futures::StreamExt;
use regex::Regex;

use mindmap_core::error::{MindmapError, PipelineError, Result};
use mindmap_core::message::UsageMetadata;
use mindmap_core::model::{ChatModel, ChatStreamEvent};
use mindmap_core::outline::Outline;

use crate::enrichment::{Snippet, truncate_chars};
use crate::event::{EventSink, PipelineEvent};
use crate::options::PipelineOptions;
use crate::prompts;

/// Glyph between a heading's name and its inline summary.
pub const SUMMARY_SEPARATOR: &str = " — ";

/// Deepest heading level kept in the output.
pub const MAX_HEADING_LEVEL: usize = 4;

const APPENDIX_EXCERPT_CHARS: usize = 160;

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// Line-wise cleanup of model markdown, usable on a token stream.
///
/// Drops preamble before the title, code fence markers, headings deeper than
/// `####`, and FAQ/Glossary sections that were not asked for. Keeps a single
/// `# ` heading, demoting later ones and synthesising one from the outline
/// title if the model starts at `##`.
#[derive(Debug)]
pub struct MarkdownSanitizer {
    title: String,
    include_faq: bool,
    include_glossary: bool,
    pending: String,
    seen_title: bool,
    /// Level of a dropped section still being skipped.
    skipping: Option<usize>,
}

impl MarkdownSanitizer {
    pub fn new(title: impl Into<String>, options: &PipelineOptions) -> Self {
        Self {
            title: title.into(),
            include_faq: options.include_faq,
            include_glossary: options.include_glossary,
            pending: String::new(),
            seen_title: false,
            skipping: None,
        }
    }

    /// Feed a chunk, returning the cleaned text of every line it completes.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut out = String::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            self.process_line(line.trim_end_matches(['\n', '\r']), &mut out);
        }
        out
    }

    /// Flush the last, unterminated line.
    pub fn finish(&mut self) -> String {
        let line = std::mem::take(&mut self.pending);
        let mut out = String::new();
        if !line.trim().is_empty() {
            self.process_line(line.trim_end_matches('\r'), &mut out);
        }
        out
    }

    /// Sanitize a complete document.
    pub fn sanitize(title: &str, options: &PipelineOptions, text: &str) -> String {
        let mut sanitizer = Self::new(title, options);
        let mut out = sanitizer.push(text);
        out.push_str(&sanitizer.finish());
        out
    }

    fn process_line(&mut self, line: &str, out: &mut String) {
        static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^(#+)[ \t]+(.*?)[ \t]*$").expect("valid regex")
        });

        // Fence markers go; models often wrap the whole document in one.
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            return;
        }

        let Some(caps) = HEADING_RE.captures(trimmed) else {
            if self.seen_title && self.skipping.is_none() {
                out.push_str(line);
                out.push('\n');
            }
            return;
        };

        let mut level = caps[1].len();
        let text = caps[2].trim();

        if let Some(skip_level) = self.skipping {
            if level > skip_level {
                return;
            }
            self.skipping = None;
        }
        if level > MAX_HEADING_LEVEL || text.is_empty() {
            return;
        }

        if !self.seen_title {
            self.seen_title = true;
            if level == 1 {
                out.push_str(&format!("# {text}\n"));
                return;
            }
            tracing::debug!("render output lacked a title heading, synthesising one");
            out.push_str(&format!("# {}\n", self.title));
        } else if level == 1 {
            level = 2;
        }

        if self.is_excluded_section(text) {
            self.skipping = Some(level);
            return;
        }
        out.push_str(&format!("{} {text}\n", "#".repeat(level)));
    }

    fn is_excluded_section(&self, heading: &str) -> bool {
        let name = heading.trim_end_matches(':').to_lowercase();
        let is_faq = name.starts_with("faq") || name.starts_with("frequently asked");
        let is_glossary = name.starts_with("glossary") || name == "key terms";
        (is_faq && !self.include_faq) || (is_glossary && !self.include_glossary)
    }
}

// ---------------------------------------------------------------------------
// Sources appendix
// ---------------------------------------------------------------------------

/// Deterministic citation section built from the snippets actually used.
pub fn sources_appendix(snippets: &[Snippet]) -> String {
    if snippets.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n## Sources\n");
    for snippet in snippets {
        let excerpt = snippet.excerpt.split_whitespace().collect::<Vec<_>>().join(" ");
        out.push_str(&format!(
            "### [{}]({}){SUMMARY_SEPARATOR}{}\n",
            snippet.title.trim(),
            snippet.url,
            truncate_chars(&excerpt, APPENDIX_EXCERPT_CHARS)
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub markdown: String,
    pub usage: Option<UsageMetadata>,
}

/// Asks the model to render the outline. There is nothing to fall back to,
/// so unusable output is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub async fn render(
        &self,
        model: &dyn ChatModel,
        outline: &Outline,
        options: &PipelineOptions,
    ) -> Result<RenderOutput> {
        let messages = prompts::render_messages(outline, options)?;
        let result = model
            .generate(&messages, &options.call_options(false))
            .await?;
        let markdown =
            MarkdownSanitizer::sanitize(&outline.title, options, result.message.content());
        ensure_rendered(&markdown)?;
        Ok(RenderOutput {
            markdown,
            usage: result.usage,
        })
    }

    /// Stream sanitized lines into `sink` as [`PipelineEvent::Text`] while
    /// accumulating the full document.
    pub async fn render_stream(
        &self,
        model: &dyn ChatModel,
        outline: &Outline,
        options: &PipelineOptions,
        sink: &EventSink,
    ) -> Result<RenderOutput> {
        let messages = prompts::render_messages(outline, options)?;
        let mut stream = model
            .stream(&messages, &options.call_options(false))
            .await?;

        let mut sanitizer = MarkdownSanitizer::new(outline.title.clone(), options);
        let mut markdown = String::new();
        let mut usage = None;
        let mut completed = false;

        while let Some(event) = stream.next().await {
            match event? {
                ChatStreamEvent::Token(token) => {
                    let clean = sanitizer.push(&token);
                    emit(sink, &mut markdown, clean).await?;
                }
                ChatStreamEvent::Usage(u) => usage = Some(u),
                ChatStreamEvent::Done => {
                    completed = true;
                    break;
                }
            }
        }
        if !completed {
            tracing::warn!(rendered = markdown.len(), "render stream closed without completion");
            return Err(MindmapError::Pipeline(PipelineError::Render(
                "model stream ended before completion".into(),
            )));
        }
        emit(sink, &mut markdown, sanitizer.finish()).await?;

        ensure_rendered(&markdown)?;
        Ok(RenderOutput { markdown, usage })
    }
}

async fn emit(sink: &EventSink, markdown: &mut String, clean: String) -> Result<()> {
    if clean.is_empty() {
        return Ok(());
    }
    markdown.push_str(&clean);
    sink.send(PipelineEvent::Text { text: clean }).await
}

fn ensure_rendered(markdown: &str) -> Result<()> {
    if markdown.lines().any(|l| l.starts_with("# ")) {
        Ok(())
    } else {
        Err(MindmapError::Pipeline(PipelineError::Render(
            "model returned no usable markdown".into(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedChatModel;
    use mindmap_core::outline::{Depth, Node};
    use tokio::sync::mpsc;

    fn options() -> PipelineOptions {
        PipelineOptions::default()
    }

    fn clean(text: &str) -> String {
        MarkdownSanitizer::sanitize("Topic", &options(), text)
    }

    fn outline() -> Outline {
        Outline::new("Topic", Depth::Three).with_branches(vec![Node::new("A", "a")])
    }

    #[test]
    fn drops_preamble_and_fence_markers() {
        let text = "Here is your mindmap:\n```markdown\n# Topic\n## A — a\n```";
        assert_eq!(clean(text), "# Topic\n## A — a\n");
    }

    #[test]
    fn keeps_body_lines() {
        let text = "Sure!\n# Topic\n## A — a\n- note\n~~~\n### B — b";
        assert_eq!(clean(text), "# Topic\n## A — a\n- note\n### B — b\n");
    }

    #[test]
    fn single_title_later_h1_demoted() {
        let text = "# Topic\n## A\n# Another\n### C";
        assert_eq!(clean(text), "# Topic\n## A\n## Another\n### C\n");
    }

    #[test]
    fn deep_headings_dropped() {
        let text = "# Topic\n## A\n### B\n#### C\n##### D\n###### E\n#### F";
        let out = clean(text);
        assert!(!out.lines().any(|l| l.starts_with("#####")));
        assert!(out.contains("#### C\n#### F\n"));
    }

    #[test]
    fn title_synthesised_when_missing() {
        assert_eq!(clean("## A — a\n### B"), "# Topic\n## A — a\n### B\n");
    }

    #[test]
    fn faq_and_glossary_sections_dropped_when_off() {
        let text = "# Topic\n## A\n## FAQ\n### Why?\nBecause.\n## Glossary:\n### Term\n## B";
        assert_eq!(clean(text), "# Topic\n## A\n## B\n");
    }

    #[test]
    fn faq_kept_when_requested() {
        let options = PipelineOptions {
            include_faq: true,
            ..Default::default()
        };
        let out = MarkdownSanitizer::sanitize("Topic", &options, "# Topic\n## FAQ\n### Why?\n");
        assert_eq!(out, "# Topic\n## FAQ\n### Why?\n");
    }

    #[test]
    fn streaming_matches_whole_document() {
        let text = "Intro\n# Topic\n## A — a\n### B — b\n## FAQ\n### Q\n## C";
        let whole = clean(text);

        let mut sanitizer = MarkdownSanitizer::new("Topic", &options());
        let mut streamed = String::new();
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(3) {
            streamed.push_str(&sanitizer.push(&chunk.iter().collect::<String>()));
        }
        streamed.push_str(&sanitizer.finish());
        assert_eq!(streamed, whole);
    }

    #[test]
    fn appendix_format() {
        assert_eq!(sources_appendix(&[]), "");
        let appendix = sources_appendix(&[Snippet::new(
            "Photosynthesis",
            "https://en.wikipedia.org/wiki/Photosynthesis",
            "Photosynthesis is\na process.",
        )]);
        assert_eq!(
            appendix,
            "\n## Sources\n### [Photosynthesis](https://en.wikipedia.org/wiki/Photosynthesis) — Photosynthesis is a process.\n"
        );
    }

    #[tokio::test]
    async fn render_sanitizes_model_output() {
        let model = ScriptedChatModel::new().then_text("Sure!\n# Topic\n## A — a\n##### deep");
        let output = MarkdownRenderer
            .render(&model, &outline(), &options())
            .await
            .unwrap();
        assert_eq!(output.markdown, "# Topic\n## A — a\n");
        assert!(output.usage.is_some());
    }

    #[tokio::test]
    async fn render_rejects_empty_output() {
        let model = ScriptedChatModel::new().then_text("I cannot help with that.");
        let err = MarkdownRenderer
            .render(&model, &outline(), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, MindmapError::Pipeline(PipelineError::Render(_))));
    }

    #[tokio::test]
    async fn render_stream_emits_text_events() {
        let model = ScriptedChatModel::new().then_text("# Topic\n## A — a\n## B — b\n");
        let (tx, mut rx) = mpsc::channel(16);
        let output = MarkdownRenderer
            .render_stream(&model, &outline(), &options(), &EventSink::channel(tx))
            .await
            .unwrap();

        let mut streamed = String::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                PipelineEvent::Text { text } => streamed.push_str(&text),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(streamed, output.markdown);
        assert_eq!(output.markdown, "# Topic\n## A — a\n## B — b\n");
    }

    /// Streams part of a document, then closes without `Done`.
    struct CutOffModel;

    #[async_trait::async_trait]
    impl ChatModel for CutOffModel {
        async fn generate(
            &self,
            _messages: &[mindmap_core::message::Message],
            _options: &mindmap_core::model::CallOptions,
        ) -> Result<mindmap_core::model::ChatResult> {
            Err(MindmapError::Other("generate is not used".into()))
        }

        fn model_name(&self) -> &str {
            "cut-off"
        }

        async fn stream(
            &self,
            _messages: &[mindmap_core::message::Message],
            _options: &mindmap_core::model::CallOptions,
        ) -> Result<mindmap_core::model::ChatStream> {
            let events = vec![Ok(ChatStreamEvent::Token("# Topic\n## A — a\n## B".into()))];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    #[tokio::test]
    async fn render_stream_rejects_truncated_stream() {
        let (tx, mut rx) = mpsc::channel(16);
        let err = MarkdownRenderer
            .render_stream(&CutOffModel, &outline(), &options(), &EventSink::channel(tx))
            .await
            .unwrap_err();
        assert!(matches!(err, MindmapError::Pipeline(PipelineError::Render(ref m)) if m.contains("before completion")));
        // the complete lines were already delivered
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::Text { .. })));
    }
}
