use std::sync::Arc;
use std::time::Duration;

use mindmap_core::outline::{Depth, Outline};
use mindmap_pipeline::enrichment::Snippet;
use mindmap_pipeline::event::PipelineEvent;
use mindmap_pipeline::mock::{ScriptedChatModel, StaticEnricher};
use mindmap_pipeline::options::PipelineOptions;
use mindmap_pipeline::orchestrator::Pipeline;
use mindmap_pipeline::stage::Stage;
use tokio::sync::mpsc;

const DRAFT: &str = r#"{
  "title": "Photosynthesis",
  "depth": 3,
  "branches": [
    {"name": "Light reactions", "summary": "Capture light energy", "sub": [
      {"name": "Photosystem II", "summary": "Splits water"},
      {"name": "Photosystem I", "summary": "Reduces NADP+"}
    ]},
    {"name": "Calvin cycle", "summary": "Fixes carbon dioxide"}
  ]
}"#;

const COVERED: &str = r#"Here is the improved outline:
{"title": "Photosynthesis", "depth": 3, "branches": [
  {"name": "Light reactions", "summary": "Capture light energy", "sub": [
    {"name": "Photosystem II", "summary": "Splits water"},
    {"name": "Photosystem I", "summary": "Reduces NADP+"}
  ]},
  {"name": "Calvin cycle", "summary": "Fixes carbon dioxide"},
  {"name": "Factors", "summary": "Light, CO2, temperature"}
]}"#;

const ENRICHED: &str = r#"{"title": "Photosynthesis", "depth": 3, "branches": [
  {"name": "Light reactions", "summary": "Thylakoid membranes; e.g. spinach chloroplasts", "sub": [
    {"name": "Photosystem II", "summary": "Splits water, releasing O2"},
    {"name": "Photosystem I", "summary": "Reduces NADP+ to NADPH"}
  ]},
  {"name": "Calvin cycle", "summary": "RuBisCO fixes CO2; e.g. C3 wheat"},
  {"name": "Factors", "summary": "Light intensity; greenhouse CO2 enrichment"}
]}"#;

/// Render output with the usual model noise around the document.
const NOISY_MARKDOWN: &str = "Sure! Here is your mindmap:\n\
```markdown\n\
# Photosynthesis\n\
## Light reactions — Thylakoid membranes\n\
### Photosystem II — Splits water\n\
#### Oxygen evolution — O2 release\n\
##### Manganese cluster — too deep\n\
### Photosystem I — Reduces NADP+\n\
## Calvin cycle — Fixes CO2\n\
# Photosynthesis Summary\n\
## FAQ\n\
### Why are leaves green? — Chlorophyll reflects green light\n\
## Glossary\n\
### Stroma — Fluid inside the chloroplast\n\
## Factors — Light intensity\n\
```\n";

fn scripted(render: &str) -> ScriptedChatModel {
    ScriptedChatModel::new()
        .then_text(DRAFT)
        .then_text(COVERED)
        .then_text(ENRICHED)
        .then_text(render)
}

#[tokio::test]
async fn photosynthesis_end_to_end() {
    let model = Arc::new(scripted(NOISY_MARKDOWN));
    let pipeline = Pipeline::new(model.clone(), Arc::new(StaticEnricher::empty()));
    let options = PipelineOptions {
        depth: Depth::Three,
        include_faq: false,
        include_glossary: false,
        web_enrichment: false,
        ..Default::default()
    };

    let output = pipeline.run("Photosynthesis", &options).await.unwrap();
    let md = &output.markdown;

    assert!(md.starts_with("# Photosynthesis\n"));
    assert_eq!(md.lines().filter(|l| l.starts_with("# ")).count(), 1);
    assert_eq!(md.lines().filter(|l| l.starts_with("#####")).count(), 0);
    assert!(!md.lines().any(|l| l.starts_with('#') && l.contains("FAQ")));
    assert!(!md.lines().any(|l| l.starts_with('#') && l.contains("Glossary")));
    assert!(md.contains("## Photosynthesis Summary\n"));
    assert!(md.contains("## Factors — Light intensity\n"));
    assert!(!md.contains("```"));

    assert_eq!(model.call_count(), 4);
    assert!(output.sources.is_empty());
    assert_eq!(output.usage.stages.len(), 4);
    assert_eq!(
        output.usage.total_tokens,
        output.usage.stages.iter().map(|s| s.total_tokens).sum::<u64>()
    );
}

#[tokio::test]
async fn unparsable_coverage_keeps_generator_outline() {
    let model = Arc::new(
        ScriptedChatModel::new()
            .then_text(DRAFT)
            .then_text("The outline already covers everything.")
            .then_text("{ broken json")
            .then_text("# Photosynthesis\n## Light reactions\n"),
    );
    let pipeline = Pipeline::new(model.clone(), Arc::new(StaticEnricher::empty()));

    let output = pipeline
        .run("Photosynthesis", &PipelineOptions::default())
        .await
        .unwrap();
    assert_eq!(output.warnings.len(), 2);

    let draft: Outline = serde_json::from_str(DRAFT).unwrap();
    let compact = serde_json::to_string(&draft).unwrap();
    let requests = model.requests();
    // leaf pass and render both saw the generator's outline unchanged
    assert!(requests[2][1].content().contains(&compact));
    assert!(requests[3][1].content().contains(&compact));
}

#[tokio::test]
async fn unparsable_draft_continues_from_topic() {
    let model = Arc::new(
        ScriptedChatModel::new()
            .then_text("Photosynthesis is how plants make food from light.")
            .then_text(COVERED)
            .then_text(ENRICHED)
            .then_text("# Photosynthesis\n## Light reactions — Thylakoid membranes\n"),
    );
    let pipeline = Pipeline::new(model.clone(), Arc::new(StaticEnricher::empty()));

    let output = pipeline
        .run("Photosynthesis", &PipelineOptions::default())
        .await
        .unwrap();

    assert_eq!(model.call_count(), 4);
    assert_eq!(output.warnings.len(), 1);
    assert!(output.markdown.starts_with("# Photosynthesis\n"));
    assert_eq!(output.usage.stages.len(), 4);
}

#[tokio::test]
async fn render_failure_is_fatal() {
    let model = Arc::new(scripted("I'm sorry, I can't produce that."));
    let pipeline = Pipeline::new(model, Arc::new(StaticEnricher::empty()));
    let err = pipeline
        .run("Photosynthesis", &PipelineOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Markdown rendering failed"));
}

#[tokio::test]
async fn streaming_event_sequence() {
    let model = Arc::new(scripted("# Photosynthesis\n## Light reactions — a\n## Calvin cycle — b\n"));
    let enricher = Arc::new(StaticEnricher::new(vec![Snippet::new(
        "Photosynthesis",
        "https://en.wikipedia.org/wiki/Photosynthesis",
        "Photosynthesis converts light energy into chemical energy.",
    )]));
    let pipeline = Pipeline::new(model, enricher);
    let options = PipelineOptions {
        web_enrichment: true,
        ..Default::default()
    };

    let (tx, mut rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move {
        pipeline.run_streaming("Photosynthesis", &options, tx).await;
    });

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    handle.await.unwrap();

    let statuses: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Status { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![Stage::Sources, Stage::Outline, Stage::Coverage, Stage::Leaves, Stage::Render]
    );
    assert!(matches!(&events[1], PipelineEvent::Sources { sources } if sources.len() == 1));

    let text: String = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert!(text.starts_with("# Photosynthesis\n## Light reactions — a\n"));
    assert!(text.contains("## Sources\n"));

    match events.last() {
        Some(PipelineEvent::Done { usage }) => assert_eq!(usage.stages.len(), 4),
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn streaming_error_replaces_done() {
    let model = Arc::new(
        ScriptedChatModel::new()
            .then_text(DRAFT)
            .then_text(COVERED)
            .then_text(ENRICHED)
            .then_error("HTTP 500: upstream exploded"),
    );
    let pipeline = Pipeline::new(model, Arc::new(StaticEnricher::empty()));
    let (tx, mut rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move {
        pipeline
            .run_streaming("Photosynthesis", &PipelineOptions::default(), tx)
            .await;
    });

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    handle.await.unwrap();

    assert!(!events.iter().any(|e| matches!(e, PipelineEvent::Done { .. })));
    match events.last() {
        Some(PipelineEvent::Error { message }) => assert!(message.contains("upstream exploded")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn streaming_stops_when_client_disconnects() {
    let model = Arc::new(scripted(NOISY_MARKDOWN).with_chunk_delay(Duration::from_millis(5)));
    let pipeline = Pipeline::new(model.clone(), Arc::new(StaticEnricher::empty()));
    let (tx, mut rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        pipeline
            .run_streaming("Photosynthesis", &PipelineOptions::default(), tx)
            .await;
    });

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, PipelineEvent::Status { stage: Stage::Outline, .. }));
    drop(rx);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pipeline task should stop after disconnect")
        .expect("pipeline task should not panic");
    // the render stage is never reached
    assert!(model.call_count() < 4);
}

#[tokio::test]
async fn streaming_disconnect_mid_render() {
    let model = Arc::new(scripted(NOISY_MARKDOWN).with_chunk_delay(Duration::from_millis(5)));
    let pipeline = Pipeline::new(model, Arc::new(StaticEnricher::empty()));
    let (tx, mut rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        pipeline
            .run_streaming("Photosynthesis", &PipelineOptions::default(), tx)
            .await;
    });

    loop {
        match rx.recv().await {
            Some(PipelineEvent::Text { .. }) => break,
            Some(_) => continue,
            None => panic!("stream ended before any text"),
        }
    }
    drop(rx);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pipeline task should stop after disconnect")
        .expect("pipeline task should not panic");
}
