//! Instruction templates for each model stage.

use mindmap_core::error::Result;
use mindmap_core::message::Message;
use mindmap_core::outline::Outline;

use crate::options::PipelineOptions;
use crate::render::SUMMARY_SEPARATOR;

/// Aspects the coverage pass checks the outline against.
pub const COVERAGE_RUBRIC: &[&str] = &[
    "definition and core idea",
    "history or origins",
    "key components and terminology",
    "how it works (processes, mechanisms)",
    "types, variants or schools of thought",
    "real-world applications",
    "benefits, limitations and common misconceptions",
    "current trends and open questions",
];

fn system_prompt(options: &PipelineOptions) -> String {
    format!(
        "You are an expert who structures knowledge into mindmaps.\n\
         Audience: {audience}. Tone: {tone}.\n\
         {density}",
        audience = options.audience,
        tone = options.tone,
        density = options.detail_level.directive(),
    )
}

fn json_contract(options: &PipelineOptions) -> Result<String> {
    let schema = serde_json::to_string(&Outline::json_schema())?;
    Ok(format!(
        "Respond with a single JSON object and nothing else. No prose, no code fences.\n\
         The object must match this JSON Schema:\n{schema}\n\
         `depth` is {depth}: branches are level 2 and each `sub` adds one level, \
         so nothing may nest deeper than level {depth}.",
        depth = options.depth,
    ))
}

pub fn outline_messages(topic: &str, options: &PipelineOptions) -> Result<Vec<Message>> {
    let user = format!(
        "Draft a mindmap outline for the topic \"{topic}\".\n\
         Use 4-8 top-level branches covering the most important aspects. \
         Give every node a short `name` and a brief `summary`.\n\n{}",
        json_contract(options)?,
    );
    Ok(vec![Message::system(system_prompt(options)), Message::user(user)])
}

pub fn coverage_messages(
    outline: &Outline,
    options: &PipelineOptions,
    context: Option<&str>,
) -> Result<Vec<Message>> {
    let rubric = COVERAGE_RUBRIC
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut user = format!(
        "Improve the coverage of this mindmap outline.\n\
         Check it against the rubric below, add missing branches or sub-branches, \
         merge duplicates, and keep the existing good structure.\n\n\
         Rubric:\n{rubric}\n\n\
         Current outline:\n{}\n",
        serde_json::to_string(outline)?,
    );

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        user.push_str(&format!(
            "\nReference material (use only as grounding; do not invent statistics \
             and do not copy passages beyond short phrases):\n{context}\n"
        ));
    }

    user.push('\n');
    user.push_str(&json_contract(options)?);
    Ok(vec![Message::system(system_prompt(options)), Message::user(user)])
}

pub fn leaf_messages(outline: &Outline, options: &PipelineOptions) -> Result<Vec<Message>> {
    let user = format!(
        "Enrich the leaves of this mindmap outline.\n\
         For every node without `sub`, rewrite its `summary` to include {n} concrete \
         example(s) or a short checklist. Every node, not only leaves, must end up \
         with a non-empty summary. Do not add or remove nodes.\n\n\
         Current outline:\n{}\n\n{}",
        serde_json::to_string(outline)?,
        json_contract(options)?,
        n = options.examples_per_leaf,
    );
    Ok(vec![Message::system(system_prompt(options)), Message::user(user)])
}

pub fn render_messages(outline: &Outline, options: &PipelineOptions) -> Result<Vec<Message>> {
    let mut rules = vec![
        "Output markdown only: no preamble, no closing remarks, no code fences.".to_string(),
        "Start with exactly one `# ` heading holding the title.".to_string(),
        format!(
            "Use `##` for branches and one more `#` per level; never go deeper than `{}`.",
            "#".repeat(usize::from(options.depth.as_u8()))
        ),
        format!(
            "Put each node's summary on its heading line after \"{SUMMARY_SEPARATOR}\", \
             e.g. `## Name{SUMMARY_SEPARATOR}summary`."
        ),
    ];
    if options.include_faq {
        rules.push(
            "End with a `## FAQ` section of 3-5 `### question` headings with the answer as summary."
                .into(),
        );
    } else {
        rules.push("Do not add an FAQ section.".into());
    }
    if options.include_glossary {
        rules.push(
            "Add a `## Glossary` section with one `### term` heading per key term and its definition as summary."
                .into(),
        );
    } else {
        rules.push("Do not add a Glossary section.".into());
    }

    let user = format!(
        "Render this outline as a markmap-compatible markdown document.\n\nRules:\n{}\n\nOutline:\n{}",
        rules
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::to_string(outline)?,
    );
    Ok(vec![Message::system(system_prompt(options)), Message::user(user)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DetailLevel;
    use mindmap_core::outline::{Depth, Node};

    fn outline() -> Outline {
        Outline::new("Photosynthesis", Depth::Three)
            .with_branches(vec![Node::new("Light reactions", "Capture energy")])
    }

    #[test]
    fn outline_prompt_names_topic_and_depth() {
        let options = PipelineOptions {
            depth: Depth::Four,
            ..Default::default()
        };
        let messages = outline_messages("Photosynthesis", &options).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], Message::System { .. }));
        assert!(messages[1].content().contains("\"Photosynthesis\""));
        assert!(messages[1].content().contains("deeper than level 4"));
        assert!(messages[1].content().contains("\"branches\""));
    }

    #[test]
    fn system_prompt_carries_detail_directive() {
        let options = PipelineOptions {
            detail_level: DetailLevel::Ultra,
            audience: "students".into(),
            ..Default::default()
        };
        let messages = outline_messages("X", &options).unwrap();
        assert!(messages[0].content().contains("students"));
        assert!(messages[0].content().contains(DetailLevel::Ultra.directive()));
    }

    #[test]
    fn coverage_prompt_includes_context_only_when_present() {
        let options = PipelineOptions::default();
        let without = coverage_messages(&outline(), &options, None).unwrap();
        assert!(!without[1].content().contains("Reference material"));

        let with = coverage_messages(&outline(), &options, Some("Source 1: Photosynthesis")).unwrap();
        assert!(with[1].content().contains("Reference material"));
        assert!(with[1].content().contains("do not invent statistics"));
        assert!(with[1].content().contains("Source 1: Photosynthesis"));
    }

    #[test]
    fn leaf_prompt_uses_example_count() {
        let options = PipelineOptions {
            examples_per_leaf: 4,
            ..Default::default()
        };
        let messages = leaf_messages(&outline(), &options).unwrap();
        assert!(messages[1].content().contains("4 concrete"));
    }

    #[test]
    fn render_prompt_follows_flags() {
        let mut options = PipelineOptions::default();
        let content = render_messages(&outline(), &options).unwrap()[1]
            .content()
            .to_string();
        assert!(content.contains("Do not add an FAQ section."));
        assert!(content.contains("`###`"));

        options.include_faq = true;
        options.include_glossary = true;
        let content = render_messages(&outline(), &options).unwrap()[1]
            .content()
            .to_string();
        assert!(content.contains("## FAQ"));
        assert!(content.contains("## Glossary"));
    }
}
