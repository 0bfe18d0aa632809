use serde::{Deserialize, Serialize};

use mindmap_core::outline::Depth;
use mindmap_pipeline::enrichment::Snippet;
use mindmap_pipeline::options::{DetailLevel, MAX_EXAMPLES_PER_LEAF, PipelineOptions};
use mindmap_pipeline::orchestrator::PipelineOutput;
use mindmap_pipeline::usage::UsageReport;

use crate::error::AppError;

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub api_key_configured: bool,
    pub model: String,
    pub environment: String,
}

// --- Mindmap ---

/// Body shared by the blocking and streaming generation routes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub depth: Option<u8>,
    #[serde(default)]
    pub examples_per_leaf: Option<u8>,
    #[serde(default, rename = "includeFAQ", alias = "includeFaq")]
    pub include_faq: Option<bool>,
    #[serde(default)]
    pub include_glossary: Option<bool>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default, rename = "web_enrichment", alias = "webEnrichment")]
    pub web_enrichment: Option<bool>,
    #[serde(default)]
    pub detail_level: Option<DetailLevel>,
}

/// A validated request: what to generate and with which model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub topic: String,
    pub model: String,
    pub options: PipelineOptions,
}

impl GenerateRequest {
    pub fn into_params(self, default_model: &str) -> Result<GenerateParams, AppError> {
        let topic = self
            .topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::BadRequest("Topic is required".into()))?;

        let defaults = PipelineOptions::default();
        let depth = match self.depth {
            Some(d) => Depth::try_from(d).map_err(|e| AppError::BadRequest(e.to_string()))?,
            None => defaults.depth,
        };
        let examples_per_leaf = self.examples_per_leaf.unwrap_or(defaults.examples_per_leaf);
        if !(1..=MAX_EXAMPLES_PER_LEAF).contains(&examples_per_leaf) {
            return Err(AppError::BadRequest(format!(
                "examplesPerLeaf must be between 1 and {MAX_EXAMPLES_PER_LEAF}"
            )));
        }

        let model = self
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model.to_string());

        let options = PipelineOptions {
            depth,
            examples_per_leaf,
            include_faq: self.include_faq.unwrap_or(defaults.include_faq),
            include_glossary: self.include_glossary.unwrap_or(defaults.include_glossary),
            audience: non_blank(self.audience).unwrap_or(defaults.audience),
            tone: non_blank(self.tone).unwrap_or(defaults.tone),
            max_tokens: self.max_tokens,
            temperature: self.temperature.unwrap_or(defaults.temperature),
            web_enrichment: self.web_enrichment.unwrap_or(defaults.web_enrichment),
            detail_level: self.detail_level.unwrap_or(defaults.detail_level),
        };
        options.validate()?;

        Ok(GenerateParams {
            topic,
            model,
            options,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub markdown: String,
    pub usage: UsageReport,
    pub sources: Vec<Snippet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<PipelineOutput> for GenerateResponse {
    fn from(output: PipelineOutput) -> Self {
        Self {
            markdown: output.markdown,
            usage: output.usage,
            sources: output.sources,
            warnings: output.warnings,
        }
    }
}
