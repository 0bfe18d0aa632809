use serde::{Deserialize, Serialize};

use mindmap_core::error::{MindmapError, PipelineError, Result};
use mindmap_core::model::{CallOptions, ResponseFormat};
use mindmap_core::outline::Depth;

pub const MAX_EXAMPLES_PER_LEAF: u8 = 5;

/// How dense the generated summaries should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Normal,
    #[default]
    Detailed,
    Ultra,
}

impl DetailLevel {
    /// Token budget used when the caller does not set `max_tokens`.
    pub fn default_max_tokens(self) -> u32 {
        match self {
            DetailLevel::Normal => 1500,
            DetailLevel::Detailed => 3000,
            DetailLevel::Ultra => 4000,
        }
    }

    pub fn directive(self) -> &'static str {
        match self {
            DetailLevel::Normal => {
                "Keep summaries to a few keywords. Favour breadth over explanation."
            }
            DetailLevel::Detailed => {
                "Give every node a practical summary of 10-20 words with concrete facts."
            }
            DetailLevel::Ultra => {
                "Be exhaustive: summaries of 20-40 words with mechanisms, numbers and named examples."
            }
        }
    }
}

/// Per-request knobs for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub depth: Depth,
    pub examples_per_leaf: u8,
    pub include_faq: bool,
    pub include_glossary: bool,
    pub audience: String,
    pub tone: String,
    pub max_tokens: Option<u32>,
    pub temperature: f64,
    pub web_enrichment: bool,
    pub detail_level: DetailLevel,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            depth: Depth::default(),
            examples_per_leaf: 2,
            include_faq: false,
            include_glossary: false,
            audience: "general".into(),
            tone: "clear and neutral".into(),
            max_tokens: None,
            temperature: 0.7,
            web_enrichment: false,
            detail_level: DetailLevel::default(),
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_EXAMPLES_PER_LEAF).contains(&self.examples_per_leaf) {
            return Err(invalid(format!(
                "examplesPerLeaf must be between 1 and {MAX_EXAMPLES_PER_LEAF}, got {}",
                self.examples_per_leaf
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == Some(0) {
            return Err(invalid("maxTokens must be positive".into()));
        }
        Ok(())
    }

    pub fn token_budget(&self) -> u32 {
        self.max_tokens
            .unwrap_or_else(|| self.detail_level.default_max_tokens())
    }

    /// Call options for one model stage; outline stages ask for a JSON object.
    pub fn call_options(&self, json: bool) -> CallOptions {
        CallOptions {
            max_tokens: Some(self.token_budget()),
            temperature: Some(self.temperature),
            response_format: json.then_some(ResponseFormat::JsonObject),
        }
    }
}

fn invalid(message: String) -> MindmapError {
    MindmapError::Pipeline(PipelineError::InvalidOption(message))
}
