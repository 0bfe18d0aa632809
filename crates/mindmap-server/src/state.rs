use std::sync::Arc;

use mindmap_core::error::Result;
use mindmap_core::model::ChatModel;
use mindmap_llm::factory::create_chat_model;
use mindmap_llm::provider::Provider;
use mindmap_pipeline::enrichment::{Enricher, ReferenceFetcher};

use crate::config::ServerConfig;
use crate::rate_limit::{FixedWindowLimiter, RateLimiter};

/// Factory function type for creating ChatModel instances.
pub type ChatModelFactory =
    Arc<dyn Fn(&Provider, String, String) -> Box<dyn ChatModel> + Send + Sync>;

/// Create the default factory that delegates to mindmap_llm::factory.
pub fn default_model_factory() -> ChatModelFactory {
    Arc::new(|provider, api_key, model_id| create_chat_model(provider, api_key, model_id))
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub model_factory: ChatModelFactory,
    pub enricher: Arc<dyn Enricher>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// Production wiring: real providers, live reference fetching.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let enricher = ReferenceFetcher::new()?;
        Ok(Self::with_parts(
            config,
            default_model_factory(),
            Arc::new(enricher),
        ))
    }

    /// Create with explicit collaborators (for testing).
    pub fn with_parts(
        config: ServerConfig,
        model_factory: ChatModelFactory,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        let rate_limiter = Arc::new(FixedWindowLimiter::from_config(&config.rate_limit));
        Self {
            config: Arc::new(config),
            model_factory,
            enricher,
            rate_limiter,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}
