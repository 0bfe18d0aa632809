//! Environment-driven server configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use mindmap_llm::provider::Provider;
use mindmap_pipeline::orchestrator::DEFAULT_ENRICHMENT_BUDGET;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_MODEL: &str = "grok-3-mini";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} has an unsupported value '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                var: "APP_ENV",
                value: s.to_string(),
            }),
        }
    }
}

/// Origins allowed to call the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parse a comma list; a `*` entry allows any origin.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|o| o.trim().trim_end_matches('/'))
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        if origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        match self {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(list) => {
                let origin = origin.trim_end_matches('/');
                list.iter().any(|o| o == origin)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    /// Upper bound on tracked clients.
    pub capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 30,
            capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: Environment,
    pub xai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub default_model: String,
    pub allowed_origins: AllowedOrigins,
    pub rate_limit: RateLimitConfig,
    pub enrichment_budget: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::default(),
            xai_api_key: None,
            anthropic_api_key: None,
            default_model: DEFAULT_MODEL.into(),
            allowed_origins: AllowedOrigins::parse(DEFAULT_ALLOWED_ORIGINS),
            rate_limit: RateLimitConfig::default(),
            enrichment_budget: DEFAULT_ENRICHMENT_BUDGET,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = RateLimitConfig::default();

        let environment = match get("APP_ENV") {
            Some(raw) => raw.parse()?,
            None => Environment::default(),
        };
        let allowed_origins = AllowedOrigins::parse(
            get("ALLOWED_ORIGINS")
                .as_deref()
                .unwrap_or(DEFAULT_ALLOWED_ORIGINS),
        );

        Ok(Self {
            port: parse_number("PORT", get("PORT"), DEFAULT_PORT)?,
            environment,
            xai_api_key: get("XAI_API_KEY").or_else(|| get("GROK_API_KEY")),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            default_model: get("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            allowed_origins,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(parse_number(
                    "RATE_LIMIT_WINDOW_SECS",
                    get("RATE_LIMIT_WINDOW_SECS"),
                    defaults.window.as_secs(),
                )?),
                max_requests: parse_number(
                    "RATE_LIMIT_MAX_REQUESTS",
                    get("RATE_LIMIT_MAX_REQUESTS"),
                    defaults.max_requests,
                )?,
                capacity: parse_number(
                    "RATE_LIMIT_CAPACITY",
                    get("RATE_LIMIT_CAPACITY"),
                    defaults.capacity,
                )?,
            },
            enrichment_budget: parse_number(
                "ENRICHMENT_CHAR_BUDGET",
                get("ENRICHMENT_CHAR_BUDGET"),
                DEFAULT_ENRICHMENT_BUDGET,
            )?,
        })
    }

    pub fn api_key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Grok => self.xai_api_key.as_deref(),
            Provider::Claude => self.anthropic_api_key.as_deref(),
        }
    }

    /// Whether the provider behind the default model has a key.
    pub fn default_model_key_configured(&self) -> bool {
        Provider::for_model(&self.default_model)
            .and_then(|p| self.api_key_for(p))
            .is_some()
    }
}

fn parse_number<T: FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}
