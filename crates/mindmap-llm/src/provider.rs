use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Grok,
    Claude,
}

impl Provider {
    /// Route a model identifier to the provider that serves it.
    ///
    /// Matching is by prefix, case-insensitive: `grok-*` goes to xAI and
    /// `claude-*` to Anthropic.
    pub fn for_model(model_id: &str) -> Option<Provider> {
        let id = model_id.trim().to_ascii_lowercase();
        if id.starts_with("grok") {
            Some(Provider::Grok)
        } else if id.starts_with("claude") {
            Some(Provider::Claude)
        } else {
            None
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Grok => write!(f, "xAI Grok"),
            Provider::Claude => write!(f, "Anthropic Claude"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_serialize() {
        assert_eq!(serde_json::to_string(&Provider::Grok).unwrap(), "\"grok\"");
        assert_eq!(serde_json::to_string(&Provider::Claude).unwrap(), "\"claude\"");
    }

    #[test]
    fn provider_deserialize() {
        let p: Provider = serde_json::from_str("\"grok\"").unwrap();
        assert_eq!(p, Provider::Grok);
        let p: Provider = serde_json::from_str("\"claude\"").unwrap();
        assert_eq!(p, Provider::Claude);
    }

    #[test]
    fn for_model_routes_by_prefix() {
        assert_eq!(Provider::for_model("grok-3-mini"), Some(Provider::Grok));
        assert_eq!(Provider::for_model("Grok-Beta"), Some(Provider::Grok));
        assert_eq!(
            Provider::for_model("claude-sonnet-4-20250514"),
            Some(Provider::Claude)
        );
        assert_eq!(Provider::for_model("gpt-4o"), None);
        assert_eq!(Provider::for_model(""), None);
    }
}
