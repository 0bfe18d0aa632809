use mindmap_core::model::ChatModel;

use crate::claude::ClaudeChatModel;
use crate::openai::OpenAIChatModel;
use crate::provider::Provider;

/// Base URL of xAI's OpenAI-compatible API.
pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";

/// Create a ChatModel instance for the given provider.
pub fn create_chat_model(
    provider: &Provider,
    api_key: String,
    model_id: String,
) -> Box<dyn ChatModel> {
    match provider {
        Provider::Grok => {
            Box::new(OpenAIChatModel::new(api_key, model_id).with_base_url(XAI_BASE_URL))
        }
        Provider::Claude => Box::new(ClaudeChatModel::new(api_key, model_id)),
    }
}
