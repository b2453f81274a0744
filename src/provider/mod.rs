//! Model provider trait and the streaming vendor implementations.

pub mod http;
pub mod sse;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "openai")]
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::config::SluiceConfig;
use crate::error::SluiceError;
use crate::models::{ModelSpec, ProviderKind};
use crate::types::{ConversationTurn, GenerationSettings, StreamEvent};

/// Decoded events of one upstream turn.
pub type EventStream = BoxStream<'static, Result<StreamEvent, SluiceError>>;

/// A request sent to a model provider: the full history plus tool schemas.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub turns: Vec<ConversationTurn>,
    pub tools: Vec<ToolDefinition>,
    pub settings: GenerationSettings,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "anthropic").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Open a streaming request for one turn.
    ///
    /// Errors returned here happened before any event was produced (transport
    /// failure, non-2xx status) and are safe to retry. Errors yielded by the
    /// stream are not.
    async fn stream_turn(&self, request: &ProviderRequest) -> Result<EventStream, SluiceError>;
}

/// Create a provider for the given model, using the provided config.
#[allow(unused_variables)]
pub fn create_provider(
    model: &ModelSpec,
    config: &SluiceConfig,
) -> Result<Box<dyn ModelProvider>, SluiceError> {
    match model.provider {
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => {
            let api_key = config
                .get_api_key("anthropic")
                .ok_or_else(|| SluiceError::Authentication("Missing ANTHROPIC_API_KEY".into()))?;
            Ok(Box::new(anthropic::AnthropicProvider::new(
                model.model_id.clone(),
                api_key,
                config.get_base_url("anthropic"),
            )))
        }
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => {
            let api_key = config
                .get_api_key("openai")
                .ok_or_else(|| SluiceError::Authentication("Missing OPENAI_API_KEY".into()))?;
            Ok(Box::new(openai::OpenAiProvider::new(
                model.model_id.clone(),
                api_key,
                config.get_base_url("openai"),
            )))
        }
        #[allow(unreachable_patterns)]
        other => Err(SluiceError::UnsupportedOperation(format!(
            "provider '{other}' is not enabled in this build"
        ))),
    }
}

/// Render a tool result payload as the plain string vendors expect.
pub(crate) fn payload_text(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_an_authentication_error() {
        let spec: ModelSpec = "anthropic:claude-sonnet-4-5".parse().unwrap();
        let err = create_provider(&spec, &SluiceConfig::new()).err().unwrap();
        assert!(matches!(err, SluiceError::Authentication(_)));
    }

    #[test]
    fn creates_provider_for_configured_key() {
        let config = SluiceConfig::new();
        config.set_api_key("openai", "sk-test".into());
        let spec: ModelSpec = "openai:gpt-4o-mini".parse().unwrap();
        let provider = create_provider(&spec, &config).unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model_id(), "gpt-4o-mini");
    }
}
