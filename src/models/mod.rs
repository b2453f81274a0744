//! Model addressing: `provider:model` strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SluiceError;

/// Upstream vendors with a built-in streaming provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    Anthropic,
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

/// A model addressed as `provider:model_id`.
///
/// ```
/// use sluice::models::{ModelSpec, ProviderKind};
///
/// let spec: ModelSpec = "anthropic:claude-sonnet-4-5".parse().unwrap();
/// assert_eq!(spec.provider, ProviderKind::Anthropic);
/// assert_eq!(spec.model_id, "claude-sonnet-4-5");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
}

impl ModelSpec {
    pub fn new(provider: ProviderKind, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }
}

impl FromStr for ModelSpec {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model_id) = s.split_once(':').ok_or_else(|| {
            SluiceError::ModelNotFound(format!(
                "'{s}' is not of the form provider:model (e.g. anthropic:claude-sonnet-4-5)"
            ))
        })?;
        let provider = provider
            .trim()
            .parse::<ProviderKind>()
            .map_err(|_| SluiceError::ModelNotFound(format!("unknown provider '{provider}'")))?;
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(SluiceError::ModelNotFound(format!("'{s}' has no model id")));
        }
        Ok(Self::new(provider, model_id))
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_models_with_colons_in_id() {
        let spec: ModelSpec = "openai:ft:gpt-4o:acme".parse().unwrap();
        assert_eq!(spec.provider, ProviderKind::OpenAi);
        assert_eq!(spec.model_id, "ft:gpt-4o:acme");
        assert_eq!(spec.to_string(), "openai:ft:gpt-4o:acme");
    }

    #[test]
    fn rejects_unknown_provider_and_missing_separator() {
        assert!(matches!(
            "mystery:model".parse::<ModelSpec>(),
            Err(SluiceError::ModelNotFound(_))
        ));
        assert!("claude".parse::<ModelSpec>().is_err());
        assert!("anthropic:".parse::<ModelSpec>().is_err());
    }

    #[test]
    fn provider_names_are_case_insensitive() {
        let spec: ModelSpec = "Anthropic:claude-haiku-4-5".parse().unwrap();
        assert_eq!(spec.provider, ProviderKind::Anthropic);
    }
}
