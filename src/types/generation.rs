//! Per-request generation settings.

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Settings forwarded to the provider on every upstream call of a run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
}
