//! Bounds applied to every agent loop run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const DEFAULT_MAX_ITERATIONS: usize = 5;
pub const DEFAULT_REQUEST_BUDGET: Duration = Duration::from_secs(120);
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_TOOL_RESULT_BYTES: usize = 16 * 1024;

pub(crate) const MAX_ITERATIONS_ENV: &str = "SLUICE_MAX_ITERATIONS";
pub(crate) const REQUEST_BUDGET_ENV: &str = "SLUICE_REQUEST_BUDGET_MS";
pub(crate) const STREAM_IDLE_TIMEOUT_ENV: &str = "SLUICE_STREAM_IDLE_TIMEOUT_MS";
pub(crate) const TOOL_TIMEOUT_ENV: &str = "SLUICE_TOOL_TIMEOUT_MS";
pub(crate) const MAX_TOOL_RESULT_BYTES_ENV: &str = "SLUICE_MAX_TOOL_RESULT_BYTES";

/// What to do with a tool call whose arguments did not parse as a JSON object.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MalformedToolCallPolicy {
    /// Record the call and answer it with a `malformed_arguments` error result.
    #[default]
    SyntheticError,
    /// Drop the call: no tool use is recorded and no result is produced.
    Omit,
}

/// Iteration, time and size bounds for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopLimits {
    /// Maximum upstream calls per run.
    pub max_iterations: usize,
    /// Wall-clock budget for the whole run, tools included.
    pub request_budget: Duration,
    /// Longest silence tolerated between two upstream events.
    pub stream_idle_timeout: Duration,
    /// Per-invocation tool timeout (further capped by the remaining budget).
    pub tool_timeout: Duration,
    /// Serialized tool outputs above this size are truncated.
    pub max_tool_result_bytes: usize,
    pub malformed_tool_calls: MalformedToolCallPolicy,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_budget: DEFAULT_REQUEST_BUDGET,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_tool_result_bytes: DEFAULT_MAX_TOOL_RESULT_BYTES,
            malformed_tool_calls: MalformedToolCallPolicy::default(),
        }
    }
}

impl LoopLimits {
    /// Apply `SLUICE_*` environment overrides. Unset, zero or unparseable
    /// values keep the current setting.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_positive_usize(MAX_ITERATIONS_ENV) {
            self.max_iterations = n;
        }
        if let Some(ms) = env_positive_usize(REQUEST_BUDGET_ENV) {
            self.request_budget = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = env_positive_usize(STREAM_IDLE_TIMEOUT_ENV) {
            self.stream_idle_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = env_positive_usize(TOOL_TIMEOUT_ENV) {
            self.tool_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(bytes) = env_positive_usize(MAX_TOOL_RESULT_BYTES_ENV) {
            self.max_tool_result_bytes = bytes;
        }
        self
    }
}

fn env_positive_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| parse_positive_usize(&value))
}

pub(crate) fn parse_positive_usize(value: &str) -> Option<usize> {
    let parsed = value.trim().parse::<usize>().ok()?;
    if parsed == 0 {
        None
    } else {
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let limits = LoopLimits::default();
        assert_eq!(limits.max_iterations, 5);
        assert_eq!(limits.request_budget, Duration::from_secs(120));
        assert_eq!(limits.max_tool_result_bytes, 16384);
        assert_eq!(
            limits.malformed_tool_calls,
            MalformedToolCallPolicy::SyntheticError
        );
    }

    #[test]
    fn parse_positive_usize_rejects_zero_and_garbage() {
        assert_eq!(parse_positive_usize(" 7 "), Some(7));
        assert_eq!(parse_positive_usize("0"), None);
        assert_eq!(parse_positive_usize("-3"), None);
        assert_eq!(parse_positive_usize("many"), None);
    }

    #[test]
    fn malformed_policy_parses_from_snake_case() {
        assert_eq!(
            "omit".parse::<MalformedToolCallPolicy>().unwrap(),
            MalformedToolCallPolicy::Omit
        );
    }
}
