//! Appends a tool round-trip to the conversation history.

use crate::error::{Result, SluiceError};
use crate::tools::ToolInvocationResult;
use crate::types::{ConversationTurn, ToolUse};

/// Append `[assistant turn with tool uses, tool turn with results]`.
///
/// Results are reordered to follow `tool_uses`. Every tool use needs exactly
/// one result with its id; otherwise `history` is left untouched and an
/// [`SluiceError::InvalidState`] is returned.
pub fn rewrite_with_tool_results(
    history: &mut Vec<ConversationTurn>,
    assistant_text: &str,
    tool_uses: Vec<ToolUse>,
    results: Vec<ToolInvocationResult>,
) -> Result<()> {
    if tool_uses.is_empty() {
        return Err(SluiceError::InvalidState(
            "tool round-trip without tool uses".into(),
        ));
    }
    if results.len() != tool_uses.len() {
        return Err(SluiceError::InvalidState(format!(
            "{} tool uses but {} results",
            tool_uses.len(),
            results.len()
        )));
    }

    let mut remaining = results;
    let mut ordered = Vec::with_capacity(tool_uses.len());
    for tool_use in &tool_uses {
        let position = remaining
            .iter()
            .position(|result| result.tool_call_id == tool_use.id)
            .ok_or_else(|| {
                SluiceError::InvalidState(format!("no result for tool use '{}'", tool_use.id))
            })?;
        ordered.push(remaining.swap_remove(position).to_tool_result());
    }

    history.push(ConversationTurn::assistant_with_tool_uses(
        assistant_text,
        tool_uses,
    ));
    history.push(ConversationTurn::tool_results(ordered));
    Ok(())
}
