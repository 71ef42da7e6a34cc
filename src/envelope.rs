//! Chat history → Blackbox envelope translation and usage estimation.

use serde::{Deserialize, Serialize};

use crate::agent_routing::AgentConfig;
use crate::models::chat::{ChatMessage, ChatUsage};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("messages must contain at least one entry")]
    EmptyConversation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopePayload {
    /// Content of the current (last) turn.
    pub content: String,
    /// Prior turns as `role: content` lines. Absent, not empty, for single-turn requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Backend-bound request for one agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEnvelope {
    pub agent: String,
    pub classification: String,
    pub compartments: Vec<String>,
    pub payload: EnvelopePayload,
}

/// Build the envelope for `agent` from a chronological message list.
pub fn translate(
    agent: &AgentConfig,
    messages: &[ChatMessage],
) -> Result<AgentEnvelope, EnvelopeError> {
    let (current, history) = messages
        .split_last()
        .ok_or(EnvelopeError::EmptyConversation)?;

    Ok(AgentEnvelope {
        agent: agent.agent.clone(),
        classification: agent.classification.clone(),
        compartments: agent.compartments.clone(),
        payload: EnvelopePayload {
            content: current.content.clone(),
            context: render_context(history),
        },
    })
}

/// Render prior turns; `None` when there are none.
pub fn render_context(history: &[ChatMessage]) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let lines: Vec<String> = history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect();
    Some(lines.join("\n"))
}

/// Approximate token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    chars.div_ceil(4).try_into().unwrap_or(u32::MAX)
}

/// Estimate usage for a completion: prompt from the serialized envelope, completion from
/// the produced content.
pub fn estimate_usage(envelope: &AgentEnvelope, content: &str) -> serde_json::Result<ChatUsage> {
    let serialized = serde_json::to_string(envelope)?;
    Ok(ChatUsage::new(
        estimate_tokens(&serialized),
        estimate_tokens(content),
    ))
}
