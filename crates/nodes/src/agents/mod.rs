//! Default agents for the four-step content chain.
//!
//! | Step | Agent | Consumes | Produces |
//! |------|-------|----------|----------|
//! | 1 | [`IdeationAgent`] | idea, audience, memory | theme, angle, topic, hook, key points |
//! | 2 | [`WriterAgent`] | idea, audience, ideation output | core content |
//! | 3 | [`AdapterAgent`] | core content, platforms, hook, topic, theme | per-platform adaptations |
//! | 4 | [`SchedulerAgent`] | adaptations, platforms, audience | schedule |
//!
//! Generation is template-driven and deterministic: choices are keyed on a
//! stable hash of the normalised idea, never on time or randomness, so the
//! structural output (theme, sections, adaptation set, schedule order) is a
//! pure function of the request payload.

mod adapter;
mod ideation;
mod scheduler;
mod writer;

use std::sync::Arc;

use pipeline::{
    normalize, AgentId, AgentRegistry, ErrorDetail, Payload, RegistryError, RegistryEntry,
    RequestEnvelope, ResponseEnvelope,
};
use serde::de::DeserializeOwned;

pub use adapter::{AdapterAgent, Adaptation};
pub use ideation::{IdeationAgent, IdeationOutput};
pub use scheduler::{ScheduleEntry, SchedulerAgent};
pub use writer::{CoreContent, Section, WriterAgent};

pub const IDEATION: &str = "ideation";
pub const WRITER: &str = "writer";
pub const ADAPTER: &str = "adapter";
pub const SCHEDULER: &str = "scheduler";

/// Registry holding the four default agents in chain order.
pub fn default_registry() -> Result<AgentRegistry, RegistryError> {
    let mut registry = AgentRegistry::new();
    registry.register(IdeationAgent::entry()?, Arc::new(IdeationAgent))?;
    registry.register(WriterAgent::entry()?, Arc::new(WriterAgent))?;
    registry.register(AdapterAgent::entry()?, Arc::new(AdapterAgent))?;
    registry.register(SchedulerAgent::entry()?, Arc::new(SchedulerAgent))?;
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Template generation step shared by every default agent.
trait Generate {
    fn generate(&self, payload: &Payload) -> Result<Payload, ErrorDetail>;
}

/// Wraps a [`Generate`] result into a response envelope.
fn respond(generator: &impl Generate, request: &RequestEnvelope) -> ResponseEnvelope {
    match generator.generate(request.payload()) {
        Ok(payload) => ResponseEnvelope::success(request, payload),
        Err(detail) => {
            tracing::debug!(agent = %request.recipient_id(), %detail, "agent reported failure");
            ResponseEnvelope::failure(request, detail)
        }
    }
}

fn agent_id(name: &str) -> Result<AgentId, RegistryError> {
    AgentId::new(name).ok_or_else(|| RegistryError::InvalidAgentId(name.to_string()))
}

fn entry(name: &str) -> Result<RegistryEntry, RegistryError> {
    Ok(RegistryEntry::new(agent_id(name)?))
}

fn missing(field: &str) -> ErrorDetail {
    ErrorDetail::new("missing_input", format!("required field '{field}' is absent"))
}

fn require_str<'a>(payload: &'a Payload, field: &str) -> Result<&'a str, ErrorDetail> {
    payload.get_str(field).ok_or_else(|| missing(field))
}

fn require<T: DeserializeOwned>(payload: &Payload, field: &str) -> Result<T, ErrorDetail> {
    let value = payload
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| missing(field))?;
    serde_json::from_value(value.clone()).map_err(|e| {
        ErrorDetail::new(
            "malformed_input",
            format!("field '{field}' has an unexpected shape: {e}"),
        )
    })
}

/// String array field; absent or null reads as empty.
fn string_list(payload: &Payload, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// FNV-1a over the normalised text. Stable across processes and platforms.
fn stable_hash(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    normalize(text)
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

/// Picks an element by hash; `items` must not be empty.
fn pick<'a, T>(items: &'a [T], seed: u64) -> &'a T {
    &items[(seed % items.len() as u64) as usize]
}

/// Capitalises the first character.
fn sentence_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Shortens `text` to at most `limit` characters, ending with an ellipsis when cut.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_case_and_spacing() {
        assert_eq!(
            stable_hash("Benefits of  async logging"),
            stable_hash(" benefits of async LOGGING ")
        );
        assert_ne!(stable_hash("a"), stable_hash("b"));
    }

    #[test]
    fn truncation_respects_char_limit() {
        let cut = truncate_chars("héllo wörld", 6);
        assert_eq!(cut.chars().count(), 6);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn default_registry_resolves_chain() {
        let registry = default_registry().unwrap();
        let order: Vec<String> = registry
            .resolve_order()
            .unwrap()
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(order, [IDEATION, WRITER, ADAPTER, SCHEDULER]);
    }

    #[test]
    fn blank_agent_name_is_rejected_not_reassigned() {
        assert_eq!(
            entry("  ").unwrap_err(),
            RegistryError::InvalidAgentId("  ".to_string())
        );
        assert_eq!(entry(WRITER).unwrap().id.as_str(), WRITER);
    }
}
