//! Adapter: cuts the core content down to each requested platform.

use std::collections::BTreeMap;
use std::str::FromStr;

use pipeline::{
    fields, Agent, ErrorDetail, Payload, Platform, RegistryEntry, RegistryError, RequestEnvelope,
    ResponseEnvelope,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ideation::THEME;
use super::writer::CoreContent;
use super::{
    agent_id, entry, require, require_str, respond, string_list, truncate_chars, Generate,
    ADAPTER, WRITER,
};

/// One platform-specific rendition of the core content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adaptation {
    pub platform: String,
    pub text: String,
    pub hashtags: Vec<String>,
    pub char_count: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AdapterAgent;

impl AdapterAgent {
    pub fn entry() -> Result<RegistryEntry, RegistryError> {
        Ok(entry(ADAPTER)?
            .depends_on(agent_id(WRITER)?)
            .consumes(&[
                fields::CORE_CONTENT,
                fields::PLATFORMS,
                fields::HOOK,
                fields::TOPIC,
                THEME,
            ])
            .produces(&[fields::ADAPTATIONS]))
    }

    fn adapt(&self, payload: &Payload) -> Result<BTreeMap<String, Adaptation>, ErrorDetail> {
        let content: CoreContent = require(payload, fields::CORE_CONTENT)?;
        let hook = require_str(payload, fields::HOOK)?;
        let topic = require_str(payload, fields::TOPIC)?;
        let theme = payload.get_str(THEME).unwrap_or_default();

        let names = string_list(payload, fields::PLATFORMS);
        if names.is_empty() {
            return Err(ErrorDetail::new(
                "missing_input",
                "required field 'platforms' is absent",
            ));
        }

        let mut adaptations = BTreeMap::new();
        for name in names {
            let platform = Platform::from_str(&name)
                .map_err(|e| ErrorDetail::new("unsupported_platform", e.to_string()))?;
            let adaptation = render(platform, &content, hook, topic, theme);
            adaptations.insert(platform.name().to_string(), adaptation);
        }
        Ok(adaptations)
    }
}

fn render(
    platform: Platform,
    content: &CoreContent,
    hook: &str,
    topic: &str,
    theme: &str,
) -> Adaptation {
    let hashtags = hashtags(topic, theme, hashtag_budget(platform));
    let draft = match platform {
        Platform::Twitter => hook.to_string(),
        Platform::Threads => format!("{hook}\n\n{}", content.title),
        Platform::Instagram => format!(
            "{hook}\n\n{}",
            content
                .sections
                .iter()
                .skip(1)
                .map(|s| format!("• {}", s.heading))
                .collect::<Vec<_>>()
                .join("\n")
        ),
        Platform::LinkedIn | Platform::Facebook => {
            format!("{}\n\n{}", content.title, content.body_text())
        }
    };

    let limit = platform.char_limit();
    let hashtags = fit_tags(hashtags, limit.saturating_sub(MIN_TEXT_CHARS));
    let tag_line = hashtags.join(" ");
    let text = if tag_line.is_empty() {
        truncate_chars(&draft, limit)
    } else {
        let room = limit.saturating_sub(tag_line.chars().count() + TAG_SEPARATOR.len());
        format!("{}{TAG_SEPARATOR}{tag_line}", truncate_chars(&draft, room))
    };
    let char_count = text.chars().count();

    Adaptation {
        platform: platform.name().to_string(),
        text,
        hashtags,
        char_count,
    }
}

/// Longest hashtag kept, `#` included.
const MAX_TAG_CHARS: usize = 30;

/// Characters always left for the post body, whatever the tags need.
const MIN_TEXT_CHARS: usize = 100;

const TAG_SEPARATOR: &str = "\n\n";

/// Drops trailing tags until the tag line and its separator fit in `room`.
fn fit_tags(mut tags: Vec<String>, room: usize) -> Vec<String> {
    while !tags.is_empty() {
        let line = tags.iter().map(|t| t.chars().count()).sum::<usize>() + tags.len() - 1;
        if line + TAG_SEPARATOR.len() <= room {
            break;
        }
        tags.pop();
    }
    tags
}

fn hashtag_budget(platform: Platform) -> usize {
    match platform {
        Platform::Twitter | Platform::Threads => 2,
        Platform::LinkedIn | Platform::Facebook => 3,
        Platform::Instagram => 5,
    }
}

fn hashtags(topic: &str, theme: &str, budget: usize) -> Vec<String> {
    let camel = |text: &str| -> String {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                    .unwrap_or_default()
            })
            .collect()
    };

    let mut tags: Vec<String> = Vec::new();
    let candidates = std::iter::once(camel(topic))
        .chain(
            topic
                .split_whitespace()
                .filter(|w| w.chars().count() > 3)
                .map(camel),
        )
        .chain(std::iter::once(camel(theme)));
    for tag in candidates.filter(|t| !t.is_empty()) {
        let tag: String = std::iter::once('#')
            .chain(tag.chars().take(MAX_TAG_CHARS - 1))
            .collect();
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
        if tags.len() == budget {
            break;
        }
    }
    tags
}

impl Generate for AdapterAgent {
    fn generate(&self, payload: &Payload) -> Result<Payload, ErrorDetail> {
        let adaptations = self.adapt(payload)?;
        Ok(Payload::new().with(fields::ADAPTATIONS, json!(adaptations)))
    }
}

#[async_trait::async_trait]
impl Agent for AdapterAgent {
    async fn process(&self, request: RequestEnvelope) -> ResponseEnvelope {
        respond(self, &request)
    }
}
