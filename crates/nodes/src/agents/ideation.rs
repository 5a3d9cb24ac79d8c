//! Ideation: turns the raw idea into a theme, angle, topic, hook and key points.

use pipeline::{
    fields, normalize, Agent, ErrorDetail, Payload, RegistryEntry, RegistryError, RequestEnvelope,
    ResponseEnvelope,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    entry, pick, require_str, respond, sentence_case, stable_hash, string_list, Generate,
    IDEATION,
};

pub const THEME: &str = "theme";
pub const ANGLE: &str = "angle";
pub const KEY_POINTS: &str = "key_points";

const THEMES: [&str; 5] = [
    "practical guide",
    "lessons learned",
    "myth busting",
    "behind the scenes",
    "future outlook",
];

const ANGLES: [&str; 4] = [
    "why it matters now",
    "the mistakes most teams make",
    "a step-by-step walkthrough",
    "what the numbers say",
];

const HOOKS: [&str; 4] = [
    "Most people get {topic} wrong. Here is what works.",
    "{topic}: the change nobody talks about.",
    "I spent a year on {topic}. Three things stood out.",
    "Stop ignoring {topic}.",
];

/// Structured output of the ideation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeationOutput {
    pub theme: String,
    pub angle: String,
    pub topic: String,
    pub hook: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdeationAgent;

impl IdeationAgent {
    pub fn entry() -> Result<RegistryEntry, RegistryError> {
        Ok(entry(IDEATION)?
            .consumes(&[
                fields::CONTENT_IDEA,
                fields::AUDIENCE,
                fields::PAST_TOPICS,
                fields::PAST_HOOKS,
                fields::RECENT_TOPICS,
            ])
            .produces(&[THEME, ANGLE, fields::TOPIC, fields::HOOK, KEY_POINTS]))
    }

    fn ideate(&self, payload: &Payload) -> Result<IdeationOutput, ErrorDetail> {
        let idea = require_str(payload, fields::CONTENT_IDEA)?;
        let audience = payload.get_str(fields::AUDIENCE);
        let past_hooks: Vec<String> = string_list(payload, fields::PAST_HOOKS)
            .iter()
            .map(|h| normalize(h))
            .collect();
        let recent: Vec<String> = string_list(payload, fields::RECENT_TOPICS)
            .iter()
            .map(|t| normalize(t))
            .collect();

        let seed = stable_hash(idea);
        let topic = sentence_case(&idea.split_whitespace().collect::<Vec<_>>().join(" "));
        let theme = pick(&THEMES, seed).to_string();

        // A recently covered topic gets the next angle over.
        let shift = u64::from(recent.contains(&normalize(&topic)));
        let angle = pick(&ANGLES, seed.wrapping_add(shift)).to_string();

        let hook = (0..HOOKS.len() as u64)
            .map(|offset| pick(&HOOKS, seed.wrapping_add(offset)).replace("{topic}", &topic))
            .find(|candidate| !past_hooks.contains(&normalize(candidate)))
            .unwrap_or_else(|| format!("{topic}, revisited: {angle}."));

        let reader = audience.unwrap_or("your team");
        let key_points = vec![
            format!("What {topic} means for {reader}"),
            format!("{} through the lens of {angle}", sentence_case(&theme)),
            format!("One action {reader} can take this week"),
        ];

        Ok(IdeationOutput {
            theme,
            angle,
            topic,
            hook,
            key_points,
        })
    }
}

impl Generate for IdeationAgent {
    fn generate(&self, payload: &Payload) -> Result<Payload, ErrorDetail> {
        let out = self.ideate(payload)?;
        Ok(Payload::new()
            .with(THEME, json!(out.theme))
            .with(ANGLE, json!(out.angle))
            .with(fields::TOPIC, json!(out.topic))
            .with(fields::HOOK, json!(out.hook))
            .with(KEY_POINTS, json!(out.key_points)))
    }
}

#[async_trait::async_trait]
impl Agent for IdeationAgent {
    async fn process(&self, request: RequestEnvelope) -> ResponseEnvelope {
        respond(self, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(idea: &str) -> Payload {
        Payload::new().with(fields::CONTENT_IDEA, json!(idea))
    }

    #[test]
    fn same_idea_yields_same_structure() {
        let a = IdeationAgent.ideate(&payload("Benefits of async logging")).unwrap();
        let b = IdeationAgent.ideate(&payload("benefits of  ASYNC logging")).unwrap();
        assert_eq!(a.theme, b.theme);
        assert_eq!(a.angle, b.angle);
        assert_eq!(a.key_points.len(), 3);
    }

    #[test]
    fn remembered_hooks_are_skipped() {
        let first = IdeationAgent.ideate(&payload("async logging")).unwrap();
        let again = IdeationAgent
            .ideate(&payload("async logging").with(fields::PAST_HOOKS, json!([first.hook])))
            .unwrap();
        assert_ne!(first.hook, again.hook);
    }

    #[test]
    fn recent_topic_takes_a_fresh_angle() {
        let first = IdeationAgent.ideate(&payload("async logging")).unwrap();
        let again = IdeationAgent
            .ideate(&payload("async logging").with(fields::RECENT_TOPICS, json!(["Async logging"])))
            .unwrap();
        assert_ne!(first.angle, again.angle);
    }

    #[test]
    fn missing_idea_is_reported() {
        let err = IdeationAgent.generate(&Payload::new()).unwrap_err();
        assert_eq!(err.code, "missing_input");
    }

    #[test]
    fn output_satisfies_declared_contract() {
        let out = IdeationAgent.generate(&payload("async logging")).unwrap();
        for field in IdeationAgent::entry().unwrap().produces {
            assert!(out.has_value(field.as_str()), "missing {field}");
        }
    }
}
