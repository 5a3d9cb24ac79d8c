//! Writer: expands the ideation output into long-form core content.

use pipeline::{
    fields, Agent, ErrorDetail, Payload, RegistryEntry, RegistryError, RequestEnvelope,
    ResponseEnvelope,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ideation::{ANGLE, KEY_POINTS, THEME};
use super::{agent_id, entry, require, require_str, respond, sentence_case, Generate, IDEATION, WRITER};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub body: String,
}

/// The platform-neutral article every adaptation is cut from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreContent {
    pub title: String,
    pub sections: Vec<Section>,
    pub word_count: usize,
}

impl CoreContent {
    fn new(title: String, sections: Vec<Section>) -> Self {
        let word_count = sections
            .iter()
            .map(|s| s.heading.split_whitespace().count() + s.body.split_whitespace().count())
            .sum::<usize>()
            + title.split_whitespace().count();
        Self {
            title,
            sections,
            word_count,
        }
    }

    /// Section bodies joined into plain paragraphs.
    pub fn body_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.body.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WriterAgent;

impl WriterAgent {
    pub fn entry() -> Result<RegistryEntry, RegistryError> {
        Ok(entry(WRITER)?
            .depends_on(agent_id(IDEATION)?)
            .consumes(&[
                fields::CONTENT_IDEA,
                fields::AUDIENCE,
                THEME,
                ANGLE,
                fields::TOPIC,
                fields::HOOK,
                KEY_POINTS,
            ])
            .produces(&[fields::CORE_CONTENT]))
    }

    fn write(&self, payload: &Payload) -> Result<CoreContent, ErrorDetail> {
        let topic = require_str(payload, fields::TOPIC)?;
        let hook = require_str(payload, fields::HOOK)?;
        let theme = require_str(payload, THEME)?;
        let angle = require_str(payload, ANGLE)?;
        let key_points: Vec<String> = require(payload, KEY_POINTS)?;
        let reader = payload.get_str(fields::AUDIENCE).unwrap_or("readers");

        let mut sections = Vec::with_capacity(key_points.len() + 2);
        sections.push(Section {
            heading: "Introduction".to_string(),
            body: format!(
                "{hook} This {theme} looks at {topic} from one angle: {angle}. \
                 It is written for {reader} who want something they can use."
            ),
        });
        sections.extend(key_points.iter().map(|point| Section {
            heading: point.clone(),
            body: format!(
                "{point}. In practice this comes down to small, repeatable habits \
                 rather than a one-off project, and the payoff compounds over time."
            ),
        }));
        sections.push(Section {
            heading: "Conclusion".to_string(),
            body: format!(
                "{} is worth the attention. Start small, measure the effect, and share what you learn.",
                sentence_case(topic)
            ),
        });

        Ok(CoreContent::new(format!("{}: {angle}", sentence_case(topic)), sections))
    }
}

impl Generate for WriterAgent {
    fn generate(&self, payload: &Payload) -> Result<Payload, ErrorDetail> {
        let content = self.write(payload)?;
        Ok(Payload::new().with(fields::CORE_CONTENT, json!(content)))
    }
}

#[async_trait::async_trait]
impl Agent for WriterAgent {
    async fn process(&self, request: RequestEnvelope) -> ResponseEnvelope {
        respond(self, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ideated() -> Payload {
        Payload::new()
            .with(fields::CONTENT_IDEA, json!("async logging"))
            .with(THEME, json!("practical guide"))
            .with(ANGLE, json!("why it matters now"))
            .with(fields::TOPIC, json!("Async logging"))
            .with(fields::HOOK, json!("Stop ignoring Async logging."))
            .with(KEY_POINTS, json!(["one", "two", "three"]))
    }

    #[test]
    fn sections_wrap_key_points() {
        let content = WriterAgent.write(&ideated()).unwrap();
        let headings: Vec<&str> = content.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, ["Introduction", "one", "two", "three", "Conclusion"]);
        assert!(content.word_count > 0);
    }

    #[test]
    fn word_count_is_serialised_camel_case() {
        let out = WriterAgent.generate(&ideated()).unwrap();
        let core = out.get(fields::CORE_CONTENT).unwrap();
        assert!(core.get("wordCount").is_some());
        assert!(core.get("title").is_some());
    }

    #[test]
    fn malformed_key_points_are_reported() {
        let payload = ideated().with(KEY_POINTS, json!("not a list"));
        let err = WriterAgent.generate(&payload).unwrap_err();
        assert_eq!(err.code, "malformed_input");
    }
}
