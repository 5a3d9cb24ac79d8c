//! Workflow input admission.
//!
//! A run only leaves `Idle` with a [`WorkflowRequest`], and the only way to get
//! one is [`WorkflowRequest::admit`]. Rejected input never reaches an agent
//! and is never retried.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::fields;
use crate::{InputError, Payload, Platform};

/// Bounds on the content idea, in characters after trimming.
pub const MIN_IDEA_CHARS: usize = 3;
pub const MAX_IDEA_CHARS: usize = 500;

/// Bounds on the number of target platforms.
pub const MIN_PLATFORMS: usize = 2;
pub const MAX_PLATFORMS: usize = 3;

/// Raw, unvalidated input as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub idea: String,
    pub platforms: Vec<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

impl WorkflowInput {
    pub fn new<I, S>(idea: impl Into<String>, platforms: I, audience: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            idea: idea.into(),
            platforms: platforms.into_iter().map(Into::into).collect(),
            audience,
        }
    }
}

/// Admitted input: a valid idea, 2–3 distinct known platforms, and an
/// optional audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    idea: String,
    platforms: Vec<Platform>,
    audience: Option<String>,
}

impl WorkflowRequest {
    /// Validates raw input.
    pub fn admit(input: &WorkflowInput) -> Result<Self, InputError> {
        let idea = input.idea.trim();
        if idea.is_empty() {
            return Err(InputError::EmptyIdea);
        }
        let len = idea.chars().count();
        if len < MIN_IDEA_CHARS {
            return Err(InputError::IdeaTooShort {
                len,
                min: MIN_IDEA_CHARS,
            });
        }
        if len > MAX_IDEA_CHARS {
            return Err(InputError::IdeaTooLong {
                len,
                max: MAX_IDEA_CHARS,
            });
        }

        let count = input.platforms.len();
        if !(MIN_PLATFORMS..=MAX_PLATFORMS).contains(&count) {
            return Err(InputError::PlatformCount {
                count,
                min: MIN_PLATFORMS,
                max: MAX_PLATFORMS,
            });
        }
        let mut platforms = Vec::with_capacity(count);
        for raw in &input.platforms {
            let platform: Platform = raw
                .parse()
                .map_err(|_| InputError::UnknownPlatform(raw.clone()))?;
            if platforms.contains(&platform) {
                return Err(InputError::DuplicatePlatform(platform));
            }
            platforms.push(platform);
        }

        let audience = input
            .audience
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        Ok(Self {
            idea: idea.to_string(),
            platforms,
            audience,
        })
    }

    pub fn idea(&self) -> &str {
        &self.idea
    }

    /// Platforms in the order the caller listed them.
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// The fields seeded into the shared state before the first step.
    pub fn to_payload(&self) -> Payload {
        let platforms: Vec<Value> = self.platforms.iter().map(|p| json!(p.name())).collect();
        Payload::new()
            .with(fields::CONTENT_IDEA, json!(self.idea))
            .with(fields::PLATFORMS, Value::Array(platforms))
            .with(fields::AUDIENCE, json!(self.audience))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(platforms: &[&str]) -> WorkflowInput {
        WorkflowInput::new(
            "benefits of async logging",
            platforms.iter().copied(),
            None,
        )
    }

    #[test]
    fn two_or_three_platforms_are_admitted() {
        assert!(WorkflowRequest::admit(&input(&["LinkedIn", "Twitter"])).is_ok());
        assert!(WorkflowRequest::admit(&input(&["LinkedIn", "Twitter", "Threads"])).is_ok());
    }

    #[test]
    fn platform_count_outside_bounds_is_rejected() {
        for platforms in [
            &[][..],
            &["LinkedIn"][..],
            &["LinkedIn", "Twitter", "Threads", "Facebook"][..],
        ] {
            assert!(matches!(
                WorkflowRequest::admit(&input(platforms)),
                Err(InputError::PlatformCount { .. })
            ));
        }
    }

    #[test]
    fn unknown_and_duplicate_platforms_are_rejected() {
        assert_eq!(
            WorkflowRequest::admit(&input(&["LinkedIn", "Myspace"])),
            Err(InputError::UnknownPlatform("Myspace".to_string()))
        );
        assert_eq!(
            WorkflowRequest::admit(&input(&["twitter", "X"])),
            Err(InputError::DuplicatePlatform(Platform::Twitter))
        );
    }

    #[test]
    fn idea_text_is_checked() {
        let blank = WorkflowInput::new("   ", ["LinkedIn", "Twitter"], None);
        assert_eq!(WorkflowRequest::admit(&blank), Err(InputError::EmptyIdea));

        let short = WorkflowInput::new("ab", ["LinkedIn", "Twitter"], None);
        assert!(matches!(
            WorkflowRequest::admit(&short),
            Err(InputError::IdeaTooShort { .. })
        ));

        let long = WorkflowInput::new("x".repeat(501), ["LinkedIn", "Twitter"], None);
        assert!(matches!(
            WorkflowRequest::admit(&long),
            Err(InputError::IdeaTooLong { .. })
        ));
    }

    #[test]
    fn seeded_payload_carries_input_fields() {
        let request = WorkflowRequest::admit(&WorkflowInput::new(
            "  benefits of async logging ",
            ["linkedin", "twitter"],
            Some("  ".to_string()),
        ))
        .unwrap();
        let payload = request.to_payload();

        assert_eq!(payload.get_str(fields::CONTENT_IDEA), Some("benefits of async logging"));
        assert_eq!(
            payload.get(fields::PLATFORMS),
            Some(&json!(["LinkedIn", "Twitter"]))
        );
        assert_eq!(payload.get(fields::AUDIENCE), Some(&Value::Null));
    }
}
