//! Scheduler: assigns each adaptation a publication slot.

use std::str::FromStr;

use pipeline::{
    fields, Agent, ErrorDetail, Payload, Platform, RegistryEntry, RegistryError, RequestEnvelope,
    ResponseEnvelope,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{agent_id, entry, respond, stable_hash, string_list, Generate, ADAPTER, SCHEDULER};

const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// `(day index, time UTC, rationale)`
type Slot = (usize, &'static str, &'static str);

fn slots(platform: Platform) -> &'static [Slot] {
    match platform {
        Platform::LinkedIn => &[
            (1, "08:00", "Professional audiences read before the workday starts"),
            (2, "12:00", "Midweek lunch break sees peak feed activity"),
        ],
        Platform::Twitter => &[
            (0, "13:00", "Early-week afternoons get the most replies"),
            (3, "09:00", "Morning commute scrolling drives reach"),
        ],
        Platform::Instagram => &[
            (2, "11:00", "Late morning posts collect saves through the day"),
            (5, "10:00", "Weekend mornings have the longest sessions"),
        ],
        Platform::Facebook => &[
            (3, "15:00", "Afternoon engagement peaks late in the week"),
            (4, "10:00", "Friday mornings favour shares"),
        ],
        Platform::Threads => &[
            (1, "18:00", "Evening conversations run longest"),
            (4, "17:00", "End-of-week posts draw casual replies"),
        ],
    }
}

/// One publication slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub platform: String,
    pub day: String,
    pub time_utc: String,
    pub rationale: String,
}

impl ScheduleEntry {
    /// Position in the week, used to order the schedule.
    fn slot_key(&self) -> (usize, &str) {
        let day = DAYS.iter().position(|d| *d == self.day).unwrap_or(DAYS.len());
        (day, self.time_utc.as_str())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerAgent;

impl SchedulerAgent {
    pub fn entry() -> Result<RegistryEntry, RegistryError> {
        Ok(entry(SCHEDULER)?
            .depends_on(agent_id(ADAPTER)?)
            .consumes(&[fields::ADAPTATIONS, fields::PLATFORMS, fields::AUDIENCE])
            .produces(&[fields::SCHEDULE]))
    }

    fn schedule(&self, payload: &Payload) -> Result<Vec<ScheduleEntry>, ErrorDetail> {
        let adaptations = payload
            .get(fields::ADAPTATIONS)
            .and_then(Value::as_object)
            .ok_or_else(|| super::missing(fields::ADAPTATIONS))?;
        let seed = stable_hash(payload.get_str(fields::AUDIENCE).unwrap_or_default());

        let mut entries = Vec::new();
        for name in string_list(payload, fields::PLATFORMS) {
            let platform = Platform::from_str(&name)
                .map_err(|e| ErrorDetail::new("unsupported_platform", e.to_string()))?;
            if !adaptations.contains_key(platform.name()) {
                return Err(ErrorDetail::new(
                    "missing_input",
                    format!("no adaptation for {platform}"),
                ));
            }
            let &(day, time, rationale) = super::pick(slots(platform), seed);
            entries.push(ScheduleEntry {
                platform: platform.name().to_string(),
                day: DAYS[day].to_string(),
                time_utc: time.to_string(),
                rationale: rationale.to_string(),
            });
        }
        if entries.is_empty() {
            return Err(super::missing(fields::PLATFORMS));
        }

        entries.sort_by(|a, b| {
            a.slot_key()
                .cmp(&b.slot_key())
                .then_with(|| a.platform.cmp(&b.platform))
        });
        Ok(entries)
    }
}

impl Generate for SchedulerAgent {
    fn generate(&self, payload: &Payload) -> Result<Payload, ErrorDetail> {
        let entries = self.schedule(payload)?;
        Ok(Payload::new().with(fields::SCHEDULE, json!(entries)))
    }
}

#[async_trait::async_trait]
impl Agent for SchedulerAgent {
    async fn process(&self, request: RequestEnvelope) -> ResponseEnvelope {
        respond(self, &request)
    }
}
