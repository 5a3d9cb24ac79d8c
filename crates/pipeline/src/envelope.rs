//! Request/response envelopes and their validation rules.
//!
//! Envelopes are the only thing that crosses the coordinator/agent boundary.
//! Both kinds are immutable once built: fields are private and exposed through
//! accessors, and every dispatch attempt constructs a fresh envelope.
//!
//! The wire shape (schema `v1`) is camelCase JSON with exactly the fields of
//! [`RequestEnvelope`] and [`ResponseEnvelope`]. Unknown extra payload keys
//! are carried through untouched; agents ignore what their contract does not
//! name.
//!
//! [`validate_request`] and [`validate_response`] are pure: they inspect,
//! never mutate, and report the first violated rule.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    AgentId, FieldName, InvalidMessage, MessageId, Payload, SchemaSupport, SchemaVersion,
    StateSnapshot, StepNumber, Timestamp, WorkflowId,
};

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Where in which run a request was issued, plus the state the agent may read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Run the request belongs to.
    pub workflow_id: WorkflowId,
    /// 1-based position of the step in the resolved order.
    pub step_number: StepNumber,
    /// Immutable copy of the shared state taken just before dispatch.
    pub state_snapshot: StateSnapshot,
    /// Number of earlier attempts at this step (0 on the first dispatch).
    pub retry_count: u32,
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A request from the coordinator to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    message_id: MessageId,
    sender_id: AgentId,
    recipient_id: AgentId,
    schema_version: SchemaVersion,
    timestamp: Timestamp,
    execution_context: ExecutionContext,
    payload: Payload,
}

impl RequestEnvelope {
    /// Builds a request at the current schema version with a fresh message id.
    pub fn new(
        sender_id: AgentId,
        recipient_id: AgentId,
        execution_context: ExecutionContext,
        payload: Payload,
    ) -> Self {
        Self {
            message_id: MessageId::new_random(),
            sender_id,
            recipient_id,
            schema_version: SchemaVersion::current(),
            timestamp: Timestamp::now(),
            execution_context,
            payload,
        }
    }

    /// Returns the same request re-tagged with another schema version.
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: SchemaVersion) -> Self {
        self.schema_version = schema_version;
        self
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn sender_id(&self) -> &AgentId {
        &self.sender_id
    }

    pub fn recipient_id(&self) -> &AgentId {
        &self.recipient_id
    }

    pub fn schema_version(&self) -> &SchemaVersion {
        &self.schema_version
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution_context
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Encodes the request in its wire shape.
    pub fn to_wire(&self) -> Result<Value, InvalidMessage> {
        serde_json::to_value(self).map_err(|e| InvalidMessage::Malformed(e.to_string()))
    }

    /// Decodes a request from its wire shape.
    ///
    /// Absent mandatory fields are reported by name rather than as a generic
    /// decoding failure.
    pub fn from_wire(value: Value) -> Result<Self, InvalidMessage> {
        require_fields(
            &value,
            &[
                "messageId",
                "senderId",
                "recipientId",
                "schemaVersion",
                "timestamp",
                "executionContext",
                "payload",
            ],
        )?;
        serde_json::from_value(value).map_err(|e| InvalidMessage::Malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Outcome reported by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The step produced its full output.
    Success,
    /// The step failed; the coordinator may retry.
    Error,
    /// The step produced only part of its output; treated as a failure.
    Partial,
}

impl ResponseStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(ResponseStatus::Success),
            "error" => Some(ResponseStatus::Error),
            "partial" => Some(ResponseStatus::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Error => "error",
            ResponseStatus::Partial => "partial",
        };
        f.write_str(name)
    }
}

/// Machine-readable code plus human-readable explanation of a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// An agent's answer to one [`RequestEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    message_id: MessageId,
    responds_to: MessageId,
    sender_id: AgentId,
    timestamp: Timestamp,
    schema_version: SchemaVersion,
    status: ResponseStatus,
    payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_detail: Option<ErrorDetail>,
}

impl ResponseEnvelope {
    /// A successful response to `request`, sent by its recipient.
    pub fn success(request: &RequestEnvelope, payload: Payload) -> Self {
        Self::reply(request, ResponseStatus::Success, payload, None)
    }

    /// An `error` response to `request`.
    pub fn failure(request: &RequestEnvelope, detail: ErrorDetail) -> Self {
        Self::reply(request, ResponseStatus::Error, Payload::new(), Some(detail))
    }

    /// A `partial` response carrying whatever the agent managed to produce.
    pub fn partial(request: &RequestEnvelope, payload: Payload, detail: ErrorDetail) -> Self {
        Self::reply(request, ResponseStatus::Partial, payload, Some(detail))
    }

    fn reply(
        request: &RequestEnvelope,
        status: ResponseStatus,
        payload: Payload,
        error_detail: Option<ErrorDetail>,
    ) -> Self {
        Self {
            message_id: MessageId::new_random(),
            responds_to: request.message_id,
            sender_id: request.recipient_id.clone(),
            timestamp: Timestamp::now(),
            schema_version: request.schema_version.clone(),
            status,
            payload,
            error_detail,
        }
    }

    /// Returns the same response re-tagged with another schema version.
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: SchemaVersion) -> Self {
        self.schema_version = schema_version;
        self
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn responds_to(&self) -> MessageId {
        self.responds_to
    }

    pub fn sender_id(&self) -> &AgentId {
        &self.sender_id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn schema_version(&self) -> &SchemaVersion {
        &self.schema_version
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn error_detail(&self) -> Option<&ErrorDetail> {
        self.error_detail.as_ref()
    }

    /// Consumes the response, returning its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Encodes the response in its wire shape.
    pub fn to_wire(&self) -> Result<Value, InvalidMessage> {
        serde_json::to_value(self).map_err(|e| InvalidMessage::Malformed(e.to_string()))
    }

    /// Decodes a response from its wire shape.
    ///
    /// An unrecognised `status` is reported as [`InvalidMessage::UnknownStatus`].
    pub fn from_wire(value: Value) -> Result<Self, InvalidMessage> {
        require_fields(
            &value,
            &[
                "messageId",
                "respondsTo",
                "senderId",
                "timestamp",
                "schemaVersion",
                "status",
                "payload",
            ],
        )?;
        match value.get("status") {
            Some(Value::String(raw)) if ResponseStatus::parse(raw).is_some() => {}
            Some(other) => {
                let raw = other
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string());
                return Err(InvalidMessage::UnknownStatus(raw));
            }
            None => return Err(InvalidMessage::MissingField("status")),
        }
        serde_json::from_value(value).map_err(|e| InvalidMessage::Malformed(e.to_string()))
    }
}

fn require_fields(value: &Value, fields: &[&'static str]) -> Result<(), InvalidMessage> {
    let Some(object) = value.as_object() else {
        return Err(InvalidMessage::Malformed(
            "envelope is not a JSON object".to_string(),
        ));
    };
    for field in fields {
        match object.get(*field) {
            None | Some(Value::Null) => return Err(InvalidMessage::MissingField(*field)),
            _ => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a request before it is dispatched to an agent that accepts `support`.
///
/// Sender, recipient, schema version, execution context and payload must be
/// present and non-empty, and the schema version must be one the recipient
/// declares.
pub fn validate_request(
    envelope: &RequestEnvelope,
    support: &SchemaSupport,
) -> Result<(), InvalidMessage> {
    if envelope.message_id.is_nil() {
        return Err(InvalidMessage::MissingField("messageId"));
    }
    if envelope.sender_id.is_blank() {
        return Err(InvalidMessage::MissingField("senderId"));
    }
    if envelope.recipient_id.is_blank() {
        return Err(InvalidMessage::MissingField("recipientId"));
    }
    if envelope.schema_version.is_blank() {
        return Err(InvalidMessage::MissingField("schemaVersion"));
    }
    if envelope.payload.is_empty() {
        return Err(InvalidMessage::MissingField("payload"));
    }
    let context = &envelope.execution_context;
    if context.workflow_id.is_nil() {
        return Err(InvalidMessage::MissingField("executionContext.workflowId"));
    }
    if context.step_number.is_input() {
        return Err(InvalidMessage::Inconsistent(
            "executionContext.stepNumber must be at least 1".to_string(),
        ));
    }
    if !support.accepts(&envelope.schema_version) {
        return Err(InvalidMessage::UnsupportedSchemaVersion {
            version: envelope.schema_version.to_string(),
        });
    }
    Ok(())
}

/// Checks an agent's response against the request it answers.
///
/// `support` is the set of schema versions the coordinator understands, and
/// `required` is the recipient's declared output contract, enforced only when
/// the status is `success`.
pub fn validate_response(
    response: &ResponseEnvelope,
    request: &RequestEnvelope,
    support: &SchemaSupport,
    required: &[FieldName],
) -> Result<(), InvalidMessage> {
    if response.message_id.is_nil() {
        return Err(InvalidMessage::MissingField("messageId"));
    }
    if response.sender_id.is_blank() {
        return Err(InvalidMessage::MissingField("senderId"));
    }
    if response.schema_version.is_blank() {
        return Err(InvalidMessage::MissingField("schemaVersion"));
    }
    if response.responds_to != request.message_id {
        return Err(InvalidMessage::Inconsistent(format!(
            "respondsTo {} does not match request {}",
            response.responds_to, request.message_id
        )));
    }
    if response.sender_id != request.recipient_id {
        return Err(InvalidMessage::Inconsistent(format!(
            "response sent by '{}' but request was addressed to '{}'",
            response.sender_id, request.recipient_id
        )));
    }
    if !support.accepts(&response.schema_version) {
        return Err(InvalidMessage::UnsupportedSchemaVersion {
            version: response.schema_version.to_string(),
        });
    }
    match (response.status, &response.error_detail) {
        (ResponseStatus::Success, Some(_)) => Err(InvalidMessage::Inconsistent(
            "successful response carries an error detail".to_string(),
        )),
        (ResponseStatus::Error | ResponseStatus::Partial, None) => {
            Err(InvalidMessage::MissingField("errorDetail"))
        }
        (ResponseStatus::Success, None) => {
            match required.iter().find(|f| !response.payload.has_value(f.as_str())) {
                Some(missing) => Err(InvalidMessage::ContractViolation(missing.clone())),
                None => Ok(()),
            }
        }
        (ResponseStatus::Error | ResponseStatus::Partial, Some(_)) => Ok(()),
    }
}
