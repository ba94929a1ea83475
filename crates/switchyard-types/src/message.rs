//! Immutable message envelope and its canonical flat-record form

use crate::{AgentId, AgentRole, MalformedMessageError, MessageId, MessageType, Payload};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Where the bus should deliver a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Exactly one agent, by id
    Agent(AgentId),
    /// Every agent subscribed under the role
    Role(AgentRole),
    /// Every subscribed agent
    Broadcast,
}

/// Routed envelope exchanged between agents.
///
/// Fields are fixed at construction; the builder methods consume the message,
/// so once it has been handed to the bus nothing can change it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    sender_id: AgentId,
    sender_role: AgentRole,
    recipient: Recipient,
    message_type: MessageType,
    content: Payload,
    in_reply_to: Option<MessageId>,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a broadcast message with a fresh id and the current time
    pub fn new(
        sender_id: impl Into<AgentId>,
        sender_role: AgentRole,
        message_type: MessageType,
        content: Payload,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            sender_role,
            recipient: Recipient::Broadcast,
            message_type,
            content,
            in_reply_to: None,
            timestamp: Utc::now(),
        }
    }

    /// Address the message to a single agent
    pub fn to_agent(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.recipient = Recipient::Agent(agent_id.into());
        self
    }

    /// Address the message to every agent of a role
    pub fn to_role(mut self, role: AgentRole) -> Self {
        self.recipient = Recipient::Role(role);
        self
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark the message as an answer to `message_id`
    pub fn replying_to(mut self, message_id: impl Into<MessageId>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Build a reply addressed back to this message's sender and correlated via `in_reply_to`
    pub fn reply(
        &self,
        sender_id: impl Into<AgentId>,
        sender_role: AgentRole,
        message_type: MessageType,
        content: Payload,
    ) -> Message {
        Message::new(sender_id, sender_role, message_type, content)
            .to_agent(self.sender_id.clone())
            .replying_to(self.id.clone())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn sender_role(&self) -> AgentRole {
        self.sender_role
    }

    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    pub fn recipient_id(&self) -> Option<&str> {
        match &self.recipient {
            Recipient::Agent(id) => Some(id),
            _ => None,
        }
    }

    pub fn recipient_role(&self) -> Option<AgentRole> {
        match self.recipient {
            Recipient::Role(role) => Some(role),
            _ => None,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn content(&self) -> &Payload {
        &self.content
    }

    /// String value stored under `key` in the content, if any
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.in_reply_to.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Canonical flat key/value form. Absent optional fields are `null`.
    pub fn to_record(&self) -> Payload {
        let mut record = Payload::new();
        record.insert("message_id".into(), Value::String(self.id.clone()));
        record.insert("sender_id".into(), Value::String(self.sender_id.clone()));
        record.insert("sender_role".into(), self.sender_role.as_str().into());
        record.insert(
            "recipient_id".into(),
            self.recipient_id().map_or(Value::Null, Value::from),
        );
        record.insert(
            "recipient_role".into(),
            self.recipient_role()
                .map_or(Value::Null, |role| role.as_str().into()),
        );
        record.insert("message_type".into(), self.message_type.as_str().into());
        record.insert("content".into(), Value::Object(self.content.clone()));
        record.insert(
            "in_reply_to".into(),
            self.in_reply_to.clone().map_or(Value::Null, Value::String),
        );
        record.insert("timestamp".into(), self.timestamp.to_rfc3339().into());
        record
    }

    /// Parse the canonical flat form produced by [`Message::to_record`].
    ///
    /// `sender_id`, `sender_role`, `message_type` and `content` are required.
    /// A missing or empty `message_id` is regenerated and a missing timestamp
    /// defaults to now. Timestamps without an offset are read as UTC.
    pub fn from_record(record: &Payload) -> Result<Self, MalformedMessageError> {
        let sender_id = required_str(record, "sender_id")?.to_string();
        let sender_role = required_str(record, "sender_role")?.parse::<AgentRole>()?;
        let message_type = required_str(record, "message_type")?.parse::<MessageType>()?;
        let content = match record.get("content") {
            None | Some(Value::Null) => return Err(MalformedMessageError::MissingKey("content")),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(MalformedMessageError::InvalidField {
                    key: "content",
                    expected: "an object",
                })
            }
        };

        let recipient_id = optional_str(record, "recipient_id")?;
        let recipient_role = optional_str(record, "recipient_role")?
            .map(str::parse::<AgentRole>)
            .transpose()?;
        let recipient = match (recipient_id, recipient_role) {
            (Some(_), Some(_)) => return Err(MalformedMessageError::ConflictingRecipients),
            (Some(id), None) => Recipient::Agent(id.to_string()),
            (None, Some(role)) => Recipient::Role(role),
            (None, None) => Recipient::Broadcast,
        };

        let id = optional_str(record, "message_id")?
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timestamp = match optional_str(record, "timestamp")? {
            Some(raw) => parse_timestamp(raw)?,
            None => Utc::now(),
        };

        Ok(Self {
            id,
            sender_id,
            sender_role,
            recipient,
            message_type,
            content,
            in_reply_to: optional_str(record, "in_reply_to")?.map(str::to_string),
            timestamp,
        })
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.to_record()).to_string()
    }

    pub fn from_json(json: &str) -> Result<Self, MalformedMessageError> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(record) => Self::from_record(&record),
            _ => Err(MalformedMessageError::NotAnObject),
        }
    }
}

fn required_str<'a>(record: &'a Payload, key: &'static str) -> Result<&'a str, MalformedMessageError> {
    optional_str(record, key)?.ok_or(MalformedMessageError::MissingKey(key))
}

// Empty strings count as absent.
fn optional_str<'a>(
    record: &'a Payload,
    key: &'static str,
) -> Result<Option<&'a str>, MalformedMessageError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(MalformedMessageError::InvalidField {
            key,
            expected: "a string",
        }),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MalformedMessageError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| MalformedMessageError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use serde_json::json;

    fn assignment() -> Message {
        Message::new(
            "coordinator_1",
            AgentRole::Coordinator,
            MessageType::TaskAssignment,
            payload(json!({"task": "collect_data", "source": "noaa"})),
        )
        .to_role(AgentRole::DataCollector)
    }

    #[test]
    fn test_new_message_defaults() {
        let a = assignment();
        let b = assignment();
        assert_ne!(a.id(), b.id());
        assert!(a.in_reply_to().is_none());
        assert_eq!(a.recipient_role(), Some(AgentRole::DataCollector));
        assert!(a.recipient_id().is_none());
        assert_eq!(a.content_str("task"), Some("collect_data"));
    }

    #[test]
    fn test_reply_targets_sender() {
        let original = assignment();
        let reply = original.reply(
            "data_collector_2",
            AgentRole::DataCollector,
            MessageType::TaskCompletion,
            Payload::new(),
        );
        assert_eq!(reply.recipient(), &Recipient::Agent("coordinator_1".into()));
        assert_eq!(reply.in_reply_to(), Some(original.id()));
        assert_eq!(reply.sender_role(), AgentRole::DataCollector);
    }

    #[test]
    fn test_record_round_trip() {
        let original = assignment().replying_to("earlier");
        let record = original.to_record();
        assert_eq!(record["recipient_id"], Value::Null);
        assert_eq!(record["recipient_role"], json!("data_collector"));
        assert_eq!(record["message_type"], json!("task_assignment"));

        let parsed = Message::from_json(&original.to_json()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let mut record = assignment().to_record();
        record.remove("message_type");
        assert!(matches!(
            Message::from_record(&record),
            Err(MalformedMessageError::MissingKey("message_type"))
        ));
    }

    #[test]
    fn test_unknown_enum_values_are_malformed() {
        let mut record = assignment().to_record();
        record.insert("sender_role".into(), json!("janitor"));
        assert!(matches!(
            Message::from_record(&record),
            Err(MalformedMessageError::UnknownRole(_))
        ));

        let mut record = assignment().to_record();
        record.insert("recipient_role".into(), json!("janitor"));
        assert!(matches!(
            Message::from_record(&record),
            Err(MalformedMessageError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_both_recipients_rejected() {
        let mut record = assignment().to_record();
        record.insert("recipient_id".into(), json!("data_collector_2"));
        assert!(matches!(
            Message::from_record(&record),
            Err(MalformedMessageError::ConflictingRecipients)
        ));
    }

    #[test]
    fn test_lenient_optional_fields() {
        let record = payload(json!({
            "message_id": "",
            "sender_id": "system_monitor_4",
            "sender_role": "system_monitor",
            "message_type": "system_status",
            "content": {"component": "ingest", "status": "degraded"},
            "timestamp": "2024-03-01T12:30:00.250000"
        }));
        let parsed = Message::from_record(&record).unwrap();
        assert!(!parsed.id().is_empty());
        assert_eq!(parsed.recipient(), &Recipient::Broadcast);
        assert_eq!(parsed.timestamp().to_rfc3339(), "2024-03-01T12:30:00.250+00:00");
    }

    #[test]
    fn test_bad_timestamp_and_content_shape() {
        let mut record = assignment().to_record();
        record.insert("timestamp".into(), json!("yesterday"));
        assert!(matches!(
            Message::from_record(&record),
            Err(MalformedMessageError::InvalidTimestamp(_))
        ));

        let mut record = assignment().to_record();
        record.insert("content".into(), json!("collect"));
        assert!(matches!(
            Message::from_record(&record),
            Err(MalformedMessageError::InvalidField { key: "content", .. })
        ));

        assert!(matches!(
            Message::from_json("[1]"),
            Err(MalformedMessageError::NotAnObject)
        ));
    }
}
