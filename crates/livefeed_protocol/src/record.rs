//! Feed records and the scalar parsing rules they depend on.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Formats accepted for timestamps that carry no UTC offset.
///
/// Such timestamps are interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// One append-only event shown in the live feed.
///
/// The identifier is the sole de-duplication key: two records with the same
/// `id` are the same logical event whatever their other fields say.
///
/// Fields not modelled explicitly are kept in [`EventRecord::extra`] so that
/// views can still render them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct EventRecord {
    /// Opaque unique identifier.
    pub id: String,
    /// Creation instant, always resolved to UTC.
    pub created_at: DateTime<Utc>,
    /// Message body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Authoring agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Display name of the authoring agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Role of the authoring agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    /// Task the event refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Title of the referenced task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    /// Board the task lives on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    /// Name of the board.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_name: Option<String>,
    /// Any remaining payload fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventRecord {
    /// Creates a record with only the required fields set.
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            message: None,
            agent_id: None,
            agent_name: None,
            agent_role: None,
            task_id: None,
            task_title: None,
            board_id: None,
            board_name: None,
            extra: Map::new(),
        }
    }

    /// Sets the message body.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Decodes a record from frame payload text.
    ///
    /// When `envelope_key` is given and the payload is an object holding that
    /// key, the record is read from the nested value (the server wraps records
    /// as `{"comment": {...}}`). Otherwise the payload itself must be the record.
    pub fn from_payload(payload: &str, envelope_key: Option<&str>) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(payload)?;
        let value = match (envelope_key, value) {
            (Some(key), Value::Object(mut map)) => match map.remove(key) {
                Some(inner) => inner,
                None => Value::Object(map),
            },
            (_, value) => value,
        };
        Self::try_from(value)
    }
}

impl TryFrom<Value> for EventRecord {
    type Error = ProtocolError;

    fn try_from(value: Value) -> ProtocolResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let id = parse_identifier(map.remove("id").as_ref())?;
        let created_at = match map.remove("created_at") {
            Some(Value::String(raw)) => parse_timestamp(&raw)?,
            Some(other) => {
                return Err(ProtocolError::InvalidTimestamp {
                    value: other.to_string(),
                })
            }
            None => return Err(ProtocolError::MalformedRecord("missing created_at".into())),
        };

        Ok(Self {
            id,
            created_at,
            message: take_text(&mut map, "message")?,
            agent_id: take_text(&mut map, "agent_id")?,
            agent_name: take_text(&mut map, "agent_name")?,
            agent_role: take_text(&mut map, "agent_role")?,
            task_id: take_text(&mut map, "task_id")?,
            task_title: take_text(&mut map, "task_title")?,
            board_id: take_text(&mut map, "board_id")?,
            board_name: take_text(&mut map, "board_name")?,
            extra: map,
        })
    }
}

/// Normalizes a JSON identifier to its opaque string form.
///
/// Strings and integers are accepted; anything else, or an empty string, is not.
pub fn parse_identifier(value: Option<&Value>) -> ProtocolResult<String> {
    match value {
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Err(ProtocolError::invalid_identifier("empty"))
            } else {
                Ok(trimmed.to_string())
            }
        }
        Some(Value::Number(number)) if number.is_i64() || number.is_u64() => {
            Ok(number.to_string())
        }
        Some(other) => Err(ProtocolError::invalid_identifier(format!(
            "unsupported type: {other}"
        ))),
        None => Err(ProtocolError::invalid_identifier("missing")),
    }
}

/// Resolves timestamp text to an absolute UTC instant.
///
/// RFC 3339 text with an offset is converted to UTC; naive ISO-8601 text is
/// taken to already be UTC.
pub fn parse_timestamp(raw: &str) -> ProtocolResult<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(ProtocolError::InvalidTimestamp {
        value: raw.to_string(),
    })
}

/// Renders a catch-up cursor for the `since` query parameter.
pub fn format_cursor(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn take_text(map: &mut Map<String, Value>, key: &str) -> ProtocolResult<Option<String>> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(ProtocolError::MalformedRecord(format!(
            "field {key} must be text, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_enveloped_comment() {
        let payload = json!({
            "comment": {
                "id": "6f1c9a2e-0000-4000-8000-000000000001",
                "created_at": "2025-01-02T03:04:05.123456",
                "message": "deploy finished",
                "agent_id": null,
                "agent_name": "builder",
                "task_id": "t-1",
                "task_title": "Ship it",
                "board_id": "b-1",
                "board_name": "Ops"
            }
        })
        .to_string();

        let record = EventRecord::from_payload(&payload, Some("comment")).unwrap();
        assert_eq!(record.id, "6f1c9a2e-0000-4000-8000-000000000001");
        assert_eq!(record.message.as_deref(), Some("deploy finished"));
        assert_eq!(record.agent_id, None);
        assert_eq!(record.agent_name.as_deref(), Some("builder"));
        assert_eq!(
            record.created_at,
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
                + chrono::Duration::microseconds(123_456)
        );
        assert!(record.extra.is_empty());
    }

    #[test]
    fn bare_payload_without_envelope() {
        let payload = r#"{"id":"x","created_at":"2025-01-01T00:00:00Z"}"#;
        let record = EventRecord::from_payload(payload, Some("comment")).unwrap();
        assert_eq!(record.id, "x");

        let record = EventRecord::from_payload(payload, None).unwrap();
        assert_eq!(record.id, "x");
    }

    #[test]
    fn offsets_are_normalized_to_utc() {
        let a = parse_timestamp("2025-01-01T02:00:00+02:00").unwrap();
        let b = parse_timestamp("2025-01-01T00:00:00Z").unwrap();
        let c = parse_timestamp("2025-01-01 00:00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn rejects_unparsable_timestamp() {
        let payload = r#"{"id":"x","created_at":"not a time"}"#;
        let err = EventRecord::from_payload(payload, None).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidTimestamp { .. }));

        let payload = r#"{"id":"x","created_at":17}"#;
        let err = EventRecord::from_payload(payload, None).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidTimestamp { .. }));

        let payload = r#"{"id":"x"}"#;
        let err = EventRecord::from_payload(payload, None).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRecord(_)));
    }

    #[test]
    fn identifier_rules() {
        assert_eq!(parse_identifier(Some(&json!(42))).unwrap(), "42");
        assert_eq!(parse_identifier(Some(&json!(" a "))).unwrap(), "a");
        assert!(parse_identifier(Some(&json!(""))).is_err());
        assert!(parse_identifier(Some(&json!(1.5))).is_err());
        assert!(parse_identifier(Some(&json!({"nested": 1}))).is_err());
        assert!(parse_identifier(None).is_err());
    }

    #[test]
    fn unknown_fields_are_kept() {
        let payload = r#"{"id":"x","created_at":"2025-01-01T00:00:00Z","verb":"moved","payload":{"to":"done"}}"#;
        let record = EventRecord::from_payload(payload, None).unwrap();
        assert_eq!(record.extra.get("verb"), Some(&json!("moved")));

        let rendered = serde_json::to_value(&record).unwrap();
        assert_eq!(rendered["verb"], json!("moved"));
        assert_eq!(rendered["payload"]["to"], json!("done"));
        assert!(rendered.get("message").is_none());
    }

    #[test]
    fn deserialize_goes_through_validation() {
        let ok: EventRecord =
            serde_json::from_str(r#"{"id":7,"created_at":"2025-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(ok.id, "7");

        let bad = serde_json::from_str::<EventRecord>(r#"{"id":"","created_at":"2025-01-01T00:00:00Z"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn malformed_json_and_non_objects() {
        assert!(matches!(
            EventRecord::from_payload("{not json", None),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            EventRecord::from_payload("[1,2]", None),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            EventRecord::from_payload(r#"{"comment": 3}"#, Some("comment")),
            Err(ProtocolError::NotAnObject)
        ));
    }

    #[test]
    fn cursor_format_round_trips() {
        let instant = parse_timestamp("2025-03-04T05:06:07.5Z").unwrap();
        let text = format_cursor(&instant);
        assert_eq!(text, "2025-03-04T05:06:07.500000Z");
        assert_eq!(parse_timestamp(&text).unwrap(), instant);
    }
}
