use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::constants::{EVENT_CLOSED, EVENT_ERROR, EVENT_OPENED, EVENT_PING};

/// Identifies one logical client session within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next process-wide id.
    ///
    /// Called by whoever accepts the transport connection (the
    /// connection manager) before spawning the connection.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

/// Errors decoding an inbound payload into an [`Event`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be an object with a string `name` field")]
    MissingName,
}

/// An immutable named occurrence with a JSON payload.
///
/// `name` and `data` never change after construction; the only
/// delivery metadata a connection attaches is the user identity, via
/// [`with_user`](Event::with_user) at construction time.
///
/// Wire form is the JSON object `{id, name, data, userId?}`; a flush
/// batch is a JSON array of wire events in queue order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    id: String,
    name: String,
    data: serde_json::Value,
    #[serde(skip)]
    connection: ConnectionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

impl Event {
    /// Creates an application event addressed from the given connection.
    pub fn new(
        name: impl Into<String>,
        data: serde_json::Value,
        connection: ConnectionId,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            data,
            connection,
            user_id: None,
        }
    }

    /// Attaches the resolved user identity. Delivery metadata only;
    /// name and payload are untouched.
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// The `connection_opened` lifecycle event.
    pub fn opened(connection: ConnectionId, data: Option<serde_json::Value>) -> Self {
        Self::new(EVENT_OPENED, data.unwrap_or_default(), connection)
    }

    /// The `connection_closed` lifecycle event.
    pub fn closed(connection: ConnectionId, data: Option<serde_json::Value>) -> Self {
        Self::new(EVENT_CLOSED, data.unwrap_or_default(), connection)
    }

    /// The `connection_error` lifecycle event.
    pub fn error(connection: ConnectionId, data: Option<serde_json::Value>) -> Self {
        Self::new(EVENT_ERROR, data.unwrap_or_default(), connection)
    }

    /// The `ping` liveness probe event.
    pub fn ping(connection: ConnectionId) -> Self {
        Self::new(EVENT_PING, serde_json::Value::Null, connection)
    }

    /// Decodes an inbound text payload.
    ///
    /// The payload must be a JSON object with a string `name` field;
    /// `data` defaults to `null` when absent.
    pub fn decode(raw: &str, connection: ConnectionId) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let obj = value.as_object().ok_or(DecodeError::MissingName)?;
        let name = obj
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or(DecodeError::MissingName)?;
        let data = obj.get("data").cloned().unwrap_or_default();
        Ok(Self::new(name.to_owned(), data, connection))
    }

    /// Serializes this event to its wire form.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes a flushed batch as one JSON array, in order.
    pub fn serialize_batch(batch: &[Event]) -> Result<String, serde_json::Error> {
        serde_json::to_string(batch)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// The originating connection (non-owning back-reference).
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::next()
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn new_event_has_fresh_id() {
        let c = conn();
        let a = Event::new("greet", serde_json::json!({"hi": true}), c);
        let b = Event::new("greet", serde_json::json!({"hi": true}), c);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "greet");
        assert_eq!(a.connection(), c);
        assert!(a.user_id().is_none());
    }

    #[test]
    fn with_user_attaches_identity() {
        let ev = Event::new("greet", serde_json::Value::Null, conn())
            .with_user(Some("user-7".into()));
        assert_eq!(ev.user_id(), Some("user-7"));
    }

    #[test]
    fn lifecycle_constructors_use_protocol_names() {
        let c = conn();
        assert_eq!(Event::opened(c, None).name(), EVENT_OPENED);
        assert_eq!(Event::closed(c, None).name(), EVENT_CLOSED);
        assert_eq!(Event::error(c, None).name(), EVENT_ERROR);
        assert_eq!(Event::ping(c).name(), EVENT_PING);
    }

    #[test]
    fn decode_valid_payload() {
        let ev = Event::decode(r#"{"name": "chat", "data": {"text": "hi"}}"#, conn()).unwrap();
        assert_eq!(ev.name(), "chat");
        assert_eq!(ev.data()["text"], "hi");
    }

    #[test]
    fn decode_defaults_missing_data_to_null() {
        let ev = Event::decode(r#"{"name": "chat"}"#, conn()).unwrap();
        assert!(ev.data().is_null());
    }

    #[test]
    fn decode_rejects_invalid_json() {
        assert!(matches!(
            Event::decode("not json {{{", conn()),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn decode_rejects_missing_name() {
        assert!(matches!(
            Event::decode(r#"{"data": 1}"#, conn()),
            Err(DecodeError::MissingName)
        ));
        assert!(matches!(
            Event::decode(r#"[1, 2]"#, conn()),
            Err(DecodeError::MissingName)
        ));
        assert!(matches!(
            Event::decode(r#"{"name": 42}"#, conn()),
            Err(DecodeError::MissingName)
        ));
    }

    #[test]
    fn serialize_omits_absent_user() {
        let ev = Event::new("chat", serde_json::json!({"text": "hi"}), conn());
        let json = ev.serialize().unwrap();
        assert!(!json.contains("userId"));
        assert!(!json.contains("connection"));

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["name"], "chat");
        assert_eq!(parsed["data"]["text"], "hi");
    }

    #[test]
    fn serialize_includes_user_when_set() {
        let ev = Event::new("chat", serde_json::Value::Null, conn())
            .with_user(Some("user-1".into()));
        let parsed: serde_json::Value = serde_json::from_str(&ev.serialize().unwrap()).unwrap();
        assert_eq!(parsed["userId"], "user-1");
    }

    #[test]
    fn serialize_batch_preserves_order() {
        let c = conn();
        let batch = vec![
            Event::new("first", serde_json::Value::Null, c),
            Event::new("second", serde_json::Value::Null, c),
        ];
        let json = Event::serialize_batch(&batch).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let arr = parsed.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["name"], "first");
        assert_eq!(arr[1]["name"], "second");
    }
}
