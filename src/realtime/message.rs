//! Phoenix channel frames exchanged with the realtime server

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::store::{ChangeEvent, ChangeKind};

/// Topic used for socket-level frames such as heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

/// A frame sent or received over the websocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: ChannelEvent,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEvent {
    PostgresChanges,
    #[serde(rename = "phx_join")]
    PhoenixJoin,
    #[serde(rename = "phx_reply")]
    PhoenixReply,
    #[serde(rename = "phx_error")]
    PhoenixError,
    #[serde(rename = "phx_close")]
    PhoenixClose,
    Heartbeat,
    /// Presence, broadcast and anything newer servers send
    #[serde(other)]
    Other,
}

/// Topic for one collection's change feed
pub fn topic_for(collection: &str) -> String {
    format!("realtime:{}", collection)
}

impl RealtimeMessage {
    /// Join request for every change on `schema.collection`
    pub fn join(
        collection: &str,
        schema: &str,
        access_token: Option<&str>,
        message_ref: String,
    ) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": schema, "table": collection }
                ]
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }
        Self {
            topic: topic_for(collection),
            event: ChannelEvent::PhoenixJoin,
            payload,
            message_ref: Some(message_ref),
        }
    }

    pub fn heartbeat(message_ref: String) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: ChannelEvent::Heartbeat,
            payload: json!({}),
            message_ref: Some(message_ref),
        }
    }

    /// Reply status (`ok`/`error`) for `phx_reply` frames
    pub fn reply_status(&self) -> Option<&str> {
        match self.event {
            ChannelEvent::PhoenixReply => self.payload.get("status").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Translate a `postgres_changes` frame into a store change.
    ///
    /// The row id comes from `record` for inserts and updates and from
    /// `old_record` for deletes.
    pub fn change_event(&self) -> Option<ChangeEvent> {
        if self.event != ChannelEvent::PostgresChanges {
            return None;
        }
        let data = self.payload.get("data")?;
        let kind = ChangeKind::from_wire(data.get("type")?.as_str()?)?;
        let table = data.get("table").and_then(Value::as_str).or_else(|| {
            self.topic
                .strip_prefix("realtime:")
                .map(|rest| rest.rsplit(':').next().unwrap_or(rest))
        })?;

        let row = match kind {
            ChangeKind::Delete => data.get("old_record"),
            _ => data.get("record"),
        };
        let id = row.and_then(|r| r.get("id")).and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Some(ChangeEvent::new(table, kind, id))
    }
}
