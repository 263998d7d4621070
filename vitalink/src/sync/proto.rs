//! Wire frames for the realtime channel.
//!
//! Frames are JSON text messages of the phoenix-style shape
//! `{topic, event, payload, ref}`. The client sends `join`, `heartbeat`
//! and `leave`; the backend answers with `reply` frames and pushes
//! `insert` events whose payload carries the inserted row under `new`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::data::{Sample, SessionId};

pub const EVENT_JOIN: &str = "join";
pub const EVENT_REPLY: &str = "reply";
pub const EVENT_LEAVE: &str = "leave";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_INSERT: &str = "insert";

/// Topic for control traffic that is not scoped to a session.
pub const CONTROL_TOPIC: &str = "vitals:control";

#[derive(Debug)]
pub enum Error {
    Malformed(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Malformed(msg) => write!(f, "malformed frame: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Channel topic scoping live inserts to one session.
pub fn session_topic(session_id: SessionId) -> String {
    format!("vitals:{}", session_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<u64>,
}

impl Frame {
    /// Join the session channel, asking the backend to push inserts on the
    /// live-data store filtered by session identifier.
    pub fn join(session_id: SessionId, reference: u64) -> Frame {
        Frame {
            topic: session_topic(session_id),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "events": [EVENT_INSERT],
                "filter": format!("session_id=eq.{}", session_id),
            }),
            reference: Some(reference),
        }
    }

    pub fn leave(session_id: SessionId, reference: u64) -> Frame {
        Frame {
            topic: session_topic(session_id),
            event: EVENT_LEAVE.to_string(),
            payload: Value::Null,
            reference: Some(reference),
        }
    }

    pub fn heartbeat(reference: u64) -> Frame {
        Frame {
            topic: CONTROL_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: Value::Null,
            reference: Some(reference),
        }
    }

    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Malformed(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Frame, Error> {
        serde_json::from_str(text).map_err(|e| Error::Malformed(e.to_string()))
    }

    /// True for a `reply` frame whose payload reports success.
    pub fn reply_ok(&self) -> bool {
        self.event == EVENT_REPLY && self.payload.get("status").and_then(Value::as_str) == Some("ok")
    }

    /// The inserted row of an `insert` event; `Ok(None)` for other events.
    pub fn insert_row(&self) -> Result<Option<Sample>, Error> {
        if self.event != EVENT_INSERT {
            return Ok(None);
        }

        #[derive(Deserialize)]
        struct InsertPayload {
            #[serde(rename = "new")]
            row: Sample,
        }

        let payload: InsertPayload = serde_json::from_value(self.payload.clone())
            .map_err(|e| Error::Malformed(e.to_string()))?;
        Ok(Some(payload.row))
    }
}
