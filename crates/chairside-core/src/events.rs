//! Wire-format events pushed to dashboard clients.
//!
//! Every payload the server fans out is an [`Event`] envelope: a `type` tag,
//! an optional RFC 3339 timestamp, and a JSON payload. Producers may leave
//! the timestamp unset; the broadcast layer stamps it at send time so that
//! replayed or queued events still carry a delivery-side clock.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Lifecycle states reported for each clinic agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Waiting for work.
    #[default]
    Idle,
    /// Running a task (tool call, scheduling action, lookup).
    Executing,
    /// Waiting on a model response.
    Thinking,
    /// Escalated to front-desk staff; stays until explicitly reset.
    HumanHandoff,
    /// Last unit of work failed.
    Error,
}

impl AgentStatus {
    /// Wire spelling of the status, as it appears in `agent_status_update`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Executing => "executing",
            Self::Thinking => "thinking",
            Self::HumanHandoff => "human_handoff",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope for every event broadcast over WebSocket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type tag, e.g. `"message_new"` or `"agent_status_update"`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC 3339 timestamp. `None` until stamped by the broadcast layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Event-specific body.
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    /// Build an event with an unset timestamp.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: None,
            payload,
        }
    }

    /// A conversation was created.
    #[must_use]
    pub fn conversation_new(conversation_id: &str, conversation: Value) -> Self {
        Self::new(
            "conversation_new",
            json!({ "conversation_id": conversation_id, "conversation": conversation }),
        )
    }

    /// Conversation metadata changed (title, state, assignment).
    #[must_use]
    pub fn conversation_update(conversation_id: &str, update: Value) -> Self {
        Self::new(
            "conversation_update",
            json!({ "conversation_id": conversation_id, "update": update }),
        )
    }

    /// A message was appended to a conversation.
    #[must_use]
    pub fn message_new(conversation_id: &str, message: Value) -> Self {
        Self::new(
            "message_new",
            json!({ "conversation_id": conversation_id, "message": message }),
        )
    }

    /// A conversation escalated to human staff.
    #[must_use]
    pub fn escalation(conversation_id: &str, escalation: Value) -> Self {
        Self::new(
            "escalation",
            json!({ "conversation_id": conversation_id, "escalation": escalation }),
        )
    }

    /// An agent changed lifecycle state.
    #[must_use]
    pub fn agent_status_update(agent_id: &str, status: AgentStatus) -> Self {
        Self::new(
            "agent_status_update",
            json!({ "agent_id": agent_id, "status": status }),
        )
    }

    /// Fine-grained activity within a task (tool call, step description).
    #[must_use]
    pub fn agent_activity(agent_id: &str, activity: Value) -> Self {
        Self::new(
            "agent_activity",
            json!({ "agent_id": agent_id, "activity": activity }),
        )
    }

    /// An agent needs a human to take over.
    #[must_use]
    pub fn human_handoff_required(agent_id: &str, reason: &str, context: Value) -> Self {
        Self::new(
            "human_handoff_required",
            json!({ "agent_id": agent_id, "reason": reason, "context": context }),
        )
    }

    /// Aggregate clinic metrics for dashboard tiles.
    #[must_use]
    pub fn metrics_update(metrics: Value) -> Self {
        Self::new("metrics_update", metrics)
    }

    /// A server-side error surfaced to observers.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::new("error", json!({ "message": message }))
    }

    /// Fill in the timestamp if the producer left it unset.
    pub fn ensure_timestamp(&mut self) {
        if self.timestamp.is_none() {
            self.timestamp = Some(now_iso8601());
        }
    }
}

/// Current time as RFC 3339 with millisecond precision, e.g.
/// `2026-03-14T09:26:53.589Z`.
#[must_use]
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AgentStatus::HumanHandoff).unwrap();
        assert_eq!(json, r#""human_handoff""#);
        let back: AgentStatus = serde_json::from_str(r#""executing""#).unwrap();
        assert_eq!(back, AgentStatus::Executing);
    }

    #[test]
    fn status_default_is_idle() {
        assert_eq!(AgentStatus::default(), AgentStatus::Idle);
    }

    #[test]
    fn status_display_matches_wire_spelling() {
        assert_eq!(AgentStatus::Idle.to_string(), "idle");
        assert_eq!(AgentStatus::Thinking.to_string(), "thinking");
        assert_eq!(AgentStatus::HumanHandoff.to_string(), "human_handoff");
    }

    #[test]
    fn event_type_serializes_as_type_key() {
        let event = Event::new("message_new", json!({"x": 1}));
        let parsed: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "message_new");
        assert_eq!(parsed["payload"]["x"], 1);
    }

    #[test]
    fn unset_timestamp_is_omitted() {
        let event = Event::new("error", json!({"message": "boom"}));
        let text = serde_json::to_string(&event).unwrap();
        assert!(!text.contains("timestamp"));
    }

    #[test]
    fn ensure_timestamp_stamps_once() {
        let mut event = Event::error("boom");
        assert!(event.timestamp.is_none());
        event.ensure_timestamp();
        let first = event.timestamp.clone().unwrap();
        event.ensure_timestamp();
        assert_eq!(event.timestamp.unwrap(), first);
    }

    #[test]
    fn preset_timestamp_survives_stamping() {
        let mut event = Event::error("boom");
        event.timestamp = Some("2026-01-01T00:00:00.000Z".into());
        event.ensure_timestamp();
        assert_eq!(event.timestamp.as_deref(), Some("2026-01-01T00:00:00.000Z"));
    }

    #[test]
    fn message_new_payload_shape() {
        let event = Event::message_new("conv-42", json!({"sender": "patient", "text": "hi"}));
        assert_eq!(event.event_type, "message_new");
        assert_eq!(event.payload["conversation_id"], "conv-42");
        assert_eq!(event.payload["message"]["text"], "hi");
    }

    #[test]
    fn status_update_payload_shape() {
        let event = Event::agent_status_update("scheduler", AgentStatus::Thinking);
        assert_eq!(event.payload["agent_id"], "scheduler");
        assert_eq!(event.payload["status"], "thinking");
    }

    #[test]
    fn handoff_payload_shape() {
        let event =
            Event::human_handoff_required("triage", "billing dispute", json!({"conv": "c9"}));
        assert_eq!(event.event_type, "human_handoff_required");
        assert_eq!(event.payload["reason"], "billing dispute");
        assert_eq!(event.payload["context"]["conv"], "c9");
    }

    #[test]
    fn metrics_update_payload_is_passthrough() {
        let event = Event::metrics_update(json!({"open_conversations": 7}));
        assert_eq!(event.payload["open_conversations"], 7);
    }

    #[test]
    fn event_roundtrip_preserves_fields() {
        let mut event = Event::conversation_new("c1", json!({"patient": "A. Molar"}));
        event.ensure_timestamp();
        let text = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn timestamp_format_is_utc_millis() {
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        // 2026-03-14T09:26:53.589Z
        assert_eq!(ts.len(), 24);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }
}
