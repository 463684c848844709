//! Typed emit surface for pushing domain events to connected clients.
//!
//! Conversation-scoped events go to the monitoring channel and to the
//! conversation's followers. A client holding both subscriptions receives
//! one copy per subscription, and both copies carry the same timestamp
//! because the event is stamped once before fan-out.

use std::sync::Arc;

use chairside_core::events::{AgentStatus, Event};
use serde_json::Value;

use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::MONITORING_CHANNEL;

/// Pushes domain events through the broadcaster.
pub struct EventEmitter {
    broadcaster: Arc<Broadcaster>,
}

impl EventEmitter {
    /// Create an emitter over a broadcaster.
    #[must_use]
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }

    /// The broadcaster this emitter delivers through.
    #[must_use]
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Announce a newly created conversation.
    pub async fn conversation_new(&self, conversation_id: &str, conversation: Value) -> usize {
        self.dual_emit(
            conversation_id,
            Event::conversation_new(conversation_id, conversation),
        )
        .await
    }

    /// Announce a change to an existing conversation.
    pub async fn conversation_update(&self, conversation_id: &str, update: Value) -> usize {
        self.dual_emit(
            conversation_id,
            Event::conversation_update(conversation_id, update),
        )
        .await
    }

    /// Announce a new message inside a conversation.
    pub async fn message_new(&self, conversation_id: &str, message: Value) -> usize {
        self.dual_emit(conversation_id, Event::message_new(conversation_id, message))
            .await
    }

    /// Announce an escalation raised inside a conversation.
    pub async fn escalation(&self, conversation_id: &str, escalation: Value) -> usize {
        self.dual_emit(conversation_id, Event::escalation(conversation_id, escalation))
            .await
    }

    /// Announce an agent status change to monitoring clients.
    pub async fn agent_status(&self, agent_id: &str, status: AgentStatus) -> usize {
        self.monitor_emit(Event::agent_status_update(agent_id, status))
            .await
    }

    /// Announce fine-grained agent activity to monitoring clients.
    pub async fn agent_activity(&self, agent_id: &str, activity: Value) -> usize {
        self.monitor_emit(Event::agent_activity(agent_id, activity))
            .await
    }

    /// Flag a conversation that needs a human to step in.
    pub async fn human_handoff(&self, agent_id: &str, reason: &str, context: Value) -> usize {
        self.monitor_emit(Event::human_handoff_required(agent_id, reason, context))
            .await
    }

    /// Push a metrics snapshot to monitoring clients, payload passed through.
    pub async fn metrics_update(&self, metrics: Value) -> usize {
        self.monitor_emit(Event::metrics_update(metrics)).await
    }

    /// Surface an operational error to monitoring clients.
    pub async fn error(&self, message: &str) -> usize {
        self.monitor_emit(Event::error(message)).await
    }

    /// Stamp once, then deliver to monitoring and to the conversation's
    /// followers. Returns the combined delivery count.
    async fn dual_emit(&self, conversation_id: &str, mut event: Event) -> usize {
        event.ensure_timestamp();
        let delivered = self
            .broadcaster
            .broadcast_to_channel(MONITORING_CHANNEL, event.clone())
            .await;
        delivered
            + self
                .broadcaster
                .broadcast_to_conversation(conversation_id, event)
                .await
    }

    async fn monitor_emit(&self, mut event: Event) -> usize {
        event.ensure_timestamp();
        self.broadcaster
            .broadcast_to_channel(MONITORING_CHANNEL, event)
            .await
    }
}
