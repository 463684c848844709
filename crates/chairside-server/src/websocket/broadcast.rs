//! Event fan-out to subscribed clients.
//!
//! Events serialize once per broadcast and fan out as shared `Arc<String>`s.
//! A failing recipient never aborts the sweep: dead clients (closed queue)
//! and persistently slow ones (drop ceiling reached) are collected during
//! the sweep and dropped from the registry afterwards.

use std::sync::Arc;

use chairside_core::events::Event;
use metrics::counter;
use tracing::{debug, warn};

use super::connection::{ClientConnection, SendOutcome};
use super::registry::ConnectionRegistry;

/// Lifetime message-drop ceiling before a slow client is disconnected.
const MAX_TOTAL_DROPS: u64 = 100;

/// Delivers events to registry members.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over a registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster delivers to.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver an event to every member of a channel.
    ///
    /// Stamps the timestamp if the producer left it unset. Returns how many
    /// clients the event was queued for.
    pub async fn broadcast_to_channel(&self, channel: &str, mut event: Event) -> usize {
        event.ensure_timestamp();
        let members = self.registry.members(channel).await;
        self.fan_out(channel, &members, &event).await
    }

    /// Deliver an event to every follower of a conversation.
    pub async fn broadcast_to_conversation(
        &self,
        conversation_id: &str,
        mut event: Event,
    ) -> usize {
        event.ensure_timestamp();
        let members = self.registry.conversation_members(conversation_id).await;
        self.fan_out(conversation_id, &members, &event).await
    }

    /// Deliver an event to one connection, outside any subscription.
    ///
    /// Used for seeding snapshots on connect. Failure is logged and reported
    /// in the return value, never raised.
    pub fn send_direct(&self, connection: &ClientConnection, mut event: Event) -> bool {
        event.ensure_timestamp();
        let json = match serde_json::to_string(&event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                return false;
            }
        };
        match connection.send(json) {
            SendOutcome::Sent => {
                counter!("ws_messages_sent_total").increment(1);
                true
            }
            outcome => {
                debug!(
                    client_id = %connection.id,
                    event_type = %event.event_type,
                    ?outcome,
                    "direct send failed"
                );
                false
            }
        }
    }

    /// Serialize once, sweep all recipients, then drop the failed ones.
    async fn fan_out(
        &self,
        label: &str,
        members: &[Arc<ClientConnection>],
        event: &Event,
    ) -> usize {
        if members.is_empty() {
            return 0;
        }
        let json = match serde_json::to_string(event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0usize;
        let mut to_drop = Vec::new();
        for conn in members {
            match conn.send(Arc::clone(&json)) {
                SendOutcome::Sent => {
                    delivered += 1;
                    counter!("ws_messages_sent_total").increment(1);
                }
                SendOutcome::Closed => {
                    debug!(client_id = %conn.id, label, "client gone, scheduling removal");
                    to_drop.push(conn.id.clone());
                }
                SendOutcome::QueueFull => {
                    counter!("ws_broadcast_drops_total").increment(1);
                    let drops = conn.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(client_id = %conn.id, label, drops, "disconnecting slow client");
                        to_drop.push(conn.id.clone());
                    } else {
                        warn!(
                            client_id = %conn.id,
                            label,
                            total_drops = drops,
                            "client queue full, dropped event"
                        );
                    }
                }
            }
        }
        debug!(
            event_type = %event.event_type,
            label,
            recipients = members.len(),
            delivered,
            "broadcast event"
        );

        for id in &to_drop {
            let _ = self.registry.drop_connection(id).await;
        }
        delivered
    }
}
