//! Connection registry: who is connected and what they watch.
//!
//! All membership state lives behind one lock, owned here. Callers get
//! snapshots (`Vec<Arc<ClientConnection>>`), never references into the maps,
//! so delivery work always happens outside the lock.
//!
//! Channel entries persist once created (the channel vocabulary is small and
//! fixed), while conversation entries are pruned as soon as their last
//! subscriber leaves; conversations are unbounded and mostly short-lived.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use super::connection::ClientConnection;

/// Channel every dashboard client is auto-joined to on connect.
pub const MONITORING_CHANNEL: &str = "monitoring";

#[derive(Default)]
struct RegistryInner {
    /// Live connections by client id.
    connections: HashMap<String, Arc<ClientConnection>>,
    /// Channel name to member client ids.
    channels: HashMap<String, HashSet<String>>,
    /// Conversation id to follower client ids.
    conversations: HashMap<String, HashSet<String>>,
}

/// Tracks connections and their channel/conversation memberships.
///
/// Every operation is total: joins and leaves are idempotent, lookups on
/// absent keys answer with empty sets, and none of them can fail.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
    /// Connection total kept outside the lock for cheap count queries.
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register a connection. Replacing an existing id keeps the count flat.
    pub async fn insert(&self, connection: Arc<ClientConnection>) {
        let mut inner = self.inner.write().await;
        if inner
            .connections
            .insert(connection.id.clone(), connection)
            .is_none()
        {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Add a client to a channel. Joining twice is a no-op.
    pub async fn join(&self, channel: &str, client_id: &str) {
        let mut inner = self.inner.write().await;
        let _ = inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    /// Remove a client from a channel. Absent memberships are a no-op; the
    /// channel entry itself stays, even when empty.
    pub async fn leave(&self, channel: &str, client_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.channels.get_mut(channel) {
            let _ = members.remove(client_id);
        }
    }

    /// Start following a conversation. Following twice is a no-op.
    pub async fn subscribe_conversation(&self, conversation_id: &str, client_id: &str) {
        let mut inner = self.inner.write().await;
        let _ = inner
            .conversations
            .entry(conversation_id.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    /// Stop following a conversation, pruning the entry once nobody is left.
    pub async fn unsubscribe_conversation(&self, conversation_id: &str, client_id: &str) {
        let mut inner = self.inner.write().await;
        let now_empty = match inner.conversations.get_mut(conversation_id) {
            Some(members) => {
                let _ = members.remove(client_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            let _ = inner.conversations.remove(conversation_id);
        }
    }

    /// Remove a connection and every membership it holds.
    ///
    /// Returns whether the connection was still registered; a second call
    /// for the same id is a no-op answering `false`.
    pub async fn drop_connection(&self, client_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let was_present = inner.connections.remove(client_id).is_some();
        if was_present {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        for members in inner.channels.values_mut() {
            let _ = members.remove(client_id);
        }
        inner.conversations.retain(|_, members| {
            let _ = members.remove(client_id);
            !members.is_empty()
        });
        if was_present {
            debug!(client_id, "connection dropped from registry");
        }
        was_present
    }

    /// Snapshot of live connections in a channel. Unknown channels and
    /// members without a registered connection yield nothing.
    pub async fn members(&self, channel: &str) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read().await;
        inner
            .channels
            .get(channel)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of live connections following a conversation.
    pub async fn conversation_members(&self, conversation_id: &str) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read().await;
        inner
            .conversations
            .get(conversation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a single live connection.
    pub async fn connection(&self, client_id: &str) -> Option<Arc<ClientConnection>> {
        let inner = self.inner.read().await;
        inner.connections.get(client_id).cloned()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Number of channel entries (empty ones included).
    pub async fn channel_count(&self) -> usize {
        self.inner.read().await.channels.len()
    }

    /// Number of conversations with at least one follower.
    pub async fn conversation_count(&self) -> usize {
        self.inner.read().await.conversations.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
