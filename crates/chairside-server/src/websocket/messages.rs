//! Control messages exchanged with dashboard clients.
//!
//! Inbound frames parse into [`ClientMessage`]; anything with an
//! unrecognized `type` tag lands on [`ClientMessage::Unknown`] so the
//! session can log and move on instead of tearing the connection down.

use chairside_core::events::now_iso8601;
use serde::{Deserialize, Serialize};

/// Messages clients send to the server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a named broadcast channel.
    Subscribe {
        /// Channel to join, e.g. `"monitoring"`.
        channel: String,
    },
    /// Follow one conversation's live events.
    SubscribeConversation {
        /// Conversation to follow.
        conversation_id: String,
    },
    /// Stop following a conversation.
    UnsubscribeConversation {
        /// Conversation to stop following.
        conversation_id: String,
    },
    /// Application-level liveness probe.
    Ping,
    /// Any unrecognized `type` tag.
    #[serde(other)]
    Unknown,
}

/// Acks and handshake messages the server sends back.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake, sent once right after the connection registers.
    Connected {
        /// Greeting for debug consoles.
        message: String,
        /// Channels the client was auto-joined to.
        channels: Vec<String>,
        /// When the handshake was built.
        timestamp: String,
    },
    /// Ack for [`ClientMessage::Subscribe`].
    Subscribed {
        /// Channel that was joined.
        channel: String,
        /// Ack time.
        timestamp: String,
    },
    /// Ack for [`ClientMessage::SubscribeConversation`].
    ConversationSubscribed {
        /// Conversation now followed.
        conversation_id: String,
        /// Ack time.
        timestamp: String,
    },
    /// Ack for [`ClientMessage::UnsubscribeConversation`].
    ConversationUnsubscribed {
        /// Conversation no longer followed.
        conversation_id: String,
        /// Ack time.
        timestamp: String,
    },
    /// Reply to [`ClientMessage::Ping`].
    Pong {
        /// Reply time.
        timestamp: String,
    },
}

impl ServerMessage {
    /// Handshake listing the channels the client starts in.
    #[must_use]
    pub fn connected(channels: Vec<String>) -> Self {
        Self::Connected {
            message: "connected to chairside".into(),
            channels,
            timestamp: now_iso8601(),
        }
    }

    /// Ack a channel join.
    #[must_use]
    pub fn subscribed(channel: impl Into<String>) -> Self {
        Self::Subscribed {
            channel: channel.into(),
            timestamp: now_iso8601(),
        }
    }

    /// Ack a conversation subscription.
    #[must_use]
    pub fn conversation_subscribed(conversation_id: impl Into<String>) -> Self {
        Self::ConversationSubscribed {
            conversation_id: conversation_id.into(),
            timestamp: now_iso8601(),
        }
    }

    /// Ack a conversation unsubscription.
    #[must_use]
    pub fn conversation_unsubscribed(conversation_id: impl Into<String>) -> Self {
        Self::ConversationUnsubscribed {
            conversation_id: conversation_id.into(),
            timestamp: now_iso8601(),
        }
    }

    /// Reply to an application-level ping.
    #[must_use]
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_iso8601(),
        }
    }
}
