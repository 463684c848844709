//! WebSocket session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chairside_core::events::Event;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::server::AppState;

use super::connection::ClientConnection;
use super::messages::{ClientMessage, ServerMessage};
use super::registry::{ConnectionRegistry, MONITORING_CHANNEL};

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the client and auto-joins the monitoring channel
/// 2. Sends the `connected` handshake, then a per-agent status snapshot
/// 3. Dispatches incoming control messages and forwards outbound events
/// 4. Sends periodic Ping frames and disconnects unresponsive clients
/// 5. Cleans up exactly once on disconnect
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(ws: WebSocket, client_id: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    info!("client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    state.registry.insert(connection.clone()).await;
    state.registry.join(MONITORING_CHANNEL, &client_id).await;

    // The handshake goes straight to the socket so it precedes anything the
    // broadcaster queues for this client.
    let connected = ServerMessage::connected(vec![MONITORING_CHANNEL.to_string()]);
    if let Ok(json) = serde_json::to_string(&connected) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Seed the new client with the current status of every tracked agent.
    for (agent_id, status) in state.status.snapshot() {
        let _ = state
            .broadcaster
            .send_direct(&connection, Event::agent_status_update(&agent_id, status));
    }

    // Spawn the outbound forwarder with periodic Ping frames.
    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let shutdown = state.shutdown.token();
    let outbound_conn = connection.clone();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(json) => {
                            if ws_tx.send(Message::Text(json.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    // Check if the client responded to the previous ping
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", pong_timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Process incoming frames until the client goes away.
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(ref t) => {
                connection.mark_alive();
                Some(t.to_string())
            }
            Message::Binary(ref data) => {
                connection.mark_alive();
                if let Ok(s) = std::str::from_utf8(data) {
                    Some(s.to_string())
                } else {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    None
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };

        let message = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring malformed client message");
                continue;
            }
        };
        handle_client_message(message, &state.registry, &connection).await;
    }

    // Clean up
    info!("client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection.age().as_secs_f64());
    outbound.abort();
    let _ = state.registry.drop_connection(&client_id).await;
}

/// Apply one control message and queue its acknowledgement.
async fn handle_client_message(
    message: ClientMessage,
    registry: &ConnectionRegistry,
    connection: &ClientConnection,
) {
    match message {
        ClientMessage::Subscribe { channel } => {
            registry.join(&channel, &connection.id).await;
            let _ = connection.send_json(&ServerMessage::subscribed(channel));
        }
        ClientMessage::SubscribeConversation { conversation_id } => {
            registry
                .subscribe_conversation(&conversation_id, &connection.id)
                .await;
            let _ = connection.send_json(&ServerMessage::conversation_subscribed(conversation_id));
        }
        ClientMessage::UnsubscribeConversation { conversation_id } => {
            registry
                .unsubscribe_conversation(&conversation_id, &connection.id)
                .await;
            let _ =
                connection.send_json(&ServerMessage::conversation_unsubscribed(conversation_id));
        }
        ClientMessage::Ping => {
            let _ = connection.send_json(&ServerMessage::pong());
        }
        ClientMessage::Unknown => {
            debug!("ignoring unrecognized control message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    // Full session behavior (handshake ordering, snapshot seeding, heartbeat
    // timeouts) is covered by tests/integration.rs; these exercise the
    // control-message dispatch in isolation.

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::new("c1".into(), tx)), rx)
    }

    fn parse(message: &Arc<String>) -> Value {
        serde_json::from_str(message).unwrap()
    }

    #[tokio::test]
    async fn subscribe_joins_channel_and_acks() {
        let registry = ConnectionRegistry::new();
        let (connection, mut rx) = make_connection();
        registry.insert(connection.clone()).await;

        handle_client_message(
            ClientMessage::Subscribe {
                channel: "appointments".into(),
            },
            &registry,
            &connection,
        )
        .await;

        assert_eq!(registry.members("appointments").await.len(), 1);
        let ack = parse(&rx.try_recv().unwrap());
        assert_eq!(ack["type"], "subscribed");
        assert_eq!(ack["channel"], "appointments");
        assert!(ack["timestamp"].is_string());
    }

    #[tokio::test]
    async fn subscribe_conversation_tracks_and_acks() {
        let registry = ConnectionRegistry::new();
        let (connection, mut rx) = make_connection();
        registry.insert(connection.clone()).await;

        handle_client_message(
            ClientMessage::SubscribeConversation {
                conversation_id: "conv-42".into(),
            },
            &registry,
            &connection,
        )
        .await;

        assert_eq!(registry.conversation_members("conv-42").await.len(), 1);
        let ack = parse(&rx.try_recv().unwrap());
        assert_eq!(ack["type"], "conversation_subscribed");
        assert_eq!(ack["conversation_id"], "conv-42");
    }

    #[tokio::test]
    async fn unsubscribe_conversation_acks_without_prior_subscription() {
        let registry = ConnectionRegistry::new();
        let (connection, mut rx) = make_connection();
        registry.insert(connection.clone()).await;

        handle_client_message(
            ClientMessage::UnsubscribeConversation {
                conversation_id: "conv-42".into(),
            },
            &registry,
            &connection,
        )
        .await;

        let ack = parse(&rx.try_recv().unwrap());
        assert_eq!(ack["type"], "conversation_unsubscribed");
        assert_eq!(ack["conversation_id"], "conv-42");
    }

    #[tokio::test]
    async fn ping_message_yields_pong() {
        let registry = ConnectionRegistry::new();
        let (connection, mut rx) = make_connection();
        registry.insert(connection.clone()).await;

        handle_client_message(ClientMessage::Ping, &registry, &connection).await;

        let ack = parse(&rx.try_recv().unwrap());
        assert_eq!(ack["type"], "pong");
        assert!(ack["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unknown_message_queues_nothing() {
        let registry = ConnectionRegistry::new();
        let (connection, mut rx) = make_connection();
        registry.insert(connection.clone()).await;

        handle_client_message(ClientMessage::Unknown, &registry, &connection).await;

        assert!(rx.try_recv().is_err());
    }
}
