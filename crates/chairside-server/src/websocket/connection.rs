//! Per-client WebSocket connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

/// What happened to an enqueued outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Sent,
    /// The client's queue is full; the message was dropped.
    QueueFull,
    /// The writer task is gone; the client is dead.
    Closed,
}

/// A connected dashboard client.
///
/// Subscription membership lives in the registry; this struct only holds the
/// delivery channel and liveness bookkeeping.
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID (`client_<uuid>`).
    pub id: String,
    /// Send channel to the client's writer task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or close-worthy activity) was received.
    last_pong: Mutex<Instant>,
    /// Messages dropped because the queue was full.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around its outbound channel.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a pre-serialized message without blocking.
    ///
    /// A full queue counts against [`drop_count`](Self::drop_count); a closed
    /// queue means the client is gone.
    pub fn send(&self, message: Arc<String>) -> SendOutcome {
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Serialize `value` and enqueue it. Returns whether it was queued.
    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)) == SendOutcome::Sent,
            Err(_) => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record liveness (pong or close-worthy frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Take and reset the alive flag for the heartbeat cycle.
    ///
    /// Returns `true` if the client showed life since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last recorded pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("client_1".into(), tx);
        (conn, rx)
    }

    #[tokio::test]
    async fn send_queues_message() {
        let (conn, mut rx) = make_connection();
        assert_eq!(conn.send(Arc::new("hello".into())), SendOutcome::Sent);
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("client_2".into(), tx);
        assert_eq!(conn.send(Arc::new("first".into())), SendOutcome::Sent);
        assert_eq!(conn.send(Arc::new("second".into())), SendOutcome::QueueFull);
        assert_eq!(conn.send(Arc::new("third".into())), SendOutcome::QueueFull);
        assert_eq!(conn.drop_count(), 2);
    }

    #[tokio::test]
    async fn closed_queue_reports_closed_without_counting() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("client_3".into(), tx);
        drop(rx);
        assert_matches!(conn.send(Arc::new("late".into())), SendOutcome::Closed);
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_json_serializes() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send_json(&serde_json::json!({"type": "pong"})));
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "pong");
    }

    #[tokio::test]
    async fn send_json_to_closed_channel_is_false() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("client_4".into(), tx);
        drop(rx);
        assert!(!conn.send_json(&serde_json::json!({"x": 1})));
    }

    #[test]
    fn alive_flag_resets_on_check() {
        let (conn, _rx) = make_connection();
        // Fresh connections count as alive for the first cycle.
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn pong_elapsed_resets_on_mark_alive() {
        let (conn, _rx) = make_connection();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.last_pong_elapsed() >= Duration::from_millis(10));
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (conn, mut rx) = make_connection();
        for i in 0..5 {
            assert_eq!(conn.send(Arc::new(format!("msg_{i}"))), SendOutcome::Sent);
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(&*msg, &format!("msg_{i}"));
        }
    }
}
