//! Last-known status for every agent, broadcast on change.
//!
//! A status persists until the next explicit update. In particular
//! `HumanHandoff` stays set until staff hand the conversation back and
//! something calls [`AgentStatusTracker::set_status`] again; nothing here
//! reverts it on a timer.

use std::collections::HashMap;
use std::sync::Arc;

use chairside_core::events::AgentStatus;
use parking_lot::RwLock;
use tracing::debug;

use crate::emit::EventEmitter;

/// Tracks agent statuses and pushes changes to monitoring clients.
pub struct AgentStatusTracker {
    statuses: RwLock<HashMap<String, AgentStatus>>,
    emitter: Arc<EventEmitter>,
}

impl AgentStatusTracker {
    /// Create a tracker that broadcasts through the given emitter.
    #[must_use]
    pub fn new(emitter: Arc<EventEmitter>) -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            emitter,
        }
    }

    /// Record an agent's status and broadcast the change.
    ///
    /// Unknown agents are added on first update. Returns how many monitoring
    /// clients received the change.
    pub async fn set_status(&self, agent_id: &str, status: AgentStatus) -> usize {
        {
            let mut statuses = self.statuses.write();
            let _ = statuses.insert(agent_id.to_string(), status);
        }
        debug!(agent_id, status = %status, "agent status changed");
        self.emitter.agent_status(agent_id, status).await
    }

    /// Mark an agent as executing a task.
    pub async fn begin_task(&self, agent_id: &str) -> usize {
        self.set_status(agent_id, AgentStatus::Executing).await
    }

    /// Mark a task finished, landing on `Idle` or `Error`.
    pub async fn finish_task(&self, agent_id: &str, ok: bool) -> usize {
        let status = if ok {
            AgentStatus::Idle
        } else {
            AgentStatus::Error
        };
        self.set_status(agent_id, status).await
    }

    /// Last known status of one agent, if it has ever reported.
    #[must_use]
    pub fn status_of(&self, agent_id: &str) -> Option<AgentStatus> {
        self.statuses.read().get(agent_id).copied()
    }

    /// Snapshot of every tracked agent, sorted by id for stable seeding.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, AgentStatus)> {
        let mut snapshot: Vec<_> = self
            .statuses
            .read()
            .iter()
            .map(|(id, status)| (id.clone(), *status))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Number of agents with a recorded status.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.statuses.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::broadcast::Broadcaster;
    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::{ConnectionRegistry, MONITORING_CHANNEL};
    use tokio::sync::mpsc;

    fn make_tracker() -> (AgentStatusTracker, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let emitter = Arc::new(EventEmitter::new(broadcaster));
        (AgentStatusTracker::new(emitter), registry)
    }

    async fn add_monitor(
        registry: &ConnectionRegistry,
        id: &str,
    ) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(id.into(), tx));
        registry.insert(conn).await;
        registry.join(MONITORING_CHANNEL, id).await;
        rx
    }

    #[tokio::test]
    async fn set_status_inserts_then_updates() {
        let (tracker, _registry) = make_tracker();

        let _ = tracker.set_status("scheduler", AgentStatus::Thinking).await;
        assert_eq!(tracker.status_of("scheduler"), Some(AgentStatus::Thinking));

        let _ = tracker.set_status("scheduler", AgentStatus::Idle).await;
        assert_eq!(tracker.status_of("scheduler"), Some(AgentStatus::Idle));
        assert_eq!(tracker.tracked_count(), 1);
    }

    #[tokio::test]
    async fn unreported_agent_has_no_status() {
        let (tracker, _registry) = make_tracker();
        assert_eq!(tracker.status_of("scheduler"), None);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[tokio::test]
    async fn status_change_reaches_monitoring_clients() {
        let (tracker, registry) = make_tracker();
        let mut rx = add_monitor(&registry, "monitor").await;

        let delivered = tracker.set_status("triage", AgentStatus::Executing).await;

        assert_eq!(delivered, 1);
        let event: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(event["type"], "agent_status_update");
        assert_eq!(event["payload"]["agent_id"], "triage");
        assert_eq!(event["payload"]["status"], "executing");
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_agent_id() {
        let (tracker, _registry) = make_tracker();
        let _ = tracker.set_status("triage", AgentStatus::Idle).await;
        let _ = tracker.set_status("billing", AgentStatus::Error).await;
        let _ = tracker.set_status("scheduler", AgentStatus::Thinking).await;

        let snapshot = tracker.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["billing", "scheduler", "triage"]);
    }

    #[tokio::test]
    async fn task_lifecycle_lands_on_idle_or_error() {
        let (tracker, _registry) = make_tracker();

        let _ = tracker.begin_task("scheduler").await;
        assert_eq!(tracker.status_of("scheduler"), Some(AgentStatus::Executing));

        let _ = tracker.finish_task("scheduler", true).await;
        assert_eq!(tracker.status_of("scheduler"), Some(AgentStatus::Idle));

        let _ = tracker.begin_task("scheduler").await;
        let _ = tracker.finish_task("scheduler", false).await;
        assert_eq!(tracker.status_of("scheduler"), Some(AgentStatus::Error));
    }

    #[tokio::test]
    async fn human_handoff_persists_until_explicit_update() {
        let (tracker, _registry) = make_tracker();

        let _ = tracker
            .set_status("front-desk", AgentStatus::HumanHandoff)
            .await;
        // Other agents changing status leaves the handoff in place.
        let _ = tracker.set_status("scheduler", AgentStatus::Idle).await;
        assert_eq!(
            tracker.status_of("front-desk"),
            Some(AgentStatus::HumanHandoff)
        );

        let _ = tracker.set_status("front-desk", AgentStatus::Idle).await;
        assert_eq!(tracker.status_of("front-desk"), Some(AgentStatus::Idle));
    }
}
