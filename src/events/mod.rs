// events/mod.rs — Fire-and-forget publication of mutation and recalc events.
//
// Delivery contract: at-most-once, post-commit, non-transactional with the
// store, no ordering guarantee between concurrent mutations. Consumers of
// the recalc signal must be idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const EXCHANGE_DEPENDENCIES: &str = "dependencies";
pub const EXCHANGE_SYSTEM: &str = "system";
pub const ROUTE_RECALCULATE: &str = "critical_path.recalculate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    /// Routing key on the `dependencies` exchange.
    pub fn routing_key(&self) -> &'static str {
        match self {
            Self::Created => "dependency.created",
            Self::Updated => "dependency.updated",
            Self::Deleted => "dependency.deleted",
        }
    }
}

/// Emitted once per successful edge mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEvent {
    pub kind: EventKind,
    pub dependency_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    /// Edge snapshot for created/deleted; before/after + patch for updated.
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Asks downstream consumers to recompute the tenant's critical path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalcRequest {
    pub tenant_id: Uuid,
    pub requested_by: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Seam between the lifecycle layer and the pub/sub fabric. The production
/// sink fans out locally; tests capture.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Value);
}

/// One published frame, addressed the way the external fabric expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Value,
}

/// Broadcasts event frames to all subscribers — the bridge process that
/// forwards to the external exchange subscribes here.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Subscribe to all published frames.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for EventBroadcaster {
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Value) {
        let frame = EventFrame {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload,
        };
        // Ignore errors — no subscribers is fine
        let _ = self
            .tx
            .send(serde_json::to_string(&frame).unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber_with_addressing() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster
            .publish(
                EXCHANGE_SYSTEM,
                ROUTE_RECALCULATE,
                serde_json::json!({"tenant_id": Uuid::nil()}),
            )
            .await;
        let raw = rx.recv().await.unwrap();
        let frame: EventFrame = serde_json::from_str(&raw).unwrap();
        assert_eq!(frame.exchange, "system");
        assert_eq!(frame.routing_key, "critical_path.recalculate");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new();
        broadcaster
            .publish(EXCHANGE_DEPENDENCIES, "dependency.created", Value::Null)
            .await;
    }

    #[test]
    fn routing_keys_match_the_bus_contract() {
        assert_eq!(EventKind::Created.routing_key(), "dependency.created");
        assert_eq!(EventKind::Updated.routing_key(), "dependency.updated");
        assert_eq!(EventKind::Deleted.routing_key(), "dependency.deleted");
    }
}
