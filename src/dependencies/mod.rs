// dependencies/mod.rs — Edge lifecycle and graph read operations.
//
// Every mutation runs the full protocol inside one advisory-locked store
// transaction: work items exist → no cycle would form → no duplicate →
// write → commit. Events go out only after commit, so a failed call leaves
// no durable write and no event behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::DependencyError;
use crate::events::{
    DependencyEvent, EventKind, EventSink, RecalcRequest, EXCHANGE_DEPENDENCIES, EXCHANGE_SYSTEM,
    ROUTE_RECALCULATE,
};
use crate::graph::analysis::{self, Bottleneck};
use crate::graph::cpm;
use crate::graph::cycles::{self, CycleReport};
use crate::graph::{DependencyGraph, DependencyType, GraphEdge, GraphNode};
use crate::store::{EdgeRow, MutationTx, Store};

/// Reachability bound for the would-create-cycle probe. Chains deeper than
/// this are treated as acyclic rather than searched exhaustively.
const MAX_PROBE_DEPTH: usize = 20;

#[derive(Debug, Clone)]
pub struct CreateEdgeInput {
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub dependency_type: DependencyType,
    pub lag_days: i32,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EdgePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_type: Option<DependencyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl EdgePatch {
    pub fn is_empty(&self) -> bool {
        self.dependency_type.is_none() && self.lag_days.is_none() && self.metadata.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub total_duration_days: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalysisPayload {
    pub critical_path: Vec<Uuid>,
    pub total_duration_days: i64,
    pub bottlenecks: Vec<Bottleneck>,
    pub risk_score: f64,
    pub completion_probability: f64,
}

pub struct DependencyService {
    store: Arc<Store>,
    events: Arc<dyn EventSink>,
}

impl DependencyService {
    pub fn new(store: Arc<Store>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    pub async fn create(
        &self,
        principal: &Principal,
        input: CreateEdgeInput,
    ) -> Result<EdgeRow, DependencyError> {
        let tenant_id = principal.tenant_id;
        let mut tx = self.store.begin_mutation(tenant_id).await?;

        let missing = tx
            .missing_work_items(&[input.from_id, input.to_id])
            .await?;
        if !missing.is_empty() {
            return Err(DependencyError::WorkItemsNotFound { missing });
        }

        if let Some(chain) = would_create_cycle(&mut tx, input.from_id, input.to_id).await? {
            return Err(DependencyError::CycleDetected { chain });
        }

        if tx.edge_between(input.from_id, input.to_id).await?.is_some() {
            return Err(DependencyError::Duplicate {
                from_id: input.from_id,
                to_id: input.to_id,
            });
        }

        let now = Utc::now();
        let edge = EdgeRow {
            id: Uuid::new_v4(),
            tenant_id,
            from_id: input.from_id,
            to_id: input.to_id,
            dependency_type: input.dependency_type.as_str().to_string(),
            lag_days: input.lag_days,
            created_at: now,
            created_by: Some(principal.id),
            updated_at: now,
            metadata: input.metadata,
        };
        tx.insert_edge(&edge).await?;
        tx.commit().await?;

        info!(
            tenant = %tenant_id,
            edge = %edge.id,
            from = %edge.from_id,
            to = %edge.to_id,
            "dependency created"
        );
        self.emit(principal, EventKind::Created, edge.id, json!({ "dependency": &edge }))
            .await;
        Ok(edge)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        patch: EdgePatch,
    ) -> Result<EdgeRow, DependencyError> {
        let tenant_id = principal.tenant_id;
        let mut tx = self.store.begin_mutation(tenant_id).await?;
        let existing = tx.get_edge(id).await?.ok_or(DependencyError::NotFound(id))?;

        // Nothing to change: return as-is, no write, no events.
        if patch.is_empty() {
            return Ok(existing);
        }

        let mut updated = existing.clone();
        if let Some(dependency_type) = patch.dependency_type {
            updated.dependency_type = dependency_type.as_str().to_string();
        }
        if let Some(lag_days) = patch.lag_days {
            updated.lag_days = lag_days;
        }
        if let Some(metadata) = &patch.metadata {
            updated.metadata = metadata.clone();
        }
        updated.updated_at = Utc::now();
        tx.update_edge(&updated).await?;
        tx.commit().await?;

        info!(tenant = %tenant_id, edge = %id, "dependency updated");
        self.emit(
            principal,
            EventKind::Updated,
            id,
            json!({ "before": &existing, "after": &updated, "patch": &patch }),
        )
        .await;
        Ok(updated)
    }

    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), DependencyError> {
        let tenant_id = principal.tenant_id;
        let mut tx = self.store.begin_mutation(tenant_id).await?;
        let existing = tx.get_edge(id).await?.ok_or(DependencyError::NotFound(id))?;
        tx.delete_edge(id).await?;
        tx.commit().await?;

        info!(tenant = %tenant_id, edge = %id, "dependency deleted");
        self.emit(
            principal,
            EventKind::Deleted,
            id,
            json!({ "deleted": existing }),
        )
        .await;
        Ok(())
    }

    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<EdgeRow, DependencyError> {
        self.store
            .get_edge(principal.tenant_id, id)
            .await?
            .ok_or(DependencyError::NotFound(id))
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub async fn graph(
        &self,
        principal: &Principal,
        filter: Option<Vec<Uuid>>,
    ) -> Result<GraphPayload, DependencyError> {
        let mut graph = self.build_graph(principal.tenant_id, filter.as_deref()).await?;
        let summary = cpm::schedule(&mut graph, Utc::now());
        Ok(GraphPayload {
            nodes: graph.nodes,
            edges: graph.edges,
            total_duration_days: summary.total_duration_days,
        })
    }

    pub async fn critical_path(
        &self,
        principal: &Principal,
    ) -> Result<AnalysisPayload, DependencyError> {
        let mut graph = self.build_graph(principal.tenant_id, None).await?;
        let summary = cpm::schedule(&mut graph, Utc::now());
        let bottlenecks = analysis::bottlenecks(&graph);
        let risk_score = analysis::risk_score(&graph);
        Ok(AnalysisPayload {
            critical_path: summary.critical_path,
            total_duration_days: summary.total_duration_days,
            bottlenecks,
            risk_score,
            completion_probability: analysis::completion_probability(risk_score),
        })
    }

    pub async fn cycles(&self, principal: &Principal) -> Result<CycleReport, DependencyError> {
        let graph = self.build_graph(principal.tenant_id, None).await?;
        Ok(cycles::detect_cycles(&graph))
    }

    async fn build_graph(
        &self,
        tenant_id: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<DependencyGraph, DependencyError> {
        let items = self.store.list_work_items(tenant_id, filter).await?;
        let edges = self.store.list_edges(tenant_id, filter).await?;
        Ok(DependencyGraph::from_rows(items, edges))
    }

    /// One recalc signal + one mutation event, in that order, post-commit.
    async fn emit(&self, principal: &Principal, kind: EventKind, dependency_id: Uuid, payload: Value) {
        let timestamp = Utc::now();
        let recalc = RecalcRequest {
            tenant_id: principal.tenant_id,
            requested_by: principal.id,
            timestamp,
        };
        self.events
            .publish(
                EXCHANGE_SYSTEM,
                ROUTE_RECALCULATE,
                serde_json::to_value(&recalc).unwrap_or(Value::Null),
            )
            .await;
        let event = DependencyEvent {
            kind,
            dependency_id,
            tenant_id: principal.tenant_id,
            user_id: principal.id,
            payload,
            timestamp,
        };
        self.events
            .publish(
                EXCHANGE_DEPENDENCIES,
                kind.routing_key(),
                serde_json::to_value(&event).unwrap_or(Value::Null),
            )
            .await;
    }
}

/// Breadth-first reachability over the stored edges, one query per frontier
/// level. A path `to → … → from` means the prospective edge `from → to`
/// closes a cycle; the returned chain starts and ends at `from`.
async fn would_create_cycle(
    tx: &mut MutationTx,
    from_id: Uuid,
    to_id: Uuid,
) -> Result<Option<Vec<Uuid>>, DependencyError> {
    // Self-loop: the degenerate case of the cycle invariant.
    if from_id == to_id {
        return Ok(Some(vec![from_id, to_id]));
    }
    let mut parents: HashMap<Uuid, Uuid> = HashMap::new();
    let mut visited: HashSet<Uuid> = HashSet::from([to_id]);
    let mut frontier = vec![to_id];
    for _ in 0..MAX_PROBE_DEPTH {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for (from, to) in tx.successor_edges(&frontier).await? {
            if visited.insert(to) {
                parents.insert(to, from);
                next.push(to);
            }
            if to == from_id {
                return Ok(Some(build_chain(&parents, from_id, to_id)));
            }
        }
        frontier = next;
    }
    Ok(None)
}

/// Walk the BFS parent links back from `from_id` to `to_id` and close the
/// loop with the prospective edge.
fn build_chain(parents: &HashMap<Uuid, Uuid>, from_id: Uuid, to_id: Uuid) -> Vec<Uuid> {
    let mut tail = vec![from_id];
    let mut current = from_id;
    while current != to_id {
        match parents.get(&current) {
            Some(&parent) => {
                current = parent;
                tail.push(current);
            }
            None => break,
        }
    }
    tail.reverse();
    let mut chain = Vec::with_capacity(tail.len() + 1);
    chain.push(from_id);
    chain.extend(tail);
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn chain_closes_the_prospective_cycle() {
        // Stored: A→B, B→C. Prospective edge: C→A. BFS from A found B then C.
        let (a, b, c) = (u(1), u(2), u(3));
        let parents = HashMap::from([(b, a), (c, b)]);
        let chain = build_chain(&parents, c, a);
        assert_eq!(chain, vec![c, a, b, c]);
    }

    #[test]
    fn direct_back_edge_produces_a_two_hop_chain() {
        // Stored: A→B. Prospective edge: B→A.
        let (a, b) = (u(1), u(2));
        let parents = HashMap::from([(b, a)]);
        let chain = build_chain(&parents, b, a);
        assert_eq!(chain, vec![b, a, b]);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(EdgePatch::default().is_empty());
        assert!(!EdgePatch {
            lag_days: Some(2),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn patch_serialises_only_present_fields() {
        let patch = EdgePatch {
            lag_days: Some(3),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({ "lag_days": 3 }));
    }
}
