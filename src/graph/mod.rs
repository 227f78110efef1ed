// graph/mod.rs — In-memory dependency graph: wire types + builder.
//
// A graph is materialised per request from store rows and discarded when the
// response is written. Nothing here touches I/O.

pub mod analysis;
pub mod cpm;
pub mod cycles;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::store::{EdgeRow, WorkItemRow};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    #[default]
    FinishToStart,
    StartToStart,
    FinishToFinish,
    StartToFinish,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinishToStart => "finish_to_start",
            Self::StartToStart => "start_to_start",
            Self::FinishToFinish => "finish_to_finish",
            Self::StartToFinish => "start_to_finish",
        }
    }
}

impl FromStr for DependencyType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finish_to_start" => Ok(Self::FinishToStart),
            "start_to_start" => Ok(Self::StartToStart),
            "finish_to_finish" => Ok(Self::FinishToFinish),
            "start_to_finish" => Ok(Self::StartToFinish),
            _ => Err(()),
        }
    }
}

/// Planning duration for items that carry no estimate, by item type.
pub fn default_duration_days(item_type: &str) -> i64 {
    match item_type {
        "objective" => 90,
        "strategy" => 60,
        "initiative" => 30,
        "task" => 7,
        "subtask" => 3,
        _ => 7,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub status: String,
    pub duration_days: i64,
    pub earliest_start: Option<DateTime<Utc>>,
    pub earliest_finish: Option<DateTime<Utc>>,
    pub latest_start: Option<DateTime<Utc>>,
    pub latest_finish: Option<DateTime<Utc>>,
    pub slack_days: Option<i64>,
    pub is_critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub dependency_type: DependencyType,
    pub lag_days: i64,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
    pub is_critical: bool,
}

/// Nodes + edges for one tenant with adjacency lookups. Owned by the request
/// that built it.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    index: HashMap<Uuid, usize>,
    /// Per node: (predecessor node index, edge index).
    preds: Vec<Vec<(usize, usize)>>,
    /// Per node: (successor node index, edge index).
    succs: Vec<Vec<(usize, usize)>>,
}

impl DependencyGraph {
    /// Materialise a graph from store rows.
    ///
    /// When the caller filtered work items by an id set, the edge query may
    /// return edges touching items outside the set; those dangling edges are
    /// dropped here so CPM's predecessor/successor lookups stay total.
    pub fn from_rows(items: Vec<WorkItemRow>, edge_rows: Vec<EdgeRow>) -> Self {
        let mut nodes = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());
        for item in items {
            // Estimates are trusted but clamped: CPM needs non-negative durations.
            let duration_days = item
                .estimated_duration_days
                .map(|d| i64::from(d).max(0))
                .unwrap_or_else(|| default_duration_days(&item.item_type));
            index.insert(item.id, nodes.len());
            nodes.push(GraphNode {
                id: item.id,
                title: item.title,
                item_type: item.item_type,
                status: item.status,
                duration_days,
                earliest_start: None,
                earliest_finish: None,
                latest_start: None,
                latest_finish: None,
                slack_days: None,
                is_critical: false,
            });
        }

        let mut edges = Vec::new();
        let mut preds = vec![Vec::new(); nodes.len()];
        let mut succs = vec![Vec::new(); nodes.len()];
        for row in edge_rows {
            let (Some(&from), Some(&to)) = (index.get(&row.from_id), index.get(&row.to_id)) else {
                continue;
            };
            let edge_idx = edges.len();
            edges.push(GraphEdge {
                id: row.id,
                from_id: row.from_id,
                to_id: row.to_id,
                dependency_type: row.dependency_type.parse().unwrap_or_default(),
                lag_days: i64::from(row.lag_days),
                created_at: row.created_at,
                created_by: row.created_by,
                updated_at: row.updated_at,
                metadata: row.metadata,
                is_critical: false,
            });
            preds[to].push((from, edge_idx));
            succs[from].push((to, edge_idx));
        }

        Self {
            nodes,
            edges,
            index,
            preds,
            succs,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_index(&self, id: Uuid) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn predecessors(&self, node: usize) -> &[(usize, usize)] {
        &self.preds[node]
    }

    pub fn successors(&self, node: usize) -> &[(usize, usize)] {
        &self.succs[node]
    }

    pub fn indegree(&self, node: usize) -> usize {
        self.preds[node].len()
    }

    pub fn outdegree(&self, node: usize) -> usize {
        self.succs[node].len()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::Utc;

    /// Build a graph from (id, type, duration, status) nodes and
    /// (from, to, lag) edges, using small integers as stand-in uuids.
    pub fn graph(nodes: &[(u32, &str, Option<i32>, &str)], edges: &[(u32, u32, i32)]) -> DependencyGraph {
        let items = nodes
            .iter()
            .map(|(n, item_type, duration, status)| WorkItemRow {
                id: uuid(*n),
                tenant_id: Uuid::nil(),
                item_type: item_type.to_string(),
                title: format!("item-{n}"),
                status: status.to_string(),
                estimated_duration_days: *duration,
            })
            .collect();
        let edge_rows = edges
            .iter()
            .map(|(from, to, lag)| edge_row(*from, *to, *lag))
            .collect();
        DependencyGraph::from_rows(items, edge_rows)
    }

    pub fn edge_row(from: u32, to: u32, lag: i32) -> EdgeRow {
        EdgeRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            from_id: uuid(from),
            to_id: uuid(to),
            dependency_type: "finish_to_start".to_string(),
            lag_days: lag,
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn uuid(n: u32) -> Uuid {
        Uuid::from_u128(u128::from(n) + 1)
    }
}
