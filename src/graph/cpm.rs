// graph/cpm.rs — Critical Path Method over a tenant graph.
//
// All times are integer days from a project origin t=0; calendar fields are
// derived at the end by offsetting from `now`. Both passes run iteratively
// with an explicit stack so deep chains cannot overflow the call stack.
//
// Two compatibility notes, kept deliberately:
//   - every edge is computed as finish-to-start with its lag, whatever its
//     stored dependency_type says;
//   - a sink anchors at its own early finish (LF = EF), not at the global
//     project completion, so every sink reports zero slack.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::DependencyGraph;

/// Project-level outcome of a scheduling pass.
#[derive(Debug, Clone, Serialize)]
pub struct CpmSummary {
    /// Critical node ids ordered by earliest start, then id.
    pub critical_path: Vec<Uuid>,
    pub total_duration_days: i64,
}

/// Run the forward and backward passes, annotate every node and edge in
/// place, and return the project summary.
pub fn schedule(graph: &mut DependencyGraph, now: DateTime<Utc>) -> CpmSummary {
    let n = graph.len();
    if n == 0 {
        return CpmSummary {
            critical_path: Vec::new(),
            total_duration_days: 0,
        };
    }

    // ── Forward pass: ES(n) = max over preds (EF(p) + lag), or 0 at sources ──
    let mut es = vec![0i64; n];
    let mut ef = vec![0i64; n];
    let mut state = vec![0u8; n]; // 0 untouched, 1 in progress, 2 resolved
    for root in 0..n {
        if state[root] != 0 {
            continue;
        }
        let mut stack = vec![(root, false)];
        while let Some((i, expanded)) = stack.pop() {
            if expanded {
                // An unresolved predecessor here is a back edge; it
                // contributes no constraint and /cycles reports it.
                let start = graph
                    .predecessors(i)
                    .iter()
                    .filter(|&&(p, _)| state[p] == 2)
                    .map(|&(p, e)| ef[p] + graph.edges[e].lag_days)
                    .max()
                    .unwrap_or(0);
                es[i] = start;
                ef[i] = start + graph.nodes[i].duration_days;
                state[i] = 2;
            } else {
                if state[i] != 0 {
                    continue;
                }
                state[i] = 1;
                stack.push((i, true));
                for &(p, _) in graph.predecessors(i) {
                    if state[p] == 0 {
                        stack.push((p, false));
                    }
                }
            }
        }
    }

    let total_duration_days = ef.iter().copied().max().unwrap_or(0);

    // ── Backward pass: LF(n) = min over succs (LS(s) − lag); sinks LF = EF ──
    let mut ls = vec![0i64; n];
    let mut lf = vec![0i64; n];
    let mut state = vec![0u8; n];
    for root in 0..n {
        if state[root] != 0 {
            continue;
        }
        let mut stack = vec![(root, false)];
        while let Some((i, expanded)) = stack.pop() {
            if expanded {
                let finish = graph
                    .successors(i)
                    .iter()
                    .filter(|&&(s, _)| state[s] == 2)
                    .map(|&(s, e)| ls[s] - graph.edges[e].lag_days)
                    .min()
                    .unwrap_or(ef[i]);
                lf[i] = finish;
                ls[i] = finish - graph.nodes[i].duration_days;
                state[i] = 2;
            } else {
                if state[i] != 0 {
                    continue;
                }
                state[i] = 1;
                stack.push((i, true));
                for &(s, _) in graph.successors(i) {
                    if state[s] == 0 {
                        stack.push((s, false));
                    }
                }
            }
        }
    }

    // ── Slack, criticality, calendar annotation ──────────────────────────────
    let mut critical: Vec<(i64, Uuid)> = Vec::new();
    let mut node_critical = vec![false; n];
    for i in 0..n {
        let slack = ls[i] - es[i];
        let node = &mut graph.nodes[i];
        node.earliest_start = Some(now + Duration::days(es[i]));
        node.earliest_finish = Some(now + Duration::days(ef[i]));
        node.latest_start = Some(now + Duration::days(ls[i]));
        node.latest_finish = Some(now + Duration::days(lf[i]));
        node.slack_days = Some(slack);
        node.is_critical = slack == 0;
        node_critical[i] = node.is_critical;
        if node.is_critical {
            critical.push((es[i], node.id));
        }
    }

    let endpoints: Vec<(usize, usize)> = graph
        .edges
        .iter()
        .map(|e| {
            (
                graph.node_index(e.from_id).unwrap_or(0),
                graph.node_index(e.to_id).unwrap_or(0),
            )
        })
        .collect();
    for (edge, (from, to)) in graph.edges.iter_mut().zip(endpoints) {
        edge.is_critical = node_critical[from] && node_critical[to];
    }

    critical.sort();
    CpmSummary {
        critical_path: critical.into_iter().map(|(_, id)| id).collect(),
        total_duration_days,
    }
}
