// graph/analysis.rs — Bottlenecks, risk score, completion probability.
//
// Runs after a CPM pass: nodes must already carry slack and critical flags.

use serde::Serialize;
use uuid::Uuid;

use super::DependencyGraph;

/// Items longer than this count as schedule risks on their own.
pub const LONG_DURATION_DAYS: i64 = 30;

/// Degree above which a node concentrates too much of the plan.
const HIGH_DEGREE: usize = 3;

const BLOCKED_STATUS: &str = "blocked";

#[derive(Debug, Clone, Serialize)]
pub struct Bottleneck {
    pub work_item_id: Uuid,
    pub title: String,
    /// Days the project slips if this item slips — its full duration, since
    /// the item is on the critical path.
    pub delay_impact_days: i64,
    pub risk_factors: Vec<String>,
    pub mitigation_suggestions: Vec<String>,
}

fn mitigation_for(factor: &str) -> &'static str {
    match factor {
        "High dependency count" => "Split the item or remove non-essential dependencies",
        "Blocks many items" => "Prioritise completion to unblock downstream work",
        "Currently blocked" => "Resolve the blocker before the critical path slips",
        "Long duration" => "Break the item into smaller increments",
        _ => "Review the item's scheduling assumptions",
    }
}

/// Critical nodes that concentrate risk: heavily depended-on, heavily
/// depending, blocked, or long. Sorted by delay impact, largest first.
pub fn bottlenecks(graph: &DependencyGraph) -> Vec<Bottleneck> {
    let mut found: Vec<Bottleneck> = Vec::new();
    for (i, node) in graph.nodes.iter().enumerate() {
        if !node.is_critical {
            continue;
        }
        let mut factors: Vec<String> = Vec::new();
        if graph.indegree(i) > HIGH_DEGREE {
            factors.push("High dependency count".to_string());
        }
        if graph.outdegree(i) > HIGH_DEGREE {
            factors.push("Blocks many items".to_string());
        }
        if node.status.eq_ignore_ascii_case(BLOCKED_STATUS) {
            factors.push("Currently blocked".to_string());
        }
        if node.duration_days > LONG_DURATION_DAYS {
            factors.push("Long duration".to_string());
        }
        if factors.is_empty() {
            continue;
        }
        let mitigation_suggestions = factors
            .iter()
            .map(|f| mitigation_for(f).to_string())
            .collect();
        found.push(Bottleneck {
            work_item_id: node.id,
            title: node.title.clone(),
            delay_impact_days: node.duration_days,
            risk_factors: factors,
            mitigation_suggestions,
        });
    }
    found.sort_by(|a, b| {
        b.delay_impact_days
            .cmp(&a.delay_impact_days)
            .then(a.work_item_id.cmp(&b.work_item_id))
    });
    found
}

/// Weighted share of risky nodes, clamped to [0, 1]. Empty graph scores 0.
pub fn risk_score(graph: &DependencyGraph) -> f64 {
    let n = graph.len();
    if n == 0 {
        return 0.0;
    }
    let critical = graph.nodes.iter().filter(|nd| nd.is_critical).count() as f64;
    let blocked = graph
        .nodes
        .iter()
        .filter(|nd| nd.status.eq_ignore_ascii_case(BLOCKED_STATUS))
        .count() as f64;
    let long = graph
        .nodes
        .iter()
        .filter(|nd| nd.duration_days > LONG_DURATION_DAYS)
        .count() as f64;
    let score = (0.3 * critical + 0.5 * blocked + 0.2 * long) / n as f64;
    score.min(1.0)
}

/// Floor of 0.1 — no plan is reported as certain to fail.
pub fn completion_probability(risk: f64) -> f64 {
    (1.0 - risk).max(0.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::cpm;
    use crate::graph::testutil::{graph, uuid};
    use chrono::Utc;

    #[test]
    fn hub_node_collects_all_matching_factors() {
        // Node 5 is critical with indegree 4, duration 45, status blocked,
        // inside a ten-node graph.
        let mut g = graph(
            &[
                (1, "task", Some(1), "open"),
                (2, "task", Some(1), "open"),
                (3, "task", Some(1), "open"),
                (4, "task", Some(1), "open"),
                (5, "task", Some(45), "blocked"),
                (6, "task", Some(1), "open"),
                (7, "task", Some(1), "open"),
                (8, "task", Some(1), "open"),
                (9, "task", Some(1), "open"),
                (10, "task", Some(1), "open"),
            ],
            &[(1, 5, 0), (2, 5, 0), (3, 5, 0), (4, 5, 0), (5, 6, 0)],
        );
        cpm::schedule(&mut g, Utc::now());

        let found = bottlenecks(&g);
        let hub = found
            .iter()
            .find(|b| b.work_item_id == uuid(5))
            .expect("hub must qualify");
        assert_eq!(hub.delay_impact_days, 45);
        for factor in ["High dependency count", "Currently blocked", "Long duration"] {
            assert!(
                hub.risk_factors.iter().any(|f| f == factor),
                "missing factor {factor}"
            );
        }
        assert_eq!(hub.risk_factors.len(), hub.mitigation_suggestions.len());
    }

    #[test]
    fn non_critical_nodes_never_qualify() {
        // B is blocked and long but sits off the critical path.
        let mut g = graph(
            &[
                (1, "task", Some(50), "open"),
                (2, "task", Some(40), "blocked"),
                (3, "task", Some(60), "open"),
            ],
            &[(1, 3, 0), (2, 3, 0)],
        );
        cpm::schedule(&mut g, Utc::now());
        let b = &g.nodes[g.node_index(uuid(2)).unwrap()];
        assert!(!b.is_critical, "precondition: B has slack");
        assert!(bottlenecks(&g).iter().all(|bn| bn.work_item_id != uuid(2)));
    }

    #[test]
    fn bottlenecks_sort_by_delay_impact_descending() {
        let mut g = graph(
            &[
                (1, "task", Some(35), "blocked"),
                (2, "task", Some(80), "blocked"),
            ],
            &[],
        );
        cpm::schedule(&mut g, Utc::now());
        let found = bottlenecks(&g);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].work_item_id, uuid(2));
        assert_eq!(found[1].work_item_id, uuid(1));
    }

    #[test]
    fn risk_score_formula_and_bounds() {
        // 3 nodes, all critical (chain), one blocked, one long:
        // (0.3·3 + 0.5·1 + 0.2·1) / 3 = 1.6 / 3.
        let mut g = graph(
            &[
                (1, "task", Some(2), "open"),
                (2, "task", Some(3), "blocked"),
                (3, "task", Some(40), "open"),
            ],
            &[(1, 2, 0), (2, 3, 0)],
        );
        cpm::schedule(&mut g, Utc::now());
        let risk = risk_score(&g);
        assert!((risk - 1.6 / 3.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&risk));

        let p = completion_probability(risk);
        assert!((0.1..=1.0).contains(&p));
        assert!((p - (1.0 - risk)).abs() < 1e-9);
    }

    #[test]
    fn risk_clamps_at_one_and_probability_floors() {
        // Every node critical, blocked, and long: raw score 1.0 per node.
        let mut g = graph(
            &[(1, "task", Some(40), "blocked"), (2, "task", Some(50), "blocked")],
            &[(1, 2, 0)],
        );
        cpm::schedule(&mut g, Utc::now());
        let risk = risk_score(&g);
        assert!(risk > 0.999 && risk <= 1.0, "risk was {risk}");
        assert!((completion_probability(risk) - 0.1).abs() < 1e-3);
    }

    #[test]
    fn empty_graph_scores_zero() {
        let g = graph(&[], &[]);
        assert_eq!(risk_score(&g), 0.0);
        assert_eq!(completion_probability(0.0), 1.0);
    }
}
