// graph/cycles.rs — Cycle detection over a materialised graph.
//
// The stored edge set is a DAG by invariant, but imported data or a partial
// mutation history can violate it; this pass reports every cycle rather than
// stopping at the first.

use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::DependencyGraph;

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub has_cycles: bool,
    /// Each cycle as a closed chain: first node repeated at the end.
    pub cycles: Vec<Vec<Uuid>>,
    /// Union of all nodes appearing in any cycle, sorted.
    pub affected_nodes: Vec<Uuid>,
    pub suggestions: Vec<String>,
}

/// Iterative three-colour DFS. A back edge (target still on the traversal
/// stack) yields the cycle: the current path sliced from the target's first
/// occurrence, closed by repeating the target.
pub fn detect_cycles(graph: &DependencyGraph) -> CycleReport {
    let n = graph.len();
    let mut color = vec![0u8; n]; // 0 unvisited, 1 on stack, 2 done
    let mut path_pos = vec![usize::MAX; n];
    let mut path: Vec<usize> = Vec::new();
    let mut cycles: Vec<Vec<usize>> = Vec::new();

    for root in 0..n {
        if color[root] != 0 {
            continue;
        }
        // Frame: (node, index of the next successor to visit).
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
        color[root] = 1;
        path_pos[root] = path.len();
        path.push(root);

        while let Some(frame) = frames.last_mut() {
            let (node, cursor) = (frame.0, frame.1);
            if cursor < graph.successors(node).len() {
                frame.1 += 1;
                let (next, _) = graph.successors(node)[cursor];
                match color[next] {
                    0 => {
                        color[next] = 1;
                        path_pos[next] = path.len();
                        path.push(next);
                        frames.push((next, 0));
                    }
                    1 => {
                        let mut cycle = path[path_pos[next]..].to_vec();
                        cycle.push(next);
                        cycles.push(cycle);
                    }
                    _ => {}
                }
            } else {
                frames.pop();
                color[node] = 2;
                path_pos[node] = usize::MAX;
                path.pop();
            }
        }
    }

    let affected: BTreeSet<Uuid> = cycles
        .iter()
        .flatten()
        .map(|&i| graph.nodes[i].id)
        .collect();

    let suggestions = cycles
        .iter()
        .map(|cycle| {
            let chain = cycle
                .iter()
                .map(|&i| graph.nodes[i].title.as_str())
                .collect::<Vec<_>>()
                .join(" → ");
            format!("Break the cycle by removing one dependency in the chain {chain}")
        })
        .collect();

    let cycles: Vec<Vec<Uuid>> = cycles
        .iter()
        .map(|cycle| cycle.iter().map(|&i| graph.nodes[i].id).collect())
        .collect();

    CycleReport {
        has_cycles: !cycles.is_empty(),
        cycles,
        affected_nodes: affected.into_iter().collect(),
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testutil::{graph, uuid};

    #[test]
    fn acyclic_graph_reports_nothing() {
        let g = graph(
            &[
                (1, "task", Some(1), "open"),
                (2, "task", Some(1), "open"),
                (3, "task", Some(1), "open"),
            ],
            &[(1, 2, 0), (1, 3, 0), (2, 3, 0)],
        );
        let report = detect_cycles(&g);
        assert!(!report.has_cycles);
        assert!(report.cycles.is_empty());
        assert!(report.affected_nodes.is_empty());
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn triangle_cycle_is_closed_and_affected_nodes_listed() {
        let g = graph(
            &[
                (1, "task", Some(1), "open"),
                (2, "task", Some(1), "open"),
                (3, "task", Some(1), "open"),
            ],
            &[(1, 2, 0), (2, 3, 0), (3, 1, 0)],
        );
        let report = detect_cycles(&g);
        assert!(report.has_cycles);
        assert_eq!(report.cycles.len(), 1);
        let cycle = &report.cycles[0];
        assert_eq!(cycle.len(), 4, "closed chain repeats the entry node");
        assert_eq!(cycle.first(), cycle.last());
        let mut affected = report.affected_nodes.clone();
        affected.sort();
        let mut expected = vec![uuid(1), uuid(2), uuid(3)];
        expected.sort();
        assert_eq!(affected, expected);
        assert_eq!(report.suggestions.len(), 1);
        assert!(report.suggestions[0].contains("Break the cycle"));
    }

    #[test]
    fn all_components_are_searched() {
        // Two disjoint cycles plus an acyclic tail.
        let g = graph(
            &[
                (1, "task", Some(1), "open"),
                (2, "task", Some(1), "open"),
                (3, "task", Some(1), "open"),
                (4, "task", Some(1), "open"),
                (5, "task", Some(1), "open"),
            ],
            &[(1, 2, 0), (2, 1, 0), (3, 4, 0), (4, 3, 0), (4, 5, 0)],
        );
        let report = detect_cycles(&g);
        assert_eq!(report.cycles.len(), 2);
        assert_eq!(report.affected_nodes.len(), 4);
        assert!(!report.affected_nodes.contains(&uuid(5)));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let g = graph(&[(1, "task", Some(1), "open")], &[(1, 1, 0)]);
        let report = detect_cycles(&g);
        assert!(report.has_cycles);
        assert_eq!(report.cycles[0], vec![uuid(1), uuid(1)]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let nodes: Vec<(u32, &str, Option<i32>, &str)> =
            (1..=5000).map(|i| (i, "task", Some(1), "open")).collect();
        let mut edges: Vec<(u32, u32, i32)> = (1..5000).map(|i| (i, i + 1, 0)).collect();
        edges.push((5000, 1, 0)); // close the loop
        let g = graph(&nodes, &edges);
        let report = detect_cycles(&g);
        assert!(report.has_cycles);
        assert_eq!(report.affected_nodes.len(), 5000);
    }
}
