//! DAG validation, cycle detection, and wave computation.
//!
//! Shared by templates and ad-hoc plans: anything with an ID and a list of
//! dependency IDs can be checked here. Cycle detection is a three-color
//! depth-first walk with an explicit stack, so template size never threatens
//! recursion depth. Wave computation uses `petgraph` to group nodes by
//! dependency depth.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;
use waymark_types::plan::OrchestrationStep;
use waymark_types::template::StepDefinition;

// ---------------------------------------------------------------------------
// Node abstraction
// ---------------------------------------------------------------------------

/// A node of a dependency graph.
pub trait DagNode {
    fn node_id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

impl DagNode for StepDefinition {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

impl DagNode for OrchestrationStep {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

/// Structural graph errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("duplicate step ID: '{0}'")]
    DuplicateNode(String),

    #[error("step '{step_id}' depends on unknown step '{missing_id}'")]
    UnknownDependency { step_id: String, missing_id: String },

    #[error("cycle detected involving step '{step_id}'")]
    CyclicDependency { step_id: String },
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that nodes form a DAG: unique IDs, resolvable references, no cycles.
///
/// References are checked in declaration order before the cycle walk, so a
/// dangling reference is always reported as `UnknownDependency` even when the
/// graph would also contain a cycle.
pub fn validate_dag<N: DagNode>(nodes: &[N]) -> Result<(), DagError> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.node_id()) {
            return Err(DagError::DuplicateNode(node.node_id().to_string()));
        }
    }

    for node in nodes {
        for dep in node.dependencies() {
            if !seen.contains(dep.as_str()) {
                return Err(DagError::UnknownDependency {
                    step_id: node.node_id().to_string(),
                    missing_id: dep.clone(),
                });
            }
        }
    }

    detect_cycle(nodes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Three-color depth-first cycle detection over `depends_on` edges.
///
/// Fails with `CyclicDependency` naming the node that was revisited while
/// still in progress.
pub fn detect_cycle<N: DagNode>(nodes: &[N]) -> Result<(), DagError> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.node_id(), i))
        .collect();

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    // (node index, next dependency to explore)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..nodes.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            let deps = nodes[node].dependencies();

            if cursor == deps.len() {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            }
            frame.1 += 1;

            let dep_id = deps[cursor].as_str();
            let dep = *index.get(dep_id).ok_or_else(|| DagError::UnknownDependency {
                step_id: nodes[node].node_id().to_string(),
                missing_id: dep_id.to_string(),
            })?;

            match marks[dep] {
                Mark::InProgress => {
                    return Err(DagError::CyclicDependency {
                        step_id: dep_id.to_string(),
                    });
                }
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    stack.push((dep, 0));
                }
                Mark::Done => {}
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Execution waves
// ---------------------------------------------------------------------------

/// Group nodes into waves by dependency depth.
///
/// 1. Build a `DiGraph` with node IDs and `depends_on` edges.
/// 2. Run `petgraph::algo::toposort` to verify acyclicity.
/// 3. Compute each node's depth (max dependency depth + 1).
/// 4. Group nodes by depth, keeping declaration order inside a wave.
///
/// Index 0 is the first wave. Flattening the waves yields a deterministic
/// order consistent with every dependency.
pub fn execution_waves<N: DagNode>(nodes: &[N]) -> Result<Vec<Vec<&N>>, DagError> {
    if nodes.is_empty() {
        return Ok(vec![]);
    }

    let id_to_idx: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.node_id(), i))
        .collect();

    // Edge from dependency -> dependent
    let mut graph = DiGraph::<usize, ()>::new();
    let node_indices: Vec<_> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

    for (to_idx, node) in nodes.iter().enumerate() {
        for dep in node.dependencies() {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                DagError::UnknownDependency {
                    step_id: node.node_id().to_string(),
                    missing_id: dep.clone(),
                }
            })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| DagError::CyclicDependency {
        step_id: nodes[graph[cycle.node_id()]].node_id().to_string(),
    })?;

    // Root nodes have depth 0
    let mut depths = vec![0usize; nodes.len()];
    for node_idx in sorted {
        let idx = graph[node_idx];
        let depth = nodes[idx]
            .dependencies()
            .iter()
            .map(|dep| depths[id_to_idx[dep.as_str()]] + 1)
            .max()
            .unwrap_or(0);
        depths[idx] = depth;
    }

    let max_depth = depths.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&N>> = vec![Vec::new(); max_depth + 1];
    for (idx, node) in nodes.iter().enumerate() {
        waves[depths[idx]].push(node);
    }

    Ok(waves)
}

/// Length (in edges) of the longest dependency chain. Independent nodes give 0.
pub fn max_dependency_depth<N: DagNode>(nodes: &[N]) -> Result<usize, DagError> {
    Ok(execution_waves(nodes)?.len().saturating_sub(1))
}

/// Flattened wave order.
pub fn execution_order<N: DagNode>(nodes: &[N]) -> Result<Vec<&N>, DagError> {
    Ok(execution_waves(nodes)?.into_iter().flatten().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Node {
        id: String,
        deps: Vec<String>,
    }

    impl DagNode for Node {
        fn node_id(&self) -> &str {
            &self.id
        }

        fn dependencies(&self) -> &[String] {
            &self.deps
        }
    }

    fn node(id: &str, deps: Vec<&str>) -> Node {
        Node {
            id: id.to_string(),
            deps: deps.into_iter().map(String::from).collect(),
        }
    }

    fn ids<'a>(wave: &[&'a Node]) -> Vec<&'a str> {
        wave.iter().map(|n| n.id.as_str()).collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_validate_accepts_diamond() {
        let nodes = vec![
            node("a", vec![]),
            node("b", vec!["a"]),
            node("c", vec!["a"]),
            node("d", vec!["b", "c"]),
        ];
        assert!(validate_dag(&nodes).is_ok());
    }

    #[test]
    fn test_validate_reports_dangling_reference() {
        let nodes = vec![node("a", vec![]), node("b", vec!["a"]), node("c", vec!["x"])];
        assert_eq!(
            validate_dag(&nodes).unwrap_err(),
            DagError::UnknownDependency {
                step_id: "c".to_string(),
                missing_id: "x".to_string()
            }
        );
    }

    #[test]
    fn test_validate_reports_duplicate() {
        let nodes = vec![node("a", vec![]), node("a", vec![])];
        assert_eq!(
            validate_dag(&nodes).unwrap_err(),
            DagError::DuplicateNode("a".to_string())
        );
    }

    #[test]
    fn test_three_node_cycle() {
        let nodes = vec![node("a", vec!["c"]), node("b", vec!["a"]), node("c", vec!["b"])];
        let err = validate_dag(&nodes).unwrap_err();
        assert!(matches!(err, DagError::CyclicDependency { .. }));
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let nodes = vec![node("a", vec!["a"])];
        assert_eq!(
            detect_cycle(&nodes).unwrap_err(),
            DagError::CyclicDependency {
                step_id: "a".to_string()
            }
        );
    }

    #[test]
    fn test_cycle_reports_revisited_node() {
        // a -> b -> c -> b : walking from a, b is revisited while in progress
        let nodes = vec![node("a", vec!["b"]), node("b", vec!["c"]), node("c", vec!["b"])];
        assert_eq!(
            detect_cycle(&nodes).unwrap_err(),
            DagError::CyclicDependency {
                step_id: "b".to_string()
            }
        );
    }

    #[test]
    fn test_shared_dependency_is_not_a_cycle() {
        // Done nodes reached twice must not be mistaken for a cycle.
        let nodes = vec![
            node("root", vec![]),
            node("left", vec!["root"]),
            node("right", vec!["root"]),
            node("join", vec!["left", "right", "root"]),
        ];
        assert!(detect_cycle(&nodes).is_ok());
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let mut nodes = vec![node("n0", vec![])];
        for i in 1..20_000 {
            nodes.push(Node {
                id: format!("n{i}"),
                deps: vec![format!("n{}", i - 1)],
            });
        }
        assert!(validate_dag(&nodes).is_ok());
    }

    // -----------------------------------------------------------------------
    // Waves
    // -----------------------------------------------------------------------

    #[test]
    fn test_no_dependencies_single_wave() {
        let nodes = vec![node("a", vec![]), node("b", vec![]), node("c", vec![])];
        let waves = execution_waves(&nodes).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(ids(&waves[0]), vec!["a", "b", "c"]);
        assert_eq!(max_dependency_depth(&nodes).unwrap(), 0);
    }

    #[test]
    fn test_linear_chain_n_waves() {
        let nodes = vec![node("a", vec![]), node("b", vec!["a"]), node("c", vec!["b"])];
        let waves = execution_waves(&nodes).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(max_dependency_depth(&nodes).unwrap(), 2);
    }

    #[test]
    fn test_order_respects_dependencies_not_declaration() {
        // Declared consumer-first; order must still put producers first.
        let nodes = vec![node("report", vec!["fetch"]), node("fetch", vec![])];
        let order: Vec<&str> = execution_order(&nodes)
            .unwrap()
            .into_iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, vec!["fetch", "report"]);
    }

    #[test]
    fn test_complex_fork_join() {
        let nodes = vec![
            node("a", vec![]),
            node("b", vec!["a"]),
            node("c", vec!["a"]),
            node("d", vec!["b"]),
            node("e", vec!["c"]),
            node("f", vec!["d", "e"]),
        ];
        let waves = execution_waves(&nodes).unwrap();
        assert_eq!(waves.len(), 4);
        assert_eq!(ids(&waves[1]), vec!["b", "c"]);
        assert_eq!(ids(&waves[2]), vec!["d", "e"]);
        assert_eq!(ids(&waves[3]), vec!["f"]);
    }

    #[test]
    fn test_waves_reject_cycle() {
        let nodes = vec![node("a", vec!["b"]), node("b", vec!["a"])];
        assert!(matches!(
            execution_waves(&nodes).unwrap_err(),
            DagError::CyclicDependency { .. }
        ));
    }

    #[test]
    fn test_empty_nodes() {
        let nodes: Vec<Node> = vec![];
        assert!(execution_waves(&nodes).unwrap().is_empty());
        assert_eq!(max_dependency_depth(&nodes).unwrap(), 0);
    }
}
