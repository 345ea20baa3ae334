//! Dependency-graph helpers for stage DAGs, workflow chains and document graphs.
//!
//! Graphs are `node -> dependencies` maps; insertion order is the tie-break
//! order for ready nodes and the root order for cycle searches. Dependencies
//! naming unknown nodes are ignored here and reported by the callers.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Kahn's algorithm. Returns nodes in dependency order, or the nodes that
/// could not be ordered when the graph has a cycle.
pub(crate) fn topological_order<N: Eq + Hash + Clone>(graph: &IndexMap<N, Vec<N>>) -> Result<Vec<N>, Vec<N>> {
    let mut in_degree = vec![0usize; graph.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); graph.len()];
    for (i, deps) in graph.values().enumerate() {
        for dep in deps {
            if let Some(j) = graph.get_index_of(dep) {
                in_degree[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..graph.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(graph.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    let node = |i: usize| graph.get_index(i).map(|(n, _)| n.clone());
    if order.len() != graph.len() {
        return Err((0..graph.len()).filter(|&i| in_degree[i] > 0).filter_map(node).collect());
    }
    Ok(order.into_iter().filter_map(node).collect())
}

/// Visiting/visited DFS from each unvisited root in order.
///
/// Each cycle is reported as the path from the re-entered node back to
/// itself (`[a, b, a]`). At most one cycle is reported per root; with
/// `first_only` the search stops at the first one.
pub(crate) fn find_cycles<N: Eq + Hash + Clone>(graph: &IndexMap<N, Vec<N>>, first_only: bool) -> Vec<Vec<N>> {
    let mut marks: HashMap<&N, Mark> = HashMap::new();
    let mut cycles = Vec::new();

    for root in graph.keys() {
        if marks.contains_key(root) {
            continue;
        }
        let mut stack = Vec::new();
        if let Some(cycle) = visit(root, graph, &mut marks, &mut stack) {
            for node in stack {
                marks.insert(node, Mark::Visited);
            }
            cycles.push(cycle);
            if first_only {
                break;
            }
        }
    }
    cycles
}

fn visit<'a, N: Eq + Hash + Clone>(
    node: &'a N,
    graph: &'a IndexMap<N, Vec<N>>,
    marks: &mut HashMap<&'a N, Mark>,
    stack: &mut Vec<&'a N>,
) -> Option<Vec<N>> {
    match marks.get(node) {
        Some(Mark::Visited) => return None,
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<N> = stack[start..].iter().map(|n| (*n).clone()).collect();
            cycle.push(node.clone());
            return Some(cycle);
        }
        None => {}
    }

    marks.insert(node, Mark::Visiting);
    stack.push(node);
    for dep in graph.get(node).into_iter().flatten() {
        let Some((key, _)) = graph.get_key_value(dep) else {
            continue;
        };
        if let Some(cycle) = visit(key, graph, marks, stack) {
            return Some(cycle);
        }
    }
    stack.pop();
    marks.insert(node, Mark::Visited);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&'static str, &[&'static str])]) -> IndexMap<&'static str, Vec<&'static str>> {
        edges.iter().map(|(n, deps)| (*n, deps.to_vec())).collect()
    }

    #[test]
    fn order_respects_dependencies_and_declaration_ties() {
        let g = graph(&[("c", &["a"]), ("a", &[]), ("b", &[]), ("d", &["c", "b"])]);
        // c becomes ready after a and precedes b by declaration order
        assert_eq!(topological_order(&g).unwrap(), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn order_reports_cyclic_nodes() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let mut stuck = topological_order(&g).unwrap_err();
        stuck.sort();
        assert_eq!(stuck, vec!["a", "b"]);
    }

    #[test]
    fn unknown_dependencies_are_ignored() {
        let g = graph(&[("a", &["ghost"])]);
        assert_eq!(topological_order(&g).unwrap(), vec!["a"]);
        assert!(find_cycles(&g, false).is_empty());
    }

    #[test]
    fn finds_one_cycle_with_path() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let cycles = find_cycles(&g, true);
        assert_eq!(cycles, vec![vec!["a", "b", "c", "a"]]);
    }

    #[test]
    fn one_cycle_per_root() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("x", &["y"]), ("y", &["x"]), ("z", &["a"])]);
        assert_eq!(find_cycles(&g, false).len(), 2);
        assert_eq!(find_cycles(&g, true).len(), 1);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        assert_eq!(find_cycles(&g, true), vec![vec!["a", "a"]]);
    }
}
