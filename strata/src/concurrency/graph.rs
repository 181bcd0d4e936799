use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use uuid::Uuid;

/// The waits-for graph: one directed edge per blocked lock request, from
/// the waiting transaction to a transaction it waits on. A multigraph; the
/// same pair may appear once per contended resource.
#[derive(Default)]
pub struct WaitsForGraph {
    edges: RwLock<Vec<(Uuid, Uuid)>>,
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&self, from: Uuid, to: Uuid) {
        self.edges.write().push((from, to));
    }

    /// Remove one matching copy of the edge, if present.
    pub fn remove_edge(&self, from: Uuid, to: Uuid) {
        let mut edges = self.edges.write();
        if let Some(position) = edges.iter().position(|&e| e == (from, to)) {
            edges.swap_remove(position);
        }
    }

    /// True iff any directed cycle exists. Colored depth-first search from
    /// every vertex; finished vertices are memoized so the walk stays
    /// linear in the number of edges.
    pub fn detect_cycle(&self) -> bool {
        let edges = self.edges.read();
        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for &(from, to) in edges.iter() {
            adjacency.entry(from).or_default().push(to);
        }
        let mut finished = HashSet::new();
        let mut on_path = HashSet::new();
        for &start in adjacency.keys() {
            if !finished.contains(&start)
                && dfs(start, &adjacency, &mut finished, &mut on_path)
            {
                return true;
            }
        }
        false
    }
}

fn dfs(
    vertex: Uuid,
    adjacency: &HashMap<Uuid, Vec<Uuid>>,
    finished: &mut HashSet<Uuid>,
    on_path: &mut HashSet<Uuid>,
) -> bool {
    on_path.insert(vertex);
    if let Some(next_vertices) = adjacency.get(&vertex) {
        for &next in next_vertices {
            if on_path.contains(&next) {
                return true;
            }
            if !finished.contains(&next) && dfs(next, adjacency, finished, on_path) {
                return true;
            }
        }
    }
    on_path.remove(&vertex);
    finished.insert(vertex);
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cycle_in_chain() {
        let graph = WaitsForGraph::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        graph.add_edge(a, b);
        graph.add_edge(b, c);
        assert!(!graph.detect_cycle());
    }

    #[test]
    fn test_two_cycle_detected() {
        let graph = WaitsForGraph::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        graph.add_edge(a, b);
        graph.add_edge(b, a);
        assert!(graph.detect_cycle());
    }

    #[test]
    fn test_long_cycle_detected_and_broken() {
        let graph = WaitsForGraph::new();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for window in ids.windows(2) {
            graph.add_edge(window[0], window[1]);
        }
        graph.add_edge(ids[4], ids[0]);
        assert!(graph.detect_cycle());
        graph.remove_edge(ids[4], ids[0]);
        assert!(!graph.detect_cycle());
    }

    #[test]
    fn test_multigraph_removes_one_copy_at_a_time() {
        let graph = WaitsForGraph::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        graph.add_edge(a, b);
        graph.add_edge(a, b);
        graph.add_edge(b, a);
        assert!(graph.detect_cycle());
        graph.remove_edge(a, b);
        // One copy remains; the cycle is still there.
        assert!(graph.detect_cycle());
        graph.remove_edge(a, b);
        assert!(!graph.detect_cycle());
    }
}
