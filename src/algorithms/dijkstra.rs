use std::collections::{BTreeMap, BinaryHeap};
use std::cmp::Ordering;
use crate::protocol::NodeId;

/// Undirected weighted edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub a: NodeId,
    pub b: NodeId,
    pub cost: u64,
}

#[derive(Debug, PartialEq, Eq)]
struct State {
    cost: u64,
    node: NodeId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other.cost.cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest path cost from `source` to every node it can reach, itself
/// included at cost 0.
pub fn shortest_costs(edges: &[Edge], source: &str) -> BTreeMap<NodeId, u64> {
    let mut adjacency: BTreeMap<&str, Vec<(&str, u64)>> = BTreeMap::new();
    for edge in edges {
        adjacency.entry(edge.a.as_str()).or_default().push((edge.b.as_str(), edge.cost));
        adjacency.entry(edge.b.as_str()).or_default().push((edge.a.as_str(), edge.cost));
    }

    let mut distances: BTreeMap<NodeId, u64> = BTreeMap::new();
    let mut heap = BinaryHeap::new();

    distances.insert(source.to_string(), 0);
    heap.push(State {
        cost: 0,
        node: source.to_string(),
    });

    while let Some(State { cost, node }) = heap.pop() {
        // Skip if we've already found a better path
        if cost > *distances.get(&node).unwrap_or(&u64::MAX) {
            continue;
        }

        let Some(links) = adjacency.get(node.as_str()) else {
            continue;
        };
        for &(neighbor, link_cost) in links {
            let new_cost = cost.saturating_add(link_cost);
            if new_cost < *distances.get(neighbor).unwrap_or(&u64::MAX) {
                distances.insert(neighbor.to_string(), new_cost);
                heap.push(State {
                    cost: new_cost,
                    node: neighbor.to_string(),
                });
            }
        }
    }

    distances
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &str, b: &str, cost: u64) -> Edge {
        Edge {
            a: a.to_string(),
            b: b.to_string(),
            cost,
        }
    }

    #[test]
    fn test_prefers_cheaper_multi_hop_path() {
        let edges = vec![edge("A", "B", 1), edge("B", "C", 1), edge("A", "C", 5)];
        let costs = shortest_costs(&edges, "A");
        assert_eq!(costs["A"], 0);
        assert_eq!(costs["B"], 1);
        assert_eq!(costs["C"], 2);
    }

    #[test]
    fn test_unreachable_nodes_are_absent() {
        let edges = vec![edge("A", "B", 1), edge("C", "D", 1)];
        let costs = shortest_costs(&edges, "A");
        assert_eq!(costs.len(), 2);
        assert!(!costs.contains_key("C"));
    }

    #[test]
    fn test_isolated_source() {
        let costs = shortest_costs(&[], "A");
        assert_eq!(costs.len(), 1);
        assert_eq!(costs["A"], 0);
    }
}
