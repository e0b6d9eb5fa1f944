use std::collections::{BTreeMap, BTreeSet};
use crate::algorithms::dijkstra::{self, Edge};
use crate::protocol::{Cost, NodeId, RoutingTable};

/// The links that are currently up, as the host sees them.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: BTreeSet<NodeId>,
    links: BTreeMap<(NodeId, NodeId), u64>,
}

fn key(a: &str, b: &str) -> (NodeId, NodeId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: &str) {
        self.nodes.insert(id.to_string());
    }

    pub fn link_up(&mut self, a: &str, b: &str, cost: u64) {
        self.add_node(a);
        self.add_node(b);
        self.links.insert(key(a, b), cost);
    }

    pub fn link_down(&mut self, a: &str, b: &str) -> bool {
        self.links.remove(&key(a, b)).is_some()
    }

    pub fn is_linked(&self, a: &str, b: &str) -> bool {
        self.links.contains_key(&key(a, b))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.links
            .iter()
            .map(|((a, b), cost)| Edge {
                a: a.clone(),
                b: b.clone(),
                cost: *cost,
            })
            .collect()
    }

    /// True shortest-path costs from `source`.
    pub fn reference_costs(&self, source: &str) -> BTreeMap<NodeId, u64> {
        dijkstra::shortest_costs(&self.edges(), source)
    }

    /// Describes every way `tables` differ from the true shortest paths.
    /// Empty means converged.
    pub fn mismatches<'a>(
        &self,
        tables: impl IntoIterator<Item = (&'a NodeId, &'a RoutingTable)>,
    ) -> Vec<String> {
        let edges = self.edges();
        let mut problems = Vec::new();

        for (owner, table) in tables {
            let expected: BTreeMap<NodeId, Cost> = dijkstra::shortest_costs(&edges, owner)
                .into_iter()
                .map(|(destination, cost)| (destination, Cost::from_raw(cost)))
                .collect();
            let actual = table.costs();

            for (destination, cost) in &expected {
                match actual.get(destination) {
                    Some(found) if found == cost => {}
                    Some(found) => problems.push(format!(
                        "{}: {} costs {} but shortest path is {}",
                        owner, destination, found, cost
                    )),
                    None => problems.push(format!(
                        "{}: no route to reachable {} (shortest path {})",
                        owner, destination, cost
                    )),
                }
            }
            for destination in actual.keys() {
                if !expected.contains_key(destination) {
                    problems.push(format!("{}: stale route to unreachable {}", owner, destination));
                }
            }
        }

        problems
    }
}
