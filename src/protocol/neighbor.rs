use std::collections::BTreeMap;
use super::messages::AdvertisedVector;
use super::types::{Cost, NodeId, PortId};

/// A directly connected neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborLink {
    pub cost: Cost,
    pub port: PortId,
}

/// Live neighbors, keyed by their id. Entries appear on link-up and leave on
/// the matching link-down.
#[derive(Debug, Clone, Default)]
pub struct NeighborDirectory {
    neighbors: BTreeMap<NodeId, NeighborLink>,
}

impl NeighborDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_neighbor(&mut self, endpoint: NodeId, link: NeighborLink) -> Option<NeighborLink> {
        self.neighbors.insert(endpoint, link)
    }

    pub fn get_neighbor(&self, endpoint: &str) -> Option<&NeighborLink> {
        self.neighbors.get(endpoint)
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.neighbors.contains_key(endpoint)
    }

    /// First neighbor (in id order) sitting on `port`. Hosts are expected to
    /// bind at most one neighbor per port; a linear scan is fine at the fan-out
    /// a single router sees.
    pub fn find_by_port(&self, port: PortId) -> Option<&NodeId> {
        self.neighbors
            .iter()
            .find(|(_, link)| link.port == port)
            .map(|(id, _)| id)
    }

    pub fn remove_neighbor(&mut self, endpoint: &str) -> Option<NeighborLink> {
        self.neighbors.remove(endpoint)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NeighborLink)> {
        self.neighbors.iter()
    }
}

/// Latest vector heard from each neighbor, iterated in the order the
/// neighbors were first stored. That order decides ties during recompute.
#[derive(Debug, Clone, Default)]
pub struct NeighborAdvertisementStore {
    vectors: Vec<(NodeId, AdvertisedVector)>,
}

impl NeighborAdvertisementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, neighbor: &str) -> Option<&AdvertisedVector> {
        self.vectors
            .iter()
            .find(|(id, _)| id == neighbor)
            .map(|(_, vector)| vector)
    }

    /// Creates an empty vector for `neighbor` unless one is already stored.
    pub fn ensure(&mut self, neighbor: &str) {
        if self.get(neighbor).is_none() {
            self.vectors.push((neighbor.to_string(), AdvertisedVector::new()));
        }
    }

    /// Stores `vector` for `neighbor`, keeping its original position.
    /// Returns false when the stored vector was already identical.
    pub fn update(&mut self, neighbor: &str, vector: AdvertisedVector) -> bool {
        match self.vectors.iter_mut().find(|(id, _)| id == neighbor) {
            Some((_, stored)) if *stored == vector => false,
            Some((_, stored)) => {
                *stored = vector;
                true
            }
            None => {
                self.vectors.push((neighbor.to_string(), vector));
                true
            }
        }
    }

    pub fn remove(&mut self, neighbor: &str) -> Option<AdvertisedVector> {
        let index = self.vectors.iter().position(|(id, _)| id == neighbor)?;
        Some(self.vectors.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &AdvertisedVector)> {
        self.vectors.iter().map(|(id, vector)| (id, vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(pairs: &[(&str, u64)]) -> AdvertisedVector {
        pairs
            .iter()
            .map(|(id, cost)| (id.to_string(), Cost::from_raw(*cost)))
            .collect()
    }

    #[test]
    fn test_find_by_port() {
        let mut directory = NeighborDirectory::new();
        directory.add_neighbor("B".to_string(), NeighborLink { cost: Cost::Finite(5), port: 1 });
        directory.add_neighbor("C".to_string(), NeighborLink { cost: Cost::Finite(2), port: 2 });

        assert_eq!(directory.find_by_port(2).map(String::as_str), Some("C"));
        assert_eq!(directory.find_by_port(9), None);
    }

    #[test]
    fn test_find_by_port_takes_first_in_id_order() {
        let mut directory = NeighborDirectory::new();
        directory.add_neighbor("Z".to_string(), NeighborLink { cost: Cost::Finite(1), port: 4 });
        directory.add_neighbor("M".to_string(), NeighborLink { cost: Cost::Finite(1), port: 4 });
        assert_eq!(directory.find_by_port(4).map(String::as_str), Some("M"));
    }

    #[test]
    fn test_store_keeps_insertion_order() {
        let mut store = NeighborAdvertisementStore::new();
        store.ensure("C");
        store.ensure("B");
        store.update("C", vector(&[("D", 1)]));
        store.update("A", vector(&[("D", 1)]));

        let order: Vec<&str> = store.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_ensure_does_not_clobber() {
        let mut store = NeighborAdvertisementStore::new();
        store.update("B", vector(&[("C", 2)]));
        store.ensure("B");
        assert_eq!(store.get("B"), Some(&vector(&[("C", 2)])));
    }

    #[test]
    fn test_update_reports_duplicates() {
        let mut store = NeighborAdvertisementStore::new();
        assert!(store.update("B", vector(&[("C", 2)])));
        assert!(!store.update("B", vector(&[("C", 2)])));
        assert!(store.update("B", vector(&[("C", 3)])));
    }

    #[test]
    fn test_remove() {
        let mut store = NeighborAdvertisementStore::new();
        store.ensure("B");
        assert!(store.remove("B").is_some());
        assert!(store.remove("B").is_none());
        assert!(store.is_empty());
    }
}
