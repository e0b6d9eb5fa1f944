use std::collections::BTreeMap;
use std::fmt;
use super::types::{Cost, NodeId, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    pub cost: Cost,
    pub next_hop: Option<PortId>,
}

impl RoutingEntry {
    pub fn local() -> Self {
        Self {
            cost: Cost::ZERO,
            next_hop: None,
        }
    }

    pub fn via(cost: Cost, port: PortId) -> Self {
        Self {
            cost,
            next_hop: Some(port),
        }
    }
}

/// Best known route per destination. Equality is structural, which is what
/// change detection after a recompute relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    owner: NodeId,
    entries: BTreeMap<NodeId, RoutingEntry>,
}

impl RoutingTable {
    /// A table holding only the owner's own zero-cost entry.
    pub fn new(owner: NodeId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(owner.clone(), RoutingEntry::local());
        Self { owner, entries }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Inserts or replaces a route. The owner's entry is pinned and never
    /// overwritten.
    pub fn add_route(&mut self, destination: NodeId, entry: RoutingEntry) {
        if destination == self.owner {
            return;
        }
        self.entries.insert(destination, entry);
    }

    pub fn get_route(&self, destination: &str) -> Option<&RoutingEntry> {
        self.entries.get(destination)
    }

    pub fn next_hop(&self, destination: &str) -> Option<PortId> {
        self.entries.get(destination).and_then(|entry| entry.next_hop)
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.entries.contains_key(destination)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &RoutingEntry)> {
        self.entries.iter()
    }

    /// Destination -> cost view, the shape compared against reference
    /// shortest paths.
    pub fn costs(&self) -> BTreeMap<NodeId, Cost> {
        self.entries
            .iter()
            .map(|(destination, entry)| (destination.clone(), entry.cost))
            .collect()
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<12} {:>12} {:>8}", "destination", "cost", "port")?;
        for (destination, entry) in &self.entries {
            let port = match entry.next_hop {
                Some(port) => port.to_string(),
                None => "-".to_string(),
            };
            writeln!(f, "{:<12} {:>12} {:>8}", destination, entry.cost, port)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_holds_only_self() {
        let table = RoutingTable::new("A".to_string());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_route("A"), Some(&RoutingEntry::local()));
        assert_eq!(table.next_hop("A"), None);
    }

    #[test]
    fn test_self_entry_cannot_be_overwritten() {
        let mut table = RoutingTable::new("A".to_string());
        table.add_route("A".to_string(), RoutingEntry::via(Cost::Finite(3), 1));
        assert_eq!(table.get_route("A"), Some(&RoutingEntry::local()));
    }

    #[test]
    fn test_structural_equality() {
        let mut left = RoutingTable::new("A".to_string());
        let mut right = RoutingTable::new("A".to_string());
        left.add_route("B".to_string(), RoutingEntry::via(Cost::Finite(5), 1));
        right.add_route("B".to_string(), RoutingEntry::via(Cost::Finite(5), 1));
        assert_eq!(left, right);

        right.add_route("B".to_string(), RoutingEntry::via(Cost::Finite(5), 2));
        assert_ne!(left, right);
    }

    #[test]
    fn test_display_lists_every_destination() {
        let mut table = RoutingTable::new("A".to_string());
        table.add_route("B".to_string(), RoutingEntry::via(Cost::Finite(5), 1));
        let rendered = table.to_string();
        assert!(rendered.contains("destination"));
        assert_eq!(rendered.lines().count(), 3);
    }
}
