use std::collections::BTreeMap;
use crate::Millis;
use crate::protocol::{NodeId, PortId};

/// Where a local port leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub peer: NodeId,
    pub peer_port: PortId,
    pub cost: u64,
    pub latency: Millis,
}

/// Ports of one node. Numbers are handed out once and never reused, so a
/// packet still in flight on a torn-down link cannot land on a new one.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    last_allocated: PortId,
    bindings: BTreeMap<PortId, PortBinding>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> PortId {
        self.last_allocated += 1;
        self.last_allocated
    }

    pub fn bind(&mut self, port: PortId, binding: PortBinding) {
        self.bindings.insert(port, binding);
    }

    pub fn unbind(&mut self, port: PortId) -> Option<PortBinding> {
        self.bindings.remove(&port)
    }

    pub fn get(&self, port: PortId) -> Option<&PortBinding> {
        self.bindings.get(&port)
    }

    pub fn port_to(&self, peer: &str) -> Option<PortId> {
        self.bindings
            .iter()
            .find(|(_, binding)| binding.peer == peer)
            .map(|(port, _)| *port)
    }

    pub fn ports(&self) -> Vec<PortId> {
        self.bindings.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(peer: &str) -> PortBinding {
        PortBinding {
            peer: peer.to_string(),
            peer_port: 1,
            cost: 1,
            latency: 0,
        }
    }

    #[test]
    fn test_ports_are_never_reused() {
        let mut table = PortTable::new();
        let first = table.allocate();
        table.bind(first, binding("B"));
        table.unbind(first);
        let second = table.allocate();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert!(table.get(first).is_none());
    }

    #[test]
    fn test_port_to_peer() {
        let mut table = PortTable::new();
        let port = table.allocate();
        table.bind(port, binding("C"));
        assert_eq!(table.port_to("C"), Some(port));
        assert_eq!(table.port_to("D"), None);
        assert_eq!(table.ports(), vec![port]);
    }
}
