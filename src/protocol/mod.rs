pub mod messages;
pub mod message_handler;
pub mod neighbor;
pub mod route_manager;
pub mod routing_table;
pub mod task_manager;
pub mod types;

pub use messages::*;
pub use neighbor::*;
pub use routing_table::*;
pub use types::*;

use crate::Millis;
use log::{debug, info, trace};
use std::fmt;
use task_manager::Heartbeat;

/// What a node needs from whoever hosts it.
pub trait Transport {
    /// Ports that currently have a live link.
    fn outgoing_ports(&self) -> Vec<PortId>;

    /// Fire-and-forget delivery out of `port`.
    fn send(&mut self, port: PortId, packet: Packet);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub recomputes: u64,
    pub table_changes: u64,
    pub broadcasts: u64,
    pub advertisements_sent: u64,
    pub duplicates_suppressed: u64,
    pub packets_forwarded: u64,
    pub packets_dropped: u64,
}

/// Node-local state of the distance-vector protocol. All mutation happens
/// inside the `handle_*` entry points, one event at a time.
#[derive(Debug, Clone)]
pub struct DistanceVectorNode {
    id: NodeId,
    routing_table: RoutingTable,
    neighbors: NeighborDirectory,
    advertisements: NeighborAdvertisementStore,
    heartbeat: Heartbeat,
    stats: NodeStats,
}

impl DistanceVectorNode {
    pub fn new(id: NodeId, heartbeat_interval: Millis) -> Self {
        Self {
            routing_table: RoutingTable::new(id.clone()),
            id,
            neighbors: NeighborDirectory::new(),
            advertisements: NeighborAdvertisementStore::new(),
            heartbeat: Heartbeat::new(heartbeat_interval),
            stats: NodeStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn neighbors(&self) -> &NeighborDirectory {
        &self.neighbors
    }

    pub fn advertisements(&self) -> &NeighborAdvertisementStore {
        &self.advertisements
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn heartbeat_interval(&self) -> Millis {
        self.heartbeat.interval()
    }

    pub fn handle_inbound_packet(&mut self, transport: &mut dyn Transport, port: PortId, packet: Packet) {
        if !packet.is_advertisement() {
            self.forward(transport, packet);
            return;
        }

        let sender = packet.source;
        let Payload::Advertisement(vector) = packet.payload else {
            return;
        };
        if !self.neighbors.contains(&sender) {
            debug!("{}: advertisement on port {} from non-neighbor {}, ignoring", self.id, port, sender);
            return;
        }
        if !self.advertisements.update(&sender, vector) {
            trace!("{}: duplicate vector from {}", self.id, sender);
            self.stats.duplicates_suppressed += 1;
            return;
        }
        if self.recompute() {
            self.broadcast(transport);
        }
    }

    pub fn handle_link_up(&mut self, transport: &mut dyn Transport, port: PortId, endpoint: NodeId, cost: Cost) {
        info!("{}: link up to {} on port {} (cost {})", self.id, endpoint, port, cost);
        self.advertisements.ensure(&endpoint);
        self.neighbors.add_neighbor(endpoint, NeighborLink { cost, port });

        if self.recompute() {
            self.broadcast(transport);
        }
    }

    pub fn handle_link_down(&mut self, transport: &mut dyn Transport, port: PortId) {
        let departed = self.neighbors.find_by_port(port).cloned();
        match departed {
            Some(neighbor) => {
                info!("{}: link down to {} on port {}", self.id, neighbor, port);
                self.neighbors.remove_neighbor(&neighbor);
                self.advertisements.remove(&neighbor);
            }
            None => debug!("{}: link down on unknown port {}", self.id, port),
        }

        if self.recompute() {
            self.broadcast(transport);
        }
    }

    /// Re-broadcasts the full table every heartbeat interval, changed or not.
    pub fn handle_clock_tick(&mut self, transport: &mut dyn Transport, now: Millis) {
        if self.heartbeat.poll(now) {
            trace!("{}: heartbeat at {}", self.id, now);
            self.broadcast(transport);
        }
    }

    fn forward(&mut self, transport: &mut dyn Transport, packet: Packet) {
        let next_hop = packet
            .destination
            .as_deref()
            .and_then(|destination| self.routing_table.next_hop(destination));

        match next_hop {
            Some(port) => {
                self.stats.packets_forwarded += 1;
                transport.send(port, packet);
            }
            None => {
                trace!("{}: no route for {:?}, dropping", self.id, packet.destination);
                self.stats.packets_dropped += 1;
            }
        }
    }

    /// Rebuilds the table; true when it differs from the previous one.
    fn recompute(&mut self) -> bool {
        self.stats.recomputes += 1;
        let table = route_manager::compute_routes(&self.routing_table, &self.neighbors, &self.advertisements);
        if table == self.routing_table {
            return false;
        }

        debug!("{}: routing table changed ({} destinations)", self.id, table.len());
        self.routing_table = table;
        self.stats.table_changes += 1;
        true
    }

    fn broadcast(&mut self, transport: &mut dyn Transport) {
        self.stats.broadcasts += 1;
        for port in transport.outgoing_ports() {
            let vector = message_handler::build_advertisement(&self.routing_table, port);
            transport.send(port, Packet::advertisement(self.id.clone(), vector));
            self.stats.advertisements_sent += 1;
        }
    }
}

impl fmt::Display for DistanceVectorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "node {} ({} neighbors)", self.id, self.neighbors.len())?;
        for (neighbor, link) in self.neighbors.iter() {
            writeln!(f, "  neighbor {} port {} cost {}", neighbor, link.port, link.cost)?;
        }
        write!(f, "{}", self.routing_table)
    }
}
