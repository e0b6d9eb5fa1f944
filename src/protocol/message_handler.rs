use super::messages::AdvertisedVector;
use super::routing_table::RoutingTable;
use super::types::{Cost, PortId};

/// The vector to send out of `port`. Routes whose next hop is `port` are
/// poisoned so the neighbor there never learns a path that runs back
/// through itself.
pub fn build_advertisement(table: &RoutingTable, port: PortId) -> AdvertisedVector {
    table
        .iter()
        .map(|(destination, entry)| {
            let cost = if entry.next_hop == Some(port) && destination != table.owner() {
                Cost::Unreachable
            } else {
                entry.cost
            };
            (destination.clone(), cost)
        })
        .collect()
}
