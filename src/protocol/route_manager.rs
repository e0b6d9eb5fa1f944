use log::trace;
use super::neighbor::{NeighborAdvertisementStore, NeighborDirectory};
use super::routing_table::{RoutingEntry, RoutingTable};

/// One Bellman-Ford step. Builds a fresh table from the direct links and the
/// stored neighbor vectors; `current` is only consulted for the split-horizon
/// check.
///
/// Candidates only replace an entry when strictly cheaper, so among equal
/// costs the first neighbor in store order keeps the route.
pub fn compute_routes(
    current: &RoutingTable,
    neighbors: &NeighborDirectory,
    advertisements: &NeighborAdvertisementStore,
) -> RoutingTable {
    let owner = current.owner();
    let mut table = RoutingTable::new(owner.to_string());

    for (neighbor, link) in neighbors.iter() {
        if link.cost.is_unreachable() {
            continue;
        }
        table.add_route(neighbor.clone(), RoutingEntry::via(link.cost, link.port));
    }

    for (neighbor, vector) in advertisements.iter() {
        let Some(link) = neighbors.get_neighbor(neighbor) else {
            continue;
        };

        for (destination, &advertised) in vector {
            if destination == owner {
                continue;
            }

            // Poisoned reflection of a route we already send through this
            // neighbor: it says nothing new.
            if advertised.is_unreachable()
                && current.next_hop(destination) == Some(link.port)
            {
                trace!("{}: ignoring poisoned {} from {}", owner, destination, neighbor);
                continue;
            }

            let candidate = link.cost + advertised;
            if candidate.is_unreachable() {
                continue;
            }

            let better = match table.get_route(destination) {
                Some(existing) => candidate < existing.cost,
                None => true,
            };
            if better {
                trace!("{}: {} via {} costs {}", owner, destination, neighbor, candidate);
                table.add_route(destination.clone(), RoutingEntry::via(candidate, link.port));
            }
        }
    }

    table
}
