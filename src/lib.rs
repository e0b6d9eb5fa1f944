pub mod protocol;
pub mod network;
pub mod algorithms;
pub mod config;

pub use protocol::{
    Cost, DistanceVectorNode, NodeId, NodeStats, Packet, Payload, PortId, RoutingEntry,
    RoutingTable, Transport,
};

/// Milliseconds in whatever clock the host drives the nodes with.
pub type Millis = u64;
