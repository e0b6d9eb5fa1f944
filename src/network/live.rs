use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until};
use crate::Millis;
use crate::config::{LinkAction, SimulationConfig};
use crate::protocol::{Cost, DistanceVectorNode, NodeId, NodeStats, Packet, PortId, RoutingTable, Transport};
use super::interface::{PortBinding, PortTable};
use super::topology::Topology;

/// What a node task can be told to do.
#[derive(Debug)]
pub enum NodeCommand {
    Frame { port: PortId, bytes: Vec<u8> },
    LinkUp { port: PortId, endpoint: NodeId, cost: u64, peer: PeerLink },
    LinkDown { port: PortId },
    Snapshot(oneshot::Sender<NodeSnapshot>),
    Shutdown,
}

/// The far side of a port: the peer's inbox and the port number it knows the
/// link by.
#[derive(Debug, Clone)]
pub struct PeerLink {
    sender: mpsc::UnboundedSender<NodeCommand>,
    port: PortId,
    latency: Duration,
}

#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub table: RoutingTable,
    pub stats: NodeStats,
}

/// Sends encoded packets straight into peer inboxes.
#[derive(Default)]
struct ChannelTransport {
    peers: BTreeMap<PortId, PeerLink>,
}

impl Transport for ChannelTransport {
    fn outgoing_ports(&self) -> Vec<PortId> {
        self.peers.keys().copied().collect()
    }

    fn send(&mut self, port: PortId, packet: Packet) {
        let Some(peer) = self.peers.get(&port) else {
            return;
        };
        let bytes = match packet.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode packet for port {}: {}", port, e);
                return;
            }
        };

        let frame = NodeCommand::Frame { port: peer.port, bytes };
        if peer.latency.is_zero() {
            let _ = peer.sender.send(frame);
        } else {
            let sender = peer.sender.clone();
            let latency = peer.latency;
            tokio::spawn(async move {
                sleep(latency).await;
                let _ = sender.send(frame);
            });
        }
    }
}

async fn node_task(
    mut node: DistanceVectorNode,
    mut inbox: mpsc::UnboundedReceiver<NodeCommand>,
    tick: Duration,
    started: Instant,
) {
    let mut transport = ChannelTransport::default();
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = inbox.recv() => match command {
                Some(NodeCommand::Frame { port, bytes }) => {
                    if !transport.peers.contains_key(&port) {
                        debug!("{}: frame on closed port {}", node.id(), port);
                    } else {
                        match Packet::deserialize(&bytes) {
                            Ok(packet) => node.handle_inbound_packet(&mut transport, port, packet),
                            Err(e) => warn!("{}: undecodable frame on port {}: {}", node.id(), port, e),
                        }
                    }
                }
                Some(NodeCommand::LinkUp { port, endpoint, cost, peer }) => {
                    transport.peers.insert(port, peer);
                    node.handle_link_up(&mut transport, port, endpoint, Cost::from_raw(cost));
                }
                Some(NodeCommand::LinkDown { port }) => {
                    transport.peers.remove(&port);
                    node.handle_link_down(&mut transport, port);
                }
                Some(NodeCommand::Snapshot(reply)) => {
                    let _ = reply.send(NodeSnapshot {
                        table: node.routing_table().clone(),
                        stats: node.stats().clone(),
                    });
                }
                Some(NodeCommand::Shutdown) | None => break,
            },
            _ = ticker.tick() => {
                let now = started.elapsed().as_millis() as Millis;
                node.handle_clock_tick(&mut transport, now);
            }
        }
    }

    debug!("{}: task stopped", node.id());
}

struct NodeHandle {
    sender: mpsc::UnboundedSender<NodeCommand>,
    ports: PortTable,
    task: JoinHandle<()>,
}

/// Every node runs in its own task and owns its state; the only thing that
/// crosses between tasks is encoded packets.
pub struct LiveNetwork {
    heartbeat_interval: Millis,
    tick: Duration,
    default_latency: Millis,
    started: Instant,
    nodes: BTreeMap<NodeId, NodeHandle>,
    topology: Topology,
}

impl LiveNetwork {
    /// Must be called from within a tokio runtime.
    pub fn new(heartbeat_interval: Millis, tick_interval: Millis, default_latency: Millis) -> Self {
        Self {
            heartbeat_interval,
            tick: Duration::from_millis(tick_interval.max(1)),
            default_latency,
            started: Instant::now(),
            nodes: BTreeMap::new(),
            topology: Topology::new(),
        }
    }

    pub fn start(config: &SimulationConfig) -> Result<Self> {
        let mut network = Self::new(config.heartbeat_interval, config.tick_interval, config.default_latency);
        for id in &config.nodes {
            network.add_node(id);
        }
        for link in &config.links {
            network.link_up(&link.a, &link.b, link.cost, link.latency)?;
        }
        Ok(network)
    }

    /// Starts the network, replays the configured link events at their
    /// offsets and returns the tables once `config.duration` has elapsed.
    pub async fn run(config: &SimulationConfig) -> Result<(BTreeMap<NodeId, NodeSnapshot>, Topology)> {
        let mut network = Self::start(config)?;

        let mut events: Vec<_> = config.events.iter().collect();
        events.sort_by_key(|event| event.time);
        for event in events {
            sleep_until(network.started + Duration::from_millis(event.time)).await;
            match event.action {
                LinkAction::Up => {
                    network.link_up(&event.a, &event.b, event.cost.unwrap_or(1), event.latency)?
                }
                LinkAction::Down => network.link_down(&event.a, &event.b)?,
            }
        }

        sleep_until(network.started + Duration::from_millis(config.duration)).await;
        let snapshots = network.snapshot().await?;
        let topology = network.topology.clone();
        network.shutdown().await;
        Ok((snapshots, topology))
    }

    pub fn add_node(&mut self, id: &str) {
        if self.nodes.contains_key(id) {
            return;
        }
        let (sender, inbox) = mpsc::unbounded_channel();
        let node = DistanceVectorNode::new(id.to_string(), self.heartbeat_interval);
        let task = tokio::spawn(node_task(node, inbox, self.tick, self.started));

        self.topology.add_node(id);
        self.nodes.insert(
            id.to_string(),
            NodeHandle {
                sender,
                ports: PortTable::new(),
                task,
            },
        );
        debug!("Spawned node {}", id);
    }

    pub fn link_up(&mut self, a: &str, b: &str, cost: u64, latency: Option<Millis>) -> Result<()> {
        if a == b {
            bail!("cannot link {} to itself", a);
        }
        let latency = Duration::from_millis(latency.unwrap_or(self.default_latency));
        let port_a = self.handle_mut(a)?.ports.allocate();
        let port_b = self.handle_mut(b)?.ports.allocate();

        for (local, local_port, peer, peer_port) in [(a, port_a, b, port_b), (b, port_b, a, port_a)] {
            let peer_sender = self.handle_mut(peer)?.sender.clone();
            let handle = self.handle_mut(local)?;
            handle.ports.bind(
                local_port,
                PortBinding {
                    peer: peer.to_string(),
                    peer_port,
                    cost,
                    latency: latency.as_millis() as Millis,
                },
            );
            handle
                .sender
                .send(NodeCommand::LinkUp {
                    port: local_port,
                    endpoint: peer.to_string(),
                    cost,
                    peer: PeerLink {
                        sender: peer_sender,
                        port: peer_port,
                        latency,
                    },
                })
                .map_err(|_| anyhow!("node {} has stopped", local))?;
        }

        self.topology.link_up(a, b, cost);
        info!("Link {}:{} <-> {}:{} up (cost {})", a, port_a, b, port_b, cost);
        Ok(())
    }

    pub fn link_down(&mut self, a: &str, b: &str) -> Result<()> {
        let port_a = self
            .handle_mut(a)?
            .ports
            .port_to(b)
            .with_context(|| format!("no link between {} and {}", a, b))?;
        let port_b = self
            .handle_mut(b)?
            .ports
            .port_to(a)
            .with_context(|| format!("no link between {} and {}", b, a))?;

        for (local, port) in [(a, port_a), (b, port_b)] {
            let handle = self.handle_mut(local)?;
            handle.ports.unbind(port);
            handle
                .sender
                .send(NodeCommand::LinkDown { port })
                .map_err(|_| anyhow!("node {} has stopped", local))?;
        }

        self.topology.link_down(a, b);
        info!("Link {}:{} <-> {}:{} down", a, port_a, b, port_b);
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<BTreeMap<NodeId, NodeSnapshot>> {
        let mut snapshots = BTreeMap::new();
        for (id, handle) in &self.nodes {
            let (reply, response) = oneshot::channel();
            handle
                .sender
                .send(NodeCommand::Snapshot(reply))
                .map_err(|_| anyhow!("node {} has stopped", id))?;
            let snapshot = response
                .await
                .with_context(|| format!("node {} dropped the snapshot request", id))?;
            snapshots.insert(id.clone(), snapshot);
        }
        Ok(snapshots)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub async fn shutdown(self) {
        for (id, handle) in self.nodes {
            let _ = handle.sender.send(NodeCommand::Shutdown);
            if let Err(e) = handle.task.await {
                warn!("Node {} task ended abnormally: {}", id, e);
            }
        }
    }

    fn handle_mut(&mut self, id: &str) -> Result<&mut NodeHandle> {
        self.nodes
            .get_mut(id)
            .with_context(|| format!("unknown node {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkEvent;

    fn tables(snapshots: &BTreeMap<NodeId, NodeSnapshot>) -> Vec<(&NodeId, &RoutingTable)> {
        snapshots.iter().map(|(id, snapshot)| (id, &snapshot.table)).collect()
    }

    #[tokio::test]
    async fn test_line_converges_over_channels() {
        let mut network = LiveNetwork::new(100, 10, 1);
        for id in ["A", "B", "C"] {
            network.add_node(id);
        }
        network.link_up("A", "B", 2, None).unwrap();
        network.link_up("B", "C", 3, None).unwrap();

        sleep(Duration::from_millis(500)).await;
        let snapshots = network.snapshot().await.unwrap();
        assert!(network.topology().mismatches(tables(&snapshots)).is_empty());
        assert_eq!(
            snapshots["A"].table.get_route("C").map(|entry| entry.cost),
            Some(Cost::Finite(5))
        );
        assert!(snapshots["A"].stats.broadcasts > 0);

        network.shutdown().await;
    }

    #[tokio::test]
    async fn test_link_down_over_channels() {
        let mut network = LiveNetwork::new(100, 10, 0);
        for id in ["A", "B", "C"] {
            network.add_node(id);
        }
        network.link_up("A", "B", 1, None).unwrap();
        network.link_up("B", "C", 1, None).unwrap();
        sleep(Duration::from_millis(300)).await;

        network.link_down("B", "C").unwrap();
        sleep(Duration::from_millis(500)).await;

        let snapshots = network.snapshot().await.unwrap();
        assert!(!snapshots["A"].table.contains("C"));
        assert!(network.topology().mismatches(tables(&snapshots)).is_empty());
        network.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejects_unknown_nodes() {
        let mut network = LiveNetwork::new(100, 10, 0);
        network.add_node("A");
        assert!(network.link_up("A", "Z", 1, None).is_err());
        assert!(network.link_up("A", "A", 1, None).is_err());
        assert!(network.link_down("A", "Z").is_err());
        network.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_replays_config() {
        let mut config = SimulationConfig::default();
        config.heartbeat_interval = 50;
        config.tick_interval = 10;
        config.default_latency = 1;
        config.duration = 600;
        config.add_link("A", "B", 1);
        config.add_link("B", "C", 1);
        config.add_link("A", "C", 5);
        config.events.push(LinkEvent {
            time: 200,
            action: LinkAction::Down,
            a: "A".to_string(),
            b: "B".to_string(),
            cost: None,
            latency: None,
        });

        let (snapshots, topology) = LiveNetwork::run(&config).await.unwrap();
        assert!(topology.mismatches(tables(&snapshots)).is_empty());
        assert_eq!(
            snapshots["A"].table.get_route("B").map(|entry| entry.cost),
            Some(Cost::Finite(6))
        );
    }
}
