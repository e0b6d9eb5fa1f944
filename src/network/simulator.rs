use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use crate::Millis;
use crate::config::{LinkAction, SimulationConfig};
use crate::protocol::{Cost, DistanceVectorNode, NodeId, Packet, PortId, RoutingTable, Transport};
use super::interface::{PortBinding, PortTable};
use super::topology::Topology;

/// Data packets that travel this many hops are treated as looping.
pub const MAX_HOPS: usize = 64;

/// Port a locally originated packet appears to arrive on.
const LOCAL_PORT: PortId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    InFlight,
    Delivered { at: Millis },
    Dropped { at: Millis, node: NodeId },
    HopLimit { at: Millis },
}

#[derive(Debug, Clone)]
pub struct TraceResult {
    pub source: NodeId,
    pub destination: NodeId,
    pub sent_at: Millis,
    pub path: Vec<NodeId>,
    pub outcome: TraceOutcome,
}

#[derive(Debug)]
enum Event {
    Deliver {
        to: NodeId,
        port: PortId,
        packet: Packet,
        trace: Option<usize>,
    },
    LinkUp {
        a: NodeId,
        b: NodeId,
        cost: u64,
        latency: Option<Millis>,
    },
    LinkDown {
        a: NodeId,
        b: NodeId,
    },
    Traceroute {
        source: NodeId,
        destination: NodeId,
    },
    Tick,
}

#[derive(Debug)]
struct Scheduled {
    time: Millis,
    sequence: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for Scheduled {}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        (other.time, other.sequence).cmp(&(self.time, self.sequence))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Collects what a node sends during one handler call.
struct Outbox {
    ports: Vec<PortId>,
    sent: Vec<(PortId, Packet)>,
}

impl Transport for Outbox {
    fn outgoing_ports(&self) -> Vec<PortId> {
        self.ports.clone()
    }

    fn send(&mut self, port: PortId, packet: Packet) {
        self.sent.push((port, packet));
    }
}

struct SimNode {
    node: DistanceVectorNode,
    ports: PortTable,
}

/// Deterministic discrete-event host. Events at the same instant run in the
/// order they were scheduled; nodes see clock ticks in id order.
pub struct Simulator {
    now: Millis,
    heartbeat_interval: Millis,
    tick_interval: Millis,
    default_latency: Millis,
    sequence: u64,
    queue: BinaryHeap<Scheduled>,
    nodes: BTreeMap<NodeId, SimNode>,
    topology: Topology,
    traces: Vec<TraceResult>,
    lose_advertisements_until: Millis,
    lost_advertisements: u64,
}

impl Simulator {
    pub fn new(heartbeat_interval: Millis, tick_interval: Millis, default_latency: Millis) -> Self {
        let mut simulator = Self {
            now: 0,
            heartbeat_interval,
            tick_interval: tick_interval.max(1),
            default_latency,
            sequence: 0,
            queue: BinaryHeap::new(),
            nodes: BTreeMap::new(),
            topology: Topology::new(),
            traces: Vec::new(),
            lose_advertisements_until: 0,
            lost_advertisements: 0,
        };
        let first_tick = simulator.tick_interval;
        simulator.schedule(first_tick, Event::Tick);
        simulator
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        let mut simulator = Self::new(config.heartbeat_interval, config.tick_interval, config.default_latency);
        for id in &config.nodes {
            simulator.add_node(id);
        }
        for link in &config.links {
            simulator.schedule_link_up(0, &link.a, &link.b, link.cost, link.latency);
        }
        for event in &config.events {
            match event.action {
                LinkAction::Up => simulator.schedule_link_up(
                    event.time,
                    &event.a,
                    &event.b,
                    event.cost.unwrap_or(1),
                    event.latency,
                ),
                LinkAction::Down => simulator.schedule_link_down(event.time, &event.a, &event.b),
            }
        }
        for trace in &config.traceroutes {
            simulator.schedule_traceroute(trace.time, &trace.source, &trace.destination);
        }
        simulator
    }

    pub fn add_node(&mut self, id: &str) {
        if self.nodes.contains_key(id) {
            return;
        }
        self.topology.add_node(id);
        self.nodes.insert(
            id.to_string(),
            SimNode {
                node: DistanceVectorNode::new(id.to_string(), self.heartbeat_interval),
                ports: PortTable::new(),
            },
        );
    }

    pub fn schedule_link_up(&mut self, time: Millis, a: &str, b: &str, cost: u64, latency: Option<Millis>) {
        self.schedule(
            time,
            Event::LinkUp {
                a: a.to_string(),
                b: b.to_string(),
                cost,
                latency,
            },
        );
    }

    pub fn schedule_link_down(&mut self, time: Millis, a: &str, b: &str) {
        self.schedule(
            time,
            Event::LinkDown {
                a: a.to_string(),
                b: b.to_string(),
            },
        );
    }

    pub fn schedule_traceroute(&mut self, time: Millis, source: &str, destination: &str) {
        self.schedule(
            time,
            Event::Traceroute {
                source: source.to_string(),
                destination: destination.to_string(),
            },
        );
    }

    /// Advertisements sent before `time` are silently lost.
    pub fn lose_advertisements_until(&mut self, time: Millis) {
        self.lose_advertisements_until = time;
    }

    pub fn lost_advertisements(&self) -> u64 {
        self.lost_advertisements
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn node(&self, id: &str) -> Option<&DistanceVectorNode> {
        self.nodes.get(id).map(|sim| &sim.node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DistanceVectorNode> {
        self.nodes.values().map(|sim| &sim.node)
    }

    pub fn tables(&self) -> BTreeMap<NodeId, RoutingTable> {
        self.nodes
            .iter()
            .map(|(id, sim)| (id.clone(), sim.node.routing_table().clone()))
            .collect()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn traces(&self) -> &[TraceResult] {
        &self.traces
    }

    /// Processes every event up to and including `end`.
    pub fn run_until(&mut self, end: Millis) {
        while self.queue.peek().is_some_and(|next| next.time <= end) {
            let Some(scheduled) = self.queue.pop() else {
                break;
            };
            self.now = scheduled.time;
            self.process(scheduled.event);
        }
        self.now = self.now.max(end);
    }

    /// Differences between the node tables and the true shortest paths,
    /// plus any next-hop chain that fails to reach its destination.
    pub fn mismatches(&self) -> Vec<String> {
        let mut problems = self.topology.mismatches(
            self.nodes.iter().map(|(id, sim)| (id, sim.node.routing_table())),
        );
        for (owner, sim) in &self.nodes {
            for (destination, _) in sim.node.routing_table().iter() {
                if let Err(problem) = self.follow_route(owner, destination) {
                    problems.push(problem);
                }
            }
        }
        problems
    }

    pub fn converged(&self) -> bool {
        self.mismatches().is_empty()
    }

    fn follow_route(&self, source: &str, destination: &str) -> Result<(), String> {
        let mut current = source.to_string();
        for _ in 0..=MAX_HOPS {
            if current == destination {
                return Ok(());
            }
            let sim = self
                .nodes
                .get(&current)
                .ok_or_else(|| format!("{} -> {}: unknown node {}", source, destination, current))?;
            let port = sim
                .node
                .routing_table()
                .next_hop(destination)
                .ok_or_else(|| format!("{} -> {}: dead end at {}", source, destination, current))?;
            let binding = sim
                .ports
                .get(port)
                .ok_or_else(|| format!("{} -> {}: {} routes via dead port {}", source, destination, current, port))?;
            current = binding.peer.clone();
        }
        Err(format!("{} -> {}: routing loop", source, destination))
    }

    fn schedule(&mut self, time: Millis, event: Event) {
        self.sequence += 1;
        self.queue.push(Scheduled {
            time,
            sequence: self.sequence,
            event,
        });
    }

    fn process(&mut self, event: Event) {
        match event {
            Event::Tick => {
                let ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
                for id in ids {
                    let now = self.now;
                    self.with_node(&id, None, |node, outbox| node.handle_clock_tick(outbox, now));
                }
                let next = self.now + self.tick_interval;
                self.schedule(next, Event::Tick);
            }
            Event::LinkUp { a, b, cost, latency } => self.apply_link_up(&a, &b, cost, latency),
            Event::LinkDown { a, b } => self.apply_link_down(&a, &b),
            Event::Traceroute { source, destination } => self.start_traceroute(source, destination),
            Event::Deliver { to, port, packet, trace } => self.deliver(to, port, packet, trace),
        }
    }

    fn apply_link_up(&mut self, a: &str, b: &str, cost: u64, latency: Option<Millis>) {
        if !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            warn!("link-up {}-{} references an unknown node", a, b);
            return;
        }
        let latency = latency.unwrap_or(self.default_latency);

        let (Some(port_a), Some(port_b)) = (
            self.nodes.get_mut(a).map(|sim| sim.ports.allocate()),
            self.nodes.get_mut(b).map(|sim| sim.ports.allocate()),
        ) else {
            return;
        };
        for (local, local_port, peer, peer_port) in [(a, port_a, b, port_b), (b, port_b, a, port_a)] {
            if let Some(sim) = self.nodes.get_mut(local) {
                sim.ports.bind(
                    local_port,
                    PortBinding {
                        peer: peer.to_string(),
                        peer_port,
                        cost,
                        latency,
                    },
                );
            }
        }
        self.topology.link_up(a, b, cost);
        info!("t={} link {}:{} <-> {}:{} up (cost {})", self.now, a, port_a, b, port_b, cost);

        self.with_node(a, None, |node, outbox| {
            node.handle_link_up(outbox, port_a, b.to_string(), Cost::from_raw(cost))
        });
        self.with_node(b, None, |node, outbox| {
            node.handle_link_up(outbox, port_b, a.to_string(), Cost::from_raw(cost))
        });
    }

    fn apply_link_down(&mut self, a: &str, b: &str) {
        let port_a = self.nodes.get(a).and_then(|sim| sim.ports.port_to(b));
        let port_b = self.nodes.get(b).and_then(|sim| sim.ports.port_to(a));
        let (Some(port_a), Some(port_b)) = (port_a, port_b) else {
            warn!("link-down {}-{} but no such link is up", a, b);
            return;
        };

        for (local, port) in [(a, port_a), (b, port_b)] {
            if let Some(sim) = self.nodes.get_mut(local) {
                sim.ports.unbind(port);
            }
        }
        self.topology.link_down(a, b);
        info!("t={} link {}:{} <-> {}:{} down", self.now, a, port_a, b, port_b);

        self.with_node(a, None, |node, outbox| node.handle_link_down(outbox, port_a));
        self.with_node(b, None, |node, outbox| node.handle_link_down(outbox, port_b));
    }

    fn start_traceroute(&mut self, source: NodeId, destination: NodeId) {
        let trace = self.traces.len();
        self.traces.push(TraceResult {
            source: source.clone(),
            destination: destination.clone(),
            sent_at: self.now,
            path: Vec::new(),
            outcome: TraceOutcome::InFlight,
        });

        let packet = Packet::data(source.clone(), destination, b"traceroute".to_vec());
        self.deliver(source, LOCAL_PORT, packet, Some(trace));
    }

    fn deliver(&mut self, to: NodeId, port: PortId, packet: Packet, trace: Option<usize>) {
        let Some(sim) = self.nodes.get(&to) else {
            return;
        };
        if port != LOCAL_PORT && sim.ports.get(port).is_none() {
            debug!("t={} {} dropped packet on dead port {}", self.now, to, port);
            if let Some(index) = trace {
                self.finish_trace(index, TraceOutcome::Dropped { at: self.now, node: to });
            }
            return;
        }

        if let Some(index) = trace {
            let now = self.now;
            let Some(record) = self.traces.get_mut(index) else {
                return;
            };
            record.path.push(to.clone());
            if packet.destination.as_deref() == Some(to.as_str()) {
                record.outcome = TraceOutcome::Delivered { at: now };
                return;
            }
            if record.path.len() > MAX_HOPS {
                record.outcome = TraceOutcome::HopLimit { at: now };
                return;
            }
        }

        self.with_node(&to, trace, |node, outbox| node.handle_inbound_packet(outbox, port, packet));
    }

    fn finish_trace(&mut self, index: usize, outcome: TraceOutcome) {
        if let Some(record) = self.traces.get_mut(index) {
            record.outcome = outcome;
        }
    }

    /// Runs one handler on `id` and puts whatever it sent onto the wire.
    fn with_node<F>(&mut self, id: &str, trace: Option<usize>, handler: F)
    where
        F: FnOnce(&mut DistanceVectorNode, &mut Outbox),
    {
        let Some(sim) = self.nodes.get_mut(id) else {
            return;
        };
        let mut outbox = Outbox {
            ports: sim.ports.ports(),
            sent: Vec::new(),
        };
        handler(&mut sim.node, &mut outbox);

        let mut forwarded = false;
        let mut deliveries = Vec::new();
        for (port, packet) in outbox.sent {
            let Some(binding) = sim.ports.get(port) else {
                warn!("t={} {} sent on unbound port {}", self.now, id, port);
                continue;
            };
            if packet.is_advertisement() && self.now < self.lose_advertisements_until {
                self.lost_advertisements += 1;
                continue;
            }
            let packet_trace = if packet.is_advertisement() {
                None
            } else {
                forwarded = true;
                trace
            };
            deliveries.push((
                self.now + binding.latency,
                Event::Deliver {
                    to: binding.peer.clone(),
                    port: binding.peer_port,
                    packet,
                    trace: packet_trace,
                },
            ));
        }

        for (time, event) in deliveries {
            self.schedule(time, event);
        }
        if let (Some(index), false) = (trace, forwarded) {
            self.finish_trace(index, TraceOutcome::Dropped { at: self.now, node: id.to_string() });
        }
    }
}
