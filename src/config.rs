use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use crate::Millis;
use crate::protocol::NodeId;

/// A topology plus the timed events to replay on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: Millis,
    #[serde(default = "default_tick_interval")]
    pub tick_interval: Millis,
    #[serde(default = "default_duration")]
    pub duration: Millis,
    #[serde(default = "default_latency")]
    pub default_latency: Millis,
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub events: Vec<LinkEvent>,
    #[serde(default)]
    pub traceroutes: Vec<TracerouteConfig>,
}

/// A link present from time zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: NodeId,
    pub b: NodeId,
    pub cost: u64,
    #[serde(default)]
    pub latency: Option<Millis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkAction {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEvent {
    pub time: Millis,
    pub action: LinkAction,
    pub a: NodeId,
    pub b: NodeId,
    /// Required for `up`.
    #[serde(default)]
    pub cost: Option<u64>,
    #[serde(default)]
    pub latency: Option<Millis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteConfig {
    pub time: Millis,
    pub source: NodeId,
    pub destination: NodeId,
}

fn default_heartbeat_interval() -> Millis {
    1000
}

fn default_tick_interval() -> Millis {
    100
}

fn default_duration() -> Millis {
    30_000
}

fn default_latency() -> Millis {
    10
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            tick_interval: default_tick_interval(),
            duration: default_duration(),
            default_latency: default_latency(),
            nodes: vec![],
            links: vec![],
            events: vec![],
            traceroutes: vec![],
        }
    }
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading topology {}", path.display()))?;
        let config: SimulationConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing topology {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn add_link(&mut self, a: &str, b: &str, cost: u64) {
        for id in [a, b] {
            if !self.nodes.iter().any(|node| node == id) {
                self.nodes.push(id.to_string());
            }
        }
        self.links.push(LinkConfig {
            a: a.to_string(),
            b: b.to_string(),
            cost,
            latency: None,
        });
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval == 0 {
            bail!("tick_interval must be positive");
        }
        if self.heartbeat_interval == 0 {
            bail!("heartbeat_interval must be positive");
        }

        let nodes: BTreeSet<&str> = self.nodes.iter().map(String::as_str).collect();
        if nodes.len() != self.nodes.len() {
            bail!("duplicate node ids in topology");
        }

        let check_endpoints = |a: &str, b: &str| -> Result<()> {
            if a == b {
                bail!("link {}-{} connects a node to itself", a, b);
            }
            for id in [a, b] {
                if !nodes.contains(id) {
                    bail!("link {}-{} references unknown node {}", a, b, id);
                }
            }
            Ok(())
        };

        let mut up: BTreeSet<(&str, &str)> = BTreeSet::new();
        for link in &self.links {
            check_endpoints(&link.a, &link.b)?;
            if !up.insert(link_key(&link.a, &link.b)) {
                bail!("duplicate link {}-{}", link.a, link.b);
            }
        }

        let mut events: Vec<&LinkEvent> = self.events.iter().collect();
        events.sort_by_key(|event| event.time);
        for event in events {
            check_endpoints(&event.a, &event.b)?;
            let key = link_key(&event.a, &event.b);
            match event.action {
                LinkAction::Up => {
                    if event.cost.is_none() {
                        bail!("link-up {}-{} at {} has no cost", event.a, event.b, event.time);
                    }
                    if !up.insert(key) {
                        bail!("link-up {}-{} at {} but the link is already up", event.a, event.b, event.time);
                    }
                }
                LinkAction::Down => {
                    if !up.remove(&key) {
                        bail!("link-down {}-{} at {} but the link is not up", event.a, event.b, event.time);
                    }
                }
            }
        }

        for trace in &self.traceroutes {
            for id in [&trace.source, &trace.destination] {
                if !nodes.contains(id.as_str()) {
                    bail!("traceroute references unknown node {}", id);
                }
            }
        }

        Ok(())
    }
}

fn link_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.add_link("A", "B", 1);
        config.add_link("B", "C", 1);
        config.add_link("A", "C", 5);
        config
    }

    #[test]
    fn test_defaults_fill_in() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{"nodes": ["A", "B"], "links": [{"a": "A", "b": "B", "cost": 3}]}"#,
        )
        .unwrap();
        assert_eq!(config.heartbeat_interval, 1000);
        assert_eq!(config.tick_interval, 100);
        assert_eq!(config.default_latency, 10);
        assert!(config.events.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load() {
        let mut config = triangle();
        config.events.push(LinkEvent {
            time: 5000,
            action: LinkAction::Down,
            a: "C".to_string(),
            b: "A".to_string(),
            cost: None,
            latency: None,
        });
        let file = tempfile::NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let loaded = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(loaded.nodes, vec!["A", "B", "C"]);
        assert_eq!(loaded.links.len(), 3);
        assert_eq!(loaded.events[0].action, LinkAction::Down);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = SimulationConfig::load(dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("reading topology"));
    }

    #[test]
    fn test_rejects_unknown_node() {
        let mut config = triangle();
        config.links.push(LinkConfig {
            a: "A".to_string(),
            b: "Z".to_string(),
            cost: 1,
            latency: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_link_in_either_direction() {
        let mut config = triangle();
        config.add_link("C", "B", 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_down_for_missing_link() {
        let mut config = triangle();
        config.add_link("C", "D", 1);
        config.events.push(LinkEvent {
            time: 10,
            action: LinkAction::Down,
            a: "A".to_string(),
            b: "D".to_string(),
            cost: None,
            latency: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_self_link_and_zero_tick() {
        let mut config = triangle();
        config.tick_interval = 0;
        assert!(config.validate().is_err());

        let mut config = triangle();
        config.links.push(LinkConfig {
            a: "B".to_string(),
            b: "B".to_string(),
            cost: 1,
            latency: None,
        });
        assert!(config.validate().is_err());
    }
}
