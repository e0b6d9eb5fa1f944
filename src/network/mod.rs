pub mod interface;
pub mod live;
pub mod simulator;
pub mod topology;

pub use interface::{PortBinding, PortTable};
pub use live::{LiveNetwork, NodeSnapshot};
pub use simulator::{Simulator, TraceOutcome, TraceResult};
pub use topology::Topology;
