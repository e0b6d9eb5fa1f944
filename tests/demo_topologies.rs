use dv_router::config::SimulationConfig;
use dv_router::network::{Simulator, TraceOutcome};
use dv_router::protocol::Cost;
use std::path::PathBuf;

fn demo(name: &str) -> SimulationConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name);
    SimulationConfig::load(path).expect("demo topology")
}

fn cost(simulator: &Simulator, from: &str, to: &str) -> Option<Cost> {
    simulator
        .node(from)
        .and_then(|node| node.routing_table().get_route(to))
        .map(|entry| entry.cost)
}

#[test]
fn mesh_converges_through_failure_and_repair() {
    let config = demo("mesh.json");
    let mut simulator = Simulator::from_config(&config);

    simulator.run_until(9_000);
    assert!(simulator.converged(), "{:?}", simulator.mismatches());
    // A-B-C-D
    assert_eq!(cost(&simulator, "A", "D"), Some(Cost::Finite(4)));

    simulator.run_until(19_000);
    assert!(simulator.converged(), "{:?}", simulator.mismatches());
    // A-B-D once B-C is gone
    assert_eq!(cost(&simulator, "A", "D"), Some(Cost::Finite(6)));

    simulator.run_until(config.duration);
    assert!(simulator.converged(), "{:?}", simulator.mismatches());
    assert_eq!(cost(&simulator, "A", "D"), Some(Cost::Finite(3)));

    let traces = simulator.traces();
    assert_eq!(traces.len(), 3);
    assert_eq!(traces[0].path, vec!["A", "B", "C", "D"]);
    assert_eq!(traces[1].path, vec!["A", "B", "D"]);
    assert!(traces.iter().all(|trace| matches!(trace.outcome, TraceOutcome::Delivered { .. })));
}

#[test]
fn split_horizon_holds_in_every_converged_table() {
    let config = demo("mesh.json");
    let mut simulator = Simulator::from_config(&config);
    simulator.run_until(9_000);

    for node in simulator.nodes() {
        let table = node.routing_table();
        for (neighbor, link) in node.neighbors().iter() {
            let vector = dv_router::protocol::message_handler::build_advertisement(table, link.port);
            for (destination, entry) in table.iter() {
                if entry.next_hop == Some(link.port) && destination != node.id() {
                    assert_eq!(
                        vector[destination],
                        Cost::Unreachable,
                        "{} leaks {} back to {}",
                        node.id(),
                        destination,
                        neighbor
                    );
                }
            }
        }
    }
}
