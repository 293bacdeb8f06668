// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Network lifecycle integration tests.
//!
//! End-to-end scenarios over the public API: initial-packet delivery order,
//! a Kick→Output pipeline, arithmetic with IIP operands, the activity
//! counter's start/end pairing, and subgraph readiness. Tests run serially
//! because the component loader shares the on-disk cache.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use serde_json::json;
use serial_test::serial;

use protoflo::core::events::Event;
use protoflo::core::graph::Graph;
use protoflo::core::network::{Network, NetworkEvent, subgraph};
use protoflo::core::socket::SocketEvent;

fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();
    runtime.block_on(local.run_until(future))
}

/// Record every event arriving at a process inport.
fn record_inport(network: &Rc<Network>, node: &str, port: &str) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let in_port = network
        .get_process(node)
        .expect("process exists")
        .component
        .expect("process has a component")
        .in_ports()
        .get(port)
        .expect("inport exists");
    in_port.events().on_any(move |event: &SocketEvent| {
        let label = match event {
            SocketEvent::Data { data } => format!("data {data}"),
            other => other.name().to_string(),
        };
        sink.borrow_mut().push(label);
    });
    log
}

/// Record network lifecycle event names.
fn record_network(network: &Rc<Network>) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    network.events().on_any(move |event: &NetworkEvent| {
        if matches!(event, NetworkEvent::Start { .. } | NetworkEvent::End { .. }) {
            sink.borrow_mut().push(event.name().to_string());
        }
    });
    log
}

async fn settle() {
    // Longer than the 10 ms end debounce.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[test]
#[serial]
fn iip_delivery_order_and_start_end() {
    run_local(async {
        let graph = Graph::new("iip");
        graph.add_node("R", "core/Drop", None);
        graph.add_initial(json!("hi"), "R", "in", None);

        let network = Network::create(graph, false).await.unwrap();

        // Initial dispatch defers one tick, so handlers installed here
        // still observe the packets.
        let inport_log = record_inport(&network, "R", "in");
        let network_log = record_network(&network);

        settle().await;

        assert_eq!(
            *inport_log.borrow(),
            vec!["connect", "data \"hi\"", "disconnect"]
        );
        assert_eq!(*network_log.borrow(), vec!["start", "end"]);
        assert_eq!(network.connection_count(), 0);
    });
}

#[test]
#[serial]
fn kick_output_pipeline_delivers_packet() {
    run_local(async {
        let graph = Graph::new("pipeline");
        graph.add_node("K", "core/Kick", None);
        graph.add_node("O", "core/Output", None);
        graph.add_edge("K", "out", "O", "in", None);
        graph.add_initial(json!("pkt"), "K", "data", None);
        graph.add_initial(json!(true), "K", "in", None);

        let network = Network::create(graph, false).await.unwrap();
        let inport_log = record_inport(&network, "O", "in");

        settle().await;

        assert_eq!(
            *inport_log.borrow(),
            vec!["connect", "data \"pkt\"", "disconnect"]
        );
    });
}

#[test]
#[serial]
fn add_component_sums_iip_operands() {
    run_local(async {
        let graph = Graph::new("math");
        graph.add_node("A", "math/Add", None);
        graph.add_node("Sink", "core/Drop", None);
        graph.add_edge("A", "sum", "Sink", "in", None);
        graph.add_initial(json!(3), "A", "augend", None);
        graph.add_initial(json!(4), "A", "addend", None);

        let network = Network::create(graph, false).await.unwrap();
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&results);
        network
            .get_process("Sink")
            .unwrap()
            .component
            .unwrap()
            .in_ports()
            .get("in")
            .unwrap()
            .on("data", move |event| {
                if let SocketEvent::Data { data } = event {
                    sink.borrow_mut().push(data.clone());
                }
            });

        settle().await;

        assert_eq!(*results.borrow(), vec![json!(7)]);
    });
}

#[test]
#[serial]
fn each_start_pairs_with_one_end() {
    run_local(async {
        let graph = Graph::new("counter");
        graph.add_node("R", "core/Drop", None);
        graph.add_initial(json!(1), "R", "in", None);

        let network = Network::create(graph, false).await.unwrap();
        let network_log = record_network(&network);

        settle().await;

        // A second burst of activity starts (and ends) the network again.
        network.graph().add_initial(json!(2), "R", "in", None);
        settle().await;

        assert_eq!(*network_log.borrow(), vec!["start", "end", "start", "end"]);
    });
}

#[test]
#[serial]
fn live_edit_wires_new_nodes_and_edges() {
    run_local(async {
        let graph = Graph::new("live");
        let network = Network::with_loader(
            Rc::clone(&graph),
            protoflo::core::registry::ComponentLoader::new(),
        );
        network.loader().list_components().await.unwrap();
        network.connect().await.unwrap();

        // Mutations on the running graph reconcile through the FIFO worker.
        graph.add_node("K", "core/Kick", None);
        graph.add_node("O", "core/Output", None);
        graph.add_edge("K", "out", "O", "in", None);
        settle().await;

        let inport_log = record_inport(&network, "O", "in");

        graph.add_initial(json!("x"), "K", "data", None);
        graph.add_initial(json!(true), "K", "in", None);
        settle().await;

        assert_eq!(
            *inport_log.borrow(),
            vec!["connect", "data \"x\"", "disconnect"]
        );
        assert_eq!(network.connections().len(), 3);
        assert_eq!(network.processes().len(), 2);
    });
}

#[test]
#[serial]
fn removed_nodes_drop_their_connections() {
    run_local(async {
        let graph = Graph::new("removal");
        graph.add_node("K", "core/Kick", None);
        graph.add_node("O", "core/Output", None);
        graph.add_edge("K", "out", "O", "in", None);

        let network = Network::create(graph, true).await.unwrap();
        network.connect().await.unwrap();
        assert_eq!(network.connections().len(), 1);

        network.graph().remove_node("O");
        settle().await;

        assert!(network.get_process("O").is_none());
        assert!(network.connections().is_empty());
        assert_eq!(network.processes().len(), 1);
    });
}

#[test]
#[serial]
fn rename_rewrites_socket_endpoints() {
    run_local(async {
        let graph = Graph::new("rename");
        graph.add_node("A", "core/Kick", None);
        graph.add_node("B", "core/Output", None);
        graph.add_edge("A", "out", "B", "in", None);

        let network = Network::create(graph, true).await.unwrap();
        network.connect().await.unwrap();
        assert_eq!(network.connections()[0].id(), "A() OUT -> IN B()");

        network.graph().rename_node("A", "C");
        settle().await;

        assert!(network.get_process("C").is_some());
        assert_eq!(network.connections()[0].id(), "C() OUT -> IN B()");
    });
}

#[test]
#[serial]
fn subgraph_becomes_ready_and_exposes_inner_ports() {
    run_local(async {
        let inner = Graph::new("inner");
        inner.add_node("Echo", "core/Output", None);

        let component = subgraph::for_graph(inner).await.unwrap();
        // Readiness is deferred one tick past network construction.
        assert!(!component.ready());
        tokio::task::yield_now().await;
        assert!(component.ready());

        // Unattached, unexported inner ports auto-expose as node.port.
        assert!(component.in_ports().contains("echo.in"));
        assert!(component.out_ports().contains("echo.out"));
    });
}

#[test]
#[serial]
fn subgraph_honors_explicit_exports() {
    run_local(async {
        let inner = Graph::new("inner");
        inner.add_node("Echo", "core/Output", None);
        inner.add_inport("input", "Echo", "in", None);

        let component = subgraph::for_graph(inner).await.unwrap();
        tokio::task::yield_now().await;
        assert!(component.ready());

        // The explicit export wins and suppresses auto-exposure.
        assert!(component.in_ports().contains("input"));
        assert!(!component.in_ports().contains("echo.in"));
    });
}

#[test]
#[serial]
fn stop_disconnects_and_shuts_down() {
    run_local(async {
        let graph = Graph::new("stop");
        graph.add_node("K", "core/Kick", None);
        graph.add_node("O", "core/Output", None);
        graph.add_edge("K", "out", "O", "in", None);

        let network = Network::create(graph, true).await.unwrap();
        network.connect().await.unwrap();

        let socket = network.connections()[0].clone();
        socket.connect();
        assert!(socket.connected());

        network.stop();
        assert!(!socket.connected());
    });
}

#[test]
#[serial]
fn group_events_stay_balanced_through_the_pipeline() {
    run_local(async {
        let graph = Graph::new("groups");
        graph.add_node("K", "core/Kick", None);
        graph.add_node("O", "core/Output", None);
        graph.add_edge("K", "out", "O", "in", None);

        let network = Network::create(graph, true).await.unwrap();
        network.connect().await.unwrap();

        let inport_log = record_inport(&network, "O", "in");

        // Drive Kick's bang port directly with a grouped packet train.
        let bang = network
            .get_process("K")
            .unwrap()
            .component
            .unwrap()
            .in_ports()
            .get("in")
            .unwrap();
        let socket = protoflo::core::socket::InternalSocket::new();
        bang.attach(Rc::clone(&socket), None);

        socket.connect();
        socket.begin_group("batch");
        socket.send(json!(true));
        socket.end_group();
        socket.disconnect();

        let log = inport_log.borrow();
        let data_value: Vec<&str> = log
            .iter()
            .filter(|l| l.starts_with("data"))
            .map(|l| l.as_str())
            .collect();
        assert_eq!(data_value, vec!["data null"]);

        // begin/end pairs must balance around the data packet.
        let begins = log.iter().filter(|l| *l == "begingroup").count();
        let ends = log.iter().filter(|l| *l == "endgroup").count();
        assert_eq!(begins, ends);
    });
}
