// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Control-protocol integration tests.
//!
//! Drives the dispatcher the way the WebSocket bridge does: envelopes in,
//! envelopes out over the client channel. Covers runtime identification,
//! graph editing with event re-broadcast, component listing, the live-edit
//! scenario with a selected-edge data observation, and error mapping.

use std::rc::Rc;
use std::time::Duration;

use serde_json::{Value, json};
use serial_test::serial;

use protoflo::server::transport::{ClientContext, Envelope, Transport};

struct Session {
    transport: Rc<Transport>,
    ctx: Rc<ClientContext>,
    rx: tokio::sync::mpsc::UnboundedReceiver<Envelope>,
}

impl Session {
    fn new() -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            transport: Transport::new(),
            ctx: ClientContext::new(1, tx),
            rx,
        }
    }

    async fn send(&self, protocol: &str, command: &str, payload: Value) {
        let envelope = Envelope {
            protocol: protocol.to_string(),
            command: command.to_string(),
            payload,
        };
        self.transport.receive(envelope, &self.ctx).await;
    }

    fn drain(&mut self) -> Vec<Envelope> {
        let mut messages = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            messages.push(envelope);
        }
        messages
    }
}

fn run_local<F: std::future::Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();
    runtime.block_on(local.run_until(future))
}

#[test]
#[serial]
fn getruntime_reports_identity() {
    run_local(async {
        let mut session = Session::new();
        session.send("runtime", "getruntime", json!({})).await;

        let messages = session.drain();
        assert_eq!(messages.len(), 1);
        let runtime = &messages[0];
        assert_eq!(runtime.protocol, "runtime");
        assert_eq!(runtime.command, "runtime");
        assert_eq!(runtime.payload["type"], "protoflo");
        assert_eq!(runtime.payload["version"], "0.5");
        assert_eq!(
            runtime.payload["capabilities"],
            json!(["protocol:graph", "protocol:component", "protocol:network"])
        );
    });
}

#[test]
#[serial]
fn graph_edits_are_rebroadcast_with_graph_id() {
    run_local(async {
        let mut session = Session::new();
        session
            .send("graph", "clear", json!({ "id": "g", "main": true }))
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "A", "component": "core/Kick", "graph": "g" }),
            )
            .await;
        session
            .send(
                "graph",
                "renamenode",
                json!({ "from": "A", "to": "B", "graph": "g" }),
            )
            .await;

        let messages = session.drain();
        let addnode = messages
            .iter()
            .find(|m| m.command == "addnode")
            .expect("addnode re-broadcast");
        assert_eq!(addnode.payload["id"], "A");
        assert_eq!(addnode.payload["graph"], "g");

        let rename = messages
            .iter()
            .find(|m| m.command == "renamenode")
            .expect("renamenode re-broadcast");
        assert_eq!(rename.payload["from"], "A");
        assert_eq!(rename.payload["to"], "B");
    });
}

#[test]
#[serial]
fn edge_events_strip_null_indices() {
    run_local(async {
        let mut session = Session::new();
        session
            .send("graph", "clear", json!({ "id": "g", "main": true }))
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "A", "component": "core/Kick", "graph": "g" }),
            )
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "B", "component": "core/Output", "graph": "g" }),
            )
            .await;
        session
            .send(
                "graph",
                "addedge",
                json!({
                    "src": { "node": "A", "port": "out" },
                    "tgt": { "node": "B", "port": "in" },
                    "graph": "g",
                }),
            )
            .await;

        let messages = session.drain();
        let addedge = messages
            .iter()
            .find(|m| m.command == "addedge")
            .expect("addedge re-broadcast");
        assert!(addedge.payload["src"].get("index").is_none());
        assert!(addedge.payload["tgt"].get("index").is_none());
    });
}

#[test]
#[serial]
fn missing_required_fields_surface_as_errors() {
    run_local(async {
        let mut session = Session::new();
        session
            .send("graph", "clear", json!({ "id": "g", "main": true }))
            .await;
        session.drain();

        // component is required for addnode
        session
            .send("graph", "addnode", json!({ "id": "A", "graph": "g" }))
            .await;

        let messages = session.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].protocol, "graph");
        assert_eq!(messages[0].command, "error");
        assert!(messages[0].payload["message"].is_string());
    });
}

#[test]
#[serial]
fn unknown_graph_yields_error_not_disconnect() {
    run_local(async {
        let mut session = Session::new();
        session
            .send("network", "start", json!({ "graph": "ghost" }))
            .await;

        let messages = session.drain();
        assert_eq!(messages[0].protocol, "network");
        assert_eq!(messages[0].command, "error");

        // The session still works afterwards.
        session.send("runtime", "getruntime", json!({})).await;
        assert_eq!(session.drain().len(), 1);
    });
}

#[test]
#[serial]
fn component_list_sends_each_component() {
    run_local(async {
        let mut session = Session::new();
        session.send("component", "list", json!({})).await;

        let messages = session.drain();
        assert!(!messages.is_empty());
        for message in &messages {
            assert_eq!(message.protocol, "component");
            assert_eq!(message.command, "component");
        }
        let names: Vec<&str> = messages
            .iter()
            .filter_map(|m| m.payload["name"].as_str())
            .collect();
        assert!(names.contains(&"core/Kick"));
        assert!(names.contains(&"math/Add"));
        assert!(names.contains(&"casts/Str"));

        let kick = messages
            .iter()
            .find(|m| m.payload["name"] == "core/Kick")
            .unwrap();
        let in_ports = kick.payload["inPorts"].as_array().unwrap();
        assert!(in_ports.iter().any(|p| p["id"] == "in" && p["type"] == "bang"));
    });
}

#[test]
#[serial]
fn getsource_is_not_implemented() {
    run_local(async {
        let mut session = Session::new();
        session.send("component", "getsource", json!({})).await;
        let messages = session.drain();
        assert_eq!(messages[0].command, "error");
        assert!(
            messages[0].payload["message"]
                .as_str()
                .unwrap()
                .contains("Not Implemented")
        );
    });
}

#[test]
#[serial]
fn live_edit_delivers_data_on_selected_edge() {
    run_local(async {
        let mut session = Session::new();

        // Start from an empty graph, then build the pipeline live.
        session
            .send("graph", "clear", json!({ "id": "main", "main": true }))
            .await;
        session
            .send("network", "start", json!({ "graph": "main" }))
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "A", "component": "core/Kick", "graph": "main" }),
            )
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "B", "component": "core/Output", "graph": "main" }),
            )
            .await;
        session
            .send(
                "graph",
                "addedge",
                json!({
                    "src": { "node": "A", "port": "out" },
                    "tgt": { "node": "B", "port": "in" },
                    "graph": "main",
                }),
            )
            .await;

        // Let the reconciliation worker wire the new processes and edge.
        tokio::time::sleep(Duration::from_millis(20)).await;

        session
            .send(
                "network",
                "edges",
                json!({
                    "graph": "main",
                    "edges": [{
                        "src": { "process": "A", "port": "out" },
                        "tgt": { "process": "B", "port": "in" },
                    }],
                }),
            )
            .await;

        session
            .send(
                "graph",
                "addinitial",
                json!({
                    "src": { "data": "x" },
                    "tgt": { "node": "A", "port": "data" },
                    "graph": "main",
                }),
            )
            .await;
        session
            .send(
                "graph",
                "addinitial",
                json!({
                    "src": { "data": true },
                    "tgt": { "node": "A", "port": "in" },
                    "graph": "main",
                }),
            )
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = session.drain();
        let data = messages
            .iter()
            .find(|m| m.protocol == "network" && m.command == "data")
            .expect("data event for the selected edge");
        assert_eq!(data.payload["data"], json!("x"));
        assert_eq!(data.payload["id"], "A() OUT -> IN B()");
        assert_eq!(data.payload["src"]["node"], "A");
        assert_eq!(data.payload["tgt"]["node"], "B");

        // started arrives when the IIP burst raises the activity counter,
        // stopped after the debounce returns it to zero.
        assert!(messages.iter().any(|m| m.command == "started"));
        assert!(messages.iter().any(|m| m.command == "stopped"));
    });
}

#[test]
#[serial]
fn unselected_edges_are_filtered_out() {
    run_local(async {
        let mut session = Session::new();
        session
            .send("graph", "clear", json!({ "id": "main", "main": true }))
            .await;
        session
            .send("network", "start", json!({ "graph": "main" }))
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "A", "component": "core/Kick", "graph": "main" }),
            )
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "B", "component": "core/Output", "graph": "main" }),
            )
            .await;
        session
            .send(
                "graph",
                "addedge",
                json!({
                    "src": { "node": "A", "port": "out" },
                    "tgt": { "node": "B", "port": "in" },
                    "graph": "main",
                }),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // No `edges` selection: packet events stay server-side.
        session
            .send(
                "graph",
                "addinitial",
                json!({
                    "src": { "data": "x" },
                    "tgt": { "node": "A", "port": "data" },
                    "graph": "main",
                }),
            )
            .await;
        session
            .send(
                "graph",
                "addinitial",
                json!({
                    "src": { "data": true },
                    "tgt": { "node": "A", "port": "in" },
                    "graph": "main",
                }),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = session.drain();
        assert!(
            !messages
                .iter()
                .any(|m| m.protocol == "network" && m.command == "data")
        );
    });
}

#[test]
#[serial]
fn exported_port_changes_send_consolidated_ports_message() {
    run_local(async {
        let mut session = Session::new();
        session
            .send("graph", "clear", json!({ "id": "g", "main": true }))
            .await;
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "A", "component": "core/Kick", "graph": "g" }),
            )
            .await;
        // Load the registry so port types resolve.
        session.send("component", "list", json!({})).await;
        session.drain();

        session
            .send(
                "graph",
                "addinport",
                json!({ "public": "start", "node": "A", "port": "in", "graph": "g" }),
            )
            .await;

        let messages = session.drain();
        let ports = messages
            .iter()
            .find(|m| m.command == "ports")
            .expect("consolidated ports message");
        assert_eq!(ports.payload["graph"], "g");
        let in_ports = ports.payload["inPorts"].as_array().unwrap();
        assert_eq!(in_ports.len(), 1);
        assert_eq!(in_ports[0]["id"], "start");
        assert_eq!(in_ports[0]["type"], "bang");
    });
}

#[test]
#[serial]
fn registered_subgraph_components_are_announced() {
    run_local(async {
        let mut session = Session::new();
        // Without `main`, the cleared graph registers as a component.
        session
            .send(
                "graph",
                "clear",
                json!({ "id": "sub", "library": "demo" }),
            )
            .await;

        let messages = session.drain();
        let component = messages
            .iter()
            .find(|m| m.protocol == "component" && m.command == "component")
            .expect("registered graph announced as component");
        assert_eq!(component.payload["name"], "demo/sub");
        assert_eq!(component.payload["subgraph"], json!(true));

        // Structural edits re-announce it.
        session
            .send(
                "graph",
                "addnode",
                json!({ "id": "A", "component": "core/Kick", "graph": "sub" }),
            )
            .await;
        let messages = session.drain();
        assert!(
            messages
                .iter()
                .any(|m| m.protocol == "component" && m.command == "component")
        );
    });
}
