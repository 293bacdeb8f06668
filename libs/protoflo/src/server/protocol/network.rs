// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The `network` sub-protocol: execution control and data-flow observation.
//!
//! `start` brings a network up for a named graph; `stop` tears it down;
//! `edges` records the client's socket-id allowlist. Packet-level events
//! are forwarded only for sockets the client selected.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::parse;
use crate::core::error::{FlowError, Result};
use crate::core::graph::Endpoint;
use crate::core::network::{Network, NetworkEvent, SocketPayload};
use crate::server::transport::{ClientContext, Transport};

pub struct NetworkProtocol {
    networks: RefCell<HashMap<String, Rc<Network>>>,
}

#[derive(Deserialize)]
struct GraphRefPayload {
    graph: String,
}

#[derive(Deserialize)]
struct EdgesPayload {
    graph: String,
    edges: Vec<EdgeSelector>,
}

#[derive(Deserialize)]
struct EdgeSelector {
    src: SelectorEnd,
    tgt: SelectorEnd,
}

#[derive(Deserialize)]
struct SelectorEnd {
    // The editor names the endpoint's process; accept `node` as an alias.
    process: Option<String>,
    node: Option<String>,
    port: String,
}

impl SelectorEnd {
    fn node_id(&self) -> Option<&str> {
        self.process.as_deref().or(self.node.as_deref())
    }
}

impl NetworkProtocol {
    pub fn new() -> Self {
        Self {
            networks: RefCell::new(HashMap::new()),
        }
    }

    pub fn get_network(&self, graph_id: &str) -> Option<Rc<Network>> {
        self.networks.borrow().get(graph_id).cloned()
    }

    pub async fn receive(
        &self,
        transport: &Rc<Transport>,
        command: &str,
        payload: &Value,
        ctx: &Rc<ClientContext>,
    ) -> Result<()> {
        let request: GraphRefPayload = parse(payload)?;
        if transport.graph.get_graph(&request.graph).is_none() {
            return Err(FlowError::Protocol("requested graph not found".into()));
        }

        match command {
            "start" => self.start_network(transport, &request.graph, ctx).await,
            "stop" => {
                self.stop_network(&request.graph, ctx);
                Ok(())
            }
            "edges" => {
                let request: EdgesPayload = parse(payload)?;
                self.select_edges(&request, ctx);
                Ok(())
            }
            other => Err(FlowError::Protocol(format!(
                "unknown network command '{other}'"
            ))),
        }
    }

    /// Build the network in delayed mode, subscribe the client, wire it up,
    /// and dispatch the queued initial packets.
    async fn start_network(
        &self,
        transport: &Rc<Transport>,
        graph_id: &str,
        ctx: &Rc<ClientContext>,
    ) -> Result<()> {
        let graph = transport
            .graph
            .get_graph(graph_id)
            .ok_or_else(|| FlowError::Protocol("requested graph not found".into()))?;

        let network = Network::with_loader(Rc::clone(&graph), transport.component.get_loader());
        network.loader().list_components().await?;

        self.networks
            .borrow_mut()
            .insert(graph_id.to_string(), Rc::clone(&network));
        subscribe_network(&network, graph_id, ctx);

        network.connect().await?;
        network.send_initials();

        // Initials added later go out as soon as the network wires them.
        let weak = Rc::downgrade(&network);
        graph.events().on("addInitial", move |_| {
            if let Some(network) = weak.upgrade() {
                network.send_initials();
            }
        });

        Ok(())
    }

    fn stop_network(&self, graph_id: &str, ctx: &Rc<ClientContext>) {
        let Some(network) = self.get_network(graph_id) else {
            return;
        };
        let was_running = network.running();
        network.stop();
        // A network with no live connections produces no `end` event, so
        // acknowledge the stop directly.
        if !was_running {
            ctx.send(
                "network",
                "stopped",
                json!({
                    "time": chrono::Utc::now().to_rfc3339(),
                    "uptime": network.uptime(),
                    "graph": graph_id,
                }),
            );
        }
    }

    /// Resolve the client's edge selection to socket id strings.
    fn select_edges(&self, request: &EdgesPayload, ctx: &Rc<ClientContext>) {
        let Some(network) = self.get_network(&request.graph) else {
            return;
        };

        let mut selected = Vec::new();
        for edge in &request.edges {
            for connection in network.connections() {
                let (Some(src), Some(tgt)) = (connection.src(), connection.tgt()) else {
                    continue;
                };
                let src_matches = edge.src.node_id() == Some(src.node.as_str())
                    && edge.src.port == src.port;
                let tgt_matches = edge.tgt.node_id() == Some(tgt.node.as_str())
                    && edge.tgt.port == tgt.port;
                if src_matches && tgt_matches {
                    selected.push(connection.id());
                }
            }
        }

        let mut edges = ctx.selected_edges.borrow_mut();
        edges.clear();
        edges.extend(selected);
    }
}

impl Default for NetworkProtocol {
    fn default() -> Self {
        Self::new()
    }
}

fn endpoint_json(endpoint: &Endpoint) -> Value {
    json!({ "node": endpoint.node, "port": endpoint.port })
}

fn socket_event_json(payload: &SocketPayload, graph_id: &str) -> Value {
    let mut entry = Map::new();
    entry.insert("id".to_string(), json!(payload.id));
    entry.insert("graph".to_string(), json!(graph_id));
    if let Some(src) = &payload.src {
        entry.insert("src".to_string(), endpoint_json(src));
    }
    if let Some(tgt) = &payload.tgt {
        entry.insert("tgt".to_string(), endpoint_json(tgt));
    }
    match &payload.event {
        crate::core::socket::SocketEvent::BeginGroup { group }
        | crate::core::socket::SocketEvent::EndGroup { group } => {
            entry.insert("group".to_string(), json!(group));
        }
        crate::core::socket::SocketEvent::Data { data } => {
            entry.insert("data".to_string(), data.clone());
        }
        _ => {}
    }
    if !payload.subgraph.is_empty() {
        entry.insert("subgraph".to_string(), json!(payload.subgraph));
    }
    Value::Object(entry)
}

/// Forward network lifecycle events to the client, and packet events for
/// the sockets it selected.
fn subscribe_network(network: &Rc<Network>, graph_id: &str, ctx: &Rc<ClientContext>) {
    {
        let ctx = Rc::clone(ctx);
        let graph_id = graph_id.to_string();
        network.events().on("start", move |event: &NetworkEvent| {
            if let NetworkEvent::Start { start } = event {
                ctx.send(
                    "network",
                    "started",
                    json!({ "time": start.to_rfc3339(), "graph": graph_id }),
                );
            }
        });
    }

    {
        let ctx = Rc::clone(ctx);
        let graph_id = graph_id.to_string();
        network.events().on("icon", move |event: &NetworkEvent| {
            if let NetworkEvent::Icon { id, icon } = event {
                ctx.send(
                    "network",
                    "icon",
                    json!({ "id": id, "icon": icon, "graph": graph_id }),
                );
            }
        });
    }

    for event_name in ["connect", "begingroup", "data", "endgroup", "disconnect"] {
        let ctx = Rc::clone(ctx);
        let graph_id = graph_id.to_string();
        network.events().on(event_name, move |event: &NetworkEvent| {
            let NetworkEvent::Socket(payload) = event else {
                return;
            };
            if !ctx.selected_edges.borrow().contains(&payload.id) {
                return;
            }
            ctx.send("network", event_name, socket_event_json(payload, &graph_id));
        });
    }

    {
        let ctx = Rc::clone(ctx);
        let graph_id = graph_id.to_string();
        network.events().on("end", move |event: &NetworkEvent| {
            if let NetworkEvent::End { end, uptime, .. } = event {
                ctx.send(
                    "network",
                    "stopped",
                    json!({
                        "time": end.to_rfc3339(),
                        "uptime": uptime,
                        "graph": graph_id,
                    }),
                );
            }
        });
    }
}
