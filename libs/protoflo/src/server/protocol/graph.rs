// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The `graph` sub-protocol: live graph editing.
//!
//! `clear` creates a graph under a client-chosen id and subscribes the
//! client to its mutation events; the remaining commands dispatch into the
//! graph model. Outgoing edge and initial events strip `null` slot indices,
//! and port-set changes additionally produce a consolidated `ports` message
//! with descriptors resolved through the component registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::parse;
use crate::core::error::{FlowError, Result};
use crate::core::graph::{Edge, Graph, GraphEvent, Initial, Metadata, Node};
use crate::core::registry::ComponentLoader;
use crate::server::transport::{ClientContext, Transport};

pub struct GraphProtocol {
    graphs: RefCell<HashMap<String, Rc<Graph>>>,
}

#[derive(Deserialize)]
struct ClearPayload {
    id: String,
    name: Option<String>,
    library: Option<String>,
    main: Option<Value>,
}

#[derive(Deserialize)]
struct AddNodePayload {
    id: String,
    component: String,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct NodeRefPayload {
    id: String,
}

#[derive(Deserialize)]
struct RenamePayload {
    from: String,
    to: String,
}

#[derive(Deserialize)]
struct ChangeNodePayload {
    id: String,
    metadata: Metadata,
}

#[derive(Deserialize)]
struct EndpointPayload {
    node: String,
    port: String,
    index: Option<usize>,
}

#[derive(Deserialize)]
struct LooseEndpointPayload {
    node: Option<String>,
    port: Option<String>,
}

#[derive(Deserialize)]
struct AddEdgePayload {
    src: EndpointPayload,
    tgt: EndpointPayload,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct RemoveEdgePayload {
    src: RemoveEdgeSrc,
    tgt: Option<LooseEndpointPayload>,
}

#[derive(Deserialize)]
struct RemoveEdgeSrc {
    node: String,
    port: Option<String>,
}

#[derive(Deserialize)]
struct ChangeEdgePayload {
    src: EndpointPayload,
    tgt: EndpointPayload,
    metadata: Metadata,
}

#[derive(Deserialize)]
struct InitialSrcPayload {
    data: Value,
}

#[derive(Deserialize)]
struct AddInitialPayload {
    src: InitialSrcPayload,
    tgt: EndpointPayload,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct RemoveInitialPayload {
    tgt: RemoveInitialTgt,
}

#[derive(Deserialize)]
struct RemoveInitialTgt {
    node: String,
    port: Option<String>,
}

#[derive(Deserialize)]
struct AddPortPayload {
    public: String,
    node: String,
    port: String,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct RemovePortPayload {
    public: String,
}

impl GraphProtocol {
    pub fn new() -> Self {
        Self {
            graphs: RefCell::new(HashMap::new()),
        }
    }

    pub fn get_graph(&self, id: &str) -> Option<Rc<Graph>> {
        self.graphs.borrow().get(id).cloned()
    }

    fn resolve(&self, payload: &Value) -> Result<Rc<Graph>> {
        let id = payload
            .get("graph")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::Protocol("no graph specified".into()))?;
        self.get_graph(id)
            .ok_or_else(|| FlowError::Protocol("requested graph not found".into()))
    }

    pub fn receive(
        &self,
        transport: &Rc<Transport>,
        command: &str,
        payload: &Value,
        ctx: &Rc<ClientContext>,
    ) -> Result<()> {
        if command == "clear" {
            return self.init_graph(transport, payload, ctx);
        }

        let graph = self.resolve(payload)?;
        match command {
            "addnode" => {
                let request: AddNodePayload = parse(payload)?;
                graph.add_node(&request.id, &request.component, request.metadata);
            }
            "removenode" => {
                let request: NodeRefPayload = parse(payload)?;
                graph.remove_node(&request.id);
            }
            "renamenode" => {
                let request: RenamePayload = parse(payload)?;
                graph.rename_node(&request.from, &request.to);
            }
            "changenode" => {
                let request: ChangeNodePayload = parse(payload)?;
                graph.set_node_metadata(&request.id, request.metadata);
            }
            "addedge" => {
                let request: AddEdgePayload = parse(payload)?;
                graph.add_edge_index(
                    &request.src.node,
                    &request.src.port.to_lowercase(),
                    request.src.index,
                    &request.tgt.node,
                    &request.tgt.port.to_lowercase(),
                    request.tgt.index,
                    request.metadata,
                );
            }
            "removeedge" => {
                let request: RemoveEdgePayload = parse(payload)?;
                let src_port = request.src.port.map(|port| port.to_lowercase());
                let (tgt_node, tgt_port) = match request.tgt {
                    Some(tgt) => (tgt.node, tgt.port.map(|port| port.to_lowercase())),
                    None => (None, None),
                };
                graph.remove_edge(
                    &request.src.node,
                    src_port.as_deref(),
                    tgt_node.as_deref(),
                    tgt_port.as_deref(),
                );
            }
            "changeedge" => {
                let request: ChangeEdgePayload = parse(payload)?;
                graph.set_edge_metadata(
                    &request.src.node,
                    &request.src.port.to_lowercase(),
                    &request.tgt.node,
                    &request.tgt.port.to_lowercase(),
                    request.metadata,
                );
            }
            "addinitial" => {
                let request: AddInitialPayload = parse(payload)?;
                graph.add_initial_index(
                    request.src.data,
                    &request.tgt.node,
                    &request.tgt.port.to_lowercase(),
                    request.tgt.index,
                    request.metadata,
                );
            }
            "removeinitial" => {
                let request: RemoveInitialPayload = parse(payload)?;
                let port = request.tgt.port.map(|port| port.to_lowercase());
                graph.remove_initial(&request.tgt.node, port.as_deref());
            }
            "addinport" => {
                let request: AddPortPayload = parse(payload)?;
                graph.add_inport(
                    &request.public,
                    &request.node,
                    &request.port.to_lowercase(),
                    request.metadata,
                );
            }
            "removeinport" => {
                let request: RemovePortPayload = parse(payload)?;
                graph.remove_inport(&request.public);
            }
            "renameinport" => {
                let request: RenamePayload = parse(payload)?;
                graph.rename_inport(&request.from, &request.to);
            }
            "addoutport" => {
                let request: AddPortPayload = parse(payload)?;
                graph.add_outport(
                    &request.public,
                    &request.node,
                    &request.port.to_lowercase(),
                    request.metadata,
                );
            }
            "removeoutport" => {
                let request: RemovePortPayload = parse(payload)?;
                graph.remove_outport(&request.public);
            }
            "renameoutport" => {
                let request: RenamePayload = parse(payload)?;
                graph.rename_outport(&request.from, &request.to);
            }
            other => {
                return Err(FlowError::Protocol(format!(
                    "unknown graph command '{other}'"
                )));
            }
        }
        Ok(())
    }

    /// `clear`: initialise a new graph under an id, subscribe the client to
    /// its events, and register it as a subgraph component unless it is the
    /// main graph.
    fn init_graph(
        &self,
        transport: &Rc<Transport>,
        payload: &Value,
        ctx: &Rc<ClientContext>,
    ) -> Result<()> {
        let request: ClearPayload = parse(payload)?;
        let name = request.name.as_deref().unwrap_or("NoFlo runtime");
        let graph = Graph::new(name);

        let mut full_name = request.id.clone();
        if let Some(library) = &request.library {
            let mut properties = Metadata::new();
            properties.insert("library".to_string(), json!(library));
            graph.set_properties(properties);
            full_name = format!("{library}/{full_name}");
        }

        subscribe_graph(transport, &request.id, &graph, ctx);

        if request.main.is_none() {
            transport.component.register_graph(&full_name, &graph, ctx);
        }

        self.graphs.borrow_mut().insert(request.id, graph);
        Ok(())
    }
}

impl Default for GraphProtocol {
    fn default() -> Self {
        Self::new()
    }
}

fn endpoint_json(endpoint: &crate::core::graph::Endpoint) -> Value {
    let mut entry = json!({
        "node": endpoint.node,
        "port": endpoint.port,
    });
    if let Some(index) = endpoint.index {
        entry["index"] = json!(index);
    }
    entry
}

fn node_json(node: &Node, graph_id: &str) -> Value {
    json!({
        "id": node.id,
        "component": node.component,
        "metadata": node.metadata,
        "graph": graph_id,
    })
}

fn edge_json(edge: &Edge, graph_id: &str) -> Value {
    json!({
        "src": endpoint_json(&edge.src),
        "tgt": endpoint_json(&edge.tgt),
        "metadata": edge.metadata,
        "graph": graph_id,
    })
}

fn initial_json(initial: &Initial, graph_id: &str) -> Value {
    json!({
        "src": { "data": initial.data },
        "tgt": endpoint_json(&initial.tgt),
        "metadata": initial.metadata,
        "graph": graph_id,
    })
}

/// Re-broadcast graph mutations to the client that owns the graph, and send
/// the consolidated `ports` message whenever the exported port set changes.
fn subscribe_graph(
    transport: &Rc<Transport>,
    graph_id: &str,
    graph: &Rc<Graph>,
    ctx: &Rc<ClientContext>,
) {
    let transport = Rc::downgrade(transport);
    let weak_graph = Rc::downgrade(graph);
    let graph_id = graph_id.to_string();
    let ctx = Rc::clone(ctx);

    graph.events().on_any(move |event: &GraphEvent| {
        match event {
            GraphEvent::AddNode { node } => {
                ctx.send("graph", "addnode", node_json(node, &graph_id));
            }
            GraphEvent::RemoveNode { node } => {
                ctx.send("graph", "removenode", node_json(node, &graph_id));
            }
            GraphEvent::RenameNode { old, new } => {
                ctx.send(
                    "graph",
                    "renamenode",
                    json!({ "from": old, "to": new, "graph": graph_id }),
                );
            }
            GraphEvent::AddEdge { edge } => {
                ctx.send("graph", "addedge", edge_json(edge, &graph_id));
            }
            GraphEvent::RemoveEdge { edge } => {
                ctx.send("graph", "removeedge", edge_json(edge, &graph_id));
            }
            GraphEvent::AddInitial { initial } => {
                ctx.send("graph", "addinitial", initial_json(initial, &graph_id));
            }
            GraphEvent::RemoveInitial { initial } => {
                ctx.send("graph", "removeinitial", initial_json(initial, &graph_id));
            }
            GraphEvent::AddInport { .. }
            | GraphEvent::RemoveInport { .. }
            | GraphEvent::RenameInport { .. }
            | GraphEvent::AddOutport { .. }
            | GraphEvent::RemoveOutport { .. }
            | GraphEvent::RenameOutport { .. } => {
                let (Some(transport), Some(graph)) = (transport.upgrade(), weak_graph.upgrade())
                else {
                    return;
                };
                let loader = transport.component.get_loader();
                ctx.send("graph", "ports", ports_json(&graph, &graph_id, &loader));
            }
            _ => {}
        }
    });
}

/// The current exported port descriptors, with datatypes pulled from the
/// registry by each port's owning component.
fn ports_json(graph: &Rc<Graph>, graph_id: &str, loader: &Rc<ComponentLoader>) -> Value {
    let describe = |entries: Vec<(String, crate::core::graph::ExportedPort)>, inbound: bool| {
        entries
            .iter()
            .map(|(public, port)| {
                let datatype = graph
                    .get_node(&port.process)
                    .and_then(|node| loader.port_datatype(&node.component, &port.port, inbound))
                    .unwrap_or_else(|| "all".to_string());
                let mut descriptor = Map::new();
                descriptor.insert("id".to_string(), json!(public));
                descriptor.insert("type".to_string(), json!(datatype));
                if !port.metadata.is_empty() {
                    descriptor.insert("metadata".to_string(), json!(port.metadata));
                }
                Value::Object(descriptor)
            })
            .collect::<Vec<_>>()
    };

    json!({
        "graph": graph_id,
        "inPorts": describe(graph.inports(), true),
        "outPorts": describe(graph.outports(), false),
    })
}
