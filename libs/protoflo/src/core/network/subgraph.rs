// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Graphs as components.
//!
//! A subgraph component runs a nested network and re-exports inner ports on
//! its own port collections. Readiness gates composition: the component
//! raises `ready` only once every inner process's component is ready, so a
//! parent network never wires edges into a half-built subgraph.
//!
//! Port discovery: explicitly exported inner ports keep their public names;
//! legacy export entries are migrated to inport/outport entries on first
//! touch; any remaining unattached inner port is auto-exposed under
//! `"<nodeid>.<portname>"` (lowercased).

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use serde_json::Value;
use tracing::error;

use super::network::{Network, Process};
use crate::core::component::Component;
use crate::core::error::{FlowError, Result};
use crate::core::graph::{self, Graph};
use crate::core::ports::PortOptions;
use crate::core::scheduler;
use crate::core::socket::SocketEvent;

struct SubgraphState {
    started: Cell<bool>,
    not_ready: Cell<usize>,
}

impl SubgraphState {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            started: Cell::new(false),
            not_ready: Cell::new(0),
        })
    }
}

/// The generic graph-running component: receives a graph definition (object
/// form or a file path) on its `graph` inport and builds the nested network
/// from it. If the `start` inport is attached, execution waits for a bang.
pub fn component() -> Result<Rc<Component>> {
    let (component, _) = new_subgraph_component();
    Ok(component)
}

/// A subgraph component bound to an already-loaded graph. Used for graph
/// files in component collections and for graphs registered over the
/// protocol.
pub async fn for_graph(graph: Rc<Graph>) -> Result<Rc<Component>> {
    let (component, state) = new_subgraph_component();
    create_network(&component, &state, graph).await?;
    Ok(component)
}

/// Load a `.json`/`.fbp` graph file as a subgraph component.
pub async fn from_file(path: impl AsRef<Path>) -> Result<Rc<Component>> {
    let graph = graph::load_file(path, None)?;
    for_graph(graph).await
}

fn new_subgraph_component() -> (Rc<Component>, Rc<SubgraphState>) {
    // Ready until a graph arrives; building the nested network drops the
    // flag and raises it again once every inner component is ready.
    let component = Component::builder()
        .description("Run a graph as a component")
        .icon("sitemap")
        .subgraph()
        .in_port(
            "graph",
            PortOptions::new("all")
                .description("Graph definition to be used with the subgraph component")
                .required(true),
        )
        .in_port(
            "start",
            PortOptions::new("bang")
                .description("If attached, the network starts only on a start packet"),
        )
        .build();
    let state = SubgraphState::new();

    let graph_port = component
        .in_ports()
        .get("graph")
        .expect("subgraph component declares a graph inport");
    let weak = Rc::downgrade(&component);
    let graph_state = Rc::clone(&state);
    graph_port.on("data", move |event| {
        if let (SocketEvent::Data { data }, Some(component)) = (event, weak.upgrade()) {
            let data = data.clone();
            let state = Rc::clone(&graph_state);
            tokio::task::spawn_local(async move {
                if let Err(err) = set_graph(&component, &state, data).await {
                    error!("subgraph load failed: {err}");
                }
            });
        }
    });

    let start_port = component
        .in_ports()
        .get("start")
        .expect("subgraph component declares a start inport");
    let weak = Rc::downgrade(&component);
    let start_state = Rc::clone(&state);
    start_port.on("data", move |_| {
        if let Some(component) = weak.upgrade() {
            start(&component, &start_state, None);
        }
    });

    let weak = Rc::downgrade(&component);
    component.on_shutdown(move || {
        if let Some(network) = weak.upgrade().and_then(|component| component.network()) {
            network.stop();
        }
    });

    (component, state)
}

/// Resolve a received graph reference and build the nested network from it.
async fn set_graph(
    component: &Rc<Component>,
    state: &Rc<SubgraphState>,
    data: Value,
) -> Result<()> {
    let graph = match &data {
        Value::Object(_) => graph::load_json(&data, None)?,
        Value::String(path) => {
            let mut path = std::path::PathBuf::from(path);
            if path.is_relative() {
                path = std::env::current_dir()?.join(path);
            }
            graph::load_file(path, None)?
        }
        _ => {
            return Err(FlowError::Component(
                "subgraph expects a graph definition or a file path".into(),
            ));
        }
    };

    create_network(component, state, graph).await
}

async fn create_network(
    component: &Rc<Component>,
    state: &Rc<SubgraphState>,
    graph: Rc<Graph>,
) -> Result<()> {
    component.set_ready(false);

    let properties = graph.properties();
    if let Some(description) = properties.get("description").and_then(Value::as_str) {
        component.set_description(description);
    }
    if let Some(icon) = properties.get("icon").and_then(Value::as_str) {
        component.set_icon(icon);
    }

    let network = Box::pin(Network::create(Rc::clone(&graph), true)).await?;
    component.set_network(Rc::clone(&network));
    network.connect().await?;

    let mut not_ready = 0;
    for process in network.processes() {
        if !check_component(component, state, &network, &process) {
            not_ready += 1;
        }
    }
    state.not_ready.set(not_ready);
    if not_ready == 0 {
        // Defer one tick so subscribers installed after loading still see it.
        let ready_component = Rc::clone(component);
        scheduler::next_tick(move || ready_component.set_ready(true));
    }

    let gated = component
        .in_ports()
        .get("start")
        .map(|port| port.attached())
        .unwrap_or(false);
    if gated && !state.started.get() {
        return Ok(());
    }

    start(component, state, Some(&graph));
    Ok(())
}

/// Account for one inner process: ready processes contribute their edge
/// ports now, pending ones decrement the counter when their `ready` fires.
fn check_component(
    outer: &Rc<Component>,
    state: &Rc<SubgraphState>,
    network: &Rc<Network>,
    process: &Process,
) -> bool {
    let Some(inner) = process.component.clone() else {
        return true;
    };

    if !inner.ready() {
        let outer = Rc::downgrade(outer);
        let state = Rc::clone(state);
        let network = Rc::downgrade(network);
        let process = process.clone();
        inner.events().once("ready", move |_| {
            let (Some(outer), Some(network)) = (outer.upgrade(), network.upgrade()) else {
                return;
            };
            if check_component(&outer, &state, &network, &process) {
                let remaining = state.not_ready.get().saturating_sub(1);
                state.not_ready.set(remaining);
                if remaining == 0 {
                    outer.set_ready(true);
                }
            }
        });
        return false;
    }

    find_edge_ports(outer, network, process);
    true
}

/// Expose the inner component's ports on the outer component.
fn find_edge_ports(outer: &Rc<Component>, network: &Rc<Network>, process: &Process) {
    let Some(inner) = process.component.clone() else {
        return;
    };
    let graph = network.graph();

    for (port_name, port) in inner.in_ports().entries() {
        if let Some(public) = exported_name(&graph, port.attached(), &process.id, &port_name, true)
        {
            outer.in_ports().add(&public, port);
        }
    }
    for (port_name, port) in inner.out_ports().entries() {
        if let Some(public) = exported_name(&graph, port.attached(), &process.id, &port_name, false)
        {
            outer.out_ports().add(&public, port);
        }
    }
}

/// Public name for an inner port, if it should be exposed: the explicit
/// export when one exists, a migrated legacy export, or the auto-generated
/// `node.port` name for unattached ports of graphs with no explicit exports.
fn exported_name(
    graph: &Rc<Graph>,
    attached: bool,
    node: &str,
    port: &str,
    inbound: bool,
) -> Option<String> {
    let entries = if inbound {
        graph.inports()
    } else {
        graph.outports()
    };

    for (public, entry) in &entries {
        if entry.process == node && entry.port == port {
            return Some(public.clone());
        }
    }

    for export in graph.exports() {
        if export.process == node && export.port == port {
            graph.remove_export(&export.public);
            if inbound {
                graph.add_inport(
                    &export.public,
                    &export.process,
                    &export.port,
                    Some(export.metadata.clone()),
                );
            } else {
                graph.add_outport(
                    &export.public,
                    &export.process,
                    &export.port,
                    Some(export.metadata.clone()),
                );
            }
            return Some(export.public.clone());
        }
    }

    // The graph exports ports explicitly and this is not one of them.
    if !entries.is_empty() {
        return None;
    }

    if attached {
        return None;
    }

    Some(format!("{node}.{port}").to_lowercase())
}

fn start(component: &Rc<Component>, state: &Rc<SubgraphState>, graph: Option<&Rc<Graph>>) {
    state.started.set(true);
    let Some(network) = component.network() else {
        return;
    };
    network.start();

    if let Some(graph) = graph {
        let network = Rc::downgrade(&network);
        graph.events().on("addInitial", move |_| {
            if let Some(network) = network.upgrade() {
                network.send_initials();
            }
        });
    }
}
