// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The `component` sub-protocol: component discovery.
//!
//! `list` replays every cached component as its own `component` message.
//! Graphs registered through `graph/clear` are re-announced whenever their
//! structure changes, so the editor sees their exported ports evolve.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};

use crate::core::error::{FlowError, Result};
use crate::core::events::Event;
use crate::core::graph::{Graph, GraphEvent};
use crate::core::registry::{ComponentDetails, ComponentLoader};
use crate::server::transport::{ClientContext, Transport};

/// Graph events that change a registered subgraph's announced shape.
const STRUCTURAL_EVENTS: [&str; 13] = [
    "addNode",
    "removeNode",
    "renameNode",
    "addEdge",
    "removeEdge",
    "addInitial",
    "removeInitial",
    "addInport",
    "removeInport",
    "renameInport",
    "addOutport",
    "removeOutport",
    "renameOutport",
];

pub struct ComponentProtocol {
    loader: RefCell<Option<Rc<ComponentLoader>>>,
}

impl ComponentProtocol {
    pub fn new() -> Self {
        Self {
            loader: RefCell::new(None),
        }
    }

    /// The shared loader, created on first use.
    pub fn get_loader(&self) -> Rc<ComponentLoader> {
        self.loader
            .borrow_mut()
            .get_or_insert_with(ComponentLoader::new)
            .clone()
    }

    pub async fn receive(
        &self,
        _transport: &Rc<Transport>,
        command: &str,
        _payload: &Value,
        ctx: &Rc<ClientContext>,
    ) -> Result<()> {
        match command {
            "list" => self.list_components(ctx).await,
            "getsource" | "source" => Err(FlowError::Protocol("Not Implemented".into())),
            other => Err(FlowError::Protocol(format!(
                "unknown component command '{other}'"
            ))),
        }
    }

    async fn list_components(&self, ctx: &Rc<ClientContext>) -> Result<()> {
        let loader = self.get_loader();
        let components = loader.list_components().await?;
        for component in components {
            send_component(ctx, &component.name, &component.details);
        }
        Ok(())
    }

    /// Register a protocol-created graph as a subgraph component and keep
    /// its announcement fresh across structural edits.
    pub fn register_graph(&self, full_name: &str, graph: &Rc<Graph>, ctx: &Rc<ClientContext>) {
        let loader = self.get_loader();
        let loaded = loader.upsert_registered_graph(full_name, graph);
        send_component(ctx, &loaded.name, &loaded.details);

        let loader = Rc::clone(&loader);
        let weak_graph = Rc::downgrade(graph);
        let ctx = Rc::clone(ctx);
        let name = full_name.to_string();
        graph.events().on_any(move |event: &GraphEvent| {
            if !STRUCTURAL_EVENTS.contains(&event.name()) {
                return;
            }
            let Some(graph) = weak_graph.upgrade() else {
                return;
            };
            let loaded = loader.upsert_registered_graph(&name, &graph);
            send_component(&ctx, &loaded.name, &loaded.details);
        });
    }
}

impl Default for ComponentProtocol {
    fn default() -> Self {
        Self::new()
    }
}

fn send_component(ctx: &Rc<ClientContext>, name: &str, details: &ComponentDetails) {
    ctx.send(
        "component",
        "component",
        json!({
            "name": name,
            "description": details.description,
            "subgraph": details.subgraph,
            "icon": details.icon,
            "inPorts": details.in_ports,
            "outPorts": details.out_ports,
        }),
    );
}
