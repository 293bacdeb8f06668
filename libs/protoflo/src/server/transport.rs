// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Envelope framing and request dispatch.
//!
//! Every message in either direction is `{protocol, command, payload}`.
//! The dispatcher routes requests to the four sub-protocols; errors never
//! cross this boundary as panics or raw results, they are mapped onto an
//! `error` response carrying the originating protocol.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::protocol::component::ComponentProtocol;
use super::protocol::graph::GraphProtocol;
use super::protocol::network::NetworkProtocol;
use super::protocol::runtime::RuntimeProtocol;
use crate::core::error::FlowError;

/// One protocol message, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

/// Per-client state: the outbound channel plus the client's selected-edges
/// allowlist for data-flow observation.
pub struct ClientContext {
    id: u64,
    tx: tokio::sync::mpsc::UnboundedSender<Envelope>,
    pub selected_edges: RefCell<HashSet<String>>,
}

impl ClientContext {
    pub fn new(id: u64, tx: tokio::sync::mpsc::UnboundedSender<Envelope>) -> Rc<Self> {
        Rc::new(Self {
            id,
            tx,
            selected_edges: RefCell::new(HashSet::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a message for the client. A gone client drops it silently.
    pub fn send(&self, protocol: &str, command: &str, payload: Value) {
        let _ = self.tx.send(Envelope {
            protocol: protocol.to_string(),
            command: command.to_string(),
            payload,
        });
    }

    pub fn send_error(&self, protocol: &str, err: &FlowError) {
        self.send(protocol, "error", json!({ "message": err.to_string() }));
    }
}

/// The four sub-protocols behind one dispatcher.
pub struct Transport {
    pub runtime: RuntimeProtocol,
    pub graph: GraphProtocol,
    pub component: ComponentProtocol,
    pub network: NetworkProtocol,
}

impl Transport {
    pub const VERSION: &'static str = "0.5";

    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            runtime: RuntimeProtocol::new(),
            graph: GraphProtocol::new(),
            component: ComponentProtocol::new(),
            network: NetworkProtocol::new(),
        })
    }

    /// Route one request. Failures become `error` responses on the
    /// originating sub-protocol; the connection stays up.
    pub async fn receive(self: &Rc<Self>, envelope: Envelope, ctx: &Rc<ClientContext>) {
        debug!(
            client = ctx.id(),
            protocol = envelope.protocol,
            command = envelope.command,
            "request"
        );

        let result = match envelope.protocol.as_str() {
            "runtime" => self.runtime.receive(&envelope.command, &envelope.payload, ctx),
            "graph" => {
                self.graph
                    .receive(self, &envelope.command, &envelope.payload, ctx)
            }
            "component" => {
                self.component
                    .receive(self, &envelope.command, &envelope.payload, ctx)
                    .await
            }
            "network" => {
                self.network
                    .receive(self, &envelope.command, &envelope.payload, ctx)
                    .await
            }
            other => Err(FlowError::Protocol(format!("unknown protocol '{other}'"))),
        };

        if let Err(err) = result {
            ctx.send_error(&envelope.protocol, &err);
        }
    }
}
