// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Internal sockets: the channel between exactly one outport slot and one
//! inport slot.
//!
//! A socket carries the five connection-lifecycle events and maintains the
//! group stack so `endGroup` always pops the most recent `beginGroup` name.
//! `connect` and `disconnect` are idempotent. The network sets the `src` and
//! `tgt` descriptors when wiring; the human-readable id derived from them is
//! what clients use to select edges for observation.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use super::events::{Event, EventEmitter};
use super::graph::Endpoint;

#[derive(Debug, Clone)]
pub enum SocketEvent {
    Connect,
    BeginGroup { group: String },
    Data { data: Value },
    EndGroup { group: String },
    Disconnect,
}

impl Event for SocketEvent {
    fn name(&self) -> &'static str {
        match self {
            SocketEvent::Connect => "connect",
            SocketEvent::BeginGroup { .. } => "begingroup",
            SocketEvent::Data { .. } => "data",
            SocketEvent::EndGroup { .. } => "endgroup",
            SocketEvent::Disconnect => "disconnect",
        }
    }
}

struct SocketState {
    connected: bool,
    groups: Vec<String>,
    src: Option<Endpoint>,
    tgt: Option<Endpoint>,
}

pub struct InternalSocket {
    state: RefCell<SocketState>,
    events: EventEmitter<SocketEvent>,
}

impl InternalSocket {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(SocketState {
                connected: false,
                groups: Vec::new(),
                src: None,
                tgt: None,
            }),
            events: EventEmitter::new(),
        })
    }

    pub fn events(&self) -> &EventEmitter<SocketEvent> {
        &self.events
    }

    pub fn connected(&self) -> bool {
        self.state.borrow().connected
    }

    pub fn src(&self) -> Option<Endpoint> {
        self.state.borrow().src.clone()
    }

    pub fn set_src(&self, src: Option<Endpoint>) {
        self.state.borrow_mut().src = src;
    }

    pub fn tgt(&self) -> Option<Endpoint> {
        self.state.borrow().tgt.clone()
    }

    pub fn set_tgt(&self, tgt: Option<Endpoint>) {
        self.state.borrow_mut().tgt = tgt;
    }

    /// Rewrite endpoint node ids after a process rename.
    pub fn rename_node(&self, old: &str, new: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(src) = &mut state.src {
            if src.node == old {
                src.node = new.to_string();
            }
        }
        if let Some(tgt) = &mut state.tgt {
            if tgt.node == old {
                tgt.node = new.to_string();
            }
        }
    }

    /// Human-readable socket id, `"<srcNode>() <PORT> -> <PORT> <tgtNode>()"`.
    /// A missing source reads `DATA`, a missing target `ANON`.
    pub fn id(&self) -> String {
        let state = self.state.borrow();
        let from = state
            .src
            .as_ref()
            .map(|src| format!("{}() {}", src.node, src.port.to_uppercase()));
        let to = state
            .tgt
            .as_ref()
            .map(|tgt| format!("{} {}()", tgt.port.to_uppercase(), tgt.node));

        match (from, to) {
            (Some(from), Some(to)) => format!("{from} -> {to}"),
            (None, Some(to)) => format!("DATA -> {to}"),
            (Some(from), None) => format!("{from} -> ANON"),
            (None, None) => "UNDEFINED".to_string(),
        }
    }

    /// Open the connection. A second `connect` while connected is a no-op.
    pub fn connect(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.connected {
                return;
            }
            state.connected = true;
        }
        self.events.emit(SocketEvent::Connect);
    }

    /// Close the connection. A `disconnect` while disconnected is a no-op.
    pub fn disconnect(&self) {
        {
            let mut state = self.state.borrow_mut();
            if !state.connected {
                return;
            }
            state.connected = false;
        }
        self.events.emit(SocketEvent::Disconnect);
    }

    /// Send one packet, auto-connecting first if needed.
    pub fn send(&self, data: Value) {
        if !self.connected() {
            self.connect();
        }
        self.events.emit(SocketEvent::Data { data });
    }

    pub fn begin_group(&self, group: &str) {
        self.state.borrow_mut().groups.push(group.to_string());
        self.events.emit(SocketEvent::BeginGroup {
            group: group.to_string(),
        });
    }

    /// Close the most recent group. A bare `endGroup` with no open group is
    /// ignored.
    pub fn end_group(&self) {
        let group = self.state.borrow_mut().groups.pop();
        if let Some(group) = group {
            self.events.emit(SocketEvent::EndGroup { group });
        }
    }
}
