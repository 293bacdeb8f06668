// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Network runtime: process instantiation, socket wiring, initial-packet
//! dispatch, activity tracking, and live graph reconciliation.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error};

use crate::core::component::{Component, ComponentEvent, when_ready};
use crate::core::error::{FlowError, Result};
use crate::core::events::{Event, EventEmitter};
use crate::core::graph::{Endpoint, Graph, GraphEvent, Metadata};
use crate::core::ports::Port as _;
use crate::core::registry::ComponentLoader;
use crate::core::scheduler::{self, Debouncer};
use crate::core::socket::{InternalSocket, SocketEvent};

/// A socket event re-emitted on the network, with the socket's identity and
/// the subgraph breadcrumb attached.
#[derive(Debug, Clone)]
pub struct SocketPayload {
    pub event: SocketEvent,
    pub id: String,
    pub src: Option<Endpoint>,
    pub tgt: Option<Endpoint>,
    /// Node-id path when the event bubbled out of nested subgraphs;
    /// outermost first.
    pub subgraph: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Start {
        start: DateTime<Utc>,
    },
    End {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        uptime: f64,
    },
    Socket(SocketPayload),
    Icon {
        id: String,
        icon: String,
    },
}

impl Event for NetworkEvent {
    fn name(&self) -> &'static str {
        match self {
            NetworkEvent::Start { .. } => "start",
            NetworkEvent::End { .. } => "end",
            NetworkEvent::Socket(payload) => payload.event.name(),
            NetworkEvent::Icon { .. } => "icon",
        }
    }
}

/// A runtime incarnation of a graph node.
#[derive(Clone)]
pub struct Process {
    pub id: String,
    pub component: Option<Rc<Component>>,
    pub metadata: Metadata,
}

struct InitialPacket {
    socket: Rc<InternalSocket>,
    data: Value,
}

/// A queued live-edit operation. Handlers enqueue these; one worker drains
/// them strictly in order so mutations never interleave with wiring.
enum GraphOp {
    AddNode {
        id: String,
        component: String,
        metadata: Metadata,
    },
    RemoveNode {
        id: String,
    },
    RenameNode {
        old: String,
        new: String,
    },
    AddEdge {
        src: Endpoint,
        tgt: Endpoint,
    },
    RemoveEdge {
        src: Endpoint,
        tgt: Endpoint,
    },
    AddInitial {
        data: Value,
        tgt: Endpoint,
    },
    RemoveInitial {
        tgt: Endpoint,
    },
}

pub struct Network {
    graph: Rc<Graph>,
    loader: Rc<ComponentLoader>,
    processes: RefCell<Vec<Process>>,
    connections: RefCell<Vec<Rc<InternalSocket>>>,
    initials: RefCell<Vec<InitialPacket>>,
    connection_count: Cell<u32>,
    running: Cell<bool>,
    startup: RefCell<DateTime<Utc>>,
    events: EventEmitter<NetworkEvent>,
    end_debounce: Debouncer,
    ops: RefCell<VecDeque<GraphOp>>,
    processing_ops: Cell<bool>,
}

impl Network {
    pub fn new(graph: Rc<Graph>) -> Rc<Self> {
        Self::with_loader(graph, ComponentLoader::new())
    }

    pub fn with_loader(graph: Rc<Graph>, loader: Rc<ComponentLoader>) -> Rc<Self> {
        Rc::new(Self {
            graph,
            loader,
            processes: RefCell::new(Vec::new()),
            connections: RefCell::new(Vec::new()),
            initials: RefCell::new(Vec::new()),
            connection_count: Cell::new(0),
            running: Cell::new(false),
            startup: RefCell::new(Utc::now()),
            events: EventEmitter::new(),
            end_debounce: Debouncer::new(Duration::from_millis(10)),
            ops: RefCell::new(VecDeque::new()),
            processing_ops: Cell::new(false),
        })
    }

    /// Build a network for a graph. Components load first; an empty graph or
    /// `delayed` mode resolves without wiring, anything else wires up and
    /// dispatches the queued initial packets.
    pub async fn create(graph: Rc<Graph>, delayed: bool) -> Result<Rc<Self>> {
        let network = Self::new(graph);
        network.loader.list_components().await?;

        if network.graph.nodes().is_empty() || delayed {
            return Ok(network);
        }

        network.connect().await?;
        network.start();
        Ok(network)
    }

    pub fn events(&self) -> &EventEmitter<NetworkEvent> {
        &self.events
    }

    pub fn graph(&self) -> Rc<Graph> {
        Rc::clone(&self.graph)
    }

    pub fn loader(&self) -> Rc<ComponentLoader> {
        Rc::clone(&self.loader)
    }

    pub fn processes(&self) -> Vec<Process> {
        self.processes.borrow().clone()
    }

    pub fn connections(&self) -> Vec<Rc<InternalSocket>> {
        self.connections.borrow().clone()
    }

    pub fn connection_count(&self) -> u32 {
        self.connection_count.get()
    }

    pub fn running(&self) -> bool {
        self.running.get()
    }

    pub fn startup(&self) -> DateTime<Utc> {
        *self.startup.borrow()
    }

    pub fn uptime(&self) -> f64 {
        let elapsed = Utc::now() - *self.startup.borrow();
        elapsed.num_milliseconds() as f64 / 1000.0
    }

    // =========================================================================
    // Wiring
    // =========================================================================

    /// Wire the network up: processes, then edges, then queued initials,
    /// each step awaited, then subscribe to live graph edits.
    pub async fn connect(self: &Rc<Self>) -> Result<()> {
        for node in self.graph.nodes() {
            self.add_process(&node.id, Some(&node.component), node.metadata.clone())
                .await?;
        }
        for edge in self.graph.edges() {
            self.add_connection(edge.src.clone(), edge.tgt.clone()).await?;
        }
        for initial in self.graph.initials() {
            self.add_initial(initial.data.clone(), initial.tgt.clone())
                .await?;
        }
        self.subscribe_graph();
        Ok(())
    }

    pub fn get_process(&self, id: &str) -> Option<Process> {
        self.processes
            .borrow()
            .iter()
            .find(|process| process.id == id)
            .cloned()
    }

    /// Instantiate a component for a node and imprint its identity on every
    /// port. Adding an existing id returns the existing process.
    pub async fn add_process(
        self: &Rc<Self>,
        id: &str,
        component: Option<&str>,
        metadata: Metadata,
    ) -> Result<Process> {
        if let Some(existing) = self.get_process(id) {
            return Ok(existing);
        }

        let Some(component_name) = component else {
            let process = Process {
                id: id.to_string(),
                component: None,
                metadata,
            };
            self.processes.borrow_mut().push(process.clone());
            return Ok(process);
        };

        let instance = self.loader.load(component_name, Some(metadata.clone())).await?;
        debug!("process '{id}' instantiated from component '{component_name}'");

        for (name, port) in instance.in_ports().entries() {
            port.set_node(id);
            port.set_name(&name);
            port.set_component(&instance);
        }
        for (name, port) in instance.out_ports().entries() {
            port.set_node(id);
            port.set_name(&name);
            port.set_component(&instance);
        }

        let process = Process {
            id: id.to_string(),
            component: Some(Rc::clone(&instance)),
            metadata,
        };

        if instance.subgraph() {
            self.subscribe_subgraph(&process);
        }
        self.subscribe_node(&process);

        self.processes.borrow_mut().push(process.clone());
        Ok(process)
    }

    /// Shut the process's component down and forget it.
    pub fn remove_process(&self, id: &str) {
        let removed = {
            let mut processes = self.processes.borrow_mut();
            processes
                .iter()
                .position(|process| process.id == id)
                .map(|index| processes.remove(index))
        };
        if let Some(process) = removed {
            if let Some(component) = &process.component {
                component.shutdown();
            }
        }
    }

    /// Re-imprint a process id after a node rename, including the endpoint
    /// descriptors of already-wired sockets.
    pub fn rename_process(&self, old: &str, new: &str) {
        let component = {
            let mut processes = self.processes.borrow_mut();
            let Some(process) = processes.iter_mut().find(|process| process.id == old) else {
                return;
            };
            process.id = new.to_string();
            process.component.clone()
        };

        if let Some(component) = component {
            for (_, port) in component.in_ports().entries() {
                port.set_node(new);
            }
            for (_, port) in component.out_ports().entries() {
                port.set_node(new);
            }
        }

        for socket in self.connections.borrow().iter() {
            socket.rename_node(old, new);
        }
    }

    /// Point a socket end at a process port and attach, honoring the port's
    /// addressability.
    pub fn connect_port(
        &self,
        socket: &Rc<InternalSocket>,
        process: &Process,
        port: &str,
        index: Option<usize>,
        inbound: bool,
    ) -> Result<()> {
        let component = process.component.as_ref().ok_or_else(|| {
            FlowError::Network(format!("no component defined for node '{}'", process.id))
        })?;

        if inbound {
            socket.set_tgt(Some(Endpoint::with_index(&process.id, port, index)));
            let in_port = component.in_ports().get(port).ok_or_else(|| {
                FlowError::Network(format!(
                    "no inport '{port}' defined in process {} ({})",
                    process.id,
                    socket.id()
                ))
            })?;
            let index = if in_port.options().addressable {
                index
            } else {
                None
            };
            in_port.attach(Rc::clone(socket), index);
        } else {
            socket.set_src(Some(Endpoint::with_index(&process.id, port, index)));
            let out_port = component.out_ports().get(port).ok_or_else(|| {
                FlowError::Network(format!(
                    "no outport '{port}' defined in process {} ({})",
                    process.id,
                    socket.id()
                ))
            })?;
            let index = if out_port.options().addressable {
                index
            } else {
                None
            };
            out_port.attach(Rc::clone(socket), index);
        }
        Ok(())
    }

    /// Wire an edge: create a socket, attach both ends (waiting for either
    /// component's `ready` when deferred), observe its events.
    pub async fn add_connection(self: &Rc<Self>, src: Endpoint, tgt: Endpoint) -> Result<()> {
        let socket = InternalSocket::new();

        let from = self.get_process(&src.node).ok_or_else(|| {
            FlowError::Network(format!("no process defined for outbound node '{}'", src.node))
        })?;
        let from_component = from.component.clone().ok_or_else(|| {
            FlowError::Network(format!("no component defined for outbound node '{}'", src.node))
        })?;
        when_ready(&from_component).await;

        let to = self.get_process(&tgt.node).ok_or_else(|| {
            FlowError::Network(format!("no process defined for inbound node '{}'", tgt.node))
        })?;
        let to_component = to.component.clone().ok_or_else(|| {
            FlowError::Network(format!("no component defined for inbound node '{}'", tgt.node))
        })?;
        when_ready(&to_component).await;

        self.connect_port(&socket, &to, &tgt.port, tgt.index, true)?;
        self.connect_port(&socket, &from, &src.port, src.index, false)?;

        self.subscribe_socket(&socket);
        self.connections.borrow_mut().push(socket);
        Ok(())
    }

    /// Detach and drop every connection matching the target (and the source
    /// when one is given).
    pub fn remove_connection(&self, src: Option<&Endpoint>, tgt: &Endpoint) {
        let matching: Vec<Rc<InternalSocket>> = self
            .connections
            .borrow()
            .iter()
            .filter(|socket| {
                let tgt_matches = socket
                    .tgt()
                    .map(|end| end.node == tgt.node && end.port == tgt.port)
                    .unwrap_or(false);
                let src_matches = match src {
                    Some(src) => socket
                        .src()
                        .map(|end| end.node == src.node && end.port == src.port)
                        .unwrap_or(false),
                    None => true,
                };
                tgt_matches && src_matches
            })
            .cloned()
            .collect();

        for socket in matching {
            self.detach_socket(&socket);
        }
    }

    fn detach_socket(&self, socket: &Rc<InternalSocket>) {
        if let Some(end) = socket.tgt() {
            if let Some(port) = self
                .get_process(&end.node)
                .and_then(|process| process.component)
                .and_then(|component| component.in_ports().get(&end.port))
            {
                port.detach(socket);
            }
        }
        if let Some(end) = socket.src() {
            if let Some(port) = self
                .get_process(&end.node)
                .and_then(|process| process.component)
                .and_then(|component| component.out_ports().get(&end.port))
            {
                port.detach(socket);
            }
        }
        self.connections
            .borrow_mut()
            .retain(|candidate| !Rc::ptr_eq(candidate, socket));
    }

    /// Wire an initial packet: a socket attached only to the target port,
    /// queued for the next `send_initials` dispatch.
    pub async fn add_initial(self: &Rc<Self>, data: Value, tgt: Endpoint) -> Result<()> {
        let socket = InternalSocket::new();
        self.subscribe_socket(&socket);

        let to = self.get_process(&tgt.node).ok_or_else(|| {
            FlowError::Network(format!("no process defined for inbound node '{}'", tgt.node))
        })?;
        let component = to.component.clone().ok_or_else(|| {
            FlowError::Network(format!("no component defined for inbound node '{}'", tgt.node))
        })?;
        if !(component.ready() || component.in_ports().contains(&tgt.port)) {
            when_ready(&component).await;
        }

        self.connect_port(&socket, &to, &tgt.port, tgt.index, true)?;

        self.connections.borrow_mut().push(Rc::clone(&socket));
        self.initials.borrow_mut().push(InitialPacket { socket, data });
        Ok(())
    }

    /// Drop wired initials for a target, queued or already sent.
    pub fn remove_initial(&self, tgt: &Endpoint) {
        let matching: Vec<Rc<InternalSocket>> = self
            .connections
            .borrow()
            .iter()
            .filter(|socket| {
                socket.src().is_none()
                    && socket
                        .tgt()
                        .map(|end| end.node == tgt.node && end.port == tgt.port)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();

        for socket in matching {
            self.initials
                .borrow_mut()
                .retain(|initial| !Rc::ptr_eq(&initial.socket, &socket));
            self.detach_socket(&socket);
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Re-emit every socket event on the network with the socket identity
    /// attached; connect/disconnect drive the activity counter.
    fn subscribe_socket(self: &Rc<Self>, socket: &Rc<InternalSocket>) {
        let network = Rc::downgrade(self);
        let socket_ref = Rc::downgrade(socket);
        socket.events().on_any(move |event: &SocketEvent| {
            let (Some(network), Some(socket)) = (network.upgrade(), socket_ref.upgrade()) else {
                return;
            };
            match event {
                SocketEvent::Connect => network.increase_connections(),
                SocketEvent::Disconnect => network.decrease_connections(),
                _ => {}
            }
            network.events.emit(NetworkEvent::Socket(SocketPayload {
                event: event.clone(),
                id: socket.id(),
                src: socket.src(),
                tgt: socket.tgt(),
                subgraph: Vec::new(),
            }));
        });
    }

    fn increase_connections(&self) {
        if self.connection_count.get() == 0 && !self.running.get() {
            // Latch before emitting so the IIP burst cannot double-start.
            self.running.set(true);
            self.events.emit(NetworkEvent::Start {
                start: *self.startup.borrow(),
            });
        }
        self.connection_count.set(self.connection_count.get() + 1);
    }

    fn decrease_connections(self: &Rc<Self>) {
        let count = self.connection_count.get().saturating_sub(1);
        self.connection_count.set(count);
        if count == 0 {
            let network = Rc::downgrade(self);
            self.end_debounce.call(move || {
                if let Some(network) = network.upgrade() {
                    network.emit_end();
                }
            });
        }
    }

    fn emit_end(&self) {
        if self.connection_count.get() > 0 || !self.running.get() {
            return;
        }
        self.running.set(false);
        let start = *self.startup.borrow();
        let end = Utc::now();
        let uptime = (end - start).num_milliseconds() as f64 / 1000.0;
        self.events.emit(NetworkEvent::End { start, end, uptime });
    }

    /// Forward a nested network's traffic with the inner node id prepended
    /// to the subgraph breadcrumb. Deferred until the subgraph is ready.
    fn subscribe_subgraph(self: &Rc<Self>, process: &Process) {
        let Some(component) = process.component.clone() else {
            return;
        };

        if !component.ready() {
            let network = Rc::downgrade(self);
            let process = process.clone();
            component.events().once("ready", move |_| {
                if let Some(network) = network.upgrade() {
                    network.subscribe_subgraph(&process);
                }
            });
            return;
        }

        let Some(inner) = component.network() else {
            return;
        };

        let network = Rc::downgrade(self);
        let node_id = process.id.clone();
        inner.events().on_any(move |event: &NetworkEvent| {
            let Some(network) = network.upgrade() else {
                return;
            };
            let NetworkEvent::Socket(payload) = event else {
                return;
            };
            match payload.event {
                SocketEvent::Connect => network.increase_connections(),
                SocketEvent::Disconnect => network.decrease_connections(),
                _ => {}
            }
            let mut payload = payload.clone();
            payload.subgraph.insert(0, node_id.clone());
            network.events.emit(NetworkEvent::Socket(payload));
        });
    }

    /// Forward component icon changes as network `icon` events.
    fn subscribe_node(self: &Rc<Self>, process: &Process) {
        let Some(component) = process.component.clone() else {
            return;
        };
        let network = Rc::downgrade(self);
        let id = process.id.clone();
        component.events().on("icon", move |event: &ComponentEvent| {
            if let (Some(network), ComponentEvent::Icon { icon }) = (network.upgrade(), event) {
                network.events.emit(NetworkEvent::Icon {
                    id: id.clone(),
                    icon: icon.clone(),
                });
            }
        });
    }

    // =========================================================================
    // Live graph reconciliation
    // =========================================================================

    /// Map graph mutation events onto the serialized op queue. Installed
    /// after initial wiring so bring-up never interleaves with edits.
    fn subscribe_graph(self: &Rc<Self>) {
        let network = Rc::downgrade(self);
        self.graph.events().on_any(move |event: &GraphEvent| {
            let Some(network) = network.upgrade() else {
                return;
            };
            let op = match event {
                GraphEvent::AddNode { node } => GraphOp::AddNode {
                    id: node.id.clone(),
                    component: node.component.clone(),
                    metadata: node.metadata.clone(),
                },
                GraphEvent::RemoveNode { node } => GraphOp::RemoveNode {
                    id: node.id.clone(),
                },
                GraphEvent::RenameNode { old, new } => GraphOp::RenameNode {
                    old: old.clone(),
                    new: new.clone(),
                },
                GraphEvent::AddEdge { edge } => GraphOp::AddEdge {
                    src: edge.src.clone(),
                    tgt: edge.tgt.clone(),
                },
                GraphEvent::RemoveEdge { edge } => GraphOp::RemoveEdge {
                    src: edge.src.clone(),
                    tgt: edge.tgt.clone(),
                },
                GraphEvent::AddInitial { initial } => GraphOp::AddInitial {
                    data: initial.data.clone(),
                    tgt: initial.tgt.clone(),
                },
                GraphEvent::RemoveInitial { initial } => GraphOp::RemoveInitial {
                    tgt: initial.tgt.clone(),
                },
                _ => return,
            };
            network.register_op(op);
        });
    }

    fn register_op(self: &Rc<Self>, op: GraphOp) {
        self.ops.borrow_mut().push_back(op);
        if !self.processing_ops.get() {
            self.processing_ops.set(true);
            let network = Rc::clone(self);
            tokio::task::spawn_local(async move {
                network.process_ops().await;
            });
        }
    }

    /// Drain the op queue one at a time; failures are logged and processing
    /// continues with the next operation.
    async fn process_ops(self: &Rc<Self>) {
        loop {
            let op = self.ops.borrow_mut().pop_front();
            let Some(op) = op else {
                break;
            };
            if let Err(err) = self.apply_op(op).await {
                error!("graph reconciliation failed: {err}");
            }
        }
        self.processing_ops.set(false);
    }

    async fn apply_op(self: &Rc<Self>, op: GraphOp) -> Result<()> {
        match op {
            GraphOp::AddNode {
                id,
                component,
                metadata,
            } => {
                self.add_process(&id, Some(&component), metadata).await?;
            }
            GraphOp::RemoveNode { id } => self.remove_process(&id),
            GraphOp::RenameNode { old, new } => self.rename_process(&old, &new),
            GraphOp::AddEdge { src, tgt } => self.add_connection(src, tgt).await?,
            GraphOp::RemoveEdge { src, tgt } => self.remove_connection(Some(&src), &tgt),
            GraphOp::AddInitial { data, tgt } => {
                self.add_initial(data, tgt).await?;
                // Initials added to a started network go out right away.
                self.send_initials();
            }
            GraphOp::RemoveInitial { tgt } => self.remove_initial(&tgt),
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start(self: &Rc<Self>) {
        self.send_initials();
    }

    /// Dispatch queued initial packets on the next scheduler tick: each runs
    /// `connect → send → disconnect`, and the queue drains exactly once.
    pub fn send_initials(self: &Rc<Self>) {
        let network = Rc::clone(self);
        scheduler::next_tick(move || {
            let pending: Vec<InitialPacket> = network.initials.borrow_mut().drain(..).collect();
            for initial in pending {
                initial.socket.connect();
                initial.socket.send(initial.data.clone());
                initial.socket.disconnect();
            }
        });
    }

    /// Disconnect every connected socket, then shut each component down.
    pub fn stop(&self) {
        let sockets = self.connections();
        for socket in sockets {
            if socket.connected() {
                socket.disconnect();
            }
        }
        let processes = self.processes();
        for process in processes {
            if let Some(component) = &process.component {
                component.shutdown();
            }
        }
    }
}
