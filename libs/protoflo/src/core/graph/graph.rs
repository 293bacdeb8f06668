// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The graph: an observable, transactional collection of nodes, edges,
//! initial packets, exported ports and groups.
//!
//! State lives behind a single `RefCell` while the event emitter sits
//! outside it, so every mutation releases its borrow before listeners run.
//! Listeners may therefore re-enter the graph (the network's live-edit
//! reconciliation and the protocol handlers both do).
//!
//! Invariants:
//! - every edge endpoint and initial target references an existing node
//! - every exported-port entry references an existing node
//! - group node lists may be loose (orphan names permitted)
//! - at most one non-implicit transaction is active at a time

use std::cell::RefCell;
use std::rc::Rc;

use super::events::GraphEvent;
use super::types::{
    Edge, Endpoint, ExportedPort, Group, Initial, LegacyExport, Metadata, Node, Transaction,
    apply_metadata_patch,
};
use crate::core::error::{FlowError, Result};
use crate::core::events::EventEmitter;

pub(super) struct GraphState {
    pub name: String,
    pub properties: Metadata,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub initials: Vec<Initial>,
    pub exports: Vec<LegacyExport>,
    pub inports: Vec<(String, ExportedPort)>,
    pub outports: Vec<(String, ExportedPort)>,
    pub groups: Vec<Group>,
    pub transaction: Transaction,
}

/// Which of the two exported-port collections an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortScope {
    In,
    Out,
}

pub struct Graph {
    events: EventEmitter<GraphEvent>,
    state: RefCell<GraphState>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            events: EventEmitter::new(),
            state: RefCell::new(GraphState {
                name: name.into(),
                properties: Metadata::new(),
                nodes: Vec::new(),
                edges: Vec::new(),
                initials: Vec::new(),
                exports: Vec::new(),
                inports: Vec::new(),
                outports: Vec::new(),
                groups: Vec::new(),
                transaction: Transaction::idle(),
            }),
        })
    }

    pub fn events(&self) -> &EventEmitter<GraphEvent> {
        &self.events
    }

    pub fn name(&self) -> String {
        self.state.borrow().name.clone()
    }

    pub fn properties(&self) -> Metadata {
        self.state.borrow().properties.clone()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.state.borrow().nodes.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.state.borrow().edges.clone()
    }

    pub fn initials(&self) -> Vec<Initial> {
        self.state.borrow().initials.clone()
    }

    pub fn exports(&self) -> Vec<LegacyExport> {
        self.state.borrow().exports.clone()
    }

    pub fn inports(&self) -> Vec<(String, ExportedPort)> {
        self.state.borrow().inports.clone()
    }

    pub fn outports(&self) -> Vec<(String, ExportedPort)> {
        self.state.borrow().outports.clone()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.state.borrow().groups.clone()
    }

    pub fn transaction(&self) -> Transaction {
        self.state.borrow().transaction.clone()
    }

    pub(super) fn with_state<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
        f(&self.state.borrow())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn start_transaction(&self, id: &str, metadata: Option<Metadata>) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.transaction.id.is_some() {
                return Err(FlowError::Graph("nested transactions not supported".into()));
            }
            state.transaction.id = Some(id.to_string());
            state.transaction.depth = 1;
        }
        self.events.emit(GraphEvent::StartTransaction {
            id: id.to_string(),
            metadata: metadata.unwrap_or_default(),
        });
        Ok(())
    }

    pub fn end_transaction(&self, id: &str, metadata: Option<Metadata>) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.transaction.id.is_none() {
                return Err(FlowError::Graph(
                    "attempted to end non-existing transaction".into(),
                ));
            }
            state.transaction.id = None;
            state.transaction.depth = 0;
        }
        self.events.emit(GraphEvent::EndTransaction {
            id: id.to_string(),
            metadata: metadata.unwrap_or_default(),
        });
        Ok(())
    }

    fn check_transaction_start(&self) {
        enum Action {
            Open,
            Nest,
            None,
        }
        let action = {
            let state = self.state.borrow();
            match state.transaction.id.as_deref() {
                None => Action::Open,
                Some(Transaction::IMPLICIT) => Action::Nest,
                Some(_) => Action::None,
            }
        };
        match action {
            // Cannot fail: we just observed no active transaction.
            Action::Open => {
                let _ = self.start_transaction(Transaction::IMPLICIT, None);
            }
            Action::Nest => self.state.borrow_mut().transaction.depth += 1,
            Action::None => {}
        }
    }

    fn check_transaction_end(&self) {
        let close = {
            let mut state = self.state.borrow_mut();
            if state.transaction.id.as_deref() == Some(Transaction::IMPLICIT) {
                state.transaction.depth -= 1;
            }
            state.transaction.depth == 0 && state.transaction.id.is_some()
        };
        if close {
            let _ = self.end_transaction(Transaction::IMPLICIT, None);
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Merge `properties` into the graph's property map.
    pub fn set_properties(&self, properties: Metadata) {
        self.check_transaction_start();
        let (new, old) = {
            let mut state = self.state.borrow_mut();
            let old = state.properties.clone();
            for (key, value) in properties {
                state.properties.insert(key, value);
            }
            (state.properties.clone(), old)
        };
        self.events.emit(GraphEvent::ChangeProperties { new, old });
        self.check_transaction_end();
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Add a node. Node ids are unique within the graph; adding an existing
    /// id is a no-op returning the existing node.
    pub fn add_node(&self, id: &str, component: &str, metadata: Option<Metadata>) -> Node {
        if let Some(existing) = self.get_node(id) {
            return existing;
        }

        self.check_transaction_start();
        let node = Node {
            id: id.to_string(),
            component: component.to_string(),
            metadata: metadata.unwrap_or_default(),
        };
        self.state.borrow_mut().nodes.push(node.clone());
        self.events.emit(GraphEvent::AddNode { node: node.clone() });
        self.check_transaction_end();
        node
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.state
            .borrow()
            .nodes
            .iter()
            .find(|node| node.id == id)
            .cloned()
    }

    /// Remove a node and everything referencing it: edges, initials, legacy
    /// exports, exported ports, and group memberships. One transaction, one
    /// `removeNode` event.
    pub fn remove_node(&self, id: &str) {
        let Some(node) = self.get_node(id) else {
            return;
        };

        self.check_transaction_start();

        self.remove_edge(id, None, None, None);
        self.remove_initial(id, None);

        let legacy: Vec<String> = self
            .state
            .borrow()
            .exports
            .iter()
            .filter(|export| export.process.eq_ignore_ascii_case(id))
            .map(|export| export.public.clone())
            .collect();
        for public in legacy {
            self.remove_export(&public);
        }

        self.remove_exported_ports_of_node(PortScope::In, id);
        self.remove_exported_ports_of_node(PortScope::Out, id);
        self.remove_node_from_groups(id);

        self.set_node_metadata(id, Metadata::new());

        self.state.borrow_mut().nodes.retain(|node| node.id != id);
        self.events.emit(GraphEvent::RemoveNode { node });

        self.check_transaction_end();
    }

    /// Rename a node, rewriting every referencing edge, initial, export and
    /// group atomically. Emits a single `renameNode` event.
    pub fn rename_node(&self, old: &str, new: &str) {
        if self.get_node(old).is_none() {
            return;
        }

        self.check_transaction_start();
        {
            let mut state = self.state.borrow_mut();
            if let Some(node) = state.nodes.iter_mut().find(|node| node.id == old) {
                node.id = new.to_string();
            }
            for edge in &mut state.edges {
                if edge.src.node == old {
                    edge.src.node = new.to_string();
                }
                if edge.tgt.node == old {
                    edge.tgt.node = new.to_string();
                }
            }
            for initial in &mut state.initials {
                if initial.tgt.node == old {
                    initial.tgt.node = new.to_string();
                }
            }
            for export in &mut state.exports {
                if export.process == old {
                    export.process = new.to_string();
                }
            }
            for (_, port) in &mut state.inports {
                if port.process == old {
                    port.process = new.to_string();
                }
            }
            for (_, port) in &mut state.outports {
                if port.process == old {
                    port.process = new.to_string();
                }
            }
            for group in &mut state.groups {
                for node in &mut group.nodes {
                    if node == old {
                        *node = new.to_string();
                    }
                }
            }
        }
        self.events.emit(GraphEvent::RenameNode {
            old: old.to_string(),
            new: new.to_string(),
        });
        self.check_transaction_end();
    }

    /// Patch a node's metadata: `null` values delete keys, others overwrite.
    pub fn set_node_metadata(&self, id: &str, metadata: Metadata) {
        if self.get_node(id).is_none() {
            return;
        }

        self.check_transaction_start();
        let changed = {
            let mut state = self.state.borrow_mut();
            state.nodes.iter_mut().find(|node| node.id == id).map(|node| {
                let old = node.metadata.clone();
                apply_metadata_patch(&mut node.metadata, &metadata);
                (node.clone(), old)
            })
        };
        if let Some((node, old)) = changed {
            self.events.emit(GraphEvent::ChangeNode { node, old });
        }
        self.check_transaction_end();
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Connect an outport to an inport. Duplicate edges (same src/tgt
    /// node+port) are rejected silently.
    pub fn add_edge(
        &self,
        src_node: &str,
        src_port: &str,
        tgt_node: &str,
        tgt_port: &str,
        metadata: Option<Metadata>,
    ) -> Option<Edge> {
        let duplicate = self.state.borrow().edges.iter().any(|edge| {
            edge.src.node == src_node
                && edge.src.port == src_port
                && edge.tgt.node == tgt_node
                && edge.tgt.port == tgt_port
        });
        if duplicate {
            return None;
        }

        self.add_edge_index(src_node, src_port, None, tgt_node, tgt_port, None, metadata)
    }

    /// Connect with explicit slot indices for addressable ports. Unknown
    /// endpoint nodes reject the edge.
    #[allow(clippy::too_many_arguments)]
    pub fn add_edge_index(
        &self,
        src_node: &str,
        src_port: &str,
        src_index: Option<usize>,
        tgt_node: &str,
        tgt_port: &str,
        tgt_index: Option<usize>,
        metadata: Option<Metadata>,
    ) -> Option<Edge> {
        if self.get_node(src_node).is_none() || self.get_node(tgt_node).is_none() {
            return None;
        }

        self.check_transaction_start();
        let edge = Edge {
            src: Endpoint::with_index(src_node, src_port, src_index),
            tgt: Endpoint::with_index(tgt_node, tgt_port, tgt_index),
            metadata: metadata.unwrap_or_default(),
        };
        self.state.borrow_mut().edges.push(edge.clone());
        self.events.emit(GraphEvent::AddEdge { edge: edge.clone() });
        self.check_transaction_end();
        Some(edge)
    }

    pub fn get_edge(&self, node: &str, port: &str, node2: &str, port2: &str) -> Option<Edge> {
        self.state
            .borrow()
            .edges
            .iter()
            .find(|edge| {
                edge.src.node == node
                    && edge.src.port == port
                    && edge.tgt.node == node2
                    && edge.tgt.port == port2
            })
            .cloned()
    }

    /// Disconnect edges. Three arities: full four-tuple, node+port on either
    /// end, or node only.
    pub fn remove_edge(
        &self,
        node: &str,
        port: Option<&str>,
        node2: Option<&str>,
        port2: Option<&str>,
    ) {
        self.check_transaction_start();

        let removed: Vec<Edge> = {
            let mut state = self.state.borrow_mut();
            let matches = |edge: &Edge| match (port, node2, port2) {
                (Some(port), Some(node2), Some(port2)) => {
                    edge.src.node == node
                        && edge.src.port == port
                        && edge.tgt.node == node2
                        && edge.tgt.port == port2
                }
                (Some(port), _, _) => {
                    (edge.src.node == node && edge.src.port == port)
                        || (edge.tgt.node == node && edge.tgt.port == port)
                }
                _ => edge.src.node == node || edge.tgt.node == node,
            };

            let (removed, kept): (Vec<Edge>, Vec<Edge>) =
                state.edges.drain(..).partition(|edge| matches(edge));
            state.edges = kept;
            removed
        };

        for edge in removed {
            self.events.emit(GraphEvent::RemoveEdge { edge });
        }

        self.check_transaction_end();
    }

    pub fn set_edge_metadata(
        &self,
        node: &str,
        port: &str,
        node2: &str,
        port2: &str,
        metadata: Metadata,
    ) {
        if self.get_edge(node, port, node2, port2).is_none() {
            return;
        }

        self.check_transaction_start();
        let changed = {
            let mut state = self.state.borrow_mut();
            state
                .edges
                .iter_mut()
                .find(|edge| {
                    edge.src.node == node
                        && edge.src.port == port
                        && edge.tgt.node == node2
                        && edge.tgt.port == port2
                })
                .map(|edge| {
                    let old = edge.metadata.clone();
                    apply_metadata_patch(&mut edge.metadata, &metadata);
                    (edge.clone(), old)
                })
        };
        if let Some((edge, old)) = changed {
            self.events.emit(GraphEvent::ChangeEdge { edge, old });
        }
        self.check_transaction_end();
    }

    // =========================================================================
    // Initials (IIPs)
    // =========================================================================

    /// Queue an initial information packet for a node inport.
    pub fn add_initial(
        &self,
        data: serde_json::Value,
        node: &str,
        port: &str,
        metadata: Option<Metadata>,
    ) -> Option<Initial> {
        self.add_initial_index(data, node, port, None, metadata)
    }

    pub fn add_initial_index(
        &self,
        data: serde_json::Value,
        node: &str,
        port: &str,
        index: Option<usize>,
        metadata: Option<Metadata>,
    ) -> Option<Initial> {
        if self.get_node(node).is_none() {
            return None;
        }

        self.check_transaction_start();
        let initial = Initial {
            data,
            tgt: Endpoint::with_index(node, port, index),
            metadata: metadata.unwrap_or_default(),
        };
        self.state.borrow_mut().initials.push(initial.clone());
        self.events.emit(GraphEvent::AddInitial {
            initial: initial.clone(),
        });
        self.check_transaction_end();
        Some(initial)
    }

    /// Remove initials targeting a node, or a specific node inport.
    pub fn remove_initial(&self, node: &str, port: Option<&str>) {
        self.check_transaction_start();

        let removed: Vec<Initial> = {
            let mut state = self.state.borrow_mut();
            let matches = |initial: &Initial| match port {
                Some(port) => initial.tgt.node == node && initial.tgt.port == port,
                None => initial.tgt.node == node,
            };
            let (removed, kept): (Vec<Initial>, Vec<Initial>) =
                state.initials.drain(..).partition(|initial| matches(initial));
            state.initials = kept;
            removed
        };

        for initial in removed {
            self.events.emit(GraphEvent::RemoveInitial { initial });
        }

        self.check_transaction_end();
    }

    // =========================================================================
    // Legacy exports
    // =========================================================================

    /// Add a legacy exported-port entry. Unknown nodes are rejected.
    pub fn add_export(&self, public: &str, node: &str, port: &str, metadata: Option<Metadata>) {
        if self.get_node(node).is_none() {
            return;
        }

        self.check_transaction_start();
        let export = LegacyExport {
            public: public.to_lowercase(),
            process: node.to_string(),
            port: port.to_string(),
            metadata: metadata.unwrap_or_default(),
        };
        self.state.borrow_mut().exports.push(export.clone());
        self.events.emit(GraphEvent::AddExport { export });
        self.check_transaction_end();
    }

    pub fn remove_export(&self, public: &str) {
        let public = public.to_lowercase();
        let found = {
            let state = self.state.borrow();
            state
                .exports
                .iter()
                .find(|export| export.public == public)
                .cloned()
        };
        let Some(export) = found else {
            return;
        };

        self.check_transaction_start();
        self.state
            .borrow_mut()
            .exports
            .retain(|entry| entry.public != public);
        self.events.emit(GraphEvent::RemoveExport { export });
        self.check_transaction_end();
    }

    // =========================================================================
    // Exported inports / outports
    // =========================================================================

    pub fn add_inport(&self, public: &str, node: &str, port: &str, metadata: Option<Metadata>) {
        self.add_exported_port(PortScope::In, public, node, port, metadata);
    }

    pub fn remove_inport(&self, public: &str) {
        self.remove_exported_port(PortScope::In, public);
    }

    pub fn rename_inport(&self, old: &str, new: &str) {
        self.rename_exported_port(PortScope::In, old, new);
    }

    pub fn set_inport_metadata(&self, public: &str, metadata: Metadata) {
        self.set_exported_port_metadata(PortScope::In, public, metadata);
    }

    pub fn add_outport(&self, public: &str, node: &str, port: &str, metadata: Option<Metadata>) {
        self.add_exported_port(PortScope::Out, public, node, port, metadata);
    }

    pub fn remove_outport(&self, public: &str) {
        self.remove_exported_port(PortScope::Out, public);
    }

    pub fn rename_outport(&self, old: &str, new: &str) {
        self.rename_exported_port(PortScope::Out, old, new);
    }

    pub fn set_outport_metadata(&self, public: &str, metadata: Metadata) {
        self.set_exported_port_metadata(PortScope::Out, public, metadata);
    }

    fn scope_ports<'a>(
        state: &'a mut GraphState,
        scope: PortScope,
    ) -> &'a mut Vec<(String, ExportedPort)> {
        match scope {
            PortScope::In => &mut state.inports,
            PortScope::Out => &mut state.outports,
        }
    }

    fn add_exported_port(
        &self,
        scope: PortScope,
        public: &str,
        node: &str,
        port: &str,
        metadata: Option<Metadata>,
    ) {
        // Exported ports may only reference nodes that exist.
        if self.get_node(node).is_none() {
            return;
        }

        let public = public.to_lowercase();
        self.check_transaction_start();
        let entry = ExportedPort {
            process: node.to_string(),
            port: port.to_string(),
            metadata: metadata.unwrap_or_default(),
        };
        {
            let mut state = self.state.borrow_mut();
            let ports = Self::scope_ports(&mut state, scope);
            if let Some(existing) = ports.iter_mut().find(|(name, _)| *name == public) {
                existing.1 = entry.clone();
            } else {
                ports.push((public.clone(), entry.clone()));
            }
        }
        self.events.emit(match scope {
            PortScope::In => GraphEvent::AddInport { public, port: entry },
            PortScope::Out => GraphEvent::AddOutport { public, port: entry },
        });
        self.check_transaction_end();
    }

    fn remove_exported_port(&self, scope: PortScope, public: &str) {
        let public = public.to_lowercase();
        let found = {
            let state = self.state.borrow();
            let ports = match scope {
                PortScope::In => &state.inports,
                PortScope::Out => &state.outports,
            };
            ports
                .iter()
                .find(|(name, _)| *name == public)
                .map(|(_, port)| port.clone())
        };
        if found.is_none() {
            return;
        }

        self.check_transaction_start();
        self.set_exported_port_metadata(scope, &public, Metadata::new());
        let port = {
            let mut state = self.state.borrow_mut();
            let ports = Self::scope_ports(&mut state, scope);
            let position = ports.iter().position(|(name, _)| *name == public);
            position.map(|index| ports.remove(index).1)
        };
        if let Some(port) = port {
            self.events.emit(match scope {
                PortScope::In => GraphEvent::RemoveInport { public, port },
                PortScope::Out => GraphEvent::RemoveOutport { public, port },
            });
        }
        self.check_transaction_end();
    }

    fn rename_exported_port(&self, scope: PortScope, old: &str, new: &str) {
        let old = old.to_lowercase();
        let new = new.to_lowercase();
        let exists = {
            let state = self.state.borrow();
            let ports = match scope {
                PortScope::In => &state.inports,
                PortScope::Out => &state.outports,
            };
            ports.iter().any(|(name, _)| *name == old)
        };
        if !exists {
            return;
        }

        self.check_transaction_start();
        {
            let mut state = self.state.borrow_mut();
            let ports = Self::scope_ports(&mut state, scope);
            if let Some(entry) = ports.iter_mut().find(|(name, _)| *name == old) {
                entry.0 = new.clone();
            }
        }
        self.events.emit(match scope {
            PortScope::In => GraphEvent::RenameInport { old, new },
            PortScope::Out => GraphEvent::RenameOutport { old, new },
        });
        self.check_transaction_end();
    }

    fn set_exported_port_metadata(&self, scope: PortScope, public: &str, metadata: Metadata) {
        let public = public.to_lowercase();
        self.check_transaction_start();
        let changed = {
            let mut state = self.state.borrow_mut();
            let ports = Self::scope_ports(&mut state, scope);
            ports
                .iter_mut()
                .find(|(name, _)| *name == public)
                .map(|(_, port)| {
                    let old = port.metadata.clone();
                    apply_metadata_patch(&mut port.metadata, &metadata);
                    (port.clone(), old)
                })
        };
        if let Some((port, old)) = changed {
            self.events.emit(match scope {
                PortScope::In => GraphEvent::ChangeInport {
                    public,
                    port,
                    old,
                },
                PortScope::Out => GraphEvent::ChangeOutport {
                    public,
                    port,
                    old,
                },
            });
        }
        self.check_transaction_end();
    }

    fn remove_exported_ports_of_node(&self, scope: PortScope, node: &str) {
        let publics: Vec<String> = {
            let state = self.state.borrow();
            let ports = match scope {
                PortScope::In => &state.inports,
                PortScope::Out => &state.outports,
            };
            ports
                .iter()
                .filter(|(_, port)| port.process == node)
                .map(|(name, _)| name.clone())
                .collect()
        };
        for public in publics {
            self.remove_exported_port(scope, &public);
        }
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Add a named group. Group names are unique.
    pub fn add_group(
        &self,
        name: &str,
        nodes: Vec<String>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let exists = self
            .state
            .borrow()
            .groups
            .iter()
            .any(|group| group.name == name);
        if exists {
            return Err(FlowError::Graph(format!(
                "group with name '{name}' already exists"
            )));
        }

        self.check_transaction_start();
        let group = Group {
            name: name.to_string(),
            nodes,
            metadata: metadata.unwrap_or_default(),
        };
        self.state.borrow_mut().groups.push(group.clone());
        self.events.emit(GraphEvent::AddGroup { group });
        self.check_transaction_end();
        Ok(())
    }

    pub fn rename_group(&self, old: &str, new: &str) -> Result<()> {
        let clash = self
            .state
            .borrow()
            .groups
            .iter()
            .any(|group| group.name == new);
        if clash {
            return Err(FlowError::Graph(format!(
                "group with name '{new}' already exists"
            )));
        }

        self.check_transaction_start();
        let renamed = {
            let mut state = self.state.borrow_mut();
            match state.groups.iter_mut().find(|group| group.name == old) {
                Some(group) => {
                    group.name = new.to_string();
                    true
                }
                None => false,
            }
        };
        if renamed {
            self.events.emit(GraphEvent::RenameGroup {
                old: old.to_string(),
                new: new.to_string(),
            });
        }
        self.check_transaction_end();
        Ok(())
    }

    pub fn remove_group(&self, name: &str) {
        self.check_transaction_start();
        let exists = self
            .state
            .borrow()
            .groups
            .iter()
            .any(|group| group.name == name);
        if exists {
            self.set_group_metadata(name, Metadata::new());
            let group = {
                let mut state = self.state.borrow_mut();
                let position = state.groups.iter().position(|group| group.name == name);
                position.map(|index| state.groups.remove(index))
            };
            if let Some(group) = group {
                self.events.emit(GraphEvent::RemoveGroup { group });
            }
        }
        self.check_transaction_end();
    }

    pub fn set_group_metadata(&self, name: &str, metadata: Metadata) {
        self.check_transaction_start();
        let changed = {
            let mut state = self.state.borrow_mut();
            state
                .groups
                .iter_mut()
                .find(|group| group.name == name)
                .map(|group| {
                    let old = group.metadata.clone();
                    apply_metadata_patch(&mut group.metadata, &metadata);
                    (group.clone(), old)
                })
        };
        if let Some((group, old)) = changed {
            self.events.emit(GraphEvent::ChangeGroup { group, old });
        }
        self.check_transaction_end();
    }

    fn remove_node_from_groups(&self, node: &str) {
        let mut state = self.state.borrow_mut();
        for group in &mut state.groups {
            group.nodes.retain(|member| member != node);
        }
    }
}
