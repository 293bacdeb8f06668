// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Graph mutation events.
//!
//! One tagged variant per verb event the graph can emit. The control
//! protocol forwards most of these to clients verbatim, so variant names
//! follow the wire vocabulary.

use super::types::{Edge, Group, Initial, LegacyExport, Metadata, Node};
use crate::core::events::Event;

#[derive(Debug, Clone)]
pub enum GraphEvent {
    StartTransaction { id: String, metadata: Metadata },
    EndTransaction { id: String, metadata: Metadata },
    ChangeProperties { new: Metadata, old: Metadata },

    AddNode { node: Node },
    RemoveNode { node: Node },
    RenameNode { old: String, new: String },
    ChangeNode { node: Node, old: Metadata },

    AddEdge { edge: Edge },
    RemoveEdge { edge: Edge },
    ChangeEdge { edge: Edge, old: Metadata },

    AddInitial { initial: Initial },
    RemoveInitial { initial: Initial },

    AddInport { public: String, port: super::types::ExportedPort },
    RemoveInport { public: String, port: super::types::ExportedPort },
    RenameInport { old: String, new: String },
    ChangeInport { public: String, port: super::types::ExportedPort, old: Metadata },

    AddOutport { public: String, port: super::types::ExportedPort },
    RemoveOutport { public: String, port: super::types::ExportedPort },
    RenameOutport { old: String, new: String },
    ChangeOutport { public: String, port: super::types::ExportedPort, old: Metadata },

    AddExport { export: LegacyExport },
    RemoveExport { export: LegacyExport },

    AddGroup { group: Group },
    RemoveGroup { group: Group },
    RenameGroup { old: String, new: String },
    ChangeGroup { group: Group, old: Metadata },
}

impl Event for GraphEvent {
    fn name(&self) -> &'static str {
        match self {
            GraphEvent::StartTransaction { .. } => "startTransaction",
            GraphEvent::EndTransaction { .. } => "endTransaction",
            GraphEvent::ChangeProperties { .. } => "changeProperties",
            GraphEvent::AddNode { .. } => "addNode",
            GraphEvent::RemoveNode { .. } => "removeNode",
            GraphEvent::RenameNode { .. } => "renameNode",
            GraphEvent::ChangeNode { .. } => "changeNode",
            GraphEvent::AddEdge { .. } => "addEdge",
            GraphEvent::RemoveEdge { .. } => "removeEdge",
            GraphEvent::ChangeEdge { .. } => "changeEdge",
            GraphEvent::AddInitial { .. } => "addInitial",
            GraphEvent::RemoveInitial { .. } => "removeInitial",
            GraphEvent::AddInport { .. } => "addInport",
            GraphEvent::RemoveInport { .. } => "removeInport",
            GraphEvent::RenameInport { .. } => "renameInport",
            GraphEvent::ChangeInport { .. } => "changeInport",
            GraphEvent::AddOutport { .. } => "addOutport",
            GraphEvent::RemoveOutport { .. } => "removeOutport",
            GraphEvent::RenameOutport { .. } => "renameOutport",
            GraphEvent::ChangeOutport { .. } => "changeOutport",
            GraphEvent::AddExport { .. } => "addExport",
            GraphEvent::RemoveExport { .. } => "removeExport",
            GraphEvent::AddGroup { .. } => "addGroup",
            GraphEvent::RemoveGroup { .. } => "removeGroup",
            GraphEvent::RenameGroup { .. } => "renameGroup",
            GraphEvent::ChangeGroup { .. } => "changeGroup",
        }
    }
}
