// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Value types stored in the graph's collections.
//!
//! All of these are plain cloneable data; events carry copies, so listeners
//! never hold references into the graph's interior.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata mapping attached to nodes, edges, ports and groups.
pub type Metadata = serde_json::Map<String, Value>;

/// Apply a metadata patch: keys with a `null` value are deleted, all other
/// keys are overwritten.
pub fn apply_metadata_patch(target: &mut Metadata, patch: &Metadata) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// A node of the graph: a named instance of a registered component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub component: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One end of an edge, or the target of an initial packet. `index` selects a
/// slot on an addressable port; `None` means non-addressable (or
/// first-available when attaching).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl Endpoint {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
            index: None,
        }
    }

    pub fn with_index(node: impl Into<String>, port: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
            index,
        }
    }
}

/// A connection between an outport slot and an inport slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: Endpoint,
    pub tgt: Endpoint,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An initial information packet: data delivered once at network start (or
/// when added to a running network), without an upstream process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initial {
    pub data: Value,
    pub tgt: Endpoint,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An exported port entry: exposes an internal port of some node under a
/// public name, so the graph itself can act as a subgraph component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPort {
    pub process: String,
    pub port: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Legacy exported-port entry (pre-split `exports` list). Kept for
/// round-tripping old graph files; new graphs use inports/outports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyExport {
    pub public: String,
    pub process: String,
    pub port: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A named annotation grouping a loose set of node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub nodes: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Transaction state: at most one non-implicit transaction at a time, with
/// nested implicit mutations tracked by depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Option<String>,
    pub depth: u32,
}

impl Transaction {
    pub const IMPLICIT: &'static str = "implicit";

    pub fn idle() -> Self {
        Self { id: None, depth: 0 }
    }
}
