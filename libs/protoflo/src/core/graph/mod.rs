// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Transactional, observable graph model.
//!
//! A [`Graph`] is an identifiable collection of nodes, edges, initial
//! information packets, exported ports and named groups. Every mutation runs
//! under a transaction (implicit when none is open) and emits a verb event
//! (`addNode`, `removeEdge`, …) on the graph's emitter, which the network
//! and the control protocol subscribe to.

mod events;
mod graph;
mod json;
mod types;

pub use events::GraphEvent;
pub use graph::Graph;
pub use json::{load_file, load_json};
pub use types::{
    Edge, Endpoint, ExportedPort, Group, Initial, LegacyExport, Metadata, Node, Transaction,
    apply_metadata_patch,
};

#[cfg(test)]
mod graph_tests;
