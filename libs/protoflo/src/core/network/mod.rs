// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The network: runtime incarnation of a graph.
//!
//! A network instantiates one process per node, wires internal sockets for
//! edges and initial packets, observes all socket traffic, tracks an
//! activity counter that drives `start`/`end`, and reconciles live graph
//! edits through a serialized FIFO worker.

mod network;
pub mod subgraph;

pub use network::{Network, NetworkEvent, Process, SocketPayload};
