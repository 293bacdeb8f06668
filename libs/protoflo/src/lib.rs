// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! ProtoFlo, a flow-based programming runtime.
//!
//! ProtoFlo executes graphs: directed networks of stateful component
//! instances exchanging discrete information packets over unidirectional
//! connections. The runtime speaks the NoFlo runtime protocol (v0.5) over
//! WebSocket, so a live-editing UI can introspect components, mutate a graph
//! while it runs, start and stop execution, and observe per-packet flow.
//!
//! The crate is organized as:
//! - [`core`]: graph model, ports and sockets, component contract,
//!   component registry, and the network runtime.
//! - [`components`]: the bundled component collections (`core`, `math`,
//!   `casts`).
//! - [`server`]: the control protocol dispatcher and the WebSocket
//!   transport.

pub mod components;
pub mod core;
pub mod server;

pub use core::component::{Component, ComponentOptions};
pub use core::error::{FlowError, Result};
pub use core::events::{Event, EventEmitter, ListenerId};
pub use core::graph::{Graph, GraphEvent};
pub use core::network::{Network, NetworkEvent};
pub use core::ports::{InPort, OutPort, PortOptions};
pub use core::registry::ComponentLoader;
pub use core::socket::{InternalSocket, SocketEvent};
