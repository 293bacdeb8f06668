// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod component;
pub mod error;
pub mod events;
pub mod graph;
pub mod network;
pub mod ports;
pub mod registry;
pub mod scheduler;
pub mod socket;

pub use component::{Component, ComponentOptions};
pub use error::{FlowError, Result};
pub use events::{Event, EventEmitter, ListenerId};
pub use graph::{Graph, GraphEvent};
pub use network::{Network, NetworkEvent};
pub use ports::{InPort, OutPort, PortOptions};
pub use registry::ComponentLoader;
pub use socket::{InternalSocket, SocketEvent};
