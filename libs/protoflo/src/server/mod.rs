// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The control protocol surface.
//!
//! Clients speak the NoFlo runtime protocol (v0.5): JSON envelopes
//! `{protocol, command, payload}` over a message-framed duplex transport.
//! [`transport`] defines the envelope and per-client context, [`protocol`]
//! the four sub-protocols, and [`ws`] the WebSocket endpoint plus the bridge
//! into the single-threaded engine.

pub mod protocol;
pub mod transport;
pub mod ws;

pub use transport::{ClientContext, Envelope, Transport};
