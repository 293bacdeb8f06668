// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The four sub-protocols of the runtime protocol.

pub mod component;
pub mod graph;
pub mod network;
pub mod runtime;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::error::{FlowError, Result};

/// Decode a request payload; missing required fields surface as protocol
/// errors.
pub(crate) fn parse<T: DeserializeOwned>(payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|err| FlowError::Protocol(format!("invalid payload: {err}")))
}
