// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The `runtime` sub-protocol: runtime identification.

use std::rc::Rc;

use serde_json::{Value, json};

use crate::core::error::{FlowError, Result};
use crate::server::transport::{ClientContext, Transport};

pub struct RuntimeProtocol;

impl RuntimeProtocol {
    pub fn new() -> Self {
        Self
    }

    pub fn receive(&self, command: &str, _payload: &Value, ctx: &Rc<ClientContext>) -> Result<()> {
        match command {
            "getruntime" => {
                ctx.send(
                    "runtime",
                    "runtime",
                    json!({
                        "type": "protoflo",
                        "version": Transport::VERSION,
                        "capabilities": [
                            "protocol:graph",
                            "protocol:component",
                            "protocol:network",
                        ],
                    }),
                );
                Ok(())
            }
            other => Err(FlowError::Protocol(format!(
                "unknown runtime command '{other}'"
            ))),
        }
    }
}

impl Default for RuntimeProtocol {
    fn default() -> Self {
        Self::new()
    }
}
