// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Core components: Kick, Drop, Output.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::core::component::Component;
use crate::core::error::Result;
use crate::core::ports::PortOptions;
use crate::core::registry::ComponentEntry;
use crate::core::socket::SocketEvent;

pub fn components() -> Vec<(&'static str, ComponentEntry)> {
    vec![
        ("Kick", ComponentEntry::Factory(kick)),
        ("Drop", ComponentEntry::Factory(drop_packets)),
        ("Output", ComponentEntry::Factory(output)),
        ("Graph", ComponentEntry::Factory(graph)),
    ]
}

/// The subgraph runner: receives a graph definition on its `graph` inport
/// and executes it as a nested network.
pub fn graph() -> Result<Rc<Component>> {
    crate::core::network::subgraph::component()
}

#[derive(Default)]
struct KickState {
    packet: Option<Value>,
    packet_groups: Vec<String>,
    groups: Vec<String>,
}

/// Generates a single packet and sends it to the output port on
/// disconnect. Mostly usable for debugging, but also handy for starting up
/// networks.
pub fn kick() -> Result<Rc<Component>> {
    let component = Component::builder()
        .description(
            "This component generates a single packet and sends it to the \
             output port. Mostly usable for debugging, but can also be \
             useful for starting up networks.",
        )
        .icon("share")
        .in_port(
            "in",
            PortOptions::new("bang").description("Signal to send the data packet"),
        )
        .in_port("data", PortOptions::new("all").description("Packet to be sent"))
        .out_port("out", PortOptions::new("all"))
        .build();

    let state = Rc::new(RefCell::new(KickState::default()));
    let in_port = component.in_ports().get("in").expect("kick declares 'in'");
    let data_port = component
        .in_ports()
        .get("data")
        .expect("kick declares 'data'");
    let out_port = component
        .out_ports()
        .get("out")
        .expect("kick declares 'out'");

    {
        let state = Rc::clone(&state);
        in_port.on("begingroup", move |event| {
            if let SocketEvent::BeginGroup { group } = event {
                state.borrow_mut().groups.push(group.clone());
            }
        });
    }
    {
        let state = Rc::clone(&state);
        in_port.on("endgroup", move |_| {
            state.borrow_mut().groups.pop();
        });
    }
    {
        let state = Rc::clone(&state);
        in_port.on("data", move |_| {
            let mut state = state.borrow_mut();
            let groups = state.groups.clone();
            state.packet_groups = groups;
        });
    }
    {
        let state = Rc::clone(&state);
        let out_port = Rc::clone(&out_port);
        in_port.on("disconnect", move |_| {
            let (packet, groups) = {
                let state = state.borrow();
                (state.packet.clone(), state.packet_groups.clone())
            };
            for group in &groups {
                out_port.begin_group(group);
            }
            out_port.send(packet.unwrap_or(Value::Null));
            for _ in &groups {
                out_port.end_group();
            }
            out_port.disconnect();
            state.borrow_mut().groups.clear();
        });
    }
    {
        let state = Rc::clone(&state);
        data_port.on("data", move |event| {
            if let SocketEvent::Data { data } = event {
                state.borrow_mut().packet = Some(data.clone());
            }
        });
    }

    Ok(component)
}

/// Drops every packet it receives with no action.
pub fn drop_packets() -> Result<Rc<Component>> {
    let component = Component::builder()
        .description("This component drops every packet it receives with no action")
        .icon("trash-o")
        .in_port(
            "in",
            PortOptions::new("all").description("Packet to be dropped"),
        )
        .build();
    Ok(component)
}

/// Prints incoming packets to the console and forwards them when the
/// outport is attached.
pub fn output() -> Result<Rc<Component>> {
    let component = Component::builder()
        .description(
            "This component receives input on a single inport, and sends \
             the data items directly to the console",
        )
        .icon("bug")
        .in_port(
            "in",
            PortOptions::new("all").description("Packet to be printed through the console"),
        )
        .out_port("out", PortOptions::new("all"))
        .build();

    let in_port = component.in_ports().get("in").expect("output declares 'in'");
    let out_port = component
        .out_ports()
        .get("out")
        .expect("output declares 'out'");

    {
        let out_port = Rc::clone(&out_port);
        in_port.on("data", move |event| {
            if let SocketEvent::Data { data } = event {
                println!("{data}");
                if out_port.attached() {
                    out_port.send(data.clone());
                }
            }
        });
    }
    {
        let out_port = Rc::clone(&out_port);
        in_port.on("disconnect", move |_| {
            if out_port.attached() {
                out_port.disconnect();
            }
        });
    }

    Ok(component)
}
