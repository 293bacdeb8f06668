// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Mathematical components: Add, Subtract, Multiply, Divide.
//!
//! Each component holds the latest packet of its primary inport together
//! with the group context it arrived in, recomputes whenever either operand
//! changes, and replays the group wrapping on the result port. A `clear`
//! bang resets both operands.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{Value, json};

use crate::core::component::Component;
use crate::core::error::{FlowError, Result};
use crate::core::ports::{OutPort, PortOptions};
use crate::core::registry::ComponentEntry;
use crate::core::socket::SocketEvent;

pub fn components() -> Vec<(&'static str, ComponentEntry)> {
    vec![
        ("Add", ComponentEntry::Factory(add)),
        ("Subtract", ComponentEntry::Factory(subtract)),
        ("Multiply", ComponentEntry::Factory(multiply)),
        ("Divide", ComponentEntry::Factory(divide)),
    ]
}

pub fn add() -> Result<Rc<Component>> {
    math_component("plus", "augend", "addend", "sum", |a, b| a + b)
}

pub fn subtract() -> Result<Rc<Component>> {
    math_component("minus", "minuend", "subtrahend", "difference", |a, b| a - b)
}

pub fn multiply() -> Result<Rc<Component>> {
    math_component("asterisk", "multiplicand", "multiplier", "product", |a, b| {
        a * b
    })
}

pub fn divide() -> Result<Rc<Component>> {
    math_component("divide", "dividend", "divisor", "quotient", |a, b| a / b)
}

/// Cast a packet to a number; strings are parsed.
fn to_number(value: &Value) -> Result<f64> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| FlowError::Component("number out of range".into())),
        Value::String(text) => text
            .parse::<f64>()
            .map_err(|_| FlowError::Component(format!("cannot parse '{text}' as a number"))),
        other => Err(FlowError::Component(format!(
            "must pass numbers to mathematical components, got {other}"
        ))),
    }
}

/// Render a result, keeping whole numbers as integers.
fn to_packet(value: f64) -> Value {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[derive(Default)]
struct PrimaryPacket {
    value: Option<f64>,
    groups: Vec<String>,
    disconnect: bool,
}

#[derive(Default)]
struct MathState {
    primary: RefCell<PrimaryPacket>,
    secondary: Cell<Option<f64>>,
    groups: RefCell<Vec<String>>,
}

impl MathState {
    fn reset(&self) {
        *self.primary.borrow_mut() = PrimaryPacket::default();
        self.secondary.set(None);
        self.groups.borrow_mut().clear();
    }
}

fn calculate(state: &MathState, result_port: &Rc<OutPort>, op: fn(f64, f64) -> f64) {
    let (value, groups, disconnect) = {
        let primary = state.primary.borrow();
        let (Some(value), Some(secondary)) = (primary.value, state.secondary.get()) else {
            return;
        };
        (op(value, secondary), primary.groups.clone(), primary.disconnect)
    };

    for group in &groups {
        result_port.begin_group(group);
    }
    if result_port.attached() {
        result_port.send(to_packet(value));
    }
    for _ in &groups {
        result_port.end_group();
    }
    if result_port.connected() && disconnect {
        result_port.disconnect();
    }
}

fn math_component(
    icon: &str,
    primary: &str,
    secondary: &str,
    result: &str,
    op: fn(f64, f64) -> f64,
) -> Result<Rc<Component>> {
    let component = Component::builder()
        .icon(icon)
        .in_port(primary, PortOptions::new("number"))
        .in_port(secondary, PortOptions::new("number"))
        .in_port("clear", PortOptions::new("bang"))
        .out_port(result, PortOptions::new("number"))
        .build();

    let state = Rc::new(MathState::default());
    let primary_port = component
        .in_ports()
        .get(primary)
        .expect("math component declares its primary inport");
    let secondary_port = component
        .in_ports()
        .get(secondary)
        .expect("math component declares its secondary inport");
    let clear_port = component
        .in_ports()
        .get("clear")
        .expect("math component declares 'clear'");
    let result_port = component
        .out_ports()
        .get(result)
        .expect("math component declares its result outport");

    {
        let state = Rc::clone(&state);
        primary_port.on("begingroup", move |event| {
            if let SocketEvent::BeginGroup { group } = event {
                state.groups.borrow_mut().push(group.clone());
            }
        });
    }
    {
        let state = Rc::clone(&state);
        primary_port.on("endgroup", move |_| {
            state.groups.borrow_mut().pop();
        });
    }
    {
        let state = Rc::clone(&state);
        let result_port = Rc::clone(&result_port);
        let component = Rc::downgrade(&component);
        primary_port.on("data", move |event| {
            let SocketEvent::Data { data } = event else {
                return;
            };
            match to_number(data) {
                Ok(value) => {
                    *state.primary.borrow_mut() = PrimaryPacket {
                        value: Some(value),
                        groups: state.groups.borrow().clone(),
                        disconnect: false,
                    };
                    calculate(&state, &result_port, op);
                }
                Err(err) => {
                    if let Some(component) = component.upgrade() {
                        if let Err(err) = component.error(err, &[], None) {
                            tracing::warn!("math component dropped bad packet: {err}");
                        }
                    }
                }
            }
        });
    }
    {
        let state = Rc::clone(&state);
        let result_port = Rc::clone(&result_port);
        primary_port.on("disconnect", move |_| {
            state.primary.borrow_mut().disconnect = true;
            result_port.disconnect();
        });
    }
    {
        let state = Rc::clone(&state);
        let result_port = Rc::clone(&result_port);
        let component = Rc::downgrade(&component);
        secondary_port.on("data", move |event| {
            let SocketEvent::Data { data } = event else {
                return;
            };
            match to_number(data) {
                Ok(value) => {
                    state.secondary.set(Some(value));
                    calculate(&state, &result_port, op);
                }
                Err(err) => {
                    if let Some(component) = component.upgrade() {
                        if let Err(err) = component.error(err, &[], None) {
                            tracing::warn!("math component dropped bad packet: {err}");
                        }
                    }
                }
            }
        });
    }
    {
        let state = Rc::clone(&state);
        let result_port = Rc::clone(&result_port);
        clear_port.on("data", move |_| {
            if result_port.connected() {
                let primary = state.primary.borrow();
                for _ in &primary.groups {
                    result_port.end_group();
                }
                if primary.disconnect {
                    result_port.disconnect();
                }
            }
            state.reset();
        });
    }

    Ok(component)
}
