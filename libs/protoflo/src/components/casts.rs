// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Type-cast components: Str, Int, Float, Boolean.
//!
//! Each is the shared cast base (a single `in` port taking anything) with
//! the instance-level outport declaring the produced datatype, mapped
//! through [`map_component`].

use std::rc::Rc;

use serde_json::{Value, json};

use crate::core::component::{Component, ComponentOptions, map_component};
use crate::core::error::Result;
use crate::core::ports::PortOptions;
use crate::core::registry::ComponentEntry;
use tracing::warn;

pub fn components() -> Vec<(&'static str, ComponentEntry)> {
    vec![
        ("Str", ComponentEntry::Factory(str_cast)),
        ("Int", ComponentEntry::Factory(int_cast)),
        ("Float", ComponentEntry::Factory(float_cast)),
        ("Boolean", ComponentEntry::Factory(boolean_cast)),
    ]
}

/// The shared base: one `in` port accepting anything, with the outport
/// overlaid per cast.
fn cast_component(out_datatype: &str) -> Rc<Component> {
    Component::builder()
        .in_port("in", PortOptions::new("all"))
        .build_with(ComponentOptions {
            out_ports: vec![(
                "out".to_string(),
                PortOptions::new(out_datatype).required(false),
            )],
            ..Default::default()
        })
}

pub fn str_cast() -> Result<Rc<Component>> {
    let component = cast_component("string");
    map_component(
        &component,
        |data, _groups, out| {
            let text = match data {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            out.send(Value::String(text));
        },
        None,
        None,
    )?;
    Ok(component)
}

pub fn int_cast() -> Result<Rc<Component>> {
    let component = cast_component("int");
    map_component(
        &component,
        |data, _groups, out| {
            let value = match data {
                Value::Number(number) => number.as_f64().map(|value| value as i64),
                Value::String(text) => text
                    .parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().map(|value| value as i64)),
                Value::Bool(flag) => Some(i64::from(*flag)),
                _ => None,
            };
            match value {
                Some(value) => out.send(json!(value)),
                None => warn!("Int cast dropped unconvertible packet: {data}"),
            }
        },
        None,
        None,
    )?;
    Ok(component)
}

pub fn float_cast() -> Result<Rc<Component>> {
    let component = cast_component("number");
    map_component(
        &component,
        |data, _groups, out| {
            let value = match data {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => text.parse::<f64>().ok(),
                Value::Bool(flag) => Some(f64::from(u8::from(*flag))),
                _ => None,
            };
            match value {
                Some(value) => out.send(json!(value)),
                None => warn!("Float cast dropped unconvertible packet: {data}"),
            }
        },
        None,
        None,
    )?;
    Ok(component)
}

pub fn boolean_cast() -> Result<Rc<Component>> {
    let component = cast_component("boolean");
    map_component(
        &component,
        |data, _groups, out| {
            let truthy = match data {
                Value::Null => false,
                Value::Bool(flag) => *flag,
                Value::Number(number) => number.as_f64().map(|v| v != 0.0).unwrap_or(false),
                Value::String(text) => !text.is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
            };
            out.send(json!(truthy));
        },
        None,
        None,
    )?;
    Ok(component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::socket::{InternalSocket, SocketEvent};
    use std::cell::RefCell;

    fn run_cast(component: &Rc<Component>, input: Value) -> Vec<Value> {
        let socket = InternalSocket::new();
        component
            .in_ports()
            .get("in")
            .unwrap()
            .attach(Rc::clone(&socket), None);
        let out = InternalSocket::new();
        component
            .out_ports()
            .get("out")
            .unwrap()
            .attach(Rc::clone(&out), None);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        out.events().on("data", move |event| {
            if let SocketEvent::Data { data } = event {
                sink.borrow_mut().push(data.clone());
            }
        });

        socket.send(input);
        socket.disconnect();
        let result = seen.borrow().clone();
        result
    }

    #[test]
    fn str_cast_stringifies() {
        let component = str_cast().unwrap();
        assert_eq!(run_cast(&component, json!(42)), vec![json!("42")]);
    }

    #[test]
    fn str_cast_passes_strings_through() {
        let component = str_cast().unwrap();
        assert_eq!(run_cast(&component, json!("x")), vec![json!("x")]);
    }

    #[test]
    fn int_cast_truncates() {
        let component = int_cast().unwrap();
        assert_eq!(run_cast(&component, json!(3.9)), vec![json!(3)]);
        let component = int_cast().unwrap();
        assert_eq!(run_cast(&component, json!("12")), vec![json!(12)]);
    }

    #[test]
    fn float_cast_parses_strings() {
        let component = float_cast().unwrap();
        assert_eq!(run_cast(&component, json!("2.5")), vec![json!(2.5)]);
    }

    #[test]
    fn boolean_cast_uses_truthiness() {
        let component = boolean_cast().unwrap();
        assert_eq!(run_cast(&component, json!("")), vec![json!(false)]);
        let component = boolean_cast().unwrap();
        assert_eq!(run_cast(&component, json!(1)), vec![json!(true)]);
    }
}
