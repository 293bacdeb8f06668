// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The component contract.
//!
//! A component instance owns its two port collections and a little
//! observable state: a `ready` flag (either true at construction or raised
//! later with a `ready` event), a `subgraph` marker, and an icon attribute
//! whose changes are announced to clients. Behavior is whatever the
//! component's factory wired onto its inports.
//!
//! Construction merges class-level port declarations with instance
//! overrides: the declared defaults are deep-copied and the caller's
//! additions overlaid on top.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;

use super::error::{FlowError, Result};
use super::events::{Event, EventEmitter};
use super::graph::Metadata;
use super::network::Network;
use super::ports::{InPorts, OutPort, OutPorts, PortOptions};
use super::socket::SocketEvent;

#[derive(Debug, Clone)]
pub enum ComponentEvent {
    Ready,
    Icon { icon: String },
}

impl Event for ComponentEvent {
    fn name(&self) -> &'static str {
        match self {
            ComponentEvent::Ready => "ready",
            ComponentEvent::Icon { .. } => "icon",
        }
    }
}

/// Instance-level overrides passed at construction time. Ports listed here
/// extend (not replace) the component's class-level declarations.
#[derive(Default)]
pub struct ComponentOptions {
    pub in_ports: Vec<(String, PortOptions)>,
    pub out_ports: Vec<(String, PortOptions)>,
    pub icon: Option<String>,
    pub metadata: Option<Metadata>,
}

pub struct Component {
    description: RefCell<String>,
    icon: RefCell<Option<String>>,
    ready: Cell<bool>,
    subgraph: Cell<bool>,
    metadata: RefCell<Metadata>,
    in_ports: InPorts,
    out_ports: OutPorts,
    events: EventEmitter<ComponentEvent>,
    shutdown_hook: RefCell<Option<Rc<dyn Fn()>>>,
    /// Set by the subgraph component; the network re-emits nested events
    /// from here.
    network: RefCell<Option<Rc<Network>>>,
}

impl Component {
    pub fn builder() -> ComponentBuilder {
        ComponentBuilder::new()
    }

    pub fn events(&self) -> &EventEmitter<ComponentEvent> {
        &self.events
    }

    pub fn in_ports(&self) -> &InPorts {
        &self.in_ports
    }

    pub fn out_ports(&self) -> &OutPorts {
        &self.out_ports
    }

    pub fn description(&self) -> String {
        self.description.borrow().clone()
    }

    pub fn set_description(&self, description: &str) {
        *self.description.borrow_mut() = description.to_string();
    }

    pub fn icon(&self) -> Option<String> {
        self.icon.borrow().clone()
    }

    /// Change the icon and announce it; the network forwards the event to
    /// protocol clients.
    pub fn set_icon(&self, icon: &str) {
        *self.icon.borrow_mut() = Some(icon.to_string());
        self.events.emit(ComponentEvent::Icon {
            icon: icon.to_string(),
        });
    }

    /// Set the icon only if none is present, without announcing.
    pub fn set_default_icon(&self, icon: &str) {
        let mut current = self.icon.borrow_mut();
        if current.is_none() {
            *current = Some(icon.to_string());
        }
    }

    pub fn ready(&self) -> bool {
        self.ready.get()
    }

    /// Flip the ready flag; raising it emits `ready` so deferred wiring can
    /// proceed.
    pub fn set_ready(&self, ready: bool) {
        self.ready.set(ready);
        if ready {
            self.events.emit(ComponentEvent::Ready);
        }
    }

    pub fn subgraph(&self) -> bool {
        self.subgraph.get()
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata.borrow().clone()
    }

    pub fn set_metadata(&self, metadata: Metadata) {
        *self.metadata.borrow_mut() = metadata;
    }

    pub fn network(&self) -> Option<Rc<Network>> {
        self.network.borrow().clone()
    }

    pub fn set_network(&self, network: Rc<Network>) {
        *self.network.borrow_mut() = Some(network);
    }

    pub fn on_shutdown(&self, hook: impl Fn() + 'static) {
        *self.shutdown_hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Called by the network on stop and on node removal.
    pub fn shutdown(&self) {
        let hook = self.shutdown_hook.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Route an error out of the component. If the named outport exists and
    /// is attached or not required, the error travels as a packet wrapped in
    /// `groups`; otherwise it returns to the caller.
    pub fn error(&self, err: FlowError, groups: &[String], error_port: Option<&str>) -> Result<()> {
        let port_name = error_port.unwrap_or("error");
        if let Some(port) = self.out_ports.get(port_name) {
            if port.attached() || !port.options().required {
                for group in groups {
                    port.begin_group(group);
                }
                port.send(Value::String(err.to_string()));
                for _ in groups {
                    port.end_group();
                }
                port.disconnect();
                return Ok(());
            }
        }
        Err(err)
    }
}

pub struct ComponentBuilder {
    description: String,
    icon: Option<String>,
    subgraph: bool,
    ready: bool,
    in_ports: Vec<(String, PortOptions)>,
    out_ports: Vec<(String, PortOptions)>,
}

impl ComponentBuilder {
    pub fn new() -> Self {
        Self {
            description: String::new(),
            icon: None,
            subgraph: false,
            ready: true,
            in_ports: Vec::new(),
            out_ports: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }

    pub fn subgraph(mut self) -> Self {
        self.subgraph = true;
        self
    }

    /// The component starts not-ready and must raise `ready` itself.
    pub fn deferred_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn in_port(mut self, name: &str, options: PortOptions) -> Self {
        self.in_ports.push((name.to_string(), options));
        self
    }

    pub fn out_port(mut self, name: &str, options: PortOptions) -> Self {
        self.out_ports.push((name.to_string(), options));
        self
    }

    pub fn build(self) -> Rc<Component> {
        self.build_with(ComponentOptions::default())
    }

    /// Build with instance overrides overlaid on the declared ports.
    pub fn build_with(self, options: ComponentOptions) -> Rc<Component> {
        let mut in_ports = self.in_ports;
        for (name, port_options) in options.in_ports {
            overlay(&mut in_ports, name, port_options);
        }
        let mut out_ports = self.out_ports;
        for (name, port_options) in options.out_ports {
            overlay(&mut out_ports, name, port_options);
        }

        Rc::new(Component {
            description: RefCell::new(self.description),
            icon: RefCell::new(options.icon.or(self.icon)),
            ready: Cell::new(self.ready),
            subgraph: Cell::new(self.subgraph),
            metadata: RefCell::new(options.metadata.unwrap_or_default()),
            in_ports: InPorts::with(in_ports),
            out_ports: OutPorts::with(out_ports),
            events: EventEmitter::new(),
            shutdown_hook: RefCell::new(None),
            network: RefCell::new(None),
        })
    }
}

impl Default for ComponentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn overlay(ports: &mut Vec<(String, PortOptions)>, name: String, options: PortOptions) {
    if let Some(entry) = ports.iter_mut().find(|(existing, _)| *existing == name) {
        entry.1 = options;
    } else {
        ports.push((name, options));
    }
}

/// Wait until the component reports ready. Resolves immediately when the
/// flag is already up; otherwise parks on the next `ready` event.
pub async fn when_ready(component: &Rc<Component>) {
    if component.ready() {
        return;
    }
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let tx = RefCell::new(Some(tx));
    component.events().once("ready", move |_| {
        if let Some(tx) = tx.borrow_mut().take() {
            let _ = tx.send(());
        }
    });
    let _ = rx.await;
}

/// Forward groups from one inport to one outport, calling `func` on each
/// incoming packet. The classic single-in single-out helper.
pub fn map_component(
    component: &Rc<Component>,
    func: impl Fn(&Value, &[String], &Rc<OutPort>) + 'static,
    in_port: Option<&str>,
    out_port: Option<&str>,
) -> Result<()> {
    let in_name = in_port.unwrap_or("in");
    let out_name = out_port.unwrap_or("out");

    let input = component.in_ports().get(in_name).ok_or_else(|| {
        FlowError::Component(format!("no inport '{in_name}' to map from"))
    })?;
    let output = component.out_ports().get(out_name).ok_or_else(|| {
        FlowError::Component(format!("no outport '{out_name}' to map to"))
    })?;

    let groups: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    input.set_process(move |event| match event {
        SocketEvent::Connect => output.connect(),
        SocketEvent::BeginGroup { group } => {
            groups.borrow_mut().push(group.clone());
            output.begin_group(group);
        }
        SocketEvent::Data { data } => {
            let held = groups.borrow();
            func(data, &held, &output);
        }
        SocketEvent::EndGroup { .. } => {
            groups.borrow_mut().pop();
            output.end_group();
        }
        SocketEvent::Disconnect => {
            groups.borrow_mut().clear();
            output.disconnect();
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::socket::InternalSocket;
    use serde_json::json;

    #[test]
    fn instance_ports_extend_class_declarations() {
        let component = Component::builder()
            .description("casts anything")
            .in_port("in", PortOptions::new("all"))
            .build_with(ComponentOptions {
                out_ports: vec![(
                    "out".to_string(),
                    PortOptions::new("string").required(false),
                )],
                ..Default::default()
            });

        assert!(component.in_ports().contains("in"));
        let out = component.out_ports().get("out").unwrap();
        assert_eq!(out.options().datatype, "string");
    }

    #[test]
    fn instance_overrides_replace_same_name_ports() {
        let component = Component::builder()
            .in_port("in", PortOptions::new("all"))
            .build_with(ComponentOptions {
                in_ports: vec![("in".to_string(), PortOptions::new("number"))],
                ..Default::default()
            });

        assert_eq!(component.in_ports().len(), 1);
        assert_eq!(
            component.in_ports().get("in").unwrap().options().datatype,
            "number"
        );
    }

    #[test]
    fn error_routes_to_attached_error_port() {
        let component = Component::builder()
            .out_port("error", PortOptions::new("object"))
            .build();
        let socket = InternalSocket::new();
        component
            .out_ports()
            .get("error")
            .unwrap()
            .attach(Rc::clone(&socket), None);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        socket.events().on_any(move |event: &SocketEvent| {
            sink.borrow_mut().push(event.name().to_string());
        });

        component
            .error(
                FlowError::Component("boom".into()),
                &["batch".to_string()],
                None,
            )
            .unwrap();

        assert_eq!(
            *seen.borrow(),
            vec!["begingroup", "connect", "data", "endgroup", "disconnect"]
        );
    }

    #[test]
    fn error_without_port_returns_to_caller() {
        let component = Component::builder().build();
        let result = component.error(FlowError::Component("boom".into()), &[], None);
        assert!(result.is_err());
    }

    #[test]
    fn error_with_required_unattached_port_returns_to_caller() {
        let component = Component::builder()
            .out_port("error", PortOptions::new("object").required(true))
            .build();
        let result = component.error(FlowError::Component("boom".into()), &[], None);
        assert!(result.is_err());
    }

    #[test]
    fn map_component_forwards_groups_and_packets() {
        let component = Component::builder()
            .in_port("in", PortOptions::new("all"))
            .out_port("out", PortOptions::new("all"))
            .build();
        map_component(
            &component,
            |data, _groups, out| out.send(json!(format!("got {data}"))),
            None,
            None,
        )
        .unwrap();

        let input = InternalSocket::new();
        component
            .in_ports()
            .get("in")
            .unwrap()
            .attach(Rc::clone(&input), None);
        let output = InternalSocket::new();
        component
            .out_ports()
            .get("out")
            .unwrap()
            .attach(Rc::clone(&output), None);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        output.events().on_any(move |event: &SocketEvent| {
            let label = match event {
                SocketEvent::Data { data } => format!("data {data}"),
                SocketEvent::BeginGroup { group } => format!("begin {group}"),
                SocketEvent::EndGroup { group } => format!("end {group}"),
                other => other.name().to_string(),
            };
            sink.borrow_mut().push(label);
        });

        input.connect();
        input.begin_group("g");
        input.send(json!("x"));
        input.end_group();
        input.disconnect();

        assert_eq!(
            *seen.borrow(),
            vec![
                "connect",
                "begin g",
                "data \"got \\\"x\\\"\"",
                "end g",
                "disconnect"
            ]
        );
    }
}
