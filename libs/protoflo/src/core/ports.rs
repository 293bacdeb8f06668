// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Component ports.
//!
//! An [`OutPort`] fans connection-lifecycle calls out to its attached
//! sockets; an [`InPort`] relays socket events to component handlers. Both
//! come in addressable variants holding a sparse index→socket map, where
//! attaching without an index takes the first free slot.
//!
//! Ports are imprinted with their owning node id, their name, and a weak
//! back-reference to the owning component when the network instantiates a
//! process; ownership always runs component→port→socket, never backwards.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::component::Component;
use super::events::{EventEmitter, ListenerId};
use super::socket::{InternalSocket, SocketEvent};

/// Port attributes: declared by components, surfaced to protocol clients
/// through the component registry.
#[derive(Debug, Clone)]
pub struct PortOptions {
    /// Free-form datatype label (`all`, `bang`, `number`, …).
    pub datatype: String,
    pub required: bool,
    pub addressable: bool,
    pub description: String,
    pub default: Option<Value>,
    pub values: Option<Vec<Value>>,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            datatype: "all".to_string(),
            required: false,
            addressable: false,
            description: String::new(),
            default: None,
            values: None,
        }
    }
}

impl PortOptions {
    pub fn new(datatype: &str) -> Self {
        Self {
            datatype: datatype.to_string(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn addressable(mut self) -> Self {
        self.addressable = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn values(mut self, values: Vec<Value>) -> Self {
        self.values = Some(values);
        self
    }
}

/// Socket storage: one flat list for ordinary ports, a sparse indexed map
/// for addressable ones.
enum SocketSlots {
    Plain(Vec<Rc<InternalSocket>>),
    Indexed(BTreeMap<usize, Rc<InternalSocket>>),
}

impl SocketSlots {
    fn for_options(options: &PortOptions) -> Self {
        if options.addressable {
            SocketSlots::Indexed(BTreeMap::new())
        } else {
            SocketSlots::Plain(Vec::new())
        }
    }

    fn attach(&mut self, socket: Rc<InternalSocket>, index: Option<usize>) {
        match self {
            SocketSlots::Plain(sockets) => sockets.push(socket),
            SocketSlots::Indexed(slots) => {
                let index = index.unwrap_or_else(|| {
                    (0..).find(|candidate| !slots.contains_key(candidate)).unwrap_or(0)
                });
                slots.insert(index, socket);
            }
        }
    }

    fn detach(&mut self, socket: &Rc<InternalSocket>) {
        match self {
            SocketSlots::Plain(sockets) => {
                sockets.retain(|candidate| !Rc::ptr_eq(candidate, socket));
            }
            SocketSlots::Indexed(slots) => {
                slots.retain(|_, candidate| !Rc::ptr_eq(candidate, socket));
            }
        }
    }

    /// Sockets selected by `index`: the named slot for addressable ports,
    /// every socket otherwise (or when no index is given).
    fn select(&self, index: Option<usize>) -> Vec<Rc<InternalSocket>> {
        match (self, index) {
            (SocketSlots::Indexed(slots), Some(index)) => {
                slots.get(&index).cloned().into_iter().collect()
            }
            (SocketSlots::Indexed(slots), None) => slots.values().cloned().collect(),
            (SocketSlots::Plain(sockets), _) => sockets.clone(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            SocketSlots::Plain(sockets) => sockets.is_empty(),
            SocketSlots::Indexed(slots) => slots.is_empty(),
        }
    }
}

/// Identity shared by both port directions; the network imprints it when a
/// process is added or renamed.
pub trait Port: Sized {
    fn from_options(options: PortOptions) -> Rc<Self>;
    fn options(&self) -> &PortOptions;
    fn set_node(&self, node: &str);
    fn set_name(&self, name: &str);
    fn set_component(&self, component: &Rc<Component>);
}

/// Output port: pushes lifecycle events into every attached socket.
pub struct OutPort {
    options: PortOptions,
    sockets: RefCell<SocketSlots>,
    node: RefCell<String>,
    name: RefCell<String>,
    component: RefCell<Weak<Component>>,
}

impl OutPort {
    pub fn new(options: PortOptions) -> Rc<Self> {
        Rc::new(Self {
            sockets: RefCell::new(SocketSlots::for_options(&options)),
            options,
            node: RefCell::new(String::new()),
            name: RefCell::new(String::new()),
            component: RefCell::new(Weak::new()),
        })
    }

    pub fn options(&self) -> &PortOptions {
        &self.options
    }

    pub fn node(&self) -> String {
        self.node.borrow().clone()
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn component(&self) -> Option<Rc<Component>> {
        self.component.borrow().upgrade()
    }

    pub fn attach(&self, socket: Rc<InternalSocket>, index: Option<usize>) {
        self.sockets.borrow_mut().attach(socket, index);
    }

    pub fn detach(&self, socket: &Rc<InternalSocket>) {
        self.sockets.borrow_mut().detach(socket);
    }

    /// True when at least one socket is attached.
    pub fn attached(&self) -> bool {
        !self.sockets.borrow().is_empty()
    }

    /// True when at least one attached socket reports connected.
    pub fn connected(&self) -> bool {
        self.sockets
            .borrow()
            .select(None)
            .iter()
            .any(|socket| socket.connected())
    }

    fn fan_out(&self, index: Option<usize>, f: impl Fn(&Rc<InternalSocket>)) {
        let sockets = self.sockets.borrow().select(index);
        for socket in &sockets {
            f(socket);
        }
    }

    pub fn connect(&self) {
        self.connect_index(None);
    }

    pub fn connect_index(&self, index: Option<usize>) {
        self.fan_out(index, |socket| socket.connect());
    }

    pub fn begin_group(&self, group: &str) {
        self.begin_group_index(group, None);
    }

    pub fn begin_group_index(&self, group: &str, index: Option<usize>) {
        self.fan_out(index, |socket| socket.begin_group(group));
    }

    /// Send one packet; sockets that are not yet connected connect first.
    pub fn send(&self, data: Value) {
        self.send_index(data, None);
    }

    pub fn send_index(&self, data: Value, index: Option<usize>) {
        self.fan_out(index, |socket| socket.send(data.clone()));
    }

    pub fn end_group(&self) {
        self.end_group_index(None);
    }

    pub fn end_group_index(&self, index: Option<usize>) {
        self.fan_out(index, |socket| socket.end_group());
    }

    pub fn disconnect(&self) {
        self.disconnect_index(None);
    }

    pub fn disconnect_index(&self, index: Option<usize>) {
        self.fan_out(index, |socket| socket.disconnect());
    }
}

impl Port for OutPort {
    fn from_options(options: PortOptions) -> Rc<Self> {
        Self::new(options)
    }

    fn options(&self) -> &PortOptions {
        &self.options
    }

    fn set_node(&self, node: &str) {
        *self.node.borrow_mut() = node.to_string();
    }

    fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    fn set_component(&self, component: &Rc<Component>) {
        *self.component.borrow_mut() = Rc::downgrade(component);
    }
}

impl std::fmt::Debug for OutPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutPort")
            .field("node", &self.node.borrow())
            .field("name", &self.name.borrow())
            .field("datatype", &self.options.datatype)
            .finish()
    }
}

struct Subscription {
    socket: Rc<InternalSocket>,
    listener: ListenerId,
}

/// Input port: re-emits attached sockets' events for component handlers.
///
/// A component either installs per-event handlers via [`InPort::on`], or one
/// consolidated `process` callback that receives every socket event.
pub struct InPort {
    options: PortOptions,
    sockets: RefCell<SocketSlots>,
    events: EventEmitter<SocketEvent>,
    process: RefCell<Option<Rc<dyn Fn(&SocketEvent)>>>,
    subscriptions: RefCell<Vec<Subscription>>,
    node: RefCell<String>,
    name: RefCell<String>,
    component: RefCell<Weak<Component>>,
}

impl InPort {
    pub fn new(options: PortOptions) -> Rc<Self> {
        Rc::new(Self {
            sockets: RefCell::new(SocketSlots::for_options(&options)),
            options,
            events: EventEmitter::new(),
            process: RefCell::new(None),
            subscriptions: RefCell::new(Vec::new()),
            node: RefCell::new(String::new()),
            name: RefCell::new(String::new()),
            component: RefCell::new(Weak::new()),
        })
    }

    pub fn options(&self) -> &PortOptions {
        &self.options
    }

    pub fn events(&self) -> &EventEmitter<SocketEvent> {
        &self.events
    }

    pub fn node(&self) -> String {
        self.node.borrow().clone()
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn component(&self) -> Option<Rc<Component>> {
        self.component.borrow().upgrade()
    }

    /// Subscribe a handler for one socket event name (`data`, `connect`, …).
    pub fn on(&self, event: &'static str, f: impl Fn(&SocketEvent) + 'static) -> ListenerId {
        self.events.on(event, f)
    }

    /// Install the consolidated callback; it observes every socket event in
    /// addition to any per-event handlers.
    pub fn set_process(&self, f: impl Fn(&SocketEvent) + 'static) {
        *self.process.borrow_mut() = Some(Rc::new(f));
    }

    pub fn attach(self: &Rc<Self>, socket: Rc<InternalSocket>, index: Option<usize>) {
        let port = Rc::downgrade(self);
        let listener = socket.events().on_any(move |event: &SocketEvent| {
            if let Some(port) = port.upgrade() {
                port.handle(event);
            }
        });
        self.subscriptions.borrow_mut().push(Subscription {
            socket: Rc::clone(&socket),
            listener,
        });
        self.sockets.borrow_mut().attach(socket, index);
    }

    pub fn detach(&self, socket: &Rc<InternalSocket>) {
        let mut subscriptions = self.subscriptions.borrow_mut();
        subscriptions.retain(|subscription| {
            if Rc::ptr_eq(&subscription.socket, socket) {
                subscription.socket.events().remove(subscription.listener);
                false
            } else {
                true
            }
        });
        drop(subscriptions);
        self.sockets.borrow_mut().detach(socket);
    }

    pub fn attached(&self) -> bool {
        !self.sockets.borrow().is_empty()
    }

    pub fn connected(&self) -> bool {
        self.sockets
            .borrow()
            .select(None)
            .iter()
            .any(|socket| socket.connected())
    }

    fn handle(&self, event: &SocketEvent) {
        self.events.emit(event.clone());
        let process = self.process.borrow().clone();
        if let Some(process) = process {
            process(event);
        }
    }
}

impl Port for InPort {
    fn from_options(options: PortOptions) -> Rc<Self> {
        Self::new(options)
    }

    fn options(&self) -> &PortOptions {
        &self.options
    }

    fn set_node(&self, node: &str) {
        *self.node.borrow_mut() = node.to_string();
    }

    fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    fn set_component(&self, component: &Rc<Component>) {
        *self.component.borrow_mut() = Rc::downgrade(component);
    }
}

impl std::fmt::Debug for InPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InPort")
            .field("node", &self.node.borrow())
            .field("name", &self.name.borrow())
            .field("datatype", &self.options.datatype)
            .finish()
    }
}

/// Insertion-ordered port collection. Growable after construction: the
/// subgraph component adds exported ports as it discovers them.
pub struct Ports<P: Port> {
    entries: RefCell<Vec<(String, Rc<P>)>>,
}

pub type InPorts = Ports<InPort>;
pub type OutPorts = Ports<OutPort>;

impl<P: Port> Ports<P> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn with(options: impl IntoIterator<Item = (String, PortOptions)>) -> Self {
        let ports = Self::new();
        for (name, port_options) in options {
            ports.add_options(&name, port_options);
        }
        ports
    }

    /// Add or replace a port under `name`. The port's own imprinted name is
    /// left alone; a subgraph may expose an inner port under a public name
    /// different from the port's.
    pub fn add(&self, name: &str, port: Rc<P>) {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.iter_mut().find(|(existing, _)| existing == name) {
            entry.1 = port;
        } else {
            entries.push((name.to_string(), port));
        }
    }

    pub fn add_options(&self, name: &str, options: PortOptions) -> Rc<P> {
        let port = P::from_options(options);
        self.add(name, Rc::clone(&port));
        port
    }

    pub fn get(&self, name: &str) -> Option<Rc<P>> {
        self.entries
            .borrow()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, port)| Rc::clone(port))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Snapshot of `(name, port)` pairs in insertion order.
    pub fn entries(&self) -> Vec<(String, Rc<P>)> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<P: Port> Default for Ports<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn outport_fans_out_to_all_sockets() {
        let port = OutPort::new(PortOptions::default());
        let first = InternalSocket::new();
        let second = InternalSocket::new();
        port.attach(Rc::clone(&first), None);
        port.attach(Rc::clone(&second), None);

        let seen = Rc::new(RefCell::new(Vec::new()));
        for socket in [&first, &second] {
            let sink = Rc::clone(&seen);
            socket.events().on("data", move |event| {
                if let SocketEvent::Data { data } = event {
                    sink.borrow_mut().push(data.clone());
                }
            });
        }

        port.send(json!(42));
        assert_eq!(*seen.borrow(), vec![json!(42), json!(42)]);
        assert!(port.connected());

        port.disconnect();
        assert!(!port.connected());
        assert!(port.attached());
    }

    #[test]
    fn addressable_outport_selects_slot_by_index() {
        let port = OutPort::new(PortOptions::new("all").addressable());
        let slot0 = InternalSocket::new();
        let slot2 = InternalSocket::new();
        port.attach(Rc::clone(&slot0), Some(0));
        port.attach(Rc::clone(&slot2), Some(2));

        port.send_index(json!("x"), Some(2));
        assert!(!slot0.connected());
        assert!(slot2.connected());
    }

    #[test]
    fn addressable_attach_without_index_takes_first_free_slot() {
        let port = OutPort::new(PortOptions::new("all").addressable());
        port.attach(InternalSocket::new(), Some(0));
        let auto = InternalSocket::new();
        port.attach(Rc::clone(&auto), None);

        // Slot 1 was the first free slot.
        port.send_index(json!(1), Some(1));
        assert!(auto.connected());
    }

    #[test]
    fn inport_relays_socket_events_to_handlers() {
        let port = InPort::new(PortOptions::default());
        let socket = InternalSocket::new();
        port.attach(Rc::clone(&socket), None);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        port.on("data", move |event| {
            if let SocketEvent::Data { data } = event {
                sink.borrow_mut().push(data.clone());
            }
        });

        socket.send(json!("pkt"));
        socket.disconnect();
        assert_eq!(*seen.borrow(), vec![json!("pkt")]);
    }

    #[test]
    fn inport_process_callback_sees_every_event() {
        let port = InPort::new(PortOptions::default());
        let socket = InternalSocket::new();
        port.attach(Rc::clone(&socket), None);

        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&names);
        port.set_process(move |event| {
            use crate::core::events::Event;
            sink.borrow_mut().push(event.name());
        });

        socket.send(json!(1));
        socket.begin_group("g");
        socket.end_group();
        socket.disconnect();

        assert_eq!(
            *names.borrow(),
            vec!["connect", "data", "begingroup", "endgroup", "disconnect"]
        );
    }

    #[test]
    fn detach_stops_relaying() {
        let port = InPort::new(PortOptions::default());
        let socket = InternalSocket::new();
        port.attach(Rc::clone(&socket), None);

        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        port.on("data", move |_| *sink.borrow_mut() += 1);

        socket.send(json!(1));
        port.detach(&socket);
        socket.send(json!(2));

        assert_eq!(*count.borrow(), 1);
        assert!(!port.attached());
    }
}
