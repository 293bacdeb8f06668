// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Component registry and loader.
//!
//! Component collections register at compile time via `inventory`; each
//! collection contributes a name, a description, an icon, and a map of
//! short names to component handles (a factory, or a path to a graph file
//! that loads as a subgraph). The full component name is
//! `"<collection>/<short>"`, with short-name lookup as a fallback.
//!
//! Per collection the loader keeps a `components.cache` descriptor file
//! under `~/.protoflo/<collection>/`. A collection is stale when the cache
//! is missing or any of its source artifacts has a modification time at or
//! after the cache's; stale collections are regenerated by instantiating
//! every component, awaiting `ready`, and extracting its port descriptors.
//! Cache write failures are logged, never fatal. Fresh caches are loaded
//! verbatim.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::component::{Component, when_ready};
use super::error::{FlowError, Result};
use super::events::{Event, EventEmitter};
use super::graph::Graph;
use super::network::subgraph;
use super::ports::PortOptions;

/// A compile-time registered collection of components.
pub struct ComponentCollection {
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub components: fn() -> Vec<(&'static str, ComponentEntry)>,
}

inventory::collect!(ComponentCollection);

/// How a component is obtained: a factory producing an instance, or a graph
/// file loaded as a subgraph.
#[derive(Clone)]
pub enum ComponentEntry {
    Factory(fn() -> Result<Rc<Component>>),
    Graph(PathBuf),
}

/// Introspected port metadata, as cached on disk and sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub datatype: String,
    pub required: bool,
    pub addressable: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl PortDescriptor {
    pub fn from_options(id: &str, options: &PortOptions) -> Self {
        Self {
            id: id.to_string(),
            datatype: options.datatype.clone(),
            required: options.required,
            addressable: options.addressable,
            description: options.description.clone(),
            default: options.default.clone(),
            values: options.values.clone(),
        }
    }
}

/// Introspected component metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentDetails {
    pub description: String,
    pub icon: Option<String>,
    pub subgraph: bool,
    #[serde(rename = "inPorts")]
    pub in_ports: Vec<PortDescriptor>,
    #[serde(rename = "outPorts")]
    pub out_ports: Vec<PortDescriptor>,
}

impl ComponentDetails {
    pub fn from_component(component: &Rc<Component>) -> Self {
        Self {
            description: component.description(),
            icon: component.icon(),
            subgraph: component.subgraph(),
            in_ports: component
                .in_ports()
                .entries()
                .iter()
                .map(|(name, port)| PortDescriptor::from_options(name, port.options()))
                .collect(),
            out_ports: component
                .out_ports()
                .entries()
                .iter()
                .map(|(name, port)| PortDescriptor::from_options(name, port.options()))
                .collect(),
        }
    }
}

/// One cached component descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "componentName")]
    pub component_name: String,
    pub details: ComponentDetails,
}

/// The `components.cache` file contents for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionCache {
    name: String,
    description: String,
    icon: String,
    components: Vec<CachedEntry>,
}

/// A component known to the loader: cached details plus the handle used to
/// instantiate it.
#[derive(Clone)]
pub struct LoadedComponent {
    pub name: String,
    pub details: ComponentDetails,
    handle: LoadedHandle,
}

#[derive(Clone)]
enum LoadedHandle {
    Factory(fn() -> Result<Rc<Component>>),
    GraphFile(PathBuf),
    RegisteredGraph(Rc<Graph>),
}

#[derive(Debug, Clone)]
enum LoaderEvent {
    Ready,
}

impl Event for LoaderEvent {
    fn name(&self) -> &'static str {
        match self {
            LoaderEvent::Ready => "ready",
        }
    }
}

/// Discovers, caches and instantiates components.
pub struct ComponentLoader {
    components: RefCell<Option<HashMap<String, LoadedComponent>>>,
    processing: Cell<bool>,
    events: EventEmitter<LoaderEvent>,
}

impl ComponentLoader {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            components: RefCell::new(None),
            processing: Cell::new(false),
            events: EventEmitter::new(),
        })
    }

    pub fn ready(&self) -> bool {
        self.components.borrow().is_some()
    }

    /// List every available component, building or refreshing the on-disk
    /// caches on first call. Concurrent callers coalesce onto one scan.
    pub async fn list_components(self: &Rc<Self>) -> Result<Vec<LoadedComponent>> {
        if let Some(components) = &*self.components.borrow() {
            return Ok(components.values().cloned().collect());
        }

        if self.processing.get() {
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            let tx = RefCell::new(Some(tx));
            self.events.once("ready", move |_| {
                if let Some(tx) = tx.borrow_mut().take() {
                    let _ = tx.send(());
                }
            });
            let _ = rx.await;
            let components = self.components.borrow();
            return Ok(components
                .as_ref()
                .map(|map| map.values().cloned().collect())
                .unwrap_or_default());
        }

        self.processing.set(true);
        let mut map = HashMap::new();
        for collection in inventory::iter::<ComponentCollection> {
            match load_collection(collection).await {
                Ok(cache) => {
                    let live: HashMap<&str, ComponentEntry> =
                        (collection.components)().into_iter().collect();
                    for entry in cache.components {
                        // Prune cached components whose handle no longer exists.
                        let Some(handle) = live.get(entry.object_name.as_str()) else {
                            continue;
                        };
                        let handle = match handle {
                            ComponentEntry::Factory(factory) => LoadedHandle::Factory(*factory),
                            ComponentEntry::Graph(path) => LoadedHandle::GraphFile(path.clone()),
                        };
                        map.insert(
                            entry.component_name.clone(),
                            LoadedComponent {
                                name: entry.component_name,
                                details: entry.details,
                                handle,
                            },
                        );
                    }
                }
                Err(err) => {
                    // A malformed collection is skipped, not fatal.
                    warn!("skipping component collection '{}': {err}", collection.name);
                }
            }
        }

        *self.components.borrow_mut() = Some(map);
        self.processing.set(false);
        self.events.emit(LoaderEvent::Ready);

        let components = self.components.borrow();
        Ok(components
            .as_ref()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Find a component by full name, falling back to short-name lookup.
    pub fn get(&self, name: &str) -> Option<LoadedComponent> {
        let components = self.components.borrow();
        let components = components.as_ref()?;
        if let Some(found) = components.get(name) {
            return Some(found.clone());
        }
        components
            .values()
            .find(|candidate| candidate.name.split('/').nth(1) == Some(name))
            .cloned()
    }

    /// Instantiate a component by name.
    pub async fn load(
        self: &Rc<Self>,
        name: &str,
        metadata: Option<super::graph::Metadata>,
    ) -> Result<Rc<Component>> {
        if !self.ready() {
            self.list_components().await?;
        }

        let found = self
            .get(name)
            .ok_or_else(|| FlowError::Registry(format!("component '{name}' not available")))?;

        let instance = match &found.handle {
            LoadedHandle::Factory(factory) => factory()?,
            LoadedHandle::GraphFile(path) => Box::pin(subgraph::from_file(path)).await?,
            LoadedHandle::RegisteredGraph(graph) => {
                Box::pin(subgraph::for_graph(Rc::clone(graph))).await?
            }
        };

        if let Some(metadata) = metadata {
            instance.set_metadata(metadata);
        }
        if instance.subgraph() {
            instance.set_default_icon("sitemap");
        } else {
            instance.set_default_icon("square");
        }

        Ok(instance)
    }

    /// Register (or refresh) a live graph as a subgraph component. Details
    /// are recomputed from the graph's current exported ports.
    pub fn upsert_registered_graph(&self, name: &str, graph: &Rc<Graph>) -> LoadedComponent {
        let details = self.subgraph_details(graph);
        let loaded = LoadedComponent {
            name: name.to_string(),
            details,
            handle: LoadedHandle::RegisteredGraph(Rc::clone(graph)),
        };
        let mut components = self.components.borrow_mut();
        components
            .get_or_insert_with(HashMap::new)
            .insert(name.to_string(), loaded.clone());
        loaded
    }

    /// Port descriptors for a graph acting as a subgraph component, with
    /// datatypes pulled from the registered component of each exported
    /// port's node.
    pub fn subgraph_details(&self, graph: &Rc<Graph>) -> ComponentDetails {
        let describe = |entries: Vec<(String, super::graph::ExportedPort)>, inbound: bool| {
            entries
                .iter()
                .map(|(public, port)| {
                    let datatype = graph
                        .get_node(&port.process)
                        .and_then(|node| self.port_datatype(&node.component, &port.port, inbound))
                        .unwrap_or_else(|| "all".to_string());
                    PortDescriptor {
                        id: public.clone(),
                        datatype,
                        required: false,
                        addressable: false,
                        description: String::new(),
                        default: None,
                        values: None,
                    }
                })
                .collect()
        };

        ComponentDetails {
            description: graph
                .properties()
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            icon: Some("sitemap".to_string()),
            subgraph: true,
            in_ports: describe(graph.inports(), true),
            out_ports: describe(graph.outports(), false),
        }
    }

    /// Datatype of a registered component's port, if known.
    pub fn port_datatype(
        &self,
        component_name: &str,
        port_name: &str,
        inbound: bool,
    ) -> Option<String> {
        let found = self.get(component_name)?;
        let ports = if inbound {
            &found.details.in_ports
        } else {
            &found.details.out_ports
        };
        ports
            .iter()
            .find(|descriptor| descriptor.id == port_name)
            .map(|descriptor| descriptor.datatype.clone())
    }
}

fn cache_root() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FlowError::Registry("cannot resolve home directory".into()))?;
    Ok(home.join(".protoflo"))
}

fn source_path(entry: &ComponentEntry) -> PathBuf {
    match entry {
        // Compiled-in factories change only when the binary does.
        ComponentEntry::Factory(_) => {
            std::env::current_exe().unwrap_or_else(|_| PathBuf::from("protoflo"))
        }
        ComponentEntry::Graph(path) => path.clone(),
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn is_stale(cache_path: &Path, entries: &[(&'static str, ComponentEntry)]) -> bool {
    let Some(cached_at) = modified(cache_path) else {
        return true;
    };
    entries.iter().any(|(_, entry)| {
        match modified(&source_path(entry)) {
            Some(source_at) => source_at >= cached_at,
            // Unreadable source: force a rebuild so the entry gets re-checked.
            None => true,
        }
    })
}

async fn load_collection(collection: &ComponentCollection) -> Result<CollectionCache> {
    let dir = cache_root()?.join(collection.name);
    let cache_path = dir.join("components.cache");
    let entries = (collection.components)();

    if !is_stale(&cache_path, &entries) {
        match std::fs::read_to_string(&cache_path)
            .map_err(FlowError::from)
            .and_then(|contents| serde_json::from_str(&contents).map_err(FlowError::from))
        {
            Ok(cache) => {
                debug!("loaded component cache for '{}'", collection.name);
                return Ok(cache);
            }
            Err(err) => {
                warn!(
                    "component cache for '{}' unreadable, regenerating: {err}",
                    collection.name
                );
            }
        }
    }

    let mut components = Vec::new();
    for (short, entry) in &entries {
        let instance = match entry {
            ComponentEntry::Factory(factory) => factory(),
            ComponentEntry::Graph(path) => Box::pin(subgraph::from_file(path)).await,
        };
        match instance {
            Ok(component) => {
                when_ready(&component).await;
                components.push(CachedEntry {
                    file_name: source_path(entry).display().to_string(),
                    object_name: short.to_string(),
                    component_name: format!("{}/{}", collection.name, short),
                    details: ComponentDetails::from_component(&component),
                });
            }
            Err(err) => {
                warn!(
                    "skipping component '{}/{}': {err}",
                    collection.name, short
                );
            }
        }
    }

    let cache = CollectionCache {
        name: collection.name.to_string(),
        description: collection.description.to_string(),
        icon: collection.icon.to_string(),
        components,
    };

    // Best-effort cache write; a read-only disk only costs rescans.
    let write = std::fs::create_dir_all(&dir)
        .map_err(FlowError::from)
        .and_then(|_| serde_json::to_string(&cache).map_err(FlowError::from))
        .and_then(|serialized| std::fs::write(&cache_path, serialized).map_err(FlowError::from));
    if let Err(err) = write {
        warn!(
            "unable to write component cache for '{}': {err}",
            collection.name
        );
    }

    Ok(cache)
}
