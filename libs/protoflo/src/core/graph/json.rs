// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Graph JSON format: load, serialize, save.
//!
//! The on-disk shape is the NoFlo graph format: `properties` (display name
//! in `properties.name`), `inports`/`outports` keyed by public name,
//! `groups`, `processes` keyed by node id, and `connections` holding both
//! edges and `{data, tgt}` initial packets. A legacy `exports` list is
//! accepted on input and written back only when present. Port names are
//! lowercased on load.
//!
//! `.fbp` files are delegated to the external `fbp` tool, which prints the
//! JSON form on stdout.

use std::path::Path;
use std::process::Command;
use std::rc::Rc;

use serde_json::{Map, Value, json};

use super::graph::Graph;
use super::types::Metadata;
use crate::core::error::{FlowError, Result};

impl Graph {
    /// Serialize to the JSON graph format. `load_json(to_json(g))` yields an
    /// equivalent graph up to insertion order.
    pub fn to_json(&self) -> Value {
        self.with_state(|state| {
            let mut properties = Map::new();
            if !state.name.is_empty() {
                properties.insert("name".to_string(), Value::String(state.name.clone()));
            }
            for (key, value) in &state.properties {
                properties.insert(key.clone(), value.clone());
            }

            let mut inports = Map::new();
            for (public, port) in &state.inports {
                inports.insert(public.clone(), exported_port_json(port));
            }
            let mut outports = Map::new();
            for (public, port) in &state.outports {
                outports.insert(public.clone(), exported_port_json(port));
            }

            let mut groups = Vec::new();
            for group in &state.groups {
                let mut entry = json!({
                    "name": group.name,
                    "nodes": group.nodes,
                });
                if !group.metadata.is_empty() {
                    entry["metadata"] = Value::Object(group.metadata.clone());
                }
                groups.push(entry);
            }

            let mut processes = Map::new();
            for node in &state.nodes {
                let mut entry = json!({ "component": node.component });
                if !node.metadata.is_empty() {
                    entry["metadata"] = Value::Object(node.metadata.clone());
                }
                processes.insert(node.id.clone(), entry);
            }

            let mut connections = Vec::new();
            for edge in &state.edges {
                let mut entry = json!({
                    "src": endpoint_json(&edge.src),
                    "tgt": endpoint_json(&edge.tgt),
                });
                if !edge.metadata.is_empty() {
                    entry["metadata"] = Value::Object(edge.metadata.clone());
                }
                connections.push(entry);
            }
            for initial in &state.initials {
                let mut entry = json!({
                    "data": initial.data,
                    "tgt": endpoint_json(&initial.tgt),
                });
                if !initial.metadata.is_empty() {
                    entry["metadata"] = Value::Object(initial.metadata.clone());
                }
                connections.push(entry);
            }

            let mut output = json!({
                "properties": properties,
                "inports": inports,
                "outports": outports,
                "groups": groups,
                "processes": processes,
                "connections": connections,
            });

            if !state.exports.is_empty() {
                output["exports"] = json!(
                    state
                        .exports
                        .iter()
                        .map(|export| {
                            json!({
                                "public": export.public,
                                "process": export.process,
                                "port": export.port,
                                "metadata": export.metadata,
                            })
                        })
                        .collect::<Vec<_>>()
                );
            }

            output
        })
    }

    /// Write the graph to `<base>.json`.
    pub fn save(&self, base: &str) -> Result<()> {
        let path = format!("{base}.json");
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, &self.to_json())?;
        Ok(())
    }
}

fn endpoint_json(endpoint: &super::types::Endpoint) -> Value {
    let mut entry = json!({
        "process": endpoint.node,
        "port": endpoint.port,
    });
    if let Some(index) = endpoint.index {
        entry["index"] = json!(index);
    }
    entry
}

fn exported_port_json(port: &super::types::ExportedPort) -> Value {
    let mut entry = json!({
        "process": port.process,
        "port": port.port,
    });
    if !port.metadata.is_empty() {
        entry["metadata"] = Value::Object(port.metadata.clone());
    }
    entry
}

fn metadata_of(value: &Value) -> Option<Metadata> {
    value
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
}

fn index_of(endpoint: &Value) -> Option<usize> {
    endpoint
        .get("index")
        .and_then(Value::as_u64)
        .map(|index| index as usize)
}

fn str_field<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| FlowError::Graph(format!("{context} is missing '{key}'")))
}

/// Load a graph from a JSON definition. All mutations run under a single
/// explicit `loadJSON` transaction.
pub fn load_json(definition: &Value, metadata: Option<Metadata>) -> Result<Rc<Graph>> {
    let name = definition
        .pointer("/properties/name")
        .and_then(Value::as_str)
        .unwrap_or("");
    let graph = Graph::new(name);

    graph.start_transaction("loadJSON", metadata)?;

    if let Some(properties) = definition.get("properties").and_then(Value::as_object) {
        let mut patch = Metadata::new();
        for (key, value) in properties {
            if key != "name" {
                patch.insert(key.clone(), value.clone());
            }
        }
        graph.set_properties(patch);
    }

    if let Some(processes) = definition.get("processes").and_then(Value::as_object) {
        for (id, process) in processes {
            let component = str_field(process, "component", &format!("process '{id}'"))?;
            graph.add_node(id, component, metadata_of(process));
        }
    }

    if let Some(connections) = definition.get("connections").and_then(Value::as_array) {
        for connection in connections {
            let connection_metadata = metadata_of(connection);
            let tgt = connection
                .get("tgt")
                .ok_or_else(|| FlowError::Graph("connection is missing 'tgt'".into()))?;
            let tgt_process = str_field(tgt, "process", "connection target")?;
            let tgt_port = str_field(tgt, "port", "connection target")?.to_lowercase();

            if let Some(data) = connection.get("data") {
                graph.add_initial_index(
                    data.clone(),
                    tgt_process,
                    &tgt_port,
                    index_of(tgt),
                    connection_metadata,
                );
                continue;
            }

            let src = connection
                .get("src")
                .ok_or_else(|| FlowError::Graph("connection is missing 'src'".into()))?;
            let src_process = str_field(src, "process", "connection source")?;
            let src_port = str_field(src, "port", "connection source")?.to_lowercase();

            graph.add_edge_index(
                src_process,
                &src_port,
                index_of(src),
                tgt_process,
                &tgt_port,
                index_of(tgt),
                connection_metadata,
            );
        }
    }

    // Legacy exported ports. Dotted `private` names resolve their process id
    // case-insensitively against the declared processes.
    if let Some(exports) = definition.get("exports").and_then(Value::as_array) {
        for exported in exports {
            let public = str_field(exported, "public", "export")?;
            let export_metadata = metadata_of(exported);

            let (process, port) = if let Some(private) =
                exported.get("private").and_then(Value::as_str)
            {
                let mut split = private.splitn(2, '.');
                let (Some(process), Some(port)) = (split.next(), split.next()) else {
                    continue;
                };
                let process = definition
                    .get("processes")
                    .and_then(Value::as_object)
                    .and_then(|processes| {
                        processes
                            .keys()
                            .find(|id| id.eq_ignore_ascii_case(process))
                            .cloned()
                    })
                    .unwrap_or_else(|| process.to_string());
                (process, port.to_lowercase())
            } else {
                (
                    str_field(exported, "process", "export")?.to_string(),
                    str_field(exported, "port", "export")?.to_lowercase(),
                )
            };

            graph.add_export(public, &process, &port, export_metadata);
        }
    }

    if let Some(inports) = definition.get("inports").and_then(Value::as_object) {
        for (public, private) in inports {
            let process = str_field(private, "process", &format!("inport '{public}'"))?;
            let port = str_field(private, "port", &format!("inport '{public}'"))?.to_lowercase();
            graph.add_inport(public, process, &port, metadata_of(private));
        }
    }

    if let Some(outports) = definition.get("outports").and_then(Value::as_object) {
        for (public, private) in outports {
            let process = str_field(private, "process", &format!("outport '{public}'"))?;
            let port = str_field(private, "port", &format!("outport '{public}'"))?.to_lowercase();
            graph.add_outport(public, process, &port, metadata_of(private));
        }
    }

    if let Some(groups) = definition.get("groups").and_then(Value::as_array) {
        for group in groups {
            let name = str_field(group, "name", "group")?;
            let nodes = group
                .get("nodes")
                .and_then(Value::as_array)
                .map(|nodes| {
                    nodes
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            graph.add_group(name, nodes, metadata_of(group))?;
        }
    }

    graph.end_transaction("loadJSON", None)?;

    Ok(graph)
}

/// Load a graph from a `.json` or `.fbp` file.
///
/// `.fbp` sources are converted by the external `fbp` tool, which must emit
/// the JSON form on stdout.
pub fn load_file(path: impl AsRef<Path>, metadata: Option<Metadata>) -> Result<Rc<Graph>> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("fbp") => {
            let output = Command::new("fbp").arg(path).output()?;
            if !output.status.success() {
                return Err(FlowError::Graph(format!(
                    "fbp failed for '{}': {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            let definition: Value = serde_json::from_slice(&output.stdout)?;
            load_json(&definition, metadata)
        }
        Some("json") => {
            let contents = std::fs::read_to_string(path)?;
            let definition: Value = serde_json::from_str(&contents)?;
            load_json(&definition, metadata)
        }
        _ => Err(FlowError::Graph(format!(
            "unsupported file type for '{}'",
            path.display()
        ))),
    }
}
