//! Serialized material description: the editor-facing JSON format and its
//! conversion into a live [`MaterialGraph`].

use std::collections::HashMap;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::graph::node::NodeHandle;
use crate::graph::registry::NodeRegistry;
use crate::graph::MaterialGraph;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphDescription {
    pub version: String,
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Stage name (`vertex` / `fragment` / `compute`) → root node id.
    pub outputs: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDescription {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One edge: `from`'s output feeds input slot `to_input` of `to`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Connection {
    pub from: String,
    pub to: String,
    #[serde(default, rename = "toInput")]
    pub to_input: u32,
}

/// Drops nodes unreachable from any declared output, so editor leftovers
/// never trip node construction.
pub fn treeshake_unreachable_nodes(desc: &GraphDescription) -> GraphDescription {
    let mut inputs_of: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for c in &desc.connections {
        inputs_of.entry(c.to.as_str()).or_default().push(c.from.as_str());
    }

    let mut keep: FxHashSet<&str> = FxHashSet::default();
    let mut frontier: Vec<&str> = desc.outputs.values().map(String::as_str).collect();
    while let Some(id) = frontier.pop() {
        if keep.insert(id) {
            if let Some(inputs) = inputs_of.get(id) {
                frontier.extend(inputs.iter().copied());
            }
        }
    }

    let nodes: Vec<NodeDescription> = desc
        .nodes
        .iter()
        .filter(|n| keep.contains(n.id.as_str()))
        .cloned()
        .collect();
    let connections: Vec<Connection> = desc
        .connections
        .iter()
        .filter(|c| keep.contains(c.to.as_str()))
        .cloned()
        .collect();

    debug!(
        "treeshake: kept {}/{} nodes",
        nodes.len(),
        desc.nodes.len()
    );

    GraphDescription {
        version: desc.version.clone(),
        nodes,
        connections,
        outputs: desc.outputs.clone(),
    }
}

pub fn load_description(json: &str) -> Result<GraphDescription, CompileError> {
    serde_json::from_str(json)
        .map_err(|e| CompileError::Description(format!("malformed graph description: {e}")))
}

pub fn load_description_from_path(
    path: impl AsRef<std::path::Path>,
) -> Result<GraphDescription, CompileError> {
    let text = std::fs::read_to_string(&path).map_err(|e| {
        CompileError::Description(format!(
            "cannot read `{}`: {e}",
            path.as_ref().display()
        ))
    })?;
    load_description(&text)
}

/// Instantiate the described graph through the registry. Output edges are
/// ordered by input slot; a cyclic description is rejected here, before
/// any node is built.
pub fn build_material_graph(
    desc: &GraphDescription,
    registry: &NodeRegistry,
) -> Result<MaterialGraph, CompileError> {
    let desc = treeshake_unreachable_nodes(desc);

    let mut by_id: FxHashMap<&str, &NodeDescription> = FxHashMap::default();
    for node in &desc.nodes {
        if by_id.insert(node.id.as_str(), node).is_some() {
            return Err(CompileError::Description(format!(
                "duplicate node id `{}`",
                node.id
            )));
        }
    }

    let mut inputs_of: FxHashMap<&str, Vec<&Connection>> = FxHashMap::default();
    for c in &desc.connections {
        inputs_of.entry(c.to.as_str()).or_default().push(c);
    }
    for inputs in inputs_of.values_mut() {
        inputs.sort_by_key(|c| c.to_input);
    }

    let mut built: FxHashMap<String, NodeHandle> = FxHashMap::default();
    let mut visiting: FxHashSet<String> = FxHashSet::default();

    fn build_node(
        id: &str,
        by_id: &FxHashMap<&str, &NodeDescription>,
        inputs_of: &FxHashMap<&str, Vec<&Connection>>,
        registry: &NodeRegistry,
        built: &mut FxHashMap<String, NodeHandle>,
        visiting: &mut FxHashSet<String>,
    ) -> Result<NodeHandle, CompileError> {
        if let Some(node) = built.get(id) {
            return Ok(node.clone());
        }
        if !visiting.insert(id.to_string()) {
            return Err(CompileError::Description(format!(
                "cyclic connection through node `{id}`"
            )));
        }
        let desc = by_id.get(id).ok_or_else(|| {
            CompileError::Description(format!("connection references unknown node `{id}`"))
        })?;

        let mut children = Vec::new();
        if let Some(inputs) = inputs_of.get(id) {
            for c in inputs {
                children.push(build_node(
                    &c.from, by_id, inputs_of, registry, built, visiting,
                )?);
            }
        }

        let node = registry.create(&desc.node_type, &desc.params, children)?;
        visiting.remove(id);
        built.insert(id.to_string(), node.clone());
        Ok(node)
    }

    let mut graph = MaterialGraph::default();
    for (stage, root_id) in &desc.outputs {
        let root = build_node(
            root_id,
            &by_id,
            &inputs_of,
            registry,
            &mut built,
            &mut visiting,
        )?;
        match stage.as_str() {
            "vertex" => graph.vertex = Some(root),
            "fragment" => graph.fragment = Some(root),
            "compute" => graph.compute = Some(root),
            other => {
                return Err(CompileError::Description(format!(
                    "unknown output stage `{other}`"
                )))
            }
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desc(value: serde_json::Value) -> GraphDescription {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn treeshake_drops_unreachable_nodes() {
        let d = desc(json!({
            "version": "1",
            "nodes": [
                { "id": "a", "type": "Float", "params": { "value": 1.0 } },
                { "id": "b", "type": "Float", "params": { "value": 2.0 } },
                { "id": "out", "type": "Join" }
            ],
            "connections": [
                { "from": "a", "to": "out", "toInput": 0 }
            ],
            "outputs": { "fragment": "out" }
        }));
        let shaken = treeshake_unreachable_nodes(&d);
        assert_eq!(shaken.nodes.len(), 2);
        assert!(shaken.nodes.iter().all(|n| n.id != "b"));
    }

    #[test]
    fn builds_graph_with_slot_ordered_inputs() {
        let d = desc(json!({
            "version": "1",
            "nodes": [
                { "id": "x", "type": "Float", "params": { "value": 1.0 } },
                { "id": "y", "type": "Float", "params": { "value": 2.0 } },
                { "id": "sub", "type": "Subtract" }
            ],
            "connections": [
                { "from": "y", "to": "sub", "toInput": 1 },
                { "from": "x", "to": "sub", "toInput": 0 }
            ],
            "outputs": { "fragment": "sub" }
        }));
        let graph = build_material_graph(&d, &NodeRegistry::with_builtins()).unwrap();
        let root = graph.fragment.unwrap();
        assert_eq!(root.node_type(), "Operator");
        assert_eq!(root.children().len(), 2);
    }

    #[test]
    fn cyclic_descriptions_are_rejected() {
        let d = desc(json!({
            "version": "1",
            "nodes": [
                { "id": "a", "type": "Sin" },
                { "id": "b", "type": "Cos" }
            ],
            "connections": [
                { "from": "a", "to": "b", "toInput": 0 },
                { "from": "b", "to": "a", "toInput": 0 }
            ],
            "outputs": { "fragment": "a" }
        }));
        let Err(err) = build_material_graph(&d, &NodeRegistry::with_builtins()) else {
            panic!("cyclic graph must not build");
        };
        assert!(err.to_string().contains("cyclic"), "{err}");
    }

    #[test]
    fn unknown_output_node_is_an_error() {
        let d = desc(json!({
            "version": "1",
            "nodes": [],
            "connections": [],
            "outputs": { "fragment": "missing" }
        }));
        let Err(err) = build_material_graph(&d, &NodeRegistry::with_builtins()) else {
            panic!("missing output node must not build");
        };
        assert!(err.to_string().contains("unknown node"), "{err}");
    }
}
