//! Incoming traffic snapshot model.
//!
//! Field names follow the camelCase JSON the embedding application sends.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::Notice;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub renderer: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub entry_node: Option<String>,
    #[serde(default)]
    pub max_volume: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<SnapshotNode>,
    #[serde(default)]
    pub connections: Vec<SnapshotConnection>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SnapshotPosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub name: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub notices: Vec<Notice>,
    #[serde(default)]
    pub position: Option<SnapshotPosition>,
    #[serde(default)]
    pub size: Option<f32>,
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub renderer: Option<String>,
    #[serde(default)]
    pub entry_node: Option<String>,
    #[serde(default)]
    pub max_volume: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<SnapshotNode>,
    #[serde(default)]
    pub connections: Vec<SnapshotConnection>,
}

impl SnapshotNode {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The nested region snapshot a global-level node carries, if any.
    pub fn region_snapshot(&self) -> Option<Snapshot> {
        let renderer = match self.renderer.as_deref() {
            Some(kind @ ("region" | "dns")) => kind.to_owned(),
            _ if !self.nodes.is_empty() => "region".to_owned(),
            _ => return None,
        };

        Some(Snapshot {
            renderer: Some(renderer),
            name: self.name.clone(),
            entry_node: self.entry_node.clone(),
            max_volume: self.max_volume,
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConnection {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub notices: Vec<Notice>,
    #[serde(default)]
    pub annotations: Vec<Value>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl SnapshotConnection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_metric(mut self, class: &str, value: f64) -> Self {
        self.metrics
            .get_or_insert_with(BTreeMap::new)
            .insert(class.to_owned(), value);
        self
    }
}

pub fn parse_snapshot(raw: &str) -> Result<Snapshot> {
    let parsed: Value = serde_json::from_str(raw).context("invalid snapshot JSON")?;
    if !parsed.is_object() {
        return Err(anyhow!("snapshot JSON must be an object"));
    }

    Snapshot::deserialize(parsed).context("snapshot JSON does not match the expected shape")
}

/// Builds the drill-down view around `focus`: the service itself, every
/// direct upstream and downstream neighbour, and the connections touching it.
pub fn focused_snapshot(parent: &Snapshot, focus: &str) -> Option<Snapshot> {
    let focus_node = parent.nodes.iter().find(|node| node.name == focus)?;

    let connections = parent
        .connections
        .iter()
        .filter(|connection| connection.source == focus || connection.target == focus)
        .cloned()
        .collect::<Vec<_>>();

    let mut keep = BTreeSet::from([focus_node.name.as_str()]);
    for connection in &connections {
        keep.insert(connection.source.as_str());
        keep.insert(connection.target.as_str());
    }

    let nodes = parent
        .nodes
        .iter()
        .filter(|node| keep.contains(node.name.as_str()))
        .map(|node| SnapshotNode {
            nodes: Vec::new(),
            connections: Vec::new(),
            position: None,
            ..node.clone()
        })
        .collect();

    Some(Snapshot {
        renderer: Some("focused".to_owned()),
        name: focus.to_owned(),
        entry_node: None,
        max_volume: parent.max_volume,
        nodes,
        connections,
    })
}
