use std::collections::HashSet;
use std::time::Instant;

use super::{DimTargets, GraphEvent, TrafficGraph};
use crate::entity::{GraphObject, ObjectRef};

impl TrafficGraph {
    pub fn highlighted(&self) -> Option<&ObjectRef> {
        self.highlighted.as_ref()
    }

    /// Selects an object (or clears the selection with `None`) and dims
    /// everything outside its neighbourhood. Unknown objects are refused.
    pub fn highlight_object(&mut self, object: Option<ObjectRef>, now: Instant) -> bool {
        let known = match &object {
            None => true,
            Some(ObjectRef::Node(name)) => self.nodes.contains_key(name),
            Some(ObjectRef::Connection(name)) => self.connections.contains_key(name),
        };
        if !known {
            log::debug!("{}: cannot highlight unknown {object:?}", self.name);
            return false;
        }
        if self.highlighted == object {
            return false;
        }

        self.highlighted = object.clone();
        self.events.push(GraphEvent::ObjectHighlighted {
            graph: self.name.clone(),
            object,
        });
        self.refresh_overlay(now);
        true
    }

    /// Recomputes dim targets from the current highlight, falling back to
    /// the search overlay, and starts the transitions.
    pub(crate) fn refresh_overlay(&mut self, now: Instant) -> usize {
        let targets = if let Some(object) = &self.highlighted {
            let (nodes, connections) = self.neighbourhood(object);
            self.dim_all_except(&nodes, &connections)
        } else if self.search.is_some() {
            let nodes = self.search_matches.clone();
            let connections = self
                .connections
                .iter()
                .filter(|(_, connection)| {
                    nodes.contains(connection.source()) || nodes.contains(connection.target())
                })
                .map(|(name, _)| name.clone())
                .collect();
            self.dim_all_except(&nodes, &connections)
        } else {
            DimTargets::default()
        };

        self.apply_dimming(&targets, now)
    }

    /// The objects that stay lit around a selection: a node with its
    /// visible neighbours and the visible connections between them, or a
    /// connection with both endpoints.
    fn neighbourhood(&self, object: &ObjectRef) -> (HashSet<String>, HashSet<String>) {
        let mut nodes = HashSet::new();
        let mut connections = HashSet::new();

        match object {
            ObjectRef::Node(name) => {
                let Some(node) = self.nodes.get(name) else {
                    return (nodes, connections);
                };
                nodes.insert(name.clone());

                for connection_name in node.incoming.iter().chain(node.outgoing.iter()) {
                    let Some(connection) = self.connections.get(connection_name) else {
                        continue;
                    };
                    if !connection.is_visible() {
                        continue;
                    }
                    connections.insert(connection_name.clone());

                    let other = if connection.source() == name {
                        connection.target()
                    } else {
                        connection.source()
                    };
                    if self.nodes.get(other).is_some_and(|node| node.is_visible()) {
                        nodes.insert(other.to_owned());
                    }
                }
            }
            ObjectRef::Connection(name) => {
                if let Some(connection) = self.connections.get(name) {
                    connections.insert(name.clone());
                    nodes.insert(connection.source().to_owned());
                    nodes.insert(connection.target().to_owned());
                }
            }
        }

        (nodes, connections)
    }

    fn dim_all_except(&self, nodes: &HashSet<String>, connections: &HashSet<String>) -> DimTargets {
        let level = self.config.overlay.dimmed_level;
        DimTargets {
            nodes: self
                .nodes
                .keys()
                .filter(|name| !nodes.contains(*name))
                .map(|name| (name.clone(), level))
                .collect(),
            connections: self
                .connections
                .keys()
                .filter(|name| !connections.contains(*name))
                .map(|name| (name.clone(), level))
                .collect(),
        }
    }
}
