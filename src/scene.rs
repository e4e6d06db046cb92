//! Owns every graph: the global view, region graphs created on first sight,
//! and at most one focused drill-down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::graph::{GraphContext, GraphEvent, GraphKind, StateChange, TrafficGraph};
use crate::layout::{Dimensions, DispatchMode, LayoutCache, LayoutDispatcher};
use crate::snapshot::Snapshot;

pub struct Scene {
    context: GraphContext,
    global: TrafficGraph,
    regions: HashMap<String, TrafficGraph>,
    focused: Option<TrafficGraph>,
    view: Vec<String>,
}

impl Scene {
    pub fn new(config: Arc<EngineConfig>, mode: DispatchMode, dimensions: Dimensions) -> Self {
        let context = GraphContext {
            config,
            dispatcher: Arc::new(LayoutDispatcher::new(mode)),
            layout_cache: Arc::new(LayoutCache::default()),
            dimensions,
        };
        let mut global = TrafficGraph::new(GraphKind::Global, Vec::new(), &context);
        global.set_current(true);

        Self {
            context,
            global,
            regions: HashMap::new(),
            focused: None,
            view: Vec::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<LayoutDispatcher> {
        &self.context.dispatcher
    }

    pub fn layout_cache(&self) -> &Arc<LayoutCache> {
        &self.context.layout_cache
    }

    pub fn view(&self) -> &[String] {
        &self.view
    }

    pub fn global(&self) -> &TrafficGraph {
        &self.global
    }

    pub fn region(&self, name: &str) -> Option<&TrafficGraph> {
        self.regions.get(name)
    }

    pub fn focused(&self) -> Option<&TrafficGraph> {
        self.focused.as_ref()
    }

    pub fn region_names(&self) -> Vec<&str> {
        let mut names = self.regions.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn current_graph(&self) -> &TrafficGraph {
        match self.view.as_slice() {
            [_, _] => self.focused.as_ref().unwrap_or(&self.global),
            [region] => self.regions.get(region).unwrap_or(&self.global),
            _ => &self.global,
        }
    }

    pub fn current_graph_mut(&mut self) -> &mut TrafficGraph {
        match self.view.as_slice() {
            [_, _] if self.focused.is_some() => self.focused.as_mut().unwrap_or(&mut self.global),
            [region] if self.regions.contains_key(region) => {
                let region = region.clone();
                self.regions.get_mut(&region).unwrap_or(&mut self.global)
            }
            _ => &mut self.global,
        }
    }

    /// Feeds one snapshot to the scene. A global snapshot updates the global
    /// graph and every region it nests; a region snapshot goes straight to
    /// that region. Background graphs only cache what they receive.
    pub fn update_data(&mut self, snapshot: Snapshot) -> StateChange {
        let kind = GraphKind::from_renderer(snapshot.renderer.as_deref()).unwrap_or(GraphKind::Global);
        if matches!(kind, GraphKind::Region | GraphKind::Dns) {
            return self.update_region(snapshot, kind);
        }

        let nested = snapshot
            .nodes
            .iter()
            .filter_map(|node| node.region_snapshot())
            .collect::<Vec<_>>();
        let change = self.global.set_state(snapshot, false);

        for region in nested {
            let kind = GraphKind::from_renderer(region.renderer.as_deref()).unwrap_or(GraphKind::Region);
            self.update_region(region, kind);
        }
        change
    }

    fn update_region(&mut self, snapshot: Snapshot, kind: GraphKind) -> StateChange {
        let name = snapshot.name.clone();
        let context = &self.context;
        let region = self.regions.entry(name.clone()).or_insert_with(|| {
            log::debug!("creating {kind:?} graph for {name}");
            TrafficGraph::new(kind, vec![name.clone()], context)
        });

        let focused_parent = self
            .focused
            .as_ref()
            .is_some_and(|focused| focused.path().first() == Some(&name))
            .then(|| snapshot.clone());

        let change = region.set_state(snapshot, false);

        if let (Some(parent), Some(focused)) = (focused_parent, self.focused.as_mut()) {
            focused.set_state_from_parent(&parent, false);
        }
        change
    }

    /// Switches the displayed graph. `[]` is global, `[region]` a region,
    /// `[region, service]` a drill-down. Unknown paths are refused.
    pub fn set_view(&mut self, path: &[String]) -> bool {
        if path.len() > 2 {
            return false;
        }
        if let Some(region) = path.first() {
            let Some(graph) = self.regions.get(region) else {
                log::warn!("no region graph named {region}");
                return false;
            };
            if let Some(service) = path.get(1) {
                let known = graph.node(service).is_some()
                    || graph
                        .latest_snapshot()
                        .is_some_and(|snapshot| snapshot.nodes.iter().any(|node| &node.name == service));
                if !known {
                    log::warn!("region {region} has no service {service}");
                    return false;
                }
            }
        }
        if self.view == path {
            return true;
        }

        log::info!("switching view to {:?}", path);
        self.global.set_current(false);
        for region in self.regions.values_mut() {
            region.set_current(false);
        }
        let keep_focus = path.len() == 2
            && self.focused.as_ref().is_some_and(|focused| focused.path() == path);
        if !keep_focus && let Some(previous) = self.focused.take() {
            if let Some(region) = previous.path().first().and_then(|r| self.regions.get_mut(r)) {
                region.release_node(previous.name());
            }
        }
        if let Some(focused) = self.focused.as_mut() {
            focused.set_current(false);
        }

        self.view = path.to_vec();
        match path {
            [] => self.global.set_current(true),
            [region] => {
                if let Some(graph) = self.regions.get_mut(region) {
                    graph.set_current(true);
                }
            }
            [region, service] => self.focus(region, service),
            _ => {}
        }
        true
    }

    fn focus(&mut self, region: &str, service: &str) {
        let Some(parent) = self.regions.get_mut(region) else {
            return;
        };
        parent.hold_node(service);
        let parent_snapshot = parent.latest_snapshot().cloned();

        let focused = self.focused.get_or_insert_with(|| {
            TrafficGraph::new(
                GraphKind::Focused,
                vec![region.to_owned(), service.to_owned()],
                &self.context,
            )
        });
        focused.set_current(true);
        if let Some(parent_snapshot) = parent_snapshot {
            focused.set_state_from_parent(&parent_snapshot, false);
        }
    }

    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        self.context.dimensions = dimensions;
        self.global.set_dimensions(dimensions);
        for region in self.regions.values_mut() {
            region.set_dimensions(dimensions);
        }
        if let Some(focused) = self.focused.as_mut() {
            focused.set_dimensions(dimensions);
        }
    }

    fn graphs_mut(&mut self) -> impl Iterator<Item = &mut TrafficGraph> {
        std::iter::once(&mut self.global)
            .chain(self.regions.values_mut())
            .chain(self.focused.as_mut())
    }

    /// Per-frame work for every graph. Drill-down requests raised by the
    /// graphs are acted on here; all events are handed back to the caller.
    pub fn tick(&mut self, now: Instant, delta_seconds: f32) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        for graph in self.graphs_mut() {
            graph.tick(now, delta_seconds);
            events.extend(graph.take_events());
        }

        for event in &events {
            if let GraphEvent::SetView { path } = event {
                self.set_view(path);
            }
        }
        events
    }
}
