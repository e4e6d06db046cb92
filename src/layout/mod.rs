//! Position computation for traffic graphs.
//!
//! Discrete strategies are pure functions of `(topology, dimensions)` and go
//! through the [`LayoutDispatcher`]; the force simulation in [`physics`] is
//! stepped every tick instead.

mod cache;
mod dns;
pub mod geometry;
pub mod physics;
mod ranked;
mod ring;
mod ring_center;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use eframe::egui::Vec2;

use crate::config::LayoutConfig;

pub use cache::{LayoutCache, TopologyKey};
pub use dns::DnsRankLayout;
pub use ranked::{RankedLayout, split_bucket_sizes};
pub use ring::RingLayout;
pub use ring_center::RingCenterLayout;
pub use worker::{DispatchMode, LayoutDispatcher, LayoutJob, LayoutResponse};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
}

impl Dimensions {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::new(1440.0, 920.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutNode {
    pub name: String,
    pub size: f32,
    /// Relative importance used to order nodes inside a rank.
    pub weight: f64,
    pub position_hint: Option<Vec2>,
    pub rank_hint: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutEdge {
    pub name: String,
    pub source: String,
    pub target: String,
}

#[derive(Clone, Debug)]
pub struct LayoutInput {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    pub entry_nodes: Vec<String>,
    pub options: LayoutConfig,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutOutput {
    pub positions: HashMap<String, Vec2>,
    pub ranks: HashMap<String, usize>,
    pub columns: HashMap<String, usize>,
}

impl LayoutOutput {
    pub(crate) fn restricted_to<'a>(&self, names: impl Iterator<Item = &'a str>) -> Self {
        let mut output = Self::default();
        for name in names {
            if let Some(position) = self.positions.get(name) {
                output.positions.insert(name.to_owned(), *position);
            }
            if let Some(rank) = self.ranks.get(name) {
                output.ranks.insert(name.to_owned(), *rank);
            }
            if let Some(column) = self.columns.get(name) {
                output.columns.insert(name.to_owned(), *column);
            }
        }
        output
    }
}

/// A discrete layout: given the visible topology and the viewport, produce a
/// position for every node. Implementations must be callable from a worker
/// thread.
pub trait LayoutStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, input: &LayoutInput, dimensions: Dimensions) -> LayoutOutput;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutKind {
    Ranked,
    RingCenter,
    Ring,
    DnsRank,
}

impl LayoutKind {
    pub fn strategy(self, cache: &Arc<LayoutCache>) -> Arc<dyn LayoutStrategy> {
        match self {
            Self::Ranked => Arc::new(RankedLayout::new(Arc::clone(cache))),
            Self::RingCenter => Arc::new(RingCenterLayout),
            Self::Ring => Arc::new(RingLayout),
            Self::DnsRank => Arc::new(DnsRankLayout),
        }
    }
}
