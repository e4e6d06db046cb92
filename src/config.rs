//! Engine configuration.
//!
//! Every field has a default so an empty JSON object (or no file at all) is a
//! valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub particles: ParticleConfig,

    #[serde(default)]
    pub physics: PhysicsConfig,

    /// Minimum notice severity that counts for `has_notices`.
    #[serde(default)]
    pub notice_severity_threshold: Option<u8>,

    #[serde(default = "default_layout_watchdog_ms")]
    pub layout_watchdog_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            overlay: OverlayConfig::default(),
            particles: ParticleConfig::default(),
            physics: PhysicsConfig::default(),
            notice_severity_threshold: None,
            layout_watchdog_ms: default_layout_watchdog_ms(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid engine config in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let particles = &self.particles;
        ensure!(
            particles.min_release_delay_ms > 0.0 && particles.min_release_delay_ms.is_finite(),
            "particles.min_release_delay_ms must be positive, got {}",
            particles.min_release_delay_ms
        );
        ensure!(
            particles.max_release_delay_ms >= particles.min_release_delay_ms
                && particles.max_release_delay_ms.is_finite(),
            "particles.max_release_delay_ms must be finite and at least min_release_delay_ms, got {}",
            particles.max_release_delay_ms
        );
        ensure!(
            self.layout.max_per_rank > 0,
            "layout.max_per_rank must be at least 1"
        );
        Ok(())
    }

    pub fn layout_watchdog(&self) -> Duration {
        Duration::from_millis(self.layout_watchdog_ms)
    }
}

fn default_layout_watchdog_ms() -> u64 {
    10_000
}

#[derive(Clone, Debug, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_max_per_rank")]
    pub max_per_rank: usize,

    #[serde(default)]
    pub entry_adjacent_ranking: bool,

    #[serde(default = "default_ring_margin")]
    pub ring_margin: f32,

    #[serde(default = "default_dns_row_height")]
    pub dns_row_height: f32,

    #[serde(default = "default_node_size")]
    pub default_node_size: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            max_per_rank: default_max_per_rank(),
            entry_adjacent_ranking: false,
            ring_margin: default_ring_margin(),
            dns_row_height: default_dns_row_height(),
            default_node_size: default_node_size(),
        }
    }
}

fn default_max_per_rank() -> usize {
    8
}

fn default_ring_margin() -> f32 {
    60.0
}

fn default_dns_row_height() -> f32 {
    120.0
}

fn default_node_size() -> f32 {
    16.0
}

#[derive(Clone, Debug, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_dimming_duration_ms")]
    pub dimming_duration_ms: u64,

    /// Dim level applied to objects outside a highlight or search match.
    #[serde(default = "default_dimmed_level")]
    pub dimmed_level: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            dimming_duration_ms: default_dimming_duration_ms(),
            dimmed_level: default_dimmed_level(),
        }
    }
}

impl OverlayConfig {
    pub fn dimming_duration(&self) -> Duration {
        Duration::from_millis(self.dimming_duration_ms)
    }
}

fn default_dimming_duration_ms() -> u64 {
    500
}

fn default_dimmed_level() -> f32 {
    0.8
}

#[derive(Clone, Debug, Deserialize)]
pub struct ParticleConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_inflection_percent")]
    pub inflection_percent: f64,

    #[serde(default = "default_min_release_delay_ms")]
    pub min_release_delay_ms: f64,

    #[serde(default = "default_max_release_delay_ms")]
    pub max_release_delay_ms: f64,

    #[serde(default = "default_max_per_release")]
    pub max_per_release: f64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            inflection_percent: default_inflection_percent(),
            min_release_delay_ms: default_min_release_delay_ms(),
            max_release_delay_ms: default_max_release_delay_ms(),
            max_per_release: default_max_per_release(),
        }
    }
}

fn default_pool_size() -> usize {
    500
}

fn default_inflection_percent() -> f64 {
    0.1
}

fn default_min_release_delay_ms() -> f64 {
    80.0
}

fn default_max_release_delay_ms() -> f64 {
    4000.0
}

fn default_max_per_release() -> f64 {
    10.0
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_intensity")]
    pub intensity: f32,

    #[serde(default = "default_velocity_damping")]
    pub velocity_damping: f32,

    #[serde(default = "default_spring_length")]
    pub spring_length: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: default_intensity(),
            velocity_damping: default_velocity_damping(),
            spring_length: default_spring_length(),
        }
    }
}

fn default_intensity() -> f32 {
    1.0
}

fn default_velocity_damping() -> f32 {
    0.9
}

fn default_spring_length() -> f32 {
    96.0
}
