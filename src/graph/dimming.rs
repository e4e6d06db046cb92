use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::TrafficGraph;

/// Time-boxed interpolation between two dim levels. Reads never block; the
/// current level is derived from the clock the caller passes in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DimState {
    from: f32,
    to: f32,
    started: Option<Instant>,
    duration: Duration,
}

impl Default for DimState {
    fn default() -> Self {
        Self {
            from: 0.0,
            to: 0.0,
            started: None,
            duration: Duration::ZERO,
        }
    }
}

impl DimState {
    pub fn level_at(&self, now: Instant) -> f32 {
        let Some(started) = self.started else {
            return self.to;
        };

        if self.duration.is_zero() {
            return self.to;
        }

        let elapsed = now.saturating_duration_since(started).as_secs_f32();
        let t = (elapsed / self.duration.as_secs_f32()).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * t
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        self.started
            .is_some_and(|started| now.saturating_duration_since(started) < self.duration)
    }

    pub(crate) fn retarget(&mut self, to: f32, now: Instant, duration: Duration) -> bool {
        let to = to.clamp(0.0, 1.0);
        if (self.to - to).abs() <= f32::EPSILON {
            return false;
        }

        self.from = self.level_at(now);
        self.to = to;
        self.started = Some(now);
        self.duration = duration;
        true
    }
}

/// Target dim levels keyed by object name. Objects missing from a map go
/// back to fully lit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DimTargets {
    pub nodes: HashMap<String, f32>,
    pub connections: HashMap<String, f32>,
}

impl TrafficGraph {
    pub(crate) fn apply_dimming(&mut self, targets: &DimTargets, now: Instant) -> usize {
        let duration = self.config.overlay.dimming_duration();
        let mut changed = 0usize;

        for (name, node) in &mut self.nodes {
            let target = targets.nodes.get(name).copied().unwrap_or(0.0);
            if node.dim.retarget(target, now, duration) {
                changed += 1;
            }
        }

        for (name, connection) in &mut self.connections {
            let target = targets.connections.get(name).copied().unwrap_or(0.0);
            if connection.dim.retarget(target, now, duration) {
                changed += 1;
            }
        }

        if changed > 0 {
            log::debug!("{}: dimming retargeted {changed} objects", self.name);
        }
        changed
    }

    pub fn node_dim_level(&self, name: &str, now: Instant) -> Option<f32> {
        self.nodes.get(name).map(|node| node.dim.level_at(now))
    }

    pub fn connection_dim_level(&self, name: &str, now: Instant) -> Option<f32> {
        self.connections
            .get(name)
            .map(|connection| connection.dim.level_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_linearly_over_duration() {
        let start = Instant::now();
        let mut state = DimState::default();
        assert!(state.retarget(0.8, start, Duration::from_millis(400)));

        assert_eq!(state.level_at(start), 0.0);
        let half = state.level_at(start + Duration::from_millis(200));
        assert!((half - 0.4).abs() < 1e-4);
        assert_eq!(state.level_at(start + Duration::from_secs(1)), 0.8);
        assert!(state.is_animating(start + Duration::from_millis(100)));
        assert!(!state.is_animating(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_retarget_mid_flight_starts_from_current_level() {
        let start = Instant::now();
        let mut state = DimState::default();
        state.retarget(1.0, start, Duration::from_millis(100));

        let mid = start + Duration::from_millis(50);
        state.retarget(0.0, mid, Duration::from_millis(100));
        assert!((state.level_at(mid) - 0.5).abs() < 1e-4);
        assert_eq!(state.level_at(mid + Duration::from_millis(100)), 0.0);
    }

    #[test]
    fn test_same_target_is_not_a_change() {
        let now = Instant::now();
        let mut state = DimState::default();
        assert!(!state.retarget(0.0, now, Duration::from_millis(100)));
    }
}
