//! Continuous force-directed placement.
//!
//! Nodes are point masses on Hookean springs (connections) with short-range
//! mutual repulsion and viscous damping. Unlike the discrete strategies this
//! runs every tick while enabled.

mod forces;
mod quadtree;

use std::collections::HashMap;

use eframe::egui::Vec2;

use crate::config::PhysicsConfig;
use crate::util::stable_pair;
use forces::{ForceParams, accumulate_repulsion, accumulate_springs};
use quadtree::QuadTree;

struct Body {
    name: String,
    position: Vec2,
    velocity: Vec2,
}

pub struct ForceSimulation {
    config: PhysicsConfig,
    bodies: Vec<Body>,
    springs: Vec<(usize, usize)>,
    anchor: Option<usize>,
    forces: Vec<Vec2>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
}

impl ForceSimulation {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            bodies: Vec::new(),
            springs: Vec::new(),
            anchor: None,
            forces: Vec::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
        }
    }

    /// Replaces the simulated topology. Bodies that survive keep their
    /// velocity; positions always come from the graph, since a discrete
    /// layout may have moved them since the last tick.
    pub fn sync<'a>(
        &mut self,
        nodes: impl IntoIterator<Item = (&'a str, Vec2)>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
        anchor: Option<&str>,
    ) {
        let mut prior = self
            .bodies
            .drain(..)
            .map(|body| (body.name.clone(), body.velocity))
            .collect::<HashMap<_, _>>();

        for (name, position) in nodes {
            let velocity = prior.remove(name).unwrap_or(Vec2::ZERO);
            let mut position = position;
            if position == Vec2::ZERO {
                let (jx, jy) = stable_pair(name);
                position = Vec2::new(jx, jy) * self.config.spring_length;
            }
            self.bodies.push(Body {
                name: name.to_owned(),
                position,
                velocity,
            });
        }

        let index_by_name = self
            .bodies
            .iter()
            .enumerate()
            .map(|(index, body)| (body.name.as_str(), index))
            .collect::<HashMap<_, _>>();

        self.springs = edges
            .into_iter()
            .filter_map(|(source, target)| {
                Some((*index_by_name.get(source)?, *index_by_name.get(target)?))
            })
            .filter(|(from, to)| from != to)
            .collect();
        self.anchor = anchor.and_then(|name| index_by_name.get(name).copied());
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = (&str, Vec2)> {
        self.bodies
            .iter()
            .map(|body| (body.name.as_str(), body.position))
    }

    /// Advances one tick. Returns whether anything is still moving.
    pub fn step(&mut self, delta_seconds: f32) -> bool {
        let count = self.bodies.len();
        if count < 2 {
            return false;
        }

        let intensity = self.config.intensity.clamp(0.2, 2.5);
        let params = ForceParams {
            repulsion: 60_000.0 * intensity,
            repulsion_range: self.config.spring_length * 2.5,
            softening: 400.0,
            spring: 0.02 * intensity,
            spring_length: self.config.spring_length,
            spring_damping: 0.22,
        };
        let time_step_scale = (delta_seconds * 60.0).clamp(0.25, 3.0);
        let damping = self
            .config
            .velocity_damping
            .clamp(0.5, 0.99)
            .powf(time_step_scale);

        self.forces.clear();
        self.forces.resize(count, Vec2::ZERO);
        self.positions.clear();
        self.velocities.clear();
        for body in &self.bodies {
            self.positions.push(body.position);
            self.velocities.push(body.velocity);
        }

        if let Some(tree) = QuadTree::build(&self.positions) {
            accumulate_repulsion(&tree, &self.positions, params, &mut self.forces);
        }
        accumulate_springs(
            &self.springs,
            &self.positions,
            &self.velocities,
            params,
            &mut self.forces,
        );

        let max_force = 120.0 + intensity * 90.0;
        let max_speed = 10.0 + intensity * 15.0;
        let mut any_motion = false;

        for (index, body) in self.bodies.iter_mut().enumerate() {
            if Some(index) == self.anchor {
                body.velocity = Vec2::ZERO;
                continue;
            }

            let mut force = self.forces[index];
            if force.length() > max_force {
                force = force.normalized() * max_force;
            }

            let mut velocity = (body.velocity + force * (0.055 * time_step_scale)) * damping;
            if velocity.length() > max_speed {
                velocity = velocity.normalized() * max_speed;
            }
            if velocity.length_sq() < 0.02 * 0.02 && force.length_sq() < 0.08 * 0.08 {
                velocity = Vec2::ZERO;
            }

            body.velocity = velocity;
            body.position += velocity * time_step_scale;
            any_motion |= velocity.length_sq() > 0.000_001;
        }

        any_motion
    }
}
