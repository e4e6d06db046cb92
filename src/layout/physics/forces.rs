use eframe::egui::{Vec2, vec2};

use super::quadtree::QuadTree;

#[derive(Clone, Copy)]
pub(super) struct ForceParams {
    pub(super) repulsion: f32,
    pub(super) repulsion_range: f32,
    pub(super) softening: f32,
    pub(super) spring: f32,
    pub(super) spring_length: f32,
    pub(super) spring_damping: f32,
}

fn separation(delta: Vec2, first: usize, second: usize) -> (Vec2, f32) {
    let distance = delta.length();
    if distance > 0.0001 {
        return (delta / distance, distance);
    }

    let angle = ((first as f32) * 0.618_034 + (second as f32) * 0.414_214) * std::f32::consts::TAU;
    (vec2(angle.cos(), angle.sin()), 0.0)
}

/// Short-range mutual repulsion: only pairs closer than the range push on
/// each other, with a softened inverse-square falloff.
pub(super) fn accumulate_repulsion(
    tree: &QuadTree,
    positions: &[Vec2],
    params: ForceParams,
    forces: &mut [Vec2],
) {
    let range_sq = params.repulsion_range * params.repulsion_range;
    for (index, &position) in positions.iter().enumerate() {
        let mut push = Vec2::ZERO;
        tree.visit_near(position, params.repulsion_range, &mut |other| {
            if other == index {
                return;
            }

            let delta = position - positions[other];
            let distance_sq = delta.length_sq();
            if distance_sq > range_sq {
                return;
            }

            let (direction, _) = separation(delta, index, other);
            push += direction * (params.repulsion / (distance_sq + params.softening));
        });
        forces[index] += push;
    }
}

/// Hookean springs along connections with damping on the relative velocity.
pub(super) fn accumulate_springs(
    springs: &[(usize, usize)],
    positions: &[Vec2],
    velocities: &[Vec2],
    params: ForceParams,
    forces: &mut [Vec2],
) {
    for &(from, to) in springs {
        if from == to {
            continue;
        }

        let (direction, distance) = separation(positions[from] - positions[to], from, to);
        let stretch = (distance - params.spring_length) * params.spring;
        let closing = (velocities[from] - velocities[to]).dot(direction) * params.spring_damping;
        let correction = direction * (stretch + closing);

        forces[from] -= correction;
        forces[to] += correction;
    }
}
