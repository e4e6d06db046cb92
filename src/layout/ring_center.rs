use std::f32::consts::{PI, TAU};

use eframe::egui::{Vec2, vec2};

use super::{Dimensions, LayoutInput, LayoutOutput, LayoutStrategy};

const MAX_FIT_ITERATIONS: usize = 64;

/// Entry node at the origin, everything else on a circle sized to the nodes.
pub struct RingCenterLayout;

impl LayoutStrategy for RingCenterLayout {
    fn name(&self) -> &'static str {
        "ring-center"
    }

    fn run(&self, input: &LayoutInput, dimensions: Dimensions) -> LayoutOutput {
        let mut output = LayoutOutput::default();
        if input.nodes.is_empty() {
            return output;
        }

        let center = input
            .nodes
            .iter()
            .find(|node| input.entry_nodes.contains(&node.name))
            .or_else(|| {
                input
                    .nodes
                    .iter()
                    .max_by(|a, b| a.weight.total_cmp(&b.weight).then_with(|| b.name.cmp(&a.name)))
            });
        let Some(center) = center else {
            return output;
        };

        let mut ring = input
            .nodes
            .iter()
            .filter(|node| node.name != center.name)
            .collect::<Vec<_>>();
        ring.sort_by(|a, b| a.name.cmp(&b.name));

        let max_size = ring
            .iter()
            .map(|node| node.size)
            .fold(center.size, f32::max)
            .max(1.0);
        let radius = fit_radius(ring.len(), max_size, center.size, dimensions, input.options.ring_margin);

        let mut positions = vec![(center.name.clone(), Vec2::ZERO)];
        for (index, node) in ring.iter().enumerate() {
            let angle = -PI * 0.5 + TAU * index as f32 / ring.len() as f32;
            positions.push((node.name.clone(), vec2(angle.cos(), angle.sin()) * radius));
        }

        let (min_y, max_y) = positions
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(low, high), (_, position)| {
                (low.min(position.y), high.max(position.y))
            });
        let shift = (min_y + max_y) * 0.5;

        for (name, position) in positions {
            output.positions.insert(name, vec2(position.x, position.y - shift));
        }
        output
    }
}

/// Starts from the viewport-sized radius, grows until neighbouring nodes no
/// longer touch, and shrinks while there is more than twice the needed room.
pub(crate) fn fit_radius(
    count: usize,
    max_size: f32,
    center_size: f32,
    dimensions: Dimensions,
    margin: f32,
) -> f32 {
    let minimum = center_size + max_size * 2.0;
    let mut radius = (dimensions.width.min(dimensions.height) * 0.5 - margin).max(minimum);
    if count < 2 {
        return radius;
    }

    let needed = max_size * 3.0;
    for _ in 0..MAX_FIT_ITERATIONS {
        let chord = 2.0 * radius * (PI / count as f32).sin();
        if chord < needed {
            radius *= 1.1;
        } else if chord > needed * 2.0 && radius * 0.95 >= minimum {
            radius *= 0.95;
        } else {
            break;
        }
    }
    radius
}
