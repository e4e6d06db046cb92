use std::f32::consts::{PI, TAU};

use eframe::egui::vec2;

use super::{Dimensions, LayoutInput, LayoutOutput, LayoutStrategy};

/// Nodes evenly spaced on an ellipse fitted to the viewport. Nodes carrying
/// a position hint keep it and are left out of the spacing.
pub struct RingLayout;

impl LayoutStrategy for RingLayout {
    fn name(&self) -> &'static str {
        "ring"
    }

    fn run(&self, input: &LayoutInput, dimensions: Dimensions) -> LayoutOutput {
        let mut output = LayoutOutput::default();
        let margin = input.options.ring_margin;
        let radius_x = (dimensions.width * 0.5 - margin).max(1.0);
        let radius_y = (dimensions.height * 0.5 - margin).max(1.0);

        let mut free = Vec::new();
        for node in &input.nodes {
            match node.position_hint {
                Some(hint) => {
                    output.positions.insert(node.name.clone(), hint);
                }
                None => free.push(node.name.as_str()),
            }
        }
        free.sort_unstable();

        for (index, name) in free.iter().enumerate() {
            let angle = -PI * 0.5 + TAU * index as f32 / free.len() as f32;
            output.positions.insert(
                (*name).to_owned(),
                vec2(angle.cos() * radius_x, angle.sin() * radius_y),
            );
        }
        output
    }
}
