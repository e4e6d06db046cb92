use std::collections::BTreeMap;

use eframe::egui::vec2;

use super::{Dimensions, LayoutInput, LayoutOutput, LayoutStrategy};

/// Deterministic grid: one row per externally supplied rank, nodes evenly
/// spread across the row. Unranked nodes go in a row after the last rank.
pub struct DnsRankLayout;

impl LayoutStrategy for DnsRankLayout {
    fn name(&self) -> &'static str {
        "dns-rank"
    }

    fn run(&self, input: &LayoutInput, dimensions: Dimensions) -> LayoutOutput {
        let mut output = LayoutOutput::default();
        let unranked = input
            .nodes
            .iter()
            .filter_map(|node| node.rank_hint)
            .max()
            .map_or(0, |rank| rank + 1);

        let mut rows: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for node in &input.nodes {
            rows.entry(node.rank_hint.unwrap_or(unranked))
                .or_default()
                .push(node.name.as_str());
        }

        let row_height = input.options.dns_row_height;
        let total_height = row_height * rows.len().saturating_sub(1) as f32;
        for (row, (rank, mut names)) in rows.into_iter().enumerate() {
            names.sort_unstable();
            let spacing = dimensions.width / (names.len() + 1) as f32;
            let y = row as f32 * row_height - total_height * 0.5;
            for (column, name) in names.into_iter().enumerate() {
                let x = (column + 1) as f32 * spacing - dimensions.width * 0.5;
                output.positions.insert(name.to_owned(), vec2(x, y));
                output.ranks.insert(name.to_owned(), rank);
                output.columns.insert(name.to_owned(), column);
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::LayoutNode;

    #[test]
    fn test_rows_follow_rank_hints() {
        let node = |name: &str, rank: Option<usize>| LayoutNode {
            name: name.to_owned(),
            size: 10.0,
            weight: 0.0,
            position_hint: None,
            rank_hint: rank,
        };
        let input = LayoutInput {
            nodes: vec![
                node("resolver", Some(0)),
                node("ns1", Some(1)),
                node("ns2", Some(1)),
                node("stray", None),
            ],
            edges: Vec::new(),
            entry_nodes: Vec::new(),
            options: LayoutConfig::default(),
        };

        let output = DnsRankLayout.run(&input, Dimensions::new(300.0, 300.0));
        assert_eq!(output.positions["resolver"], vec2(0.0, -120.0));
        assert_eq!(output.positions["ns1"], vec2(-50.0, 0.0));
        assert_eq!(output.positions["ns2"], vec2(50.0, 0.0));
        assert_eq!(output.positions["stray"], vec2(0.0, 120.0));
        assert_eq!(output.ranks["stray"], 2);
    }
}
