use eframe::egui::{Vec2, vec2};

const LEAF_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 10;

#[derive(Clone, Copy, Debug)]
pub(super) struct Square {
    center: Vec2,
    half_extent: f32,
}

impl Square {
    fn enclosing(points: &[Vec2]) -> Option<Self> {
        let mut min = vec2(f32::INFINITY, f32::INFINITY);
        let mut max = vec2(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for point in points {
            min = min.min(*point);
            max = max.max(*point);
        }

        if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
            return None;
        }

        let span = (max - min).max_elem().max(1.0);
        Some(Self {
            center: (min + max) * 0.5,
            half_extent: span * 0.5 + 1.0,
        })
    }

    fn quadrant(self, index: usize) -> Self {
        let quarter = self.half_extent * 0.5;
        let dx = if index & 1 == 1 { quarter } else { -quarter };
        let dy = if index & 2 == 2 { quarter } else { -quarter };
        Self {
            center: self.center + vec2(dx, dy),
            half_extent: quarter,
        }
    }

    fn quadrant_of(self, point: Vec2) -> usize {
        usize::from(point.x >= self.center.x) | (usize::from(point.y >= self.center.y) << 1)
    }

    /// Squared distance from `point` to the nearest point of the square.
    fn distance_sq(self, point: Vec2) -> f32 {
        let dx = ((point.x - self.center.x).abs() - self.half_extent).max(0.0);
        let dy = ((point.y - self.center.y).abs() - self.half_extent).max(0.0);
        dx * dx + dy * dy
    }
}

/// Point quadtree used to find bodies within repulsion range.
pub(super) struct QuadTree {
    square: Square,
    members: Vec<usize>,
    children: Vec<QuadTree>,
}

impl QuadTree {
    pub(super) fn build(points: &[Vec2]) -> Option<Self> {
        let square = Square::enclosing(points)?;
        Some(Self::split(square, (0..points.len()).collect(), points, 0))
    }

    fn split(square: Square, members: Vec<usize>, points: &[Vec2], depth: usize) -> Self {
        if members.len() <= LEAF_CAPACITY || depth >= MAX_DEPTH {
            return Self {
                square,
                members,
                children: Vec::new(),
            };
        }

        let mut buckets: [Vec<usize>; 4] = Default::default();
        for index in members {
            buckets[square.quadrant_of(points[index])].push(index);
        }

        let children = buckets
            .into_iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(quadrant, bucket)| {
                Self::split(square.quadrant(quadrant), bucket, points, depth + 1)
            })
            .collect();

        Self {
            square,
            members: Vec::new(),
            children,
        }
    }

    /// Calls `visit` for every stored index whose cell is within `range` of
    /// `point`. Callers still check the exact distance.
    pub(super) fn visit_near(&self, point: Vec2, range: f32, visit: &mut impl FnMut(usize)) {
        if self.square.distance_sq(point) > range * range {
            return;
        }

        for &index in &self.members {
            visit(index);
        }
        for child in &self.children {
            child.visit_near(point, range, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_near_finds_every_close_point() {
        let points = (0..100)
            .map(|index| vec2((index % 10) as f32 * 10.0, (index / 10) as f32 * 10.0))
            .collect::<Vec<_>>();
        let tree = QuadTree::build(&points).unwrap();

        let origin = vec2(45.0, 45.0);
        let mut found = Vec::new();
        tree.visit_near(origin, 12.0, &mut |index| {
            if (points[index] - origin).length() <= 12.0 {
                found.push(index);
            }
        });
        found.sort_unstable();

        let expected = (0..100)
            .filter(|index| (points[*index] - origin).length() <= 12.0)
            .collect::<Vec<_>>();
        assert_eq!(found, expected);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_empty_input_builds_nothing() {
        assert!(QuadTree::build(&[]).is_none());
    }
}
