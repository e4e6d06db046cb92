//! Small geometric helpers for curved connections.

use std::f32::consts::FRAC_PI_2;

use eframe::egui::{Vec2, vec2};

const EPSILON: f32 = 1e-5;

/// Center of the circle through three points. The slope form breaks down on
/// vertical chords, so those are retried in a rotated frame. Collinear
/// points have no circle and yield `None`.
pub fn circle_center(a: Vec2, b: Vec2, c: Vec2) -> Option<Vec2> {
    for rotation in [0.0, FRAC_PI_2, FRAC_PI_2 * 0.5] {
        let (ra, rb, rc) = (rotate(a, rotation), rotate(b, rotation), rotate(c, rotation));
        if let Some(center) = center_from_slopes(ra, rb, rc) {
            return Some(rotate(center, -rotation));
        }
    }
    None
}

fn rotate(point: Vec2, angle: f32) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    vec2(point.x * cos - point.y * sin, point.x * sin + point.y * cos)
}

fn center_from_slopes(a: Vec2, b: Vec2, c: Vec2) -> Option<Vec2> {
    let dx_ab = b.x - a.x;
    let dx_bc = c.x - b.x;
    if dx_ab.abs() < EPSILON || dx_bc.abs() < EPSILON {
        return None;
    }

    let slope_a = (b.y - a.y) / dx_ab;
    let slope_b = (c.y - b.y) / dx_bc;
    if (slope_b - slope_a).abs() < EPSILON {
        return None;
    }

    let x = (slope_a * slope_b * (a.y - c.y) + slope_b * (a.x + b.x) - slope_a * (b.x + c.x))
        / (2.0 * (slope_b - slope_a));

    let y = if slope_a.abs() > EPSILON {
        -(x - (a.x + b.x) * 0.5) / slope_a + (a.y + b.y) * 0.5
    } else if slope_b.abs() > EPSILON {
        -(x - (b.x + c.x) * 0.5) / slope_b + (b.y + c.y) * 0.5
    } else {
        return None;
    };

    (x.is_finite() && y.is_finite()).then_some(vec2(x, y))
}

/// Point offset perpendicular from the chord midpoint by `bulge` times the
/// chord length.
pub fn arc_control_point(source: Vec2, target: Vec2, bulge: f32) -> Vec2 {
    let chord = target - source;
    let normal = vec2(-chord.y, chord.x);
    (source + target) * 0.5 + normal * bulge
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Vec2, expected: Vec2) {
        assert!(
            (actual - expected).length() < 1e-2,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn test_center_of_right_triangle() {
        let center = circle_center(vec2(-1.0, 0.0), vec2(0.0, 1.0), vec2(1.0, 0.0)).unwrap();
        assert_close(center, Vec2::ZERO);
    }

    #[test]
    fn test_vertical_chord_recovers_by_rotation() {
        let center = circle_center(vec2(1.0, 0.0), vec2(1.0, 2.0), vec2(2.0, 1.0)).unwrap();
        assert_close(center, vec2(1.0, 1.0));
    }

    #[test]
    fn test_collinear_points_have_no_center() {
        assert!(circle_center(vec2(0.0, 0.0), vec2(1.0, 1.0), vec2(2.0, 2.0)).is_none());
    }

    #[test]
    fn test_control_point_is_perpendicular() {
        let control = arc_control_point(vec2(0.0, 0.0), vec2(10.0, 0.0), 0.2);
        assert_close(control, vec2(5.0, 2.0));
    }
}
