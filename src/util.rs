use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub fn format_volume(volume: f64) -> String {
    const UNITS: [&str; 4] = ["", "k", "M", "G"];

    let mut value = volume;
    let mut unit = 0usize;
    while value.abs() >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{value:.0} rps")
    } else {
        format!("{value:.2}{} rps", UNITS[unit])
    }
}

/// Deterministic pseudo-random pair in `[-1, 1]` derived from a name, so the
/// same service always starts at the same jittered spot.
pub fn stable_pair(id: &str) -> (f32, f32) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}

pub fn connection_name(source: &str, target: &str) -> String {
    format!("{source}--{target}")
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}
