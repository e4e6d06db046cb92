//! Traffic particles flowing along a connection.
//!
//! The launch rate is a function of the connection's volume relative to the
//! greatest volume in the graph:
//!
//! * below the inflection share, one particle per release and the delay
//!   between releases shrinks linearly from `max_release_delay_ms` to
//!   `min_release_delay_ms`;
//! * at or above it, releases happen every `min_release_delay_ms` and the
//!   number per release grows towards `max_per_release`. The fractional part
//!   of that multiplier is spread over releases with a shuffled 0/1 mask.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::ParticleConfig;
use crate::entity::Connection;

const MASK_LENGTH: usize = 10;
const TRAVEL_TIME_MS: f64 = 2000.0;
/// Lower bound on the release delay whatever the configuration says.
const RELEASE_DELAY_FLOOR_MS: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ParticleLevels {
    pub release_delay_ms: f64,
    pub per_release: usize,
    /// One entry per release; each adds 0 or 1 extra particle.
    pub extra_mask: Vec<u8>,
}

impl ParticleLevels {
    pub fn idle() -> Self {
        Self {
            release_delay_ms: f64::INFINITY,
            per_release: 0,
            extra_mask: vec![0; MASK_LENGTH],
        }
    }

    pub fn for_volume<R: Rng + ?Sized>(
        volume: f64,
        greatest: f64,
        config: &ParticleConfig,
        rng: &mut R,
    ) -> Self {
        if volume <= 0.0 || greatest <= 0.0 || !volume.is_finite() {
            return Self::idle();
        }

        let share = (volume / greatest).min(1.0);
        let inflection = config.inflection_percent.clamp(f64::EPSILON, 1.0);
        let min_delay = config.min_release_delay_ms.max(RELEASE_DELAY_FLOOR_MS);
        let max_delay = config.max_release_delay_ms.max(min_delay);

        if share < inflection {
            let spread = max_delay - min_delay;
            let delay = max_delay - spread * (share / inflection);
            return Self {
                release_delay_ms: delay.max(min_delay),
                per_release: 1,
                extra_mask: vec![0; MASK_LENGTH],
            };
        }

        let headroom = (1.0 - inflection).max(f64::EPSILON);
        let multiplier =
            1.0 + (share - inflection) / headroom * (config.max_per_release - 1.0).max(0.0);
        let whole = multiplier.floor();
        let extra = ((multiplier - whole) * MASK_LENGTH as f64).round() as usize;

        let mut extra_mask = vec![0u8; MASK_LENGTH];
        for slot in extra_mask.iter_mut().take(extra.min(MASK_LENGTH)) {
            *slot = 1;
        }
        extra_mask.shuffle(rng);

        Self {
            release_delay_ms: min_delay,
            per_release: whole as usize,
            extra_mask,
        }
    }

    /// Long-run average particles per release.
    pub fn mean_per_release(&self) -> f64 {
        let extra = self.extra_mask.iter().map(|bit| f64::from(*bit)).sum::<f64>();
        self.per_release as f64 + extra / self.extra_mask.len().max(1) as f64
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub class: String,
    /// 0 at the source, 1 at the target.
    pub progress: f64,
}

/// Bounded pool of in-flight particles for one connection.
#[derive(Clone, Debug)]
pub struct ParticleEmitter {
    levels: ParticleLevels,
    classes: Vec<(String, f64)>,
    particles: Vec<Particle>,
    since_release_ms: f64,
    mask_cursor: usize,
    pool_size: usize,
}

impl ParticleEmitter {
    pub fn new(pool_size: usize) -> Self {
        Self {
            levels: ParticleLevels::idle(),
            classes: Vec::new(),
            particles: Vec::new(),
            since_release_ms: 0.0,
            mask_cursor: 0,
            pool_size,
        }
    }

    pub fn update_levels<R: Rng + ?Sized>(
        &mut self,
        connection: &Connection,
        config: &ParticleConfig,
        rng: &mut R,
    ) {
        self.levels = ParticleLevels::for_volume(
            connection.volume_total(),
            connection.volume_greatest(),
            config,
            rng,
        );
        self.classes = connection
            .volume_percent_keys_sorted()
            .iter()
            .map(|class| {
                let share = connection.volume_percent().get(class).copied().unwrap_or(0.0);
                (class.clone(), share)
            })
            .collect();
    }

    pub fn levels(&self) -> &ParticleLevels {
        &self.levels
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Moves particles along and releases new ones. Returns how many were
    /// launched.
    pub fn advance<R: Rng + ?Sized>(&mut self, elapsed_ms: f64, rng: &mut R) -> usize {
        let step = elapsed_ms / TRAVEL_TIME_MS;
        for particle in &mut self.particles {
            particle.progress += step;
        }
        self.particles.retain(|particle| particle.progress < 1.0);

        if self.levels.per_release == 0 {
            return 0;
        }

        self.since_release_ms += elapsed_ms;
        let mut launched = 0usize;
        while self.since_release_ms >= self.levels.release_delay_ms {
            self.since_release_ms -= self.levels.release_delay_ms;

            let extra = self.levels.extra_mask[self.mask_cursor % self.levels.extra_mask.len()];
            self.mask_cursor = self.mask_cursor.wrapping_add(1);

            for _ in 0..self.levels.per_release + usize::from(extra) {
                if self.particles.len() >= self.pool_size {
                    break;
                }
                let class = self.pick_class(rng);
                self.particles.push(Particle {
                    class,
                    progress: 0.0,
                });
                launched += 1;
            }
        }
        launched
    }

    /// Weighted draw across the connection's traffic classes.
    fn pick_class<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let roll = rng.r#gen::<f64>();
        let mut cumulative = 0.0;
        for (class, share) in &self.classes {
            cumulative += share;
            if roll < cumulative {
                return class.clone();
            }
        }

        self.classes
            .last()
            .map(|(class, _)| class.clone())
            .unwrap_or_else(|| "normal".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::snapshot::SnapshotConnection;

    #[test]
    fn test_low_volume_interpolates_delay() {
        let config = ParticleConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        let levels = ParticleLevels::for_volume(5.0, 100.0, &config, &mut rng);
        assert_eq!(levels.per_release, 1);
        assert!((levels.release_delay_ms - 2040.0).abs() < 1e-9);

        let idle = ParticleLevels::for_volume(0.0, 100.0, &config, &mut rng);
        assert_eq!(idle.per_release, 0);
    }

    #[test]
    fn test_fractional_multiplier_uses_mask() {
        let config = ParticleConfig {
            inflection_percent: 0.5,
            max_per_release: 4.0,
            ..ParticleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);

        // share 0.75 -> multiplier 1 + 0.5 * 3 = 2.5
        let levels = ParticleLevels::for_volume(75.0, 100.0, &config, &mut rng);
        assert_eq!(levels.release_delay_ms, config.min_release_delay_ms);
        assert_eq!(levels.per_release, 2);
        assert_eq!(levels.extra_mask.iter().filter(|bit| **bit == 1).count(), 5);
        assert!((levels.mean_per_release() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_emitter_launches_in_long_run_ratio() {
        let config = ParticleConfig {
            inflection_percent: 0.5,
            max_per_release: 4.0,
            pool_size: 10_000,
            ..ParticleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let connection = Connection::new(
            &SnapshotConnection::new("a", "b")
                .with_metric("normal", 60.0)
                .with_metric("danger", 15.0),
        );
        let mut connection = connection;
        connection.update_greatest_volume(100.0);

        let mut emitter = ParticleEmitter::new(config.pool_size);
        emitter.update_levels(&connection, &config, &mut rng);

        let mut launched = 0;
        for _ in 0..10 {
            launched += emitter.advance(config.min_release_delay_ms, &mut rng);
        }
        assert_eq!(launched, 25);
        assert!(
            emitter
                .particles()
                .iter()
                .all(|particle| particle.class == "normal" || particle.class == "danger")
        );
    }

    #[test]
    fn test_pool_is_bounded() {
        let config = ParticleConfig {
            pool_size: 3,
            ..ParticleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut connection =
            Connection::new(&SnapshotConnection::new("a", "b").with_metric("normal", 100.0));
        connection.update_greatest_volume(100.0);

        let mut emitter = ParticleEmitter::new(config.pool_size);
        emitter.update_levels(&connection, &config, &mut rng);
        emitter.advance(1000.0, &mut rng);
        assert_eq!(emitter.particles().len(), 3);
    }

    #[test]
    fn test_zero_release_delay_is_floored() {
        let config = ParticleConfig {
            min_release_delay_ms: 0.0,
            pool_size: 4,
            ..ParticleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        let levels = ParticleLevels::for_volume(100.0, 100.0, &config, &mut rng);
        assert_eq!(levels.release_delay_ms, RELEASE_DELAY_FLOOR_MS);

        let mut connection =
            Connection::new(&SnapshotConnection::new("a", "b").with_metric("normal", 100.0));
        connection.update_greatest_volume(100.0);
        let mut emitter = ParticleEmitter::new(config.pool_size);
        emitter.update_levels(&connection, &config, &mut rng);

        // Terminates: a full pool plus a bounded number of releases.
        emitter.advance(50.0, &mut rng);
        assert_eq!(emitter.particles().len(), 4);
    }
}
