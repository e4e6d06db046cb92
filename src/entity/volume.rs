use std::cell::RefCell;
use std::collections::BTreeMap;

/// Traffic magnitude per traffic class.
pub type VolumeMap = BTreeMap<String, f64>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeTotals {
    pub by_class: VolumeMap,
    pub total: f64,
}

impl VolumeTotals {
    pub fn get(&self, key: Option<&str>) -> f64 {
        match key {
            None => self.total,
            Some(class) => self.by_class.get(class).copied().unwrap_or(0.0),
        }
    }

    pub fn accumulate(&mut self, volume: &VolumeMap, total: f64) {
        for (class, value) in volume {
            *self.by_class.entry(class.clone()).or_insert(0.0) += value;
        }
        self.total += total;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
enum CacheState {
    #[default]
    Stale,
    Valid(VolumeTotals),
}

/// Aggregate that is recomputed on the first read after invalidation.
#[derive(Debug, Default)]
pub struct VolumeCache {
    state: RefCell<CacheState>,
}

impl VolumeCache {
    pub fn invalidate(&self) {
        self.state.replace(CacheState::Stale);
    }

    pub fn is_valid(&self) -> bool {
        matches!(*self.state.borrow(), CacheState::Valid(_))
    }

    pub fn read(&self, compute: impl FnOnce() -> VolumeTotals) -> VolumeTotals {
        if let CacheState::Valid(totals) = &*self.state.borrow() {
            return totals.clone();
        }

        let totals = compute();
        self.state.replace(CacheState::Valid(totals.clone()));
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_recomputes_only_when_stale() {
        let cache = VolumeCache::default();
        let mut computations = 0;

        let mut compute = || {
            computations += 1;
            VolumeTotals {
                by_class: VolumeMap::from([("normal".to_owned(), 4.0)]),
                total: 4.0,
            }
        };

        assert!(!cache.is_valid());
        assert_eq!(cache.read(&mut compute).total, 4.0);
        assert_eq!(cache.read(&mut compute).get(Some("normal")), 4.0);
        assert!(cache.is_valid());

        cache.invalidate();
        assert!(!cache.is_valid());
        cache.read(&mut compute);
        assert_eq!(computations, 2);
    }
}
