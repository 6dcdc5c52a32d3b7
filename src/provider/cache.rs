use std::time::{Duration, Instant};

/// A value refreshed at most once per `duration`.
///
/// Used by adapters to bound zone listing calls. The cache knows nothing
/// about DNS TTLs. A zero duration disables caching: the value is always
/// reported as expired. Callers sharing one cache keep it behind a lock held
/// across the refresh.
#[derive(Debug)]
pub struct ZonesCache<T> {
    value: T,
    refreshed_at: Option<Instant>,
    duration: Duration,
}

impl<T: Default> ZonesCache<T> {
    pub fn new(duration: Duration) -> Self {
        Self {
            value: T::default(),
            refreshed_at: None,
            duration,
        }
    }
}

impl<T> ZonesCache<T> {
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn expired(&self) -> bool {
        self.expired_at(Instant::now())
    }

    pub fn expired_at(&self, now: Instant) -> bool {
        match self.refreshed_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.duration,
        }
    }

    pub fn reset(&mut self, value: T) {
        self.value = value;
        self.refreshed_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cache_is_expired() {
        let cache: ZonesCache<Vec<String>> = ZonesCache::new(Duration::from_secs(3600));
        assert!(cache.expired());
        assert!(cache.get().is_empty());
    }

    #[test]
    fn reset_stores_value_until_duration_elapses() {
        let mut cache = ZonesCache::new(Duration::from_secs(3600));
        cache.reset(vec!["example.com".to_string()]);

        assert!(!cache.expired());
        assert_eq!(cache.get(), &vec!["example.com".to_string()]);

        let later = Instant::now() + Duration::from_secs(3600);
        assert!(cache.expired_at(later));
    }

    #[test]
    fn zero_duration_never_caches() {
        let mut cache = ZonesCache::new(Duration::ZERO);
        cache.reset(vec![1, 2, 3]);
        assert!(cache.expired());
        assert_eq!(cache.get(), &vec![1, 2, 3]);
    }
}
