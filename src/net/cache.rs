use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    data: Vec<u8>,
    expires: Instant,
}

/// Response bodies keyed by URL, each valid for a fixed time.
pub struct Cache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    default_ttl: Duration,
}

impl Cache {
    pub fn new() -> Self {
        Self::with_limits(100, Duration::from_secs(300))
    }

    pub fn with_limits(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            default_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).and_then(|entry| {
            if entry.expires > Instant::now() {
                Some(entry.data.as_slice())
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, key: String, data: Vec<u8>) {
        self.insert_with_ttl(key, data, self.default_ttl);
    }

    pub fn insert_with_ttl(&mut self, key: String, data: Vec<u8>, ttl: Duration) {
        if self.max_entries == 0 {
            return;
        }

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_soonest();
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                data,
                expires: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires > now);
    }

    fn evict_soonest(&mut self) {
        let soonest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires)
            .map(|(key, _)| key.clone());
        if let Some(key) = soonest {
            self.entries.remove(&key);
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
