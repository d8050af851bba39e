//! Process-wide ephemeral cache of resolved context inheritance.
//!
//! The cache is an optimization only: a hit is served solely when the entry
//! is live, unexpired and its dependencies hash still matches the current
//! ancestor versions. Correctness must hold with the cache disabled.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::context::ResolvedContext;
use crate::ids::{ContextId, ContextLevel};

type CacheKey = (ContextLevel, ContextId);

/// One cached resolution with its freshness bookkeeping
#[derive(Debug, Clone)]
pub struct CachedResolution {
    pub resolved: ResolvedContext,
    /// Hash over `(level, id, version)` of every ancestor the resolution
    /// depended on
    pub dependencies_hash: String,
    /// Every node examined during resolution; invalidation matches on this
    pub resolution_path: Vec<CacheKey>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
    pub invalidated: bool,
}

/// Hash the `(level, id, version)` triples of a resolution chain
pub fn dependencies_hash(chain: &[(ContextLevel, ContextId, i64)]) -> String {
    let mut hasher = DefaultHasher::new();
    for (level, id, version) in chain {
        level.as_str().hash(&mut hasher);
        id.as_str().hash(&mut hasher);
        version.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// TTL + version-hash cache keyed by `(level, id)`
pub struct InheritanceCache {
    entries: Mutex<HashMap<CacheKey, CachedResolution>>,
    ttl: Duration,
    enabled: bool,
}

impl InheritanceCache {
    pub fn new(enabled: bool, ttl_seconds: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_seconds.max(1)),
            enabled,
        }
    }

    /// A disabled cache: every lookup misses, every store is dropped
    pub fn disabled() -> Self {
        Self::new(false, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached resolution when the entry is live, unexpired and
    /// its dependencies hash equals `current_hash`
    pub fn lookup(
        &self,
        level: ContextLevel,
        id: &ContextId,
        current_hash: &str,
        now: DateTime<Utc>,
    ) -> Option<ResolvedContext> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&(level, id.clone()))?;
        if entry.invalidated || entry.expires_at <= now || entry.dependencies_hash != current_hash {
            return None;
        }
        entry.hit_count += 1;
        Some(entry.resolved.clone())
    }

    pub fn store(
        &self,
        level: ContextLevel,
        id: &ContextId,
        resolved: ResolvedContext,
        deps_hash: String,
        resolution_path: Vec<CacheKey>,
        now: DateTime<Utc>,
    ) {
        if !self.enabled {
            return;
        }
        let entry = CachedResolution {
            resolved,
            dependencies_hash: deps_hash,
            resolution_path,
            expires_at: now + self.ttl,
            hit_count: 0,
            invalidated: false,
        };
        self.entries.lock().insert((level, id.clone()), entry);
    }

    /// Mark every entry whose resolution path contains `(level, id)` as
    /// invalidated
    pub fn invalidate_containing(&self, level: ContextLevel, id: &ContextId) -> usize {
        let key = (level, id.clone());
        let mut count = 0;
        for entry in self.entries.lock().values_mut() {
            if !entry.invalidated && entry.resolution_path.contains(&key) {
                entry.invalidated = true;
                count += 1;
            }
        }
        count
    }

    /// Drop everything; used at shutdown and by tests
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
