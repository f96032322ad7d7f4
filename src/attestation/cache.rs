// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of signature verdicts.
//!
//! Keyed by the digest of the full attestation (record, signature and public
//! key), so any altered byte misses the cache and is verified from scratch.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub struct VerdictCache {
    cache: Mutex<LruCache<[u8; 32], bool>>,
}

impl VerdictCache {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub fn get(&self, digest: &[u8; 32]) -> Option<bool> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(digest).copied()
    }

    pub fn put(&self, digest: [u8; 32], verdict: bool) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(digest, verdict);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get() {
        let cache = VerdictCache::new(4);
        assert!(cache.get(&[1u8; 32]).is_none());

        cache.put([1u8; 32], true);
        cache.put([2u8; 32], false);
        assert_eq!(cache.get(&[1u8; 32]), Some(true));
        assert_eq!(cache.get(&[2u8; 32]), Some(false));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = VerdictCache::new(2);
        cache.put([1u8; 32], true);
        cache.put([2u8; 32], true);
        // Touch 1 so 2 becomes the eviction candidate
        assert!(cache.get(&[1u8; 32]).is_some());
        cache.put([3u8; 32], true);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&[2u8; 32]).is_none());
        assert!(cache.get(&[1u8; 32]).is_some());
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let cache = VerdictCache::new(0);
        cache.put([1u8; 32], true);
        assert_eq!(cache.len(), 1);
    }
}
