use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use lru::LruCache;
use parking_lot::Mutex;
use crate::core::error::Result;
use crate::query::ast::Call;
use crate::query::parser;

/// Parsed statements keyed by query text.
pub struct ParseCache {
    cache: Option<Mutex<LruCache<String, Arc<Vec<Call>>>>>,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl ParseCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        ParseCache {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    /// Parse errors are not cached.
    pub fn parse(&self, text: &str) -> Result<Arc<Vec<Call>>> {
        let Some(cache) = &self.cache else {
            return Ok(Arc::new(parser::parse(text)?));
        };
        if let Some(calls) = cache.lock().get(text) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(calls.clone());
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let calls = Arc::new(parser::parse(text)?);
        cache.lock().put(text.to_string(), calls.clone());
        Ok(calls)
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.as_ref().map(|cache| cache.lock().len()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
