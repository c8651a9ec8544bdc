use std::sync::atomic::{AtomicUsize, Ordering};

/// Stand-in for the shared wire-protocol message buffer cache the sweep
/// phase acquires and releases around the `Terminate` send (spec.md §4.3
/// step 5, §6).
///
/// This crate doesn't implement the wire protocol itself, so there is no
/// real buffer payload to cache; what matters for the maintenance engine is
/// the acquire/release discipline and its two observable counters (cached
/// vs. allocated), which `stats_engine`'s preamble line reports verbatim
/// from the original's `"stats"` log category.
#[derive(Debug, Default)]
pub struct MessageBufferCache {
    cached: AtomicUsize,
    allocated: AtomicUsize,
}

/// RAII handle returned by [`MessageBufferCache::attach`]. Dropping it
/// returns the buffer to the cache, mirroring `buffer_cache.detach` being
/// called on every exit path of the sweep body (including early return on
/// send failure).
pub struct BufferHandle<'a> {
    cache: &'a MessageBufferCache,
}

impl Drop for BufferHandle<'_> {
    fn drop(&mut self) {
        self.cache.detach();
    }
}

impl MessageBufferCache {
    pub fn new() -> MessageBufferCache {
        MessageBufferCache::default()
    }

    /// Acquire a buffer, reusing a cached one if available, otherwise
    /// allocating a new one. Returns a guard; let it drop (or call
    /// `detach` explicitly) to release it back to the cache.
    pub fn attach(&self) -> BufferHandle<'_> {
        if self
            .cached
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                if c > 0 {
                    Some(c - 1)
                } else {
                    None
                }
            })
            .is_err()
        {
            self.allocated.fetch_add(1, Ordering::Relaxed);
        }
        BufferHandle { cache: self }
    }

    fn detach(&self) {
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cached_count(&self) -> usize {
        self.cached.load(Ordering::Relaxed)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attach_allocates_then_reuses() {
        let cache = MessageBufferCache::new();
        {
            let _handle = cache.attach();
            assert_eq!(cache.allocated_count(), 1);
        }
        assert_eq!(cache.cached_count(), 1);

        {
            let _handle = cache.attach();
            assert_eq!(cache.allocated_count(), 1, "should reuse the cached buffer");
            assert_eq!(cache.cached_count(), 0);
        }
        assert_eq!(cache.cached_count(), 1);
    }
}
