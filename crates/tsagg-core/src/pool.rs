//! Reuse pool for [`FloatArray`]s keyed by capacity
//!
//! Aggregators allocate one array per primitive field per family; pooling
//! them avoids allocating fresh arrays for every query execution.
//! Arrays handed out by `acquire` have every presence bit cleared. Callers
//! must not keep references to an array after releasing it.

use crate::array::FloatArray;
use crate::config::PoolSettings;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

static SHARED_POOL: Lazy<Arc<FloatArrayPool>> =
    Lazy::new(|| Arc::new(FloatArrayPool::new(PoolSettings::default())));

/// Free-list of float arrays keyed by capacity
#[derive(Debug)]
pub struct FloatArrayPool {
    settings: PoolSettings,
    free: Mutex<HashMap<usize, Vec<FloatArray>>>,
}

impl FloatArrayPool {
    /// Create a pool with the given settings
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            free: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide pool with default settings
    pub fn shared() -> Arc<FloatArrayPool> {
        Arc::clone(&SHARED_POOL)
    }

    /// Take an empty array of `capacity` from the pool, allocating if none is free
    pub fn acquire(&self, capacity: usize) -> FloatArray {
        if self.settings.enabled {
            let mut free = self.free.lock();
            if let Some(array) = free.get_mut(&capacity).and_then(|arrays| arrays.pop()) {
                return array;
            }
        }
        FloatArray::new(capacity)
    }

    /// Give an array back; it is reset and kept unless the free-list is full
    pub fn release(&self, mut array: FloatArray) {
        if !self.settings.enabled {
            return;
        }
        array.reset();
        let mut free = self.free.lock();
        let arrays = free.entry(array.capacity()).or_default();
        if arrays.len() < self.settings.max_arrays_per_capacity {
            arrays.push(array);
        }
    }

    /// Number of free arrays of the given capacity
    pub fn available(&self, capacity: usize) -> usize {
        self.free.lock().get(&capacity).map_or(0, Vec::len)
    }
}

impl Default for FloatArrayPool {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_reuses() {
        let pool = FloatArrayPool::default();
        let mut array = pool.acquire(8);
        array.set_value(3, 1.0);
        pool.release(array);
        assert_eq!(pool.available(8), 1);

        let array = pool.acquire(8);
        assert!(array.is_empty());
        assert_eq!(array.capacity(), 8);
        assert_eq!(pool.available(8), 0);
    }

    #[test]
    fn test_keyed_by_capacity() {
        let pool = FloatArrayPool::default();
        pool.release(FloatArray::new(4));
        assert_eq!(pool.acquire(16).capacity(), 16);
        assert_eq!(pool.available(4), 1);
    }

    #[test]
    fn test_bounded_free_list() {
        let pool = FloatArrayPool::new(PoolSettings {
            enabled: true,
            max_arrays_per_capacity: 2,
        });
        for _ in 0..5 {
            pool.release(FloatArray::new(4));
        }
        assert_eq!(pool.available(4), 2);
    }

    #[test]
    fn test_disabled_pool() {
        let pool = FloatArrayPool::new(PoolSettings {
            enabled: false,
            max_arrays_per_capacity: 2,
        });
        pool.release(FloatArray::new(4));
        assert_eq!(pool.available(4), 0);
    }
}
