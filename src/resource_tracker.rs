//! Per-plugin atomic resource accounting.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{PluginError, PluginResult, ResourceKind};

/// An atomic snapshot of a tracker's counters.
///
/// No cross-counter consistency is guaranteed; each field is read
/// independently and atomically.
#[derive(Debug, Clone, Copy)]
pub struct ResourceStats {
    /// Bytes currently allocated.
    pub memory_used: u64,
    /// Memory cap, in bytes.
    pub max_memory: u64,
    /// Open file handles.
    pub file_handles: u32,
    /// File-handle cap.
    pub max_file_handles: u32,
    /// Running threads.
    pub threads: u32,
    /// Thread cap.
    pub max_threads: u32,
}

/// Per-plugin atomic counters for memory, file handles, and threads, each
/// with an independent cap.
pub struct ResourceTracker {
    memory_used: AtomicU64,
    max_memory: u64,
    file_handles: AtomicU32,
    max_file_handles: u32,
    threads: AtomicU32,
    max_threads: u32,
    plugin_id: String,
    reset_lock: Mutex<()>,
}

impl ResourceTracker {
    /// Construct a tracker with the given caps. `max_memory` is in bytes.
    pub fn new(plugin_id: impl Into<String>, max_memory: u64, max_file_handles: u32, max_threads: u32) -> Self {
        ResourceTracker {
            memory_used: AtomicU64::new(0),
            max_memory,
            file_handles: AtomicU32::new(0),
            max_file_handles,
            threads: AtomicU32::new(0),
            max_threads,
            plugin_id: plugin_id.into(),
            reset_lock: Mutex::new(()),
        }
    }

    /// Attempt to account for `size` additional bytes of memory.
    ///
    /// Rolls back atomically on overshoot, so `memory_used` never observably
    /// exceeds `max_memory` once this call returns.
    pub fn allocate(&self, size: u64) -> PluginResult<()> {
        let old = self.memory_used.fetch_add(size, Ordering::SeqCst);
        if old + size > self.max_memory {
            self.memory_used.fetch_sub(size, Ordering::SeqCst);
            return Err(PluginError::LimitExceeded {
                id: self.plugin_id.clone(),
                kind: ResourceKind::Memory,
            });
        }
        Ok(())
    }

    /// Release `size` bytes previously accounted for by [`Self::allocate`].
    pub fn deallocate(&self, size: u64) {
        self.memory_used.fetch_sub(size, Ordering::SeqCst);
    }

    /// Account for one newly opened file handle.
    pub fn open_file_handle(&self) -> PluginResult<()> {
        let old = self.file_handles.fetch_add(1, Ordering::SeqCst);
        if old + 1 > self.max_file_handles {
            self.file_handles.fetch_sub(1, Ordering::SeqCst);
            return Err(PluginError::LimitExceeded {
                id: self.plugin_id.clone(),
                kind: ResourceKind::FileHandles,
            });
        }
        Ok(())
    }

    /// Release one previously opened file handle.
    pub fn close_file_handle(&self) {
        self.file_handles.fetch_sub(1, Ordering::SeqCst);
    }

    /// Account for one newly started thread.
    pub fn start_thread(&self) -> PluginResult<()> {
        let old = self.threads.fetch_add(1, Ordering::SeqCst);
        if old + 1 > self.max_threads {
            self.threads.fetch_sub(1, Ordering::SeqCst);
            return Err(PluginError::LimitExceeded {
                id: self.plugin_id.clone(),
                kind: ResourceKind::Threads,
            });
        }
        Ok(())
    }

    /// Release one previously started thread.
    pub fn stop_thread(&self) {
        self.threads.fetch_sub(1, Ordering::SeqCst);
    }

    /// An atomic snapshot of every counter.
    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            memory_used: self.memory_used.load(Ordering::SeqCst),
            max_memory: self.max_memory,
            file_handles: self.file_handles.load(Ordering::SeqCst),
            max_file_handles: self.max_file_handles,
            threads: self.threads.load(Ordering::SeqCst),
            max_threads: self.max_threads,
        }
    }

    /// Zero every counter. Used only during `deinit`.
    pub fn reset(&self) {
        let _guard = self.reset_lock.lock().unwrap();
        self.memory_used.store(0, Ordering::SeqCst);
        self.file_handles.store(0, Ordering::SeqCst);
        self.threads.store(0, Ordering::SeqCst);
    }
}

/// Adapts a parent allocator so every alloc/resize/free routes through a
/// [`ResourceTracker`], preventing a plugin from exceeding its budget even
/// through its own direct allocation calls.
pub struct TrackedAllocator<'a> {
    tracker: &'a ResourceTracker,
}

impl<'a> TrackedAllocator<'a> {
    /// Wrap `tracker` for allocation accounting.
    pub fn new(tracker: &'a ResourceTracker) -> Self {
        TrackedAllocator { tracker }
    }

    /// Account for an allocation of `size` bytes before it is made.
    pub fn on_alloc(&self, size: u64) -> PluginResult<()> {
        self.tracker.allocate(size)
    }

    /// Account for a resize from `old_size` to `new_size` bytes.
    pub fn on_resize(&self, old_size: u64, new_size: u64) -> PluginResult<()> {
        if new_size > old_size {
            self.tracker.allocate(new_size - old_size)
        } else {
            self.tracker.deallocate(old_size - new_size);
            Ok(())
        }
    }

    /// Account for a free of `size` bytes.
    pub fn on_free(&self, size: u64) {
        self.tracker.deallocate(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn allocate_respects_cap_and_rolls_back_overshoot() {
        let tracker = ResourceTracker::new("p", 1024 * 1024, 100, 10);
        assert!(tracker.allocate(512 * 1024).is_ok());
        let err = tracker.allocate(1024 * 1024).unwrap_err();
        assert!(matches!(err, PluginError::LimitExceeded { .. }));
        assert_eq!(tracker.stats().memory_used, 512 * 1024);
    }

    #[test]
    fn deallocate_frees_accounted_memory() {
        let tracker = ResourceTracker::new("p", 1024, 10, 10);
        tracker.allocate(512).unwrap();
        tracker.deallocate(512);
        assert_eq!(tracker.stats().memory_used, 0);
    }

    #[test]
    fn concurrent_allocations_never_exceed_cap() {
        let tracker = Arc::new(ResourceTracker::new("p", 1000, 10, 10));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let tracker = Arc::clone(&tracker);
            handles.push(thread::spawn(move || tracker.allocate(100).is_ok()));
        }
        let successes = handles.into_iter().filter(|h| h.join().unwrap()).count();
        assert_eq!(successes, 10);
        assert!(tracker.stats().memory_used <= 1000);
    }

    #[test]
    fn reset_zeroes_all_counters() {
        let tracker = ResourceTracker::new("p", 1024, 10, 10);
        tracker.allocate(100).unwrap();
        tracker.open_file_handle().unwrap();
        tracker.start_thread().unwrap();
        tracker.reset();
        let stats = tracker.stats();
        assert_eq!(stats.memory_used, 0);
        assert_eq!(stats.file_handles, 0);
        assert_eq!(stats.threads, 0);
    }

    #[test]
    fn file_handle_and_thread_caps_are_enforced() {
        let tracker = ResourceTracker::new("p", 1024, 1, 1);
        assert!(tracker.open_file_handle().is_ok());
        assert!(tracker.open_file_handle().is_err());
        assert!(tracker.start_thread().is_ok());
        assert!(tracker.start_thread().is_err());
    }
}
