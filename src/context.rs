//! Per-plugin scratch arena, the context bundle handed to a loaded plugin,
//! and the optional process-wide manager handle.

use std::alloc::Layout;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::event_bus::EventBus;
use crate::manager::PluginManager;
use crate::resource_tracker::ResourceTracker;

/// A bump-allocated scratch arena scoped to a single plugin's lifetime.
///
/// Host-side code uses this for small allocations it wants to live exactly
/// as long as the plugin does, without going through the global allocator
/// per call. Not exposed across the ABI boundary; plugins never see it
/// directly, only through whatever the host chooses to do with
/// [`PluginContext`].
pub struct Arena {
    buf: Vec<u8>,
    cursor: std::cell::Cell<usize>,
}

impl Arena {
    /// Construct an arena with `capacity` bytes pre-reserved.
    pub fn new(capacity: usize) -> Self {
        Arena {
            buf: vec![0u8; capacity],
            cursor: std::cell::Cell::new(0),
        }
    }

    /// Bump-allocate room for one `T`, write `value` into it, and return a
    /// pointer to it. The pointee is valid only for as long as this arena is.
    ///
    /// Returns `None` if the arena has no room left; callers fall back to
    /// the global allocator in that case.
    pub fn alloc<T>(&self, value: T) -> Option<*mut T> {
        let layout = Layout::new::<T>();
        let start = self.cursor.get();
        let base = self.buf.as_ptr() as usize;
        let aligned = (base + start + layout.align() - 1) & !(layout.align() - 1);
        let offset = aligned - base;
        let end = offset + layout.size();
        if end > self.buf.len() {
            return None;
        }
        self.cursor.set(end);

        unsafe {
            let ptr = self.buf.as_ptr().add(offset) as *mut T;
            ptr.write(value);
            Some(ptr)
        }
    }

    /// Reset the arena, reclaiming every allocation made so far.
    ///
    /// # Safety
    /// The caller must guarantee no previously-allocated pointer is still
    /// in use; this does not run `Drop` for any value allocated into it.
    pub unsafe fn reset(&self) {
        self.cursor.set(0);
    }

    /// Bytes currently in use.
    pub fn used(&self) -> usize {
        self.cursor.get()
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// The bundle of host-owned references a [`crate::manager::PluginManager`]
/// attaches to a plugin during `load`.
///
/// This is host-side bookkeeping, not a value passed across the C ABI: the
/// plugin ABI's `plugin_init` takes no arguments, so a plugin recovers
/// whatever state it needs from its own statics. The context exists so the
/// host itself has, for each loaded plugin, a scoped arena plus shared
/// handles to the bus and tracker it was loaded with.
pub struct PluginContext {
    /// Scratch arena scoped to this plugin's lifetime.
    pub arena: Arena,
    /// Shared handle to the event bus this plugin's subscriptions live on.
    pub event_bus: Arc<EventBus>,
    /// This plugin's resource accounting.
    pub resource_tracker: Arc<ResourceTracker>,
}

impl PluginContext {
    /// Construct a context with a default-sized scratch arena.
    pub fn new(event_bus: Arc<EventBus>, resource_tracker: Arc<ResourceTracker>) -> Self {
        PluginContext {
            arena: Arena::new(4096),
            event_bus,
            resource_tracker,
        }
    }
}

static MANAGER: OnceCell<PluginManager> = OnceCell::new();

/// Install `manager` as the process-wide handle.
///
/// Fails (returning the manager back) if one is already installed; this is
/// a convenience for callers who want a singleton, not an ambient global
/// mutated from arbitrary call sites.
pub fn install(manager: PluginManager) -> Result<(), PluginManager> {
    MANAGER.set(manager)
}

/// Borrow the process-wide handle, if one was installed.
pub fn global() -> Option<&'static PluginManager> {
    MANAGER.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_allocates_and_reports_usage() {
        let arena = Arena::new(64);
        let ptr = arena.alloc::<u32>(42).unwrap();
        unsafe {
            assert_eq!(*ptr, 42);
        }
        assert!(arena.used() > 0);
    }

    #[test]
    fn arena_refuses_allocation_past_capacity() {
        let arena = Arena::new(4);
        assert!(arena.alloc::<u64>(1).is_none());
    }

    #[test]
    fn arena_reset_reclaims_space() {
        let arena = Arena::new(64);
        arena.alloc::<u32>(1).unwrap();
        let used_before = arena.used();
        unsafe {
            arena.reset();
        }
        assert!(used_before > 0);
        assert_eq!(arena.used(), 0);
    }
}
