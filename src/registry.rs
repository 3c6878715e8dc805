//! In-memory index of known plugins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::capability::Capabilities;
use crate::error::{PluginError, PluginResult};
use crate::manifest::Manifest;
use crate::version::Version;

/// A registered plugin's bookkeeping record.
#[derive(Debug, Clone)]
pub struct PluginEntry {
    /// The plugin's declarative manifest.
    pub manifest: Manifest,
    /// Where the artifact lives on disk.
    pub artifact_path: PathBuf,
    /// Mirror of the manager's "is this plugin currently loaded" state.
    pub loaded: bool,
    /// Opaque handle value mirrored from the manager, if loaded. Zero when unloaded.
    pub handle: usize,
}

struct Inner {
    entries: HashMap<String, PluginEntry>,
    capability_index: HashMap<u32, Vec<String>>,
}

/// The registry: a mutex-protected id-keyed index with a capability
/// secondary index.
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Registry {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                capability_index: HashMap::new(),
            }),
        }
    }

    /// Register `manifest`, copying `path` into registry ownership.
    ///
    /// Fails with [`PluginError::AlreadyRegistered`] if `manifest.id` is already present.
    pub fn register(&self, manifest: Manifest, path: &Path) -> PluginResult<()> {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&manifest.id) {
            return Err(PluginError::AlreadyRegistered {
                id: manifest.id.clone(),
            });
        }

        let bits = manifest.capabilities.bits();
        let id = manifest.id.clone();
        inner.entries.insert(
            id.clone(),
            PluginEntry {
                manifest,
                artifact_path: path.to_path_buf(),
                loaded: false,
                handle: 0,
            },
        );
        inner.capability_index.entry(bits).or_default().push(id);

        Ok(())
    }

    /// Remove `id` and every capability-index reference to it.
    pub fn unregister(&self, id: &str) -> PluginResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .remove(id)
            .ok_or_else(|| PluginError::PluginNotFound { id: id.to_string() })?;

        let bits = entry.manifest.capabilities.bits();
        if let Some(ids) = inner.capability_index.get_mut(&bits) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                inner.capability_index.remove(&bits);
            }
        }

        Ok(())
    }

    /// A borrowed-equivalent snapshot of the entry for `id`.
    pub fn get(&self, id: &str) -> PluginResult<PluginEntry> {
        self.inner
            .lock()
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::PluginNotFound { id: id.to_string() })
    }

    /// Mark `id` as loaded with the given opaque handle value. Manager-only.
    pub fn set_loaded(&self, id: &str, handle: usize) -> PluginResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| PluginError::PluginNotFound { id: id.to_string() })?;
        entry.loaded = true;
        entry.handle = handle;
        Ok(())
    }

    /// Mark `id` as unloaded, clearing the mirrored handle. Manager-only.
    pub fn set_unloaded(&self, id: &str) -> PluginResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(id)
            .ok_or_else(|| PluginError::PluginNotFound { id: id.to_string() })?;
        entry.loaded = false;
        entry.handle = 0;
        Ok(())
    }

    /// Ids whose manifest declares exactly the bitmap in `capabilities`.
    pub fn find_by_capability(&self, capabilities: Capabilities) -> Vec<String> {
        self.inner
            .lock()
            .capability_index
            .get(&capabilities.bits())
            .cloned()
            .unwrap_or_default()
    }

    /// Enumerate files in `dir` whose extension matches the host OS's shared-library
    /// convention. Does not parse manifests; returns a plain count.
    pub fn discover(&self, dir: &Path) -> PluginResult<usize> {
        let mut count = 0;
        if !dir.is_dir() {
            return Ok(0);
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if crate::loader::is_plugin_library(&entry.path()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Compare the host's platform version against `id`'s declared bounds.
    pub fn check_compatibility(&self, id: &str, host_version: Version) -> PluginResult<bool> {
        let entry = self.get(id)?;
        if host_version < entry.manifest.host_version_min {
            tracing::warn!(
                plugin_id = %id,
                host_version = %host_version,
                min = %entry.manifest.host_version_min,
                "host version is below plugin's minimum"
            );
            return Ok(false);
        }
        if let Some(max) = entry.manifest.host_version_max {
            if host_version > max {
                tracing::warn!(
                    plugin_id = %id,
                    host_version = %host_version,
                    max = %max,
                    "host version exceeds plugin's maximum"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A snapshot of every currently-registered id.
    pub fn all_ids(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use std::path::PathBuf;

    fn manifest(id: &str) -> Manifest {
        Manifest {
            id: id.to_string(),
            name: id.to_string(),
            version: Version::new(1, 0, 0),
            author: String::new(),
            license: String::new(),
            api_version: crate::PLUGIN_API_VERSION,
            capabilities: Capabilities::empty(),
            dependencies: Vec::new(),
            conflicts_with: Vec::new(),
            required_permissions: Vec::new(),
            checksum_sha256: None,
            signature: None,
            host_version_min: Version::new(0, 1, 0),
            host_version_max: None,
            max_memory_mb: None,
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = Registry::new();
        registry.register(manifest("a"), &PathBuf::from("/tmp/a.so")).unwrap();
        let entry = registry.get("a").unwrap();
        assert_eq!(entry.manifest.id, "a");
        assert!(!entry.loaded);
    }

    #[test]
    fn register_twice_fails() {
        let registry = Registry::new();
        registry.register(manifest("a"), &PathBuf::from("/tmp/a.so")).unwrap();
        let err = registry.register(manifest("a"), &PathBuf::from("/tmp/a.so")).unwrap_err();
        assert!(matches!(err, PluginError::AlreadyRegistered { .. }));
    }

    #[test]
    fn unregister_removes_capability_index_entry() {
        let registry = Registry::new();
        registry.register(manifest("a"), &PathBuf::from("/tmp/a.so")).unwrap();
        assert_eq!(registry.find_by_capability(Capabilities::empty()), vec!["a".to_string()]);
        registry.unregister("a").unwrap();
        assert!(registry.find_by_capability(Capabilities::empty()).is_empty());
        assert!(registry.get("a").is_err());
    }

    #[test]
    fn set_loaded_and_unloaded_mirror_state() {
        let registry = Registry::new();
        registry.register(manifest("a"), &PathBuf::from("/tmp/a.so")).unwrap();
        registry.set_loaded("a", 42).unwrap();
        assert!(registry.get("a").unwrap().loaded);
        assert_eq!(registry.get("a").unwrap().handle, 42);
        registry.set_unloaded("a").unwrap();
        assert!(!registry.get("a").unwrap().loaded);
    }

    #[test]
    fn all_ids_snapshots_current_registrations() {
        let registry = Registry::new();
        registry.register(manifest("a"), &PathBuf::from("/tmp/a.so")).unwrap();
        registry.register(manifest("b"), &PathBuf::from("/tmp/b.so")).unwrap();
        let mut ids = registry.all_ids();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
