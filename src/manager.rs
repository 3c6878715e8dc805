//! Lifecycle orchestration: discover, verify, load, init, start, stop, unload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::abi::{read_c_str, PluginHandle};
use crate::capability::{Capabilities, Capability};
use crate::config::{ManagerConfig, Notifier};
use crate::context::PluginContext;
use crate::error::{PluginError, PluginResult};
use crate::event_bus::EventBus;
use crate::loader::{library_filename, name_from_library_filename, ResolvedSymbols};
use crate::manifest::Manifest;
use crate::policy::SecurityPolicy;
use crate::registry::Registry;
use crate::resource_tracker::ResourceTracker;
use crate::verifier::Verifier;

/// A plugin's position in its lifecycle state machine.
///
/// Legal transitions: `Loaded -> Initialized -> Running <-> Stopped`; any
/// non-unloaded state can move to `Error`; reaching "unloaded" removes the
/// plugin from the manager's map entirely rather than storing this variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Not present in the manager; this variant is returned to callers but
    /// never stored against a live entry.
    Unloaded,
    /// The shared library is open and its symbols resolved.
    Loaded,
    /// `plugin_init` returned a non-null handle.
    Initialized,
    /// `plugin_start` returned `true` (or was not exported).
    Running,
    /// `plugin_stop` returned `true` (or was not exported).
    Stopped,
    /// A lifecycle callback failed; the plugin is loaded but unusable until
    /// `unload`.
    Error,
}

/// Host-owned, string-copied metadata read out of a plugin's
/// `plugin_get_info` call. Owned because the C strings it was built from
/// are only valid for the duration of that call.
#[derive(Debug, Clone)]
pub struct PluginInfoOwned {
    /// Plugin name, as reported by the plugin itself.
    pub name: String,
    /// Plugin version string, as reported by the plugin itself.
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// Author string.
    pub author: String,
    /// License string.
    pub license: String,
    /// The plugin's declared API version.
    pub api_version: u32,
}

struct LoadedPlugin {
    path: PathBuf,
    state: PluginState,
    info: PluginInfoOwned,
    manifest: Option<Manifest>,
    capabilities: Capabilities,
    symbols: ResolvedSymbols,
    plugin_handle: Option<PluginHandle>,
    context: PluginContext,
    loaded_at: DateTime<Utc>,
    last_error: Option<String>,
}

struct ManagerState {
    entries: HashMap<String, LoadedPlugin>,
    /// Insertion order, for deterministic forced teardown.
    order: Vec<String>,
}

/// Orchestrates the full plugin lifecycle and owns every dynamic-library
/// handle and per-plugin context.
///
/// Holds one coarse lock over its plugin map, per section 5: plugin code is
/// always called with that lock released, following "take lock, copy the
/// function pointer and the handle, release lock, call out, reacquire lock,
/// record result."
pub struct PluginManager {
    state: Mutex<ManagerState>,
    plugin_dir: PathBuf,
    policy: SecurityPolicy,
    verifier: Verifier,
    registry: Registry,
    event_bus: Arc<EventBus>,
    on_loaded: Option<Notifier>,
    on_unloaded: Option<Notifier>,
}

impl PluginManager {
    /// Build a manager from `config`, with no signature-verification
    /// backend wired into its [`Verifier`].
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_verifier(config, Verifier::new())
    }

    /// Build a manager from `config`, using `verifier` in place of the
    /// default unwired one (e.g. to plug in an
    /// [`crate::signing::Ed25519SignatureVerifier`]).
    pub fn with_verifier(config: ManagerConfig, verifier: Verifier) -> Self {
        PluginManager {
            state: Mutex::new(ManagerState {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            plugin_dir: config.plugin_dir,
            policy: config.security_policy,
            verifier,
            registry: Registry::new(),
            event_bus: Arc::new(EventBus::new()),
            on_loaded: config.on_loaded,
            on_unloaded: config.on_unloaded,
        }
    }

    /// The directory this manager discovers and loads plugins from.
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// The shared event bus every loaded plugin's context is bound to.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// The manifest registry backing this manager.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load `name` from this manager's plugin directory.
    ///
    /// If `manifest` is supplied it is validated and verified against this
    /// manager's policy before the library is opened; dependency/permission
    /// checks are skipped entirely for an absent manifest, per section 6.
    pub fn load(&self, name: &str, manifest: Option<Manifest>) -> PluginResult<()> {
        {
            let state = self.state.lock();
            if state.entries.contains_key(name) {
                return Err(PluginError::AlreadyLoaded { id: name.to_string() });
            }
        }

        let path = self.plugin_dir.join(library_filename(name));
        if !path.is_file() {
            return Err(PluginError::PluginNotFound { id: name.to_string() });
        }

        if let Some(manifest) = &manifest {
            manifest.validate()?;
            self.verifier.check_policy(manifest, &self.policy)?;
            self.verifier.verify_all(&path, manifest, &self.policy)?;
        }

        let symbols = ResolvedSymbols::load(name, &path)?;

        let info = unsafe {
            let raw = symbols.get_info();
            if raw.is_null() {
                symbols.close();
                return Err(PluginError::LoadFailed {
                    id: name.to_string(),
                    path,
                    reason: "plugin_get_info returned a null pointer".to_string(),
                });
            }
            PluginInfoOwned {
                name: read_c_str((*raw).name),
                version: read_c_str((*raw).version),
                description: read_c_str((*raw).description),
                author: read_c_str((*raw).author),
                license: read_c_str((*raw).license),
                api_version: (*raw).api_version,
            }
        };

        if info.api_version != crate::PLUGIN_API_VERSION {
            symbols.close();
            return Err(PluginError::IncompatibleVersion {
                id: name.to_string(),
                reason: format!(
                    "plugin declares api_version {}, host requires {}",
                    info.api_version,
                    crate::PLUGIN_API_VERSION
                ),
            });
        }

        let capabilities = match Capabilities::from_bits(symbols.get_capabilities()) {
            Some(capabilities) => capabilities,
            None => {
                symbols.close();
                return Err(PluginError::LoadFailed {
                    id: name.to_string(),
                    path,
                    reason: "plugin_get_capabilities reported reserved bits".to_string(),
                });
            }
        };

        let registry_id = manifest.as_ref().map(|m| m.id.clone());

        let max_memory_mb = manifest
            .as_ref()
            .and_then(|m| m.max_memory_mb)
            .unwrap_or(self.policy.max_plugin_memory_mb);
        let tracker = Arc::new(ResourceTracker::new(
            name,
            u64::from(max_memory_mb) * 1024 * 1024,
            100,
            10,
        ));
        let context = PluginContext::new(Arc::clone(&self.event_bus), tracker);

        let entry = LoadedPlugin {
            path,
            state: PluginState::Loaded,
            info,
            manifest,
            capabilities,
            symbols,
            plugin_handle: None,
            context,
            loaded_at: Utc::now(),
            last_error: None,
        };

        {
            let mut state = self.state.lock();
            if state.entries.contains_key(name) {
                entry.symbols.close();
                return Err(PluginError::AlreadyLoaded { id: name.to_string() });
            }
            state.entries.insert(name.to_string(), entry);
            state.order.push(name.to_string());
        }

        if let Some(registry_id) = registry_id.as_deref() {
            if self.registry.get(registry_id).is_ok() {
                let _ = self.registry.set_loaded(registry_id, 0);
            }
        }

        tracing::info!(plugin_id = %name, "plugin loaded");
        if let Some(notify) = &self.on_loaded {
            notify(name);
        }

        Ok(())
    }

    /// Call `plugin_init`. Precondition: `state == Loaded`.
    pub fn init(&self, name: &str) -> PluginResult<()> {
        let init_fn = {
            let state = self.state.lock();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| PluginError::NotLoaded { id: name.to_string() })?;
            if entry.state != PluginState::Loaded {
                return Err(PluginError::NotLoaded { id: name.to_string() });
            }
            entry.symbols.init_ptr()
        };

        let handle = unsafe { init_fn() };

        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(name)
            .ok_or_else(|| PluginError::NotLoaded { id: name.to_string() })?;

        if handle.is_null() {
            entry.state = PluginState::Error;
            entry.last_error = Some("plugin_init returned a null handle".to_string());
            tracing::error!(plugin_id = %name, "plugin_init failed");
            return Err(PluginError::InitFailed { id: name.to_string() });
        }

        entry.plugin_handle = Some(PluginHandle(handle));
        entry.state = PluginState::Initialized;
        tracing::info!(plugin_id = %name, "plugin initialized");
        Ok(())
    }

    /// Call `plugin_start`, if exported. Precondition: `state` is
    /// `Initialized` or `Stopped`.
    pub fn start(&self, name: &str) -> PluginResult<()> {
        let (start_fn, handle) = {
            let state = self.state.lock();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| PluginError::NotLoaded { id: name.to_string() })?;
            if !matches!(entry.state, PluginState::Initialized | PluginState::Stopped) {
                return Err(PluginError::NotLoaded { id: name.to_string() });
            }
            let handle = entry
                .plugin_handle
                .ok_or_else(|| PluginError::InvalidHandle { id: name.to_string() })?;
            (entry.symbols.start_ptr(), handle)
        };

        let ok = match start_fn {
            Some(f) => unsafe { f(handle.0) },
            None => true,
        };

        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(name)
            .ok_or_else(|| PluginError::NotLoaded { id: name.to_string() })?;

        if !ok {
            entry.state = PluginState::Error;
            entry.last_error = Some("plugin_start returned false".to_string());
            tracing::error!(plugin_id = %name, "plugin_start failed");
            return Err(PluginError::StartFailed { id: name.to_string() });
        }

        entry.state = PluginState::Running;
        tracing::info!(plugin_id = %name, "plugin started");
        Ok(())
    }

    /// Call `plugin_stop`, if exported. Precondition: `state == Running`.
    pub fn stop(&self, name: &str) -> PluginResult<()> {
        let (stop_fn, handle) = {
            let state = self.state.lock();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| PluginError::NotLoaded { id: name.to_string() })?;
            if entry.state != PluginState::Running {
                return Err(PluginError::NotLoaded { id: name.to_string() });
            }
            let handle = entry
                .plugin_handle
                .ok_or_else(|| PluginError::InvalidHandle { id: name.to_string() })?;
            (entry.symbols.stop_ptr(), handle)
        };

        let ok = match stop_fn {
            Some(f) => unsafe { f(handle.0) },
            None => true,
        };

        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(name)
            .ok_or_else(|| PluginError::NotLoaded { id: name.to_string() })?;

        if !ok {
            entry.state = PluginState::Error;
            entry.last_error = Some("plugin_stop returned false".to_string());
            tracing::error!(plugin_id = %name, "plugin_stop failed");
            return Err(PluginError::StopFailed { id: name.to_string() });
        }

        entry.state = PluginState::Stopped;
        tracing::info!(plugin_id = %name, "plugin stopped");
        Ok(())
    }

    /// Tear a plugin down: best-effort `stop` if running, `deinit` if it
    /// was ever initialized, close the library, release its tracker and
    /// subscriptions. Idempotent: a second call returns `NotLoaded`.
    pub fn unload(&self, name: &str) -> PluginResult<()> {
        let entry = {
            let mut state = self.state.lock();
            let entry = state
                .entries
                .remove(name)
                .ok_or_else(|| PluginError::NotLoaded { id: name.to_string() })?;
            state.order.retain(|id| id != name);
            entry
        };

        if entry.state == PluginState::Running {
            if let (Some(stop_fn), Some(handle)) = (entry.symbols.stop_ptr(), entry.plugin_handle) {
                let ok = unsafe { stop_fn(handle.0) };
                if !ok {
                    tracing::warn!(plugin_id = %name, "best-effort stop during unload failed");
                }
            }
        }

        if let Some(handle) = entry.plugin_handle {
            unsafe {
                entry.symbols.deinit(handle.0);
            }
        }
        entry.symbols.close();
        entry.context.resource_tracker.reset();

        self.event_bus.unsubscribe_all(name);

        if let Some(registry_id) = entry.manifest.as_ref().map(|m| m.id.as_str()) {
            if self.registry.get(registry_id).is_ok() {
                let _ = self.registry.set_unloaded(registry_id);
            }
        }

        tracing::info!(plugin_id = %name, "plugin unloaded");
        if let Some(notify) = &self.on_unloaded {
            notify(name);
        }

        Ok(())
    }

    /// `unload(name)` followed by `load(name, _)` with the manifest the
    /// plugin was loaded with, so the reloaded instance re-verifies against
    /// the same declaration.
    pub fn reload(&self, name: &str) -> PluginResult<()> {
        let manifest = {
            let state = self.state.lock();
            state.entries.get(name).and_then(|e| e.manifest.clone())
        };
        self.unload(name)?;
        self.load(name, manifest)
    }

    /// Enumerate the plugin directory and `load` every file matching the
    /// host OS's shared-library convention. Failures are logged and do not
    /// stop the scan; returns the count of successful loads.
    pub fn load_all_from_directory(&self) -> PluginResult<usize> {
        let mut loaded = 0;
        if !self.plugin_dir.is_dir() {
            return Ok(0);
        }

        for entry in std::fs::read_dir(&self.plugin_dir)? {
            let path = entry?.path();
            if !crate::loader::is_plugin_library(&path) {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let Some(name) = name_from_library_filename(filename) else {
                continue;
            };

            match self.load(&name, None) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    tracing::warn!(plugin_id = %name, error = %err, "failed to load plugin during directory scan");
                }
            }
        }

        Ok(loaded)
    }

    /// Ids of currently-loaded plugins whose capabilities include `capability`.
    pub fn plugins_by_capability(&self, capability: Capability) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.capabilities.contains(capability))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The current lifecycle state of `name`, or `None` if it is not loaded.
    pub fn get_plugin_state(&self, name: &str) -> Option<PluginState> {
        self.state.lock().entries.get(name).map(|e| e.state)
    }

    /// A snapshot of every currently-loaded plugin's state.
    pub fn get_all_plugin_states(&self) -> HashMap<String, PluginState> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.state))
            .collect()
    }

    /// Force-unload every plugin still loaded, in insertion order. Lifecycle
    /// callback failures during this forced teardown are logged and ignored.
    pub fn shutdown(&self) {
        let order = self.state.lock().order.clone();
        for name in order {
            if let Err(err) = self.unload(&name) {
                tracing::warn!(plugin_id = %name, error = %err, "error during forced shutdown");
            }
        }
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
