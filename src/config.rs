//! Manager configuration and optional filesystem hot-reload.

use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::PluginResult;
use crate::manager::PluginManager;
use crate::policy::SecurityPolicy;

/// A lifecycle notifier callback: `plugin_id -> ()`.
pub type Notifier = Box<dyn Fn(&str) + Send + Sync>;

/// Programmatic configuration for a [`PluginManager`].
pub struct ManagerConfig {
    /// Directory the manager discovers and loads plugins from.
    pub plugin_dir: PathBuf,
    /// The security policy applied to every plugin this manager loads.
    pub security_policy: SecurityPolicy,
    /// Whether to start a [`HotReloadWatcher`] alongside the manager.
    pub hot_reload_enabled: bool,
    /// Invoked with a plugin's id after it finishes loading.
    pub on_loaded: Option<Notifier>,
    /// Invoked with a plugin's id after it finishes unloading.
    pub on_unloaded: Option<Notifier>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            plugin_dir: PathBuf::from("./plugins"),
            security_policy: SecurityPolicy::default_policy(),
            hot_reload_enabled: false,
            on_loaded: None,
            on_unloaded: None,
        }
    }
}

/// Watches a plugin directory for modifications and triggers
/// [`PluginManager::reload`] on the affected plugin, debounced per path.
///
/// Runs its own background thread draining the `notify` channel; dropping
/// this value stops the watch (the underlying `notify::Watcher` is dropped
/// with it, which tears down its OS-level watch).
pub struct HotReloadWatcher {
    _watcher: RecommendedWatcher,
}

impl HotReloadWatcher {
    /// Start watching `manager`'s plugin directory.
    ///
    /// Events for the same plugin name arriving within `debounce` of each
    /// other collapse into a single `reload`.
    pub fn start(manager: Arc<PluginManager>, debounce: Duration) -> PluginResult<Self> {
        let plugin_dir = manager.plugin_dir().to_path_buf();
        let (tx, rx) = channel();

        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event| {
            let _ = tx.send(event);
        })
        .map_err(|err| crate::error::PluginError::InvalidManifest {
            reason: format!("failed to start file watcher: {err}"),
        })?;
        watcher
            .watch(&plugin_dir, RecursiveMode::NonRecursive)
            .map_err(|err| crate::error::PluginError::InvalidManifest {
                reason: format!("failed to watch {plugin_dir:?}: {err}"),
            })?;

        std::thread::spawn(move || {
            let mut last_fired: std::collections::HashMap<String, std::time::Instant> =
                std::collections::HashMap::new();

            while let Ok(event) = rx.recv() {
                let event: notify::Event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "hot-reload watcher received an error event");
                        continue;
                    }
                };

                for path in &event.paths {
                    if !crate::loader::is_plugin_library(path) {
                        continue;
                    }
                    let Some(name) = path
                        .file_name()
                        .and_then(|f| f.to_str())
                        .and_then(crate::loader::name_from_library_filename)
                    else {
                        continue;
                    };

                    let now = std::time::Instant::now();
                    if let Some(last) = last_fired.get(&name) {
                        if now.duration_since(*last) < debounce {
                            continue;
                        }
                    }
                    last_fired.insert(name.clone(), now);

                    tracing::info!(plugin_id = %name, "hot-reload triggered");
                    if let Err(err) = manager.reload(&name) {
                        tracing::warn!(plugin_id = %name, error = %err, "hot-reload failed");
                    }
                }
            }
        });

        Ok(HotReloadWatcher { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = ManagerConfig::default();
        assert!(!config.hot_reload_enabled);
        assert!(config.on_loaded.is_none());
        assert!(config.on_unloaded.is_none());
    }
}
