//! Shared-library naming conventions, discovery, and symbol resolution.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::abi::{
    DeinitFn, GetCapabilitiesFn, GetInfoFn, InitFn, PluginInfo, StartFn, StopFn,
};
use crate::error::{PluginError, PluginResult};

/// The host OS's shared-library filename for a plugin named `name`.
///
/// POSIX: `lib<name>.so`. macOS: `lib<name>.dylib`. Windows: `<name>.dll`.
pub fn library_filename(name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{name}.dll")
    }
    #[cfg(target_os = "macos")]
    {
        format!("lib{name}.dylib")
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        format!("lib{name}.so")
    }
}

/// Recover a plugin `name` from a shared-library filename, undoing
/// [`library_filename`]. Returns `None` if the file does not match the
/// host OS's naming convention.
pub fn name_from_library_filename(filename: &str) -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        filename.strip_suffix(".dll").map(str::to_string)
    }
    #[cfg(target_os = "macos")]
    {
        filename
            .strip_prefix("lib")
            .and_then(|s| s.strip_suffix(".dylib"))
            .map(str::to_string)
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        filename
            .strip_prefix("lib")
            .and_then(|s| s.strip_suffix(".so"))
            .map(str::to_string)
    }
}

/// Whether `path`'s extension matches the host OS's shared-library convention.
pub fn is_plugin_library(path: &Path) -> bool {
    let extension = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    #[cfg(target_os = "windows")]
    {
        extension.eq_ignore_ascii_case("dll")
    }
    #[cfg(target_os = "macos")]
    {
        extension.eq_ignore_ascii_case("dylib")
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        extension.eq_ignore_ascii_case("so")
    }
}

/// The resolved set of exported symbols for one loaded plugin library.
///
/// Owns the `Library` so the symbols it holds remain valid for as long as
/// this struct does.
pub struct ResolvedSymbols {
    library: Library,
    get_info: GetInfoFn,
    get_capabilities: GetCapabilitiesFn,
    init: InitFn,
    deinit: DeinitFn,
    start: Option<StartFn>,
    stop: Option<StopFn>,
}

impl ResolvedSymbols {
    /// Open `path` and resolve the fixed set of exported symbols described
    /// in the plugin ABI table. `start`/`stop` are optional; the other four
    /// are required.
    pub fn load(plugin_id: &str, path: &Path) -> PluginResult<Self> {
        let library = unsafe { Library::new(path) }.map_err(|err| PluginError::LoadFailed {
            id: plugin_id.to_string(),
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        macro_rules! required_symbol {
            ($name:literal) => {
                unsafe {
                    let symbol: Symbol<'_, _> = library.get($name).map_err(|_| {
                        PluginError::MissingSymbol {
                            id: plugin_id.to_string(),
                            symbol: stringify!($name),
                        }
                    })?;
                    *symbol
                }
            };
        }

        let get_info: GetInfoFn = required_symbol!(b"plugin_get_info\0");
        let get_capabilities: GetCapabilitiesFn = required_symbol!(b"plugin_get_capabilities\0");
        let init: InitFn = required_symbol!(b"plugin_init\0");
        let deinit: DeinitFn = required_symbol!(b"plugin_deinit\0");

        let start: Option<StartFn> = unsafe {
            library
                .get(b"plugin_start\0")
                .ok()
                .map(|symbol: Symbol<'_, StartFn>| *symbol)
        };
        let stop: Option<StopFn> = unsafe {
            library
                .get(b"plugin_stop\0")
                .ok()
                .map(|symbol: Symbol<'_, StopFn>| *symbol)
        };

        Ok(ResolvedSymbols {
            library,
            get_info,
            get_capabilities,
            init,
            deinit,
            start,
            stop,
        })
    }

    /// Invoke `plugin_get_info`.
    ///
    /// # Safety
    /// The returned pointer is only valid for as long as the plugin
    /// guarantees; the host copies everything it needs out of it immediately.
    pub unsafe fn get_info(&self) -> *const PluginInfo {
        (self.get_info)()
    }

    /// Invoke `plugin_get_capabilities`.
    pub fn get_capabilities(&self) -> u32 {
        unsafe { (self.get_capabilities)() }
    }

    /// Invoke `plugin_init`.
    ///
    /// # Safety
    /// Must only be called once per loaded instance, with no core locks held.
    pub unsafe fn init(&self) -> *mut std::os::raw::c_void {
        (self.init)()
    }

    /// Invoke `plugin_deinit(handle)`.
    ///
    /// # Safety
    /// `handle` must be the value returned by this same library's `init` call.
    pub unsafe fn deinit(&self, handle: *mut std::os::raw::c_void) {
        (self.deinit)(handle)
    }

    /// Invoke `plugin_start(handle)`, if the plugin exports it.
    ///
    /// # Safety
    /// `handle` must be the value returned by this same library's `init` call.
    pub unsafe fn start(&self, handle: *mut std::os::raw::c_void) -> Option<bool> {
        self.start.map(|f| f(handle))
    }

    /// Invoke `plugin_stop(handle)`, if the plugin exports it.
    ///
    /// # Safety
    /// `handle` must be the value returned by this same library's `init` call.
    pub unsafe fn stop(&self, handle: *mut std::os::raw::c_void) -> Option<bool> {
        self.stop.map(|f| f(handle))
    }

    /// Drop the underlying `Library`, unloading it from the process.
    pub fn close(self) {
        drop(self.library);
    }

    /// A copy of the raw `plugin_init` pointer, for callers that need to
    /// release a lock before invoking it.
    pub(crate) fn init_ptr(&self) -> InitFn {
        self.init
    }

    /// A copy of the raw `plugin_deinit` pointer.
    pub(crate) fn deinit_ptr(&self) -> DeinitFn {
        self.deinit
    }

    /// A copy of the raw `plugin_start` pointer, if exported.
    pub(crate) fn start_ptr(&self) -> Option<StartFn> {
        self.start
    }

    /// A copy of the raw `plugin_stop` pointer, if exported.
    pub(crate) fn stop_ptr(&self) -> Option<StopFn> {
        self.stop
    }
}

/// Enumerates candidate plugin directories and files.
pub struct PluginDiscovery {
    search_paths: Vec<PathBuf>,
}

impl Default for PluginDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginDiscovery {
    /// An empty set of search paths.
    pub fn new() -> Self {
        PluginDiscovery {
            search_paths: Vec::new(),
        }
    }

    /// Add a directory to search.
    pub fn add_path(&mut self, path: PathBuf) {
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    /// Enumerate every plugin-shaped file across all search paths.
    pub fn discover(&self) -> PluginResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        for dir in &self.search_paths {
            if !dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if is_plugin_library(&path) {
                    found.push(path);
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_filename_matches_host_convention() {
        let name = library_filename("example");
        #[cfg(target_os = "windows")]
        assert_eq!(name, "example.dll");
        #[cfg(target_os = "macos")]
        assert_eq!(name, "libexample.dylib");
        #[cfg(all(unix, not(target_os = "macos")))]
        assert_eq!(name, "libexample.so");
    }

    #[test]
    fn name_from_library_filename_round_trips() {
        let filename = library_filename("example");
        assert_eq!(name_from_library_filename(&filename).as_deref(), Some("example"));
    }

    #[test]
    fn is_plugin_library_rejects_unrelated_extensions() {
        assert!(!is_plugin_library(Path::new("notes.txt")));
        assert!(!is_plugin_library(Path::new("no_extension")));
    }

    #[test]
    fn discovery_finds_nothing_in_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut discovery = PluginDiscovery::new();
        discovery.add_path(dir.path().to_path_buf());
        assert!(discovery.discover().unwrap().is_empty());
    }

    #[test]
    fn resolved_symbols_reports_load_failed_for_missing_file() {
        let err = ResolvedSymbols::load("missing", Path::new("/nonexistent/path.so")).unwrap_err();
        assert!(matches!(err, PluginError::LoadFailed { .. }));
    }
}
