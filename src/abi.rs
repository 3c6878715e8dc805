//! The C-layout plugin ABI: exported symbol names, their signatures, and the
//! opaque handle type threaded between them.

use std::ffi::c_char;
use std::os::raw::c_void;

/// The host's plugin API version. A manifest (or, absent one, the plugin's
/// own `plugin_get_info`) must match this exactly to load.
pub const PLUGIN_API_VERSION: u32 = 1;

/// C-layout plugin metadata returned by `plugin_get_info`.
///
/// Every string pointer is NUL-terminated and owned by the plugin; the host
/// only borrows it for the duration of the call that returned it.
#[repr(C)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: *const c_char,
    /// Plugin version string.
    pub version: *const c_char,
    /// Human-readable description.
    pub description: *const c_char,
    /// Author string.
    pub author: *const c_char,
    /// License string.
    pub license: *const c_char,
    /// The plugin's declared API version.
    pub api_version: u32,
}

/// An opaque handle a plugin returns from `plugin_init` and the host passes
/// back unmodified to `plugin_start`/`plugin_stop`/`plugin_deinit`.
///
/// The host never dereferences this pointer; it exists purely as a token
/// the plugin uses to recover its own state. `Send` because ownership
/// genuinely transfers across the thread that happens to call each
/// lifecycle function under the manager's lock discipline; not `Sync`,
/// since nothing calls into two lifecycle functions on this handle
/// concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginHandle(pub *mut c_void);

unsafe impl Send for PluginHandle {}

impl PluginHandle {
    /// Whether this handle is the null handle.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// `() -> *const PluginInfo`
pub type GetInfoFn = unsafe extern "C" fn() -> *const PluginInfo;
/// `() -> u32`, the capability bitmap.
pub type GetCapabilitiesFn = unsafe extern "C" fn() -> u32;
/// `() -> *mut c_void`, null on failure.
pub type InitFn = unsafe extern "C" fn() -> *mut c_void;
/// `(*mut c_void) -> ()`
pub type DeinitFn = unsafe extern "C" fn(*mut c_void);
/// `(*mut c_void) -> bool`
pub type StartFn = unsafe extern "C" fn(*mut c_void) -> bool;
/// `(*mut c_void) -> bool`
pub type StopFn = unsafe extern "C" fn(*mut c_void) -> bool;

/// Reads a NUL-terminated C string pointer into an owned [`String`].
///
/// Returns an empty string for a null pointer; the ABI table treats every
/// `PluginInfo` field as present, but a defensive host does not trust that
/// blindly.
///
/// # Safety
/// `ptr`, if non-null, must point to a valid NUL-terminated string that
/// remains valid for the duration of this call.
pub unsafe fn read_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_reports_null() {
        let handle = PluginHandle(std::ptr::null_mut());
        assert!(handle.is_null());
    }

    #[test]
    fn read_c_str_handles_null() {
        unsafe {
            assert_eq!(read_c_str(std::ptr::null()), "");
        }
    }

    #[test]
    fn read_c_str_reads_valid_utf8() {
        let s = std::ffi::CString::new("hello").unwrap();
        unsafe {
            assert_eq!(read_c_str(s.as_ptr()), "hello");
        }
    }
}
