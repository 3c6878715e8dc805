//! Error taxonomy for the plugin host.

use std::path::PathBuf;
use thiserror::Error;

use crate::permission::Permission;

/// Result alias used throughout the crate.
pub type PluginResult<T> = Result<T, PluginError>;

/// The reason a [`PluginError::PolicyViolation`] was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolationReason {
    /// A required permission is not in the policy's allow set, or is explicitly denied.
    PermissionDenied(Permission),
    /// The policy requires a signature and none (or an empty one) was present.
    SignatureRequired,
    /// The manifest's declared memory cap exceeds the policy's ceiling.
    MemoryLimitExceeded,
}

impl std::fmt::Display for PolicyViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolationReason::PermissionDenied(p) => {
                write!(f, "permission denied: {p:?}")
            }
            PolicyViolationReason::SignatureRequired => write!(f, "signature required"),
            PolicyViolationReason::MemoryLimitExceeded => write!(f, "memory limit exceeded"),
        }
    }
}

/// The resource kind a [`PluginError::LimitExceeded`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Memory accounting, in bytes.
    Memory,
    /// Open file handle accounting.
    FileHandles,
    /// Thread accounting.
    Threads,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Memory => write!(f, "memory"),
            ResourceKind::FileHandles => write!(f, "file handles"),
            ResourceKind::Threads => write!(f, "threads"),
        }
    }
}

/// The complete error taxonomy surfaced by this crate.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin by this name/id is known to the manager or registry.
    #[error("plugin not found: {id}")]
    PluginNotFound {
        /// The plugin id or name that was looked up.
        id: String,
    },

    /// Opening or reading the shared library failed.
    #[error("failed to load plugin '{id}' from {path:?}: {reason}")]
    LoadFailed {
        /// Plugin name.
        id: String,
        /// Artifact path that failed to open.
        path: PathBuf,
        /// Human-readable reason, usually the underlying `libloading` error text.
        reason: String,
    },

    /// A required exported symbol was absent from the shared library.
    #[error("plugin '{id}' is missing required symbol '{symbol}'")]
    MissingSymbol {
        /// Plugin name.
        id: String,
        /// Symbol name that could not be resolved.
        symbol: &'static str,
    },

    /// The plugin's declared API or host-version bounds are incompatible with this host.
    #[error("plugin '{id}' is incompatible: {reason}")]
    IncompatibleVersion {
        /// Plugin id.
        id: String,
        /// Explanation of the incompatibility.
        reason: String,
    },

    /// `load` was called for a plugin that is already loaded.
    #[error("plugin already loaded: {id}")]
    AlreadyLoaded {
        /// Plugin name.
        id: String,
    },

    /// `register` was called with an id already present in the registry.
    /// Distinct from [`PluginError::AlreadyLoaded`]: a plugin can be
    /// registered without ever being loaded.
    #[error("plugin already registered: {id}")]
    AlreadyRegistered {
        /// Plugin id.
        id: String,
    },

    /// A lifecycle operation was requested on a plugin that isn't loaded.
    #[error("plugin not loaded: {id}")]
    NotLoaded {
        /// Plugin name.
        id: String,
    },

    /// The handle the host holds for a plugin is no longer valid.
    #[error("invalid handle for plugin: {id}")]
    InvalidHandle {
        /// Plugin name.
        id: String,
    },

    /// The plugin's `plugin_init` symbol returned a null handle.
    #[error("plugin '{id}' failed to initialize")]
    InitFailed {
        /// Plugin name.
        id: String,
    },

    /// The plugin's `plugin_start` symbol returned false.
    #[error("plugin '{id}' failed to start")]
    StartFailed {
        /// Plugin name.
        id: String,
    },

    /// The plugin's `plugin_stop` symbol returned false.
    #[error("plugin '{id}' failed to stop")]
    StopFailed {
        /// Plugin name.
        id: String,
    },

    /// A resource tracker rejected an allocation because it would exceed its cap.
    #[error("resource limit exceeded for plugin '{id}': {kind}")]
    LimitExceeded {
        /// Plugin name.
        id: String,
        /// Which resource was exhausted.
        kind: ResourceKind,
    },

    /// The artifact's SHA-256 digest did not match the manifest's declared checksum.
    #[error("checksum mismatch for plugin '{id}'")]
    ChecksumMismatch {
        /// Plugin id.
        id: String,
    },

    /// Signature verification failed, or was required but absent/unverifiable.
    #[error("signature invalid for plugin '{id}'")]
    SignatureInvalid {
        /// Plugin id.
        id: String,
    },

    /// The manifest's permissions or resource caps violate the active security policy.
    #[error("policy violation for plugin '{id}': {reason}")]
    PolicyViolation {
        /// Plugin id.
        id: String,
        /// The specific sub-reason.
        reason: PolicyViolationReason,
    },

    /// A non-optional dependency is not present in the registry.
    #[error("plugin '{id}' is missing required dependency '{dependency_id}'")]
    MissingDependency {
        /// The dependent plugin.
        id: String,
        /// The dependency that could not be found.
        dependency_id: String,
    },

    /// A dependency cycle was detected among the requested plugins.
    #[error("circular dependency detected involving plugin '{id}'")]
    CircularDependency {
        /// The plugin id at which the cycle was detected.
        id: String,
    },

    /// Loading this plugin is precluded by another, currently-loaded, conflicting plugin.
    #[error("plugin '{id}' conflicts with currently loaded plugin '{conflicting_id}'")]
    ConflictingPlugin {
        /// The plugin being loaded.
        id: String,
        /// The already-loaded plugin it conflicts with.
        conflicting_id: String,
    },

    /// A version string did not parse according to the grammar in use.
    #[error("invalid version string: {input}")]
    InvalidVersion {
        /// The offending input.
        input: String,
    },

    /// A manifest failed structural validation.
    #[error("invalid manifest: {reason}")]
    InvalidManifest {
        /// Explanation of what failed.
        reason: String,
    },

    /// Wraps an I/O failure (file reads during checksum/discovery/config).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a `libloading` failure not otherwise classified above.
    #[error("dynamic library error: {0}")]
    Library(#[from] libloading::Error),

    /// Wraps a JSON (de)serialization failure, e.g. from a signature sidecar file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wraps a TOML deserialization failure, e.g. from a `plugin.toml` manifest.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PluginError {
    /// Shorthand for a permission-denied policy violation.
    pub fn permission_denied(id: impl Into<String>, permission: Permission) -> Self {
        PluginError::PolicyViolation {
            id: id.into(),
            reason: PolicyViolationReason::PermissionDenied(permission),
        }
    }

    /// Shorthand for a signature-required policy violation.
    pub fn signature_required(id: impl Into<String>) -> Self {
        PluginError::PolicyViolation {
            id: id.into(),
            reason: PolicyViolationReason::SignatureRequired,
        }
    }

    /// Shorthand for a memory-limit policy violation.
    pub fn memory_limit_exceeded(id: impl Into<String>) -> Self {
        PluginError::PolicyViolation {
            id: id.into(),
            reason: PolicyViolationReason::MemoryLimitExceeded,
        }
    }
}
