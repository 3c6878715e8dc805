//! # Vellum Plugin
//!
//! A dynamic plugin host: discovers, validates, loads, lifecycles, and
//! isolates extension modules packaged as native shared libraries against a
//! stable, host-provided C ABI.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vellum_plugin::config::ManagerConfig;
//! use vellum_plugin::manager::PluginManager;
//!
//! fn main() -> vellum_plugin::error::PluginResult<()> {
//!     let manager = PluginManager::new(ManagerConfig::default());
//!
//!     manager.load("my-plugin", None)?;
//!     manager.init("my-plugin")?;
//!     manager.start("my-plugin")?;
//!
//!     // ... plugin runs ...
//!
//!     manager.stop("my-plugin")?;
//!     manager.unload("my-plugin")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Manifest** / **SemVer** — declarative plugin metadata and the version
//!   constraint grammar it is checked against.
//! - **SecurityPolicy** / **Verifier** — allow/deny permission sets, checksum
//!   and (optional) signature checks gating a load.
//! - **Registry** — an in-memory index of known plugins with a capability
//!   secondary index.
//! - **DependencyResolver** — dependency existence/version checks, cycle
//!   detection, and topological load-order resolution.
//! - **ResourceTracker** / **EventBus** — per-plugin atomic resource
//!   accounting and the cross-plugin publish/subscribe point.
//! - **PluginManager** — orchestrates discover -> verify -> load -> init ->
//!   start -> stop -> unload and owns every dynamic-library handle.
//!
//! ## Security
//!
//! - Checksum verification (SHA-256) and an optional pluggable signature
//!   backend.
//! - Capability-based permissions, enforced per [`policy::SecurityPolicy`].
//! - Per-plugin memory/file-handle/thread accounting via
//!   [`resource_tracker::ResourceTracker`].
//!
//! This crate does not perform OS-level sandboxing (no seccomp/namespaces);
//! see [`policy::SecurityPolicy::sandbox_enabled`] for why that flag is
//! advisory only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
pub mod capability;
pub mod config;
pub mod context;
pub mod dependency;
pub mod error;
pub mod event_bus;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod permission;
pub mod policy;
pub mod registry;
pub mod resource_tracker;
pub mod signing;
pub mod verifier;
pub mod version;

pub use abi::PLUGIN_API_VERSION;
pub use capability::{Capabilities, Capability};
pub use config::ManagerConfig;
pub use context::{global, install, PluginContext};
pub use dependency::DependencyResolver;
pub use error::{PluginError, PluginResult};
pub use event_bus::{Event, EventBus};
pub use manager::{PluginManager, PluginState};
pub use manifest::{Dependency, Manifest};
pub use permission::Permission;
pub use policy::SecurityPolicy;
pub use registry::{PluginEntry, Registry};
pub use resource_tracker::{ResourceStats, ResourceTracker};
pub use verifier::Verifier;
pub use version::{Constraint, Version};
