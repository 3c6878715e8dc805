//! Host-owned security policy: allow/deny permission sets and resource caps.

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::manifest::Manifest;
use crate::permission::Permission;

/// Allow/deny sets of permissions, signature requirement, and resource caps.
///
/// Denied always wins over allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Permissions plugins under this policy may request.
    pub allowed: Vec<Permission>,
    /// Permissions plugins under this policy may never request, regardless of `allowed`.
    pub denied: Vec<Permission>,
    /// Whether a non-empty signature is mandatory.
    pub require_signature: bool,
    /// Ceiling on a plugin's declared memory cap, in megabytes.
    pub max_plugin_memory_mb: u32,
    /// Advisory only; see the design notes for why nothing currently branches on this.
    pub sandbox_enabled: bool,
}

impl SecurityPolicy {
    /// A restrictive preset: nothing is allowed, signatures are mandatory.
    pub fn strict() -> Self {
        SecurityPolicy {
            allowed: Vec::new(),
            denied: vec![
                Permission::ExecuteCommands,
                Permission::FilesystemWrite,
                Permission::NetworkServer,
                Permission::DatabaseWrite,
            ],
            require_signature: true,
            max_plugin_memory_mb: 64,
            sandbox_enabled: true,
        }
    }

    /// A balanced preset suitable for most deployments.
    pub fn default_policy() -> Self {
        SecurityPolicy {
            allowed: vec![
                Permission::FilesystemRead,
                Permission::NetworkClient,
                Permission::DatabaseRead,
                Permission::EventPublish,
                Permission::EventSubscribe,
                Permission::HttpRegisterRoutes,
            ],
            denied: vec![Permission::ExecuteCommands],
            require_signature: false,
            max_plugin_memory_mb: 256,
            sandbox_enabled: false,
        }
    }

    /// A permissive preset for local development.
    pub fn permissive() -> Self {
        SecurityPolicy {
            allowed: vec![
                Permission::FilesystemRead,
                Permission::FilesystemWrite,
                Permission::NetworkClient,
                Permission::NetworkServer,
                Permission::DatabaseRead,
                Permission::DatabaseWrite,
                Permission::AccessEnv,
                Permission::HttpRegisterRoutes,
                Permission::EventPublish,
                Permission::EventSubscribe,
                Permission::ExecuteCommands,
            ],
            denied: Vec::new(),
            require_signature: false,
            max_plugin_memory_mb: 4096,
            sandbox_enabled: false,
        }
    }

    /// Check a manifest's requested permissions and memory cap against this policy.
    ///
    /// Returns the first violation encountered; does not collect all violations.
    pub fn check_manifest(&self, manifest: &Manifest) -> PluginResult<()> {
        for permission in &manifest.required_permissions {
            let denied = self.denied.contains(permission);
            let allowed = self.allowed.contains(permission);
            if denied || !allowed {
                return Err(PluginError::permission_denied(&manifest.id, *permission));
            }
        }

        if let Some(max_memory_mb) = manifest.max_memory_mb {
            if max_memory_mb > self.max_plugin_memory_mb {
                return Err(PluginError::memory_limit_exceeded(&manifest.id));
            }
        }

        Ok(())
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::version::Version;

    fn manifest_requiring(permissions: Vec<Permission>) -> Manifest {
        Manifest {
            id: "com.example.policy".to_string(),
            name: "Policy Test".to_string(),
            version: Version::new(1, 0, 0),
            author: String::new(),
            license: String::new(),
            api_version: crate::PLUGIN_API_VERSION,
            capabilities: Capabilities::empty(),
            dependencies: Vec::new(),
            conflicts_with: Vec::new(),
            required_permissions: permissions,
            checksum_sha256: None,
            signature: None,
            host_version_min: Version::new(0, 1, 0),
            host_version_max: None,
            max_memory_mb: None,
        }
    }

    #[test]
    fn strict_policy_denies_execute_commands() {
        let policy = SecurityPolicy::strict();
        let manifest = manifest_requiring(vec![Permission::ExecuteCommands]);
        let err = policy.check_manifest(&manifest).unwrap_err();
        assert!(matches!(err, PluginError::PolicyViolation { .. }));
    }

    #[test]
    fn default_policy_allows_filesystem_read() {
        let policy = SecurityPolicy::default_policy();
        let manifest = manifest_requiring(vec![Permission::FilesystemRead]);
        assert!(policy.check_manifest(&manifest).is_ok());
    }

    #[test]
    fn memory_cap_is_enforced() {
        let policy = SecurityPolicy::strict();
        let mut manifest = manifest_requiring(vec![]);
        manifest.max_memory_mb = Some(policy.max_plugin_memory_mb + 1);
        assert!(policy.check_manifest(&manifest).is_err());
    }

    #[test]
    fn denied_wins_over_allowed() {
        let mut policy = SecurityPolicy::default_policy();
        policy.allowed.push(Permission::ExecuteCommands);
        assert!(policy.denied.contains(&Permission::ExecuteCommands));
        let manifest = manifest_requiring(vec![Permission::ExecuteCommands]);
        assert!(policy.check_manifest(&manifest).is_err());
    }
}
