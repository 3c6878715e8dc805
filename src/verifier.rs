//! Checksum, signature, and policy verification for a candidate plugin.

use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{PluginError, PluginResult};
use crate::manifest::Manifest;
use crate::policy::SecurityPolicy;

/// Pluggable signature-verification backend.
///
/// Not wired into [`Verifier`] by default: see the design notes on why
/// `require_signature=true` with no backend configured always fails.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` covers `data`. Returns `Ok(())` only on a successful,
    /// trusted verification.
    fn verify(&self, data: &[u8], signature: &[u8]) -> PluginResult<()>;
}

/// Performs checksum, signature-presence, and policy checks against a manifest.
///
/// `verify_all` is a pure function of its inputs aside from logging.
#[derive(Default)]
pub struct Verifier {
    signature_verifier: Option<Box<dyn SignatureVerifier>>,
}

impl Verifier {
    /// A verifier with no signature backend wired in.
    pub fn new() -> Self {
        Verifier {
            signature_verifier: None,
        }
    }

    /// A verifier that delegates signature checks to `backend`.
    pub fn with_signature_verifier(backend: Box<dyn SignatureVerifier>) -> Self {
        Verifier {
            signature_verifier: Some(backend),
        }
    }

    /// Run the checksum check, the signature-requirement gate, and the policy
    /// check, in that order, short-circuiting on the first failure.
    pub fn verify_all(
        &self,
        path: &Path,
        manifest: &Manifest,
        policy: &SecurityPolicy,
    ) -> PluginResult<()> {
        if let Some(expected) = manifest.checksum_sha256 {
            let actual = Self::sha256_file(path)?;
            if !constant_time_eq(&actual, &expected) {
                tracing::error!(plugin_id = %manifest.id, "checksum mismatch");
                return Err(PluginError::ChecksumMismatch {
                    id: manifest.id.clone(),
                });
            }
        }

        if policy.require_signature {
            match &manifest.signature {
                None => {
                    tracing::error!(plugin_id = %manifest.id, "signature required but absent");
                    return Err(PluginError::SignatureInvalid {
                        id: manifest.id.clone(),
                    });
                }
                Some(signature) if signature.is_empty() => {
                    tracing::error!(plugin_id = %manifest.id, "signature required but empty");
                    return Err(PluginError::SignatureInvalid {
                        id: manifest.id.clone(),
                    });
                }
                Some(signature) => match &self.signature_verifier {
                    None => {
                        tracing::error!(
                            plugin_id = %manifest.id,
                            "signature present but no verifier backend is configured"
                        );
                        return Err(PluginError::SignatureInvalid {
                            id: manifest.id.clone(),
                        });
                    }
                    Some(backend) => {
                        let data = std::fs::read(path)?;
                        if backend.verify(&data, signature).is_err() {
                            tracing::error!(plugin_id = %manifest.id, "signature verification failed");
                            return Err(PluginError::SignatureInvalid {
                                id: manifest.id.clone(),
                            });
                        }
                    }
                },
            }
        }

        self.check_policy(manifest, policy)
    }

    /// Run just the policy check.
    pub fn check_policy(&self, manifest: &Manifest, policy: &SecurityPolicy) -> PluginResult<()> {
        policy.check_manifest(manifest).map_err(|err| {
            tracing::error!(plugin_id = %manifest.id, error = %err, "policy violation");
            err
        })
    }

    fn sha256_file(path: &Path) -> PluginResult<[u8; 32]> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hasher.finalize().into())
    }
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::permission::Permission;
    use crate::version::Version;
    use tempfile::NamedTempFile;

    fn manifest_for(path: &Path, checksum: Option<[u8; 32]>) -> Manifest {
        let _ = path;
        Manifest {
            id: "com.example.verify".to_string(),
            name: "Verify Test".to_string(),
            version: Version::new(1, 0, 0),
            author: String::new(),
            license: String::new(),
            api_version: crate::PLUGIN_API_VERSION,
            capabilities: Capabilities::empty(),
            dependencies: Vec::new(),
            conflicts_with: Vec::new(),
            required_permissions: Vec::new(),
            checksum_sha256: checksum,
            signature: None,
            host_version_min: Version::new(0, 1, 0),
            host_version_max: None,
            max_memory_mb: None,
        }
    }

    #[test]
    fn checksum_match_succeeds() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"plugin bytes").unwrap();
        let digest: [u8; 32] = Sha256::digest(b"plugin bytes").into();

        let verifier = Verifier::new();
        let manifest = manifest_for(file.path(), Some(digest));
        let policy = SecurityPolicy::default_policy();
        assert!(verifier.verify_all(file.path(), &manifest, &policy).is_ok());
    }

    #[test]
    fn checksum_mismatch_fails() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"plugin bytes").unwrap();
        let wrong_digest = [0u8; 32];

        let verifier = Verifier::new();
        let manifest = manifest_for(file.path(), Some(wrong_digest));
        let policy = SecurityPolicy::default_policy();
        let err = verifier
            .verify_all(file.path(), &manifest, &policy)
            .unwrap_err();
        assert!(matches!(err, PluginError::ChecksumMismatch { .. }));
    }

    #[test]
    fn signature_required_with_no_backend_always_fails() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"plugin bytes").unwrap();

        let verifier = Verifier::new();
        let mut manifest = manifest_for(file.path(), None);
        manifest.signature = Some(vec![1, 2, 3]);
        let mut policy = SecurityPolicy::default_policy();
        policy.require_signature = true;

        let err = verifier
            .verify_all(file.path(), &manifest, &policy)
            .unwrap_err();
        assert!(matches!(err, PluginError::SignatureInvalid { .. }));
    }

    #[test]
    fn policy_denial_surfaces_as_policy_violation() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"plugin bytes").unwrap();

        let verifier = Verifier::new();
        let mut manifest = manifest_for(file.path(), None);
        manifest.required_permissions = vec![Permission::ExecuteCommands];
        let policy = SecurityPolicy::strict();

        let err = verifier
            .verify_all(file.path(), &manifest, &policy)
            .unwrap_err();
        assert!(matches!(err, PluginError::PolicyViolation { .. }));
    }
}
