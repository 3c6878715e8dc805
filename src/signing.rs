//! Optional Ed25519 signature-verification backend.
//!
//! Not wired into [`crate::verifier::Verifier`] by default — see the design
//! notes on why a caller must opt in explicitly before `require_signature`
//! does anything beyond gate on presence of signature bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as Ed25519Verify, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::PluginResult;
use crate::verifier::SignatureVerifier;

/// Verifies Ed25519 signatures against a fixed set of trusted public keys.
pub struct Ed25519SignatureVerifier {
    trusted_keys: Vec<VerifyingKey>,
}

impl Ed25519SignatureVerifier {
    /// An empty trust store; nothing verifies successfully until a key is added.
    pub fn new() -> Self {
        Ed25519SignatureVerifier {
            trusted_keys: Vec::new(),
        }
    }

    /// Trust `key` for future verifications.
    pub fn add_trusted_key(&mut self, key: VerifyingKey) {
        self.trusted_keys.push(key);
    }
}

impl Default for Ed25519SignatureVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for Ed25519SignatureVerifier {
    fn verify(&self, data: &[u8], signature: &[u8]) -> PluginResult<()> {
        let invalid = || crate::error::PluginError::SignatureInvalid {
            id: "unknown".to_string(),
        };

        if signature.len() != ed25519_dalek::SIGNATURE_LENGTH + ed25519_dalek::PUBLIC_KEY_LENGTH {
            return Err(invalid());
        }
        let (sig_bytes, key_bytes) = signature.split_at(ed25519_dalek::SIGNATURE_LENGTH);

        let sig_array: [u8; ed25519_dalek::SIGNATURE_LENGTH] =
            sig_bytes.try_into().map_err(|_| invalid())?;
        let key_array: [u8; ed25519_dalek::PUBLIC_KEY_LENGTH] =
            key_bytes.try_into().map_err(|_| invalid())?;

        let signature = Signature::from_bytes(&sig_array);
        let public_key = VerifyingKey::from_bytes(&key_array).map_err(|_| invalid())?;

        if !self.trusted_keys.contains(&public_key) {
            return Err(invalid());
        }

        let digest: [u8; 32] = Sha256::digest(data).into();
        public_key.verify(&digest, &signature).map_err(|_| invalid())
    }
}

/// Signs plugin artifacts for test fixtures and out-of-band tooling.
pub struct PluginSigner {
    signing_key: SigningKey,
}

impl PluginSigner {
    /// Wrap an existing signing key.
    pub fn new(signing_key: SigningKey) -> Self {
        PluginSigner { signing_key }
    }

    /// Generate a new random key pair.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut rng = rand::rngs::OsRng;
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        PluginSigner {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The public key counterpart to this signer's key.
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Produce the `signature || public_key` byte blob this crate's
    /// [`Ed25519SignatureVerifier`] expects to find in a manifest's
    /// `signature` field.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let digest: [u8; 32] = Sha256::digest(data).into();
        let signature = self.signing_key.sign(&digest);
        let mut out = Vec::with_capacity(
            ed25519_dalek::SIGNATURE_LENGTH + ed25519_dalek::PUBLIC_KEY_LENGTH,
        );
        out.extend_from_slice(&signature.to_bytes());
        out.extend_from_slice(&self.signing_key.verifying_key().to_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_signature_verifies() {
        let signer = PluginSigner::generate();
        let mut verifier = Ed25519SignatureVerifier::new();
        verifier.add_trusted_key(signer.public_key());

        let data = b"plugin bytes";
        let signature = signer.sign(data);
        assert!(verifier.verify(data, &signature).is_ok());
    }

    #[test]
    fn untrusted_key_fails() {
        let signer = PluginSigner::generate();
        let verifier = Ed25519SignatureVerifier::new();

        let data = b"plugin bytes";
        let signature = signer.sign(data);
        assert!(verifier.verify(data, &signature).is_err());
    }

    #[test]
    fn tampered_data_fails() {
        let signer = PluginSigner::generate();
        let mut verifier = Ed25519SignatureVerifier::new();
        verifier.add_trusted_key(signer.public_key());

        let signature = signer.sign(b"plugin bytes");
        assert!(verifier.verify(b"different bytes", &signature).is_err());
    }
}
