//! Declarative plugin metadata.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capability::Capabilities;
use crate::error::{PluginError, PluginResult};
use crate::permission::Permission;
use crate::version::{Constraint, Version};

/// `(plugin_id, version_constraint, optional)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The id of the required plugin.
    pub plugin_id: String,
    /// The version constraint that dependency must satisfy, in its canonical string form.
    pub version_constraint: String,
    /// Whether the dependency is optional.
    #[serde(default)]
    pub optional: bool,
}

impl Dependency {
    /// Parse this dependency's constraint string.
    pub fn constraint(&self) -> PluginResult<Constraint> {
        Constraint::parse(&self.version_constraint)
    }
}

fn serialize_version<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&version.format())
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Version::parse(&s).map_err(serde::de::Error::custom)
}

fn serialize_opt_version<S>(version: &Option<Version>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match version {
        Some(v) => serializer.serialize_some(&v.format()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_opt_version<'de, D>(deserializer: D) -> Result<Option<Version>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) => Version::parse(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// The immutable declarative record accompanying a plugin artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Reverse-DNS plugin identifier, unique within a registry.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The plugin's own version.
    #[serde(serialize_with = "serialize_version", deserialize_with = "deserialize_version")]
    pub version: Version,
    /// Author string.
    #[serde(default)]
    pub author: String,
    /// License identifier (e.g. SPDX expression).
    #[serde(default)]
    pub license: String,
    /// Must equal the host's `PLUGIN_API_VERSION` to load.
    pub api_version: u32,
    /// Declared capability bitmap.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Other plugins this one depends on.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Plugin ids this plugin cannot be loaded alongside (while those are loaded).
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    /// Permissions this plugin requires to operate.
    #[serde(default)]
    pub required_permissions: Vec<Permission>,
    /// Expected SHA-256 digest of the artifact file, if integrity-checked.
    #[serde(default, with = "hex_digest_opt")]
    pub checksum_sha256: Option<[u8; 32]>,
    /// Raw signature bytes, if the plugin is signed.
    #[serde(default, with = "hex_bytes_opt")]
    pub signature: Option<Vec<u8>>,
    /// Minimum host platform version this plugin supports.
    #[serde(
        serialize_with = "serialize_version",
        deserialize_with = "deserialize_version"
    )]
    pub host_version_min: Version,
    /// Maximum host platform version this plugin supports, if bounded.
    #[serde(
        default,
        serialize_with = "serialize_opt_version",
        deserialize_with = "deserialize_opt_version"
    )]
    pub host_version_max: Option<Version>,
    /// Declared memory cap for this plugin, in megabytes, if any.
    #[serde(default)]
    pub max_memory_mb: Option<u32>,
}

mod hex_digest_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            None => Ok(None),
            Some(s) => {
                let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
                if bytes.len() != 32 {
                    return Err(serde::de::Error::custom("checksum must be 32 bytes"));
                }
                let mut out = [0u8; 32];
                out.copy_from_slice(&bytes);
                Ok(Some(out))
            }
        }
    }
}

mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            None => Ok(None),
            Some(s) => hex::decode(&s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}

impl Manifest {
    /// Structural validation, independent of any security policy.
    pub fn validate(&self) -> PluginResult<()> {
        if self.id.trim().is_empty() {
            return Err(PluginError::InvalidManifest {
                reason: "id must not be empty".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidManifest {
                reason: "name must not be empty".to_string(),
            });
        }
        if self.api_version != crate::PLUGIN_API_VERSION {
            return Err(PluginError::InvalidManifest {
                reason: format!(
                    "api_version {} does not match host api_version {}",
                    self.api_version,
                    crate::PLUGIN_API_VERSION
                ),
            });
        }
        if let Some(max) = self.host_version_max {
            if self.host_version_min > max {
                return Err(PluginError::InvalidManifest {
                    reason: "host_version_min must be <= host_version_max".to_string(),
                });
            }
        }
        if Capabilities::from_bits(self.capabilities.bits()).is_none() {
            return Err(PluginError::InvalidManifest {
                reason: "capabilities bitmap uses reserved upper bits".to_string(),
            });
        }
        Ok(())
    }

    /// Load and parse a manifest from a `plugin.toml`-style file.
    pub fn from_toml_file(path: &Path) -> PluginResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse a manifest from a TOML string.
    pub fn from_toml_str(contents: &str) -> PluginResult<Self> {
        let manifest: Manifest = toml::from_str(contents)?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            id: "com.example.sample".to_string(),
            name: "Sample".to_string(),
            version: Version::new(1, 0, 0),
            author: "Example".to_string(),
            license: "MIT".to_string(),
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
    fn validates_a_well_formed_manifest() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_empty_id() {
        let mut m = sample();
        m.id = String::new();
        assert!(matches!(m.validate(), Err(PluginError::InvalidManifest { .. })));
    }

    #[test]
    fn rejects_mismatched_api_version() {
        let mut m = sample();
        m.api_version = crate::PLUGIN_API_VERSION + 1;
        assert!(matches!(m.validate(), Err(PluginError::InvalidManifest { .. })));
    }

    #[test]
    fn rejects_reserved_capability_bits() {
        let mut m = sample();
        // `Capabilities` is `#[serde(transparent)]`, so a manifest parsed from TOML can
        // carry reserved bits `from_bits` would otherwise refuse; `validate` must catch it.
        m.capabilities = serde_json::from_str(&u32::MAX.to_string()).unwrap();
        assert!(matches!(m.validate(), Err(PluginError::InvalidManifest { .. })));
    }

    #[test]
    fn rejects_inverted_host_version_bounds() {
        let mut m = sample();
        m.host_version_min = Version::new(2, 0, 0);
        m.host_version_max = Some(Version::new(1, 0, 0));
        assert!(matches!(m.validate(), Err(PluginError::InvalidManifest { .. })));
    }

    #[test]
    fn round_trips_through_toml() {
        let m = sample();
        let text = toml::to_string(&m).unwrap();
        let back = Manifest::from_toml_str(&text).unwrap();
        assert_eq!(back.id, m.id);
        assert_eq!(back.version, m.version);
    }
}
