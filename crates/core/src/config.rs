//! Application configuration model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage driver selection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Registry behaviour flags.
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Schema1 signing configuration.
    #[serde(default)]
    pub signing: SigningConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:5000`.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Expose the Prometheus `/metrics` endpoint.
    #[serde(default)]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: false,
        }
    }
}

/// Storage driver selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem driver rooted at `path`.
    Filesystem { path: PathBuf },

    /// In-memory driver. State is lost on restart; intended for tests and
    /// development.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Registry behaviour flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Allow manifest and blob deletion.
    #[serde(default)]
    pub delete_enabled: bool,

    /// Restore the digest accumulator when an upload is resumed, instead of
    /// rehashing the full stream at commit.
    #[serde(default = "default_true")]
    pub resumable_digest_enabled: bool,

    /// Respond to blob GETs with a redirect to a driver-signed URL instead
    /// of streaming bytes.
    #[serde(default)]
    pub redirect: bool,

    /// Enumerate repositories by walking the storage tree instead of the
    /// metadata service.
    #[serde(default)]
    pub catalog_from_storage: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            delete_enabled: false,
            resumable_digest_enabled: true,
            redirect: false,
            catalog_from_storage: false,
        }
    }
}

/// Schema1 signing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Path to the trust key file. When absent an ephemeral key is
    /// generated at startup.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl AppConfig {
    /// A configuration suitable for tests: in-memory storage, deletes
    /// enabled, ephemeral signing key.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                metrics_enabled: false,
            },
            storage: StorageConfig::Memory,
            registry: RegistrySettings {
                delete_enabled: true,
                resumable_digest_enabled: true,
                redirect: false,
                catalog_from_storage: false,
            },
            signing: SigningConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            registry: RegistrySettings::default(),
            signing: SigningConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_config() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "server": {"bind": "127.0.0.1:5000"},
            "storage": {"driver": "filesystem", "path": "/var/lib/registry"},
            "registry": {"delete_enabled": true, "redirect": true},
        }))
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert!(matches!(config.storage, StorageConfig::Filesystem { .. }));
        assert!(config.registry.delete_enabled);
        assert!(config.registry.redirect);
        // Unset flags keep their defaults.
        assert!(config.registry.resumable_digest_enabled);
        assert!(!config.registry.catalog_from_storage);
    }

    #[test]
    fn defaults_apply() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(!config.registry.delete_enabled);
        assert!(config.signing.key_file.is_none());
    }

    #[test]
    fn for_testing_enables_deletes() {
        let config = AppConfig::for_testing();
        assert!(config.registry.delete_enabled);
        assert!(matches!(config.storage, StorageConfig::Memory));
    }
}
