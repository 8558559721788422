//! Weaver configuration (`stitch.toml`)
//!
//! ```toml
//! [weave]
//! helper_namespace = "Host.Interop"
//! core_object = "Host.CoreObject"
//! jobs = 0
//! verify = true
//! debug_map = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stitch_sdk::helpers::{DEFAULT_CORE_OBJECT, DEFAULT_NAMESPACE};
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantically invalid value
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Weave settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Namespace of the helper library types
    pub helper_namespace: String,

    /// Managed root type every exposed class must derive from
    pub core_object: String,

    /// Worker threads for independent units; 0 means one per CPU
    pub jobs: usize,

    /// Run the structural verifier on the woven module
    pub verify: bool,

    /// Emit the companion debug map
    pub debug_map: bool,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            helper_namespace: DEFAULT_NAMESPACE.to_string(),
            core_object: DEFAULT_CORE_OBJECT.to_string(),
            jobs: 0,
            verify: true,
            debug_map: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    weave: WeaveConfig,
}

impl WeaveConfig {
    /// Parse a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.weave.validate()?;
        Ok(file.weave)
    }

    /// Check values that parse but make no sense
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.helper_namespace.is_empty() {
            return Err(ConfigError::Invalid("helper_namespace is empty".into()));
        }
        if self.core_object.is_empty() {
            return Err(ConfigError::Invalid("core_object is empty".into()));
        }
        Ok(())
    }

    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = WeaveConfig::from_toml_str("").unwrap();
        assert_eq!(config, WeaveConfig::default());
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_partial_section() {
        let config = WeaveConfig::from_toml_str(
            r#"
            [weave]
            jobs = 3
            verify = false
            "#,
        )
        .unwrap();
        assert_eq!(config.jobs, 3);
        assert_eq!(config.worker_count(), 3);
        assert!(!config.verify);
        assert_eq!(config.helper_namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_rejects_empty_namespace() {
        let err = WeaveConfig::from_toml_str("[weave]\nhelper_namespace = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stitch.toml");
        std::fs::write(&path, "[weave]\ncore_object = \"Engine.Object\"\n").unwrap();
        let config = WeaveConfig::load(&path).unwrap();
        assert_eq!(config.core_object, "Engine.Object");

        let missing = WeaveConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
