//! Configuration for tensor save/load

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warp_blobdb::DbBackend;

use crate::error::{TensorError, TensorResult};

/// Environment variable overriding [`TensorConfig::root_path`]
pub const ENV_ROOT: &str = "WARP_TENSOR_ROOT";
/// Environment variable overriding [`TensorConfig::accelerator_count`]
pub const ENV_ACCELERATORS: &str = "WARP_TENSOR_ACCELERATORS";
/// Environment variable overriding [`TensorConfig::default_backend`]
pub const ENV_BACKEND: &str = "WARP_TENSOR_BACKEND";
/// Environment variable overriding [`TensorConfig::verify_checksums`]
pub const ENV_VERIFY_CHECKSUMS: &str = "WARP_TENSOR_VERIFY_CHECKSUMS";

/// Upper bound on accelerators per host
pub const MAX_ACCELERATORS: u32 = 1024;

/// Tensor save/load configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorConfig {
    /// Root directory for relative database paths
    pub root_path: PathBuf,
    /// Backend used when none is given explicitly
    pub default_backend: DbBackend,
    /// Accelerators present on this host
    pub accelerator_count: u32,
    /// Verify record checksums on load
    pub verify_checksums: bool,
    /// Encoding configuration
    pub encode: EncodeConfig,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            default_backend: DbBackend::Sled,
            accelerator_count: 0,
            verify_checksums: true,
            encode: EncodeConfig::default(),
        }
    }
}

/// Record encoding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Encode records on the rayon pool
    pub parallel: bool,
    /// Minimum blobs in one save before encoding goes parallel
    pub parallel_threshold: usize,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 8,
        }
    }
}

impl TensorConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> TensorResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| TensorError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> TensorResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Serialize to a TOML document
    pub fn to_toml_string(&self) -> TensorResult<String> {
        toml::to_string_pretty(self).map_err(|e| TensorError::ConfigError(e.to_string()))
    }

    /// Apply `WARP_TENSOR_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> TensorResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> TensorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT) {
            self.root_path = PathBuf::from(root);
        }
        if let Some(count) = lookup(ENV_ACCELERATORS) {
            self.accelerator_count = count.trim().parse().map_err(|_| {
                TensorError::ConfigError(format!("{}: not a number: {}", ENV_ACCELERATORS, count))
            })?;
        }
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.default_backend = backend
                .parse()
                .map_err(|e| TensorError::ConfigError(format!("{}: {}", ENV_BACKEND, e)))?;
        }
        if let Some(verify) = lookup(ENV_VERIFY_CHECKSUMS) {
            self.verify_checksums = match verify.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(TensorError::ConfigError(format!(
                        "{}: not a boolean: {}",
                        ENV_VERIFY_CHECKSUMS, other
                    )));
                }
            };
        }
        self.validate()
    }

    /// Check invariants
    pub fn validate(&self) -> TensorResult<()> {
        if self.root_path.as_os_str().is_empty() {
            return Err(TensorError::ConfigError("root_path is empty".to_string()));
        }
        if self.accelerator_count > MAX_ACCELERATORS {
            return Err(TensorError::ConfigError(format!(
                "accelerator_count {} exceeds maximum {}",
                self.accelerator_count, MAX_ACCELERATORS
            )));
        }
        if self.encode.parallel_threshold == 0 {
            return Err(TensorError::ConfigError(
                "encode.parallel_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TensorConfig::default();
        assert_eq!(config.default_backend, DbBackend::Sled);
        assert_eq!(config.accelerator_count, 0);
        assert!(config.verify_checksums);
        assert!(config.encode.parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = TensorConfig::from_toml_str(
            r#"
            accelerator_count = 2
            default_backend = "minidb"

            [encode]
            parallel = false
            "#,
        )
        .unwrap();

        assert_eq!(config.accelerator_count, 2);
        assert_eq!(config.default_backend, DbBackend::MiniDb);
        assert!(!config.encode.parallel);
        assert_eq!(config.encode.parallel_threshold, 8);
        assert_eq!(config.root_path, PathBuf::from("."));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = TensorConfig {
            accelerator_count: 4,
            verify_checksums: false,
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(TensorConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            TensorConfig::from_toml_str("default_backend = \"leveldb\""),
            Err(TensorError::ConfigError(_))
        ));
        assert!(matches!(
            TensorConfig::from_toml_str("[encode]\nparallel_threshold = 0"),
            Err(TensorError::ConfigError(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = TensorConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_ROOT, "/srv/blobs"),
                (ENV_ACCELERATORS, "3"),
                (ENV_BACKEND, "MINIDB"),
                (ENV_VERIFY_CHECKSUMS, "off"),
            ]))
            .unwrap();

        assert_eq!(config.root_path, PathBuf::from("/srv/blobs"));
        assert_eq!(config.accelerator_count, 3);
        assert_eq!(config.default_backend, DbBackend::MiniDb);
        assert!(!config.verify_checksums);
    }

    #[test]
    fn test_bad_overrides() {
        let mut config = TensorConfig::default();
        assert!(config
            .apply_overrides(lookup(&[(ENV_ACCELERATORS, "many")]))
            .is_err());
        assert!(config
            .apply_overrides(lookup(&[(ENV_ACCELERATORS, "5000")]))
            .is_err());
        assert!(config
            .apply_overrides(lookup(&[(ENV_VERIFY_CHECKSUMS, "maybe")]))
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tensor.toml");
        std::fs::write(&path, "root_path = \"/var/lib/warp\"\n").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut config = TensorConfig::from_toml_str(&contents).unwrap();
        config.apply_overrides(lookup(&[])).unwrap();
        assert_eq!(config.root_path, PathBuf::from("/var/lib/warp"));
        assert_eq!(config.default_backend, DbBackend::Sled);

        config
            .apply_overrides(lookup(&[(ENV_ROOT, "/srv/tensors")]))
            .unwrap();
        assert_eq!(config.root_path, PathBuf::from("/srv/tensors"));

        // The process environment may still override; the file must load either way
        assert!(TensorConfig::from_file(&path).is_ok());
    }
}
