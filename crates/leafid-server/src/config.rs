//! Server configuration

use leafid_classifiers::{ArtifactSpec, DecodeLimits, DeviceType, ModelConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::ServeArgs;

pub const DEFAULT_CONFIG_PATH: &str = "leafid.yaml";
pub const DEFAULT_DATABASE_PATH: &str = "database/leaf_info.db";

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Classifier artifacts, labels and input spec
    #[serde(default)]
    pub model: ModelConfig,

    /// Plant metadata database
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Prediction history log
    #[serde(default)]
    pub history: HistoryConfig,

    /// Upload validation and storage
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Crop photos to the leaf region before classification
    #[serde(default)]
    pub crop_to_leaf: bool,
}

impl ServerConfig {
    /// Load configuration from file (defaults when it does not exist) and
    /// apply CLI overrides
    pub fn load(config_path: &Path, cli: &ServeArgs) -> anyhow::Result<Self> {
        let mut config = Self::from_file(config_path)?;
        config.apply_overrides(cli)?;
        Ok(config)
    }

    /// Read a YAML file, falling back to defaults when it does not exist
    pub fn from_file(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config = serde_yaml::from_str(&content).map_err(|e| {
                anyhow::anyhow!("Invalid configuration {}: {}", config_path.display(), e)
            })?;
            Ok(config)
        } else {
            tracing::debug!(
                "No configuration at {}, using defaults",
                config_path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn apply_overrides(&mut self, cli: &ServeArgs) -> anyhow::Result<()> {
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(model) = &cli.model {
            self.model.artifacts = vec![ArtifactSpec::local(model)];
        }
        if let Some(labels) = &cli.labels {
            self.model.labels = labels.clone();
        }
        if let Some(device) = &cli.device {
            self.model.device = device
                .parse::<DeviceType>()
                .map_err(|e| anyhow::anyhow!("Invalid device '{}': {}", device, e))?;
        }
        if let Some(database) = &cli.database {
            self.database = database.clone();
        }
        if let Some(history) = &cli.history {
            self.history.path = history.clone();
        }
        if cli.no_history {
            self.history.enabled = false;
        }
        if let Some(uploads) = &cli.uploads {
            self.uploads.dir = uploads.clone();
        }
        if cli.no_save_uploads {
            self.uploads.save = false;
        }
        if cli.crop_to_leaf {
            self.crop_to_leaf = true;
        }
        Ok(())
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            model: ModelConfig::default(),
            database: default_database(),
            history: HistoryConfig::default(),
            uploads: UploadConfig::default(),
            crop_to_leaf: false,
        }
    }
}

/// Prediction history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Record every identification
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// History database (kept apart from the read-only plant database)
    #[serde(default = "default_history_path")]
    pub path: PathBuf,

    /// Rows shown on the history page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
            page_size: default_page_size(),
        }
    }
}

/// Upload validation and storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Keep uploaded images on disk and serve them under `/uploads`
    #[serde(default = "default_true")]
    pub save: bool,

    /// Directory for saved uploads
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Largest accepted image payload in bytes
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Largest accepted image width or height in pixels
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Accepted file extensions for named uploads (lowercase, no dot)
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl UploadConfig {
    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_bytes: self.max_bytes,
            max_dimension: self.max_dimension,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            save: true,
            dir: default_upload_dir(),
            max_bytes: default_max_bytes(),
            max_dimension: default_max_dimension(),
            allowed_extensions: default_extensions(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn default_history_path() -> PathBuf {
    PathBuf::from("database/history.db")
}

fn default_page_size() -> usize {
    50
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_bytes() -> usize {
    DecodeLimits::default().max_bytes
}

fn default_max_dimension() -> u32 {
    DecodeLimits::default().max_dimension
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "bmp", "webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert!(config.history.enabled);
        assert!(config.uploads.allowed_extensions.contains(&"jpeg".to_string()));
        assert!(!config.crop_to_leaf);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
port: 8000
database: data/plants.db
model:
  labels: models/labels.json
  device: cpu
  artifacts:
    - source:
        type: local
        path: models/leaf.safetensors
      architecture:
        type: mobilenet-v2
        width_multiplier: 0.75
uploads:
  save: false
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.listen, "0.0.0.0");
        assert_eq!(config.database, PathBuf::from("data/plants.db"));
        assert_eq!(config.model.artifacts.len(), 1);
        assert!(!config.uploads.save);
        assert_eq!(config.uploads.max_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ServerConfig::default();
        let cli = ServeArgs {
            port: Some(9000),
            model: Some(PathBuf::from("other.safetensors")),
            device: Some("cpu".to_string()),
            no_history: true,
            crop_to_leaf: true,
            ..Default::default()
        };
        config.apply_overrides(&cli).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.model.artifacts.len(), 1);
        assert!(!config.history.enabled);
        assert!(config.crop_to_leaf);
    }

    #[test]
    fn test_bad_device_rejected() {
        let mut config = ServerConfig::default();
        let cli = ServeArgs {
            device: Some("tpu".to_string()),
            ..Default::default()
        };
        assert!(config.apply_overrides(&cli).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::from_file(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn test_example_config_parses() {
        let yaml = include_str!("../../../leafid.example.yaml");
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.model.top_k, 3);
        assert_eq!(config.history.path, PathBuf::from("database/history.db"));
    }
}
