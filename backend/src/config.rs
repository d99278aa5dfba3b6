//! Service configuration.
//!
//! Loaded from a YAML file (`config/service.yaml` unless `LUMPY_CONFIG` points
//! elsewhere), then overridden from the environment. Every field has a default,
//! so an empty or missing file yields a runnable configuration.
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 5000
//!   expose_error_details: true
//! model:
//!   path: lumpy_disease_cnn.pt
//!   device: auto
//!   inference_timeout_secs: 30
//! image:
//!   size: [128, 128]
//!   resize_method: nearest
//! upload:
//!   dir: /tmp/lumpy-uploads
//!   max_bytes: 52428800
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::inference::normalize::ResizeMethod;

pub const DEFAULT_CONFIG_PATH: &str = "config/service.yaml";
pub const CONFIG_PATH_ENV: &str = "LUMPY_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub image: ImageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of HTTP workers; actix picks one per core when unset.
    pub workers: Option<usize>,
    /// Include the error chain in 5xx bodies. It is logged either way.
    pub expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            workers: None,
            expose_error_details: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    Auto,
    Cpu,
    Cuda,
}

impl std::str::FromStr for DevicePreference {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// TorchScript export of the trained classifier.
    pub path: PathBuf,
    pub device: DevicePreference,
    pub inference_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lumpy_disease_cnn.pt"),
            device: DevicePreference::Auto,
            inference_timeout_secs: 30,
        }
    }
}

impl ModelConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Model input size as `[height, width]`.
    pub size: [u32; 2],
    pub resize_method: ResizeMethod,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: [128, 128],
            resize_method: ResizeMethod::Nearest,
        }
    }
}

impl ImageConfig {
    pub fn target_size(&self) -> (u32, u32) {
        (self.size[0], self.size[1])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("lumpy-uploads"),
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolves the config file, applies process environment overrides and validates.
    /// A missing default file is not an error; a missing explicit one is.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            Err(_) => {
                log::info!("No config file at {}, using defaults", DEFAULT_CONFIG_PATH);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidOverride { key: "PORT", value: port })?;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(device) = lookup("MODEL_DEVICE") {
            self.model.device = device.parse().map_err(|_| ConfigError::InvalidOverride {
                key: "MODEL_DEVICE",
                value: device,
            })?;
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.upload.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.size.contains(&0) {
            return Err(ConfigError::Invalid(format!(
                "image.size must be non-zero, got {:?}",
                self.image.size
            )));
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::Invalid("upload.max_bytes must be positive".into()));
        }
        if self.model.inference_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "model.inference_timeout_secs must be positive".into(),
            ));
        }
        if self.server.workers == Some(0) {
            return Err(ConfigError::Invalid("server.workers must be positive".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_reference_service() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.image.target_size(), (128, 128));
        assert_eq!(config.image.resize_method, ResizeMethod::Nearest);
        assert_eq!(config.model.inference_timeout(), Duration::from_secs(30));
        assert!(config.server.expose_error_details);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = ServiceConfig::from_yaml(
            r#"
image:
  size: [224, 160]
  resize_method: bilinear
model:
  path: /models/cow.pt
  device: cpu
"#,
        )
        .unwrap();
        assert_eq!(config.image.target_size(), (224, 160));
        assert_eq!(config.image.resize_method, ResizeMethod::Bilinear);
        assert_eq!(config.model.path, PathBuf::from("/models/cow.pt"));
        assert_eq!(config.model.device, DevicePreference::Cpu);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = ServiceConfig::from_yaml("   \n").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.yaml");
        std::fs::write(&path, "server:\n  port: 8081\n").unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceConfig::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = ServiceConfig::from_yaml("server: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9000"),
            ("MODEL_PATH", "/srv/model.pt"),
            ("UPLOAD_DIR", "/srv/uploads"),
            ("MODEL_DEVICE", "CUDA"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.path, PathBuf::from("/srv/model.pt"));
        assert_eq!(config.upload.dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.model.device, DevicePreference::Cuda);
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { key: "PORT", .. }));
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut config = ServiceConfig::default();
        config.image.size = [0, 128];
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.upload.max_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.model.inference_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
