use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, ServiceConfig};
use crate::inference::Classifier;
use crate::predict::PredictionService;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Model file not found at {0}")]
    ModelNotFound(PathBuf),
    #[error("Failed to load the model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("No inference backend compiled in; rebuild with the `torch` feature")]
    BackendUnavailable,
    #[error("Upload directory {path} is not usable: {source}")]
    UploadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Shared, read-only state handed to every worker.
pub struct AppState {
    pub service: PredictionService,
    pub model_path: PathBuf,
    pub max_upload_bytes: usize,
    pub inference_timeout: Duration,
    pub expose_error_details: bool,
}

impl AppState {
    pub fn new(config: &ServiceConfig, classifier: Arc<dyn Classifier>) -> Result<Self, StartupError> {
        std::fs::create_dir_all(&config.upload.dir).map_err(|source| StartupError::UploadDir {
            path: config.upload.dir.clone(),
            source,
        })?;

        let service = PredictionService::new(
            classifier,
            config.upload.dir.clone(),
            config.image.target_size(),
            config.image.resize_method,
        );

        Ok(Self {
            service,
            model_path: config.model.path.clone(),
            max_upload_bytes: config.upload.max_bytes,
            inference_timeout: config.model.inference_timeout(),
            expose_error_details: config.server.expose_error_details,
        })
    }
}

pub fn model_input_shape(config: &ServiceConfig) -> [usize; 4] {
    let (height, width) = config.image.target_size();
    [1, height as usize, width as usize, crate::inference::normalize::CHANNELS]
}

/// Loads the classifier once for the whole process. Any failure here means
/// the service must not start listening.
pub fn load_classifier(config: &ServiceConfig) -> Result<Arc<dyn Classifier>, StartupError> {
    let path = &config.model.path;
    if !path.is_file() {
        return Err(StartupError::ModelNotFound(path.clone()));
    }
    log::info!("Found model at: {}", path.display());
    load_backend(config)
}

#[cfg(feature = "torch")]
fn load_backend(config: &ServiceConfig) -> Result<Arc<dyn Classifier>, StartupError> {
    use crate::inference::model::TorchModel;

    let model = TorchModel::load(
        &config.model.path,
        config.model.device,
        model_input_shape(config),
    )
    .map_err(|e| StartupError::ModelLoad {
        path: config.model.path.clone(),
        reason: e.to_string(),
    })?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "torch"))]
fn load_backend(_config: &ServiceConfig) -> Result<Arc<dyn Classifier>, StartupError> {
    Err(StartupError::BackendUnavailable)
}
