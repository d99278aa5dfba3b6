use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use shared::{ErrorResponse, PredictionResult};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::inference::{
    Classifier, DecodeError, InferenceError, ResizeMethod, interpret, normalize,
};
use crate::storage::temp_upload::{PersistError, TemporaryArtifact};

/// The `image` file field of one request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("No image provided")]
    MissingInput,
    #[error("No image selected")]
    EmptyFilename,
    #[error("Image exceeds the upload limit of {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Malformed upload: {0}")]
    Upload(String),
    #[error("Failed to save the uploaded image: {0}")]
    Persist(#[from] PersistError),
    #[error("Prediction failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Prediction failed: worker unavailable: {0}")]
    Worker(String),
}

impl PredictError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingInput | PredictError::EmptyFilename | PredictError::Upload(_) => {
                StatusCode::BAD_REQUEST
            }
            PredictError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PredictError::Persist(_)
            | PredictError::Decode(_)
            | PredictError::Inference(_)
            | PredictError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Full error chain, for logs and optionally for 5xx bodies.
    pub fn details(&self) -> String {
        let mut details = format!("{:?}", self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            details.push_str("\ncaused by: ");
            details.push_str(&cause.to_string());
            source = cause.source();
        }
        details
    }

    pub fn to_response(&self, expose_details: bool) -> HttpResponse {
        let status = self.status_code();
        let mut body = ErrorResponse::new(self.to_string());
        if expose_details && status.is_server_error() {
            body = body.with_details(self.details());
        }
        HttpResponse::build(status).json(body)
    }
}

/// Received -> Validated: there must be an `image` file with a non-empty name.
pub fn validate_upload(upload: Option<UploadedImage>) -> Result<UploadedImage, PredictError> {
    let upload = upload.ok_or(PredictError::MissingInput)?;
    if upload.filename.is_empty() {
        return Err(PredictError::EmptyFilename);
    }
    Ok(upload)
}

/// Runs the blocking half of a prediction: persist, normalize, infer, interpret.
#[derive(Clone)]
pub struct PredictionService {
    classifier: Arc<dyn Classifier>,
    upload_dir: PathBuf,
    target_size: (u32, u32),
    resize_method: ResizeMethod,
}

impl PredictionService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        upload_dir: PathBuf,
        target_size: (u32, u32),
        resize_method: ResizeMethod,
    ) -> Self {
        Self {
            classifier,
            upload_dir,
            target_size,
            resize_method,
        }
    }

    pub fn predict(
        &self,
        request_id: Uuid,
        upload: &UploadedImage,
    ) -> Result<PredictionResult, PredictError> {
        let artifact = TemporaryArtifact::persist(
            &self.upload_dir,
            &upload.bytes,
            upload.content_type.as_deref(),
        )?;
        log::info!(
            "[{}] Image saved temporarily at: {}",
            request_id,
            artifact.path().display()
        );

        log::info!("[{}] Preprocessing the image...", request_id);
        let tensor = normalize(artifact.path(), self.target_size, self.resize_method)?;

        log::info!("[{}] Running model prediction...", request_id);
        let raw = self.classifier.infer(&tensor)?;
        log::info!("[{}] Raw prediction: {:?}", request_id, raw.values());

        let result = interpret(&raw);
        log::info!(
            "[{}] Prediction result: {}, probability: {}",
            request_id,
            result.label(),
            result.confidence()
        );
        Ok(result)
    }
}
