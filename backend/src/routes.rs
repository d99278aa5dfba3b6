use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, Result, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use shared::StatusResponse;
use uuid::Uuid;

use crate::inference::InferenceError;
use crate::predict::{PredictError, UploadedImage, validate_upload};
use crate::startup::AppState;

const IMAGE_FIELD: &str = "image";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/predict").route(web::post().to(predict)));
}

async fn index(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        status: "success".into(),
        message: "Cow Lumpy Disease Prediction API is running!".into(),
        model_path: state.model_path.display().to_string(),
    })
}

async fn predict(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Payload,
) -> Result<HttpResponse> {
    let request_id = Uuid::new_v4();
    info!("[{}] Processing new prediction request", request_id);

    let upload = match read_upload(&req, payload, state.max_upload_bytes)
        .await
        .and_then(validate_upload)
    {
        Ok(upload) => upload,
        Err(e) => {
            warn!("[{}] Rejected upload: {}", request_id, e);
            return Ok(e.to_response(state.expose_error_details));
        }
    };
    info!(
        "[{}] Received image: {}, content type: {}",
        request_id,
        upload.filename,
        upload.content_type.as_deref().unwrap_or("unknown")
    );

    // The temporary artifact lives inside the blocking job, so it is removed
    // when the job finishes even if the response already timed out.
    let service = state.service.clone();
    let job = web::block(move || service.predict(request_id, &upload));
    let outcome = match actix_web::rt::time::timeout(state.inference_timeout, job).await {
        Ok(Ok(result)) => result,
        Ok(Err(blocking)) => Err(PredictError::Worker(blocking.to_string())),
        Err(_) => Err(InferenceError::Timeout(state.inference_timeout).into()),
    };

    match outcome {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => {
            error!("[{}] {}\n{}", request_id, e, e.details());
            Ok(e.to_response(state.expose_error_details))
        }
    }
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Pulls the first `image` file field out of the form. Fields without a
/// filename are plain form values and are skipped like any other field.
async fn read_upload(
    req: &HttpRequest,
    payload: web::Payload,
    limit: usize,
) -> Result<Option<UploadedImage>, PredictError> {
    if !is_multipart(req) {
        return Ok(None);
    }

    let mut multipart = Multipart::new(req.headers(), payload);
    let mut upload = None;

    while let Some(mut field) = multipart
        .try_next()
        .await
        .map_err(|e| PredictError::Upload(e.to_string()))?
    {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned);

        let wanted = upload.is_none() && field.name() == Some(IMAGE_FIELD) && filename.is_some();
        if !wanted {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| PredictError::Upload(e.to_string()))?;
            }
            continue;
        }

        let content_type = field.content_type().map(|mime| mime.to_string());
        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| PredictError::Upload(e.to_string()))?;
            if bytes.len() + data.len() > limit {
                return Err(PredictError::TooLarge { limit });
            }
            bytes.extend_from_slice(&data);
        }

        upload = Some(UploadedImage {
            bytes,
            filename: filename.unwrap_or_default(),
            content_type,
        });
    }

    Ok(upload)
}
