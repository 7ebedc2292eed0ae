use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ClassifyError;
use crate::model::{Classify, Prediction};

#[derive(Clone)]
pub struct AppState {
    classifier: Arc<dyn Classify>,
}

impl AppState {
    pub fn new(classifier: impl Classify) -> Self {
        AppState {
            classifier: Arc::new(classifier),
        }
    }
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/classify/", post(classify_handler))
        .route("/classify", post(classify_handler))
        .route("/predict", post(predict_handler))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Pulls the bytes of the `file` field out of a multipart upload.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, ClassifyError> {
    let mut multipart = multipart.map_err(|err| ClassifyError::Upload(err.to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ClassifyError::Upload(err.to_string()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ClassifyError::Upload(err.to_string()))?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ClassifyError::MissingFile)
}

/// Runs `job` on the blocking pool so decoding and inference never stall the
/// async workers.
async fn run_blocking<T, F>(job: F) -> Result<T, ClassifyError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ClassifyError> + Send + 'static,
{
    tokio::task::spawn_blocking(job).await?
}

async fn classify_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ClassifyError> {
    let result = async {
        let image_data = read_upload(multipart).await?;
        let classifier = state.classifier.clone();
        run_blocking(move || classifier.classify(&image_data)).await
    }
    .await;

    match result {
        Ok(label) => {
            tracing::debug!(label, "classified upload");
            Ok(Json(json!({ "class": label })))
        }
        Err(err) => {
            tracing::warn!(error = %err, "classification failed");
            Err(err)
        }
    }
}

async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<Prediction>>, ClassifyError> {
    let result = async {
        let image_data = read_upload(multipart).await?;
        let classifier = state.classifier.clone();
        run_blocking(move || classifier.predict(&image_data)).await
    }
    .await;

    result.map(Json).map_err(|err| {
        tracing::warn!(error = %err, "prediction failed");
        err
    })
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}
