use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Anything that can go wrong while serving a single classification request.
///
/// Every variant renders to the same client-visible shape,
/// `{"error": "<message>"}` with a 500 status.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("cannot identify image file: {0}")]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error("invalid upload: {0}")]
    Upload(String),

    #[error("no file uploaded")]
    MissingFile,

    #[error("inference worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
