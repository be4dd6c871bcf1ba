use anyhow::{Context, Result};
use axum::Json;
use axum::http::StatusCode;
use std::path::{Path, PathBuf};

use super::models::ErrorResponse;
use crate::document::{DocumentError, PDF_MIME};
use crate::error::EngineError;

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    let message = message.into();
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), "{}", message);
    } else {
        tracing::debug!(status = status.as_u16(), "{}", message);
    }
    (status, Json(ErrorResponse { error: message }))
}

pub(crate) fn engine_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::SourceNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidRules(_) | EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::Load(DocumentError::Parse(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

pub(crate) fn internal_error(err: anyhow::Error) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err))
}

/// Upload ids are the hex md5 of the uploaded content.
pub(crate) fn content_id(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_hexdigit())
}

pub(crate) fn is_pdf(bytes: &[u8]) -> bool {
    infer::get(bytes).map(|kind| kind.mime_type()) == Some(PDF_MIME) || bytes.starts_with(b"%PDF")
}

pub(crate) fn upload_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.pdf", id))
}

pub(crate) fn copy_path(dir: &Path, id: &str, copy_number: usize) -> PathBuf {
    dir.join(format!("{}_copy_{}.pdf", id, copy_number))
}

/// Writes `bytes` under its content id and returns the id.
pub(crate) fn store_upload(dir: &Path, bytes: &[u8]) -> Result<String> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create upload dir: {}", dir.display()))?;
    let id = content_id(bytes);
    let path = upload_path(dir, &id);
    std::fs::write(&path, bytes)
        .with_context(|| format!("failed to store upload: {}", path.display()))?;
    Ok(id)
}
