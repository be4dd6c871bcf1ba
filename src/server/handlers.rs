use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;

use super::models::{
    GenerateRequest, OcrResponse, PreviewRequest, PreviewResponse, UploadRequest, UploadResponse,
};
use super::state::ServerState;
use super::util::{
    ApiError, api_error, copy_path, engine_error, internal_error, is_pdf, is_valid_id,
    store_upload, upload_path,
};
use crate::archive;
use crate::generator::{GenerateOptions, GenerationRequest};
use crate::rules::RuleSet;
use crate::settings;

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let app = router(ServerState::new(settings));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload))
        .route("/api/ocr/:pdf_id", post(ocr))
        .route("/api/generate", post(generate))
        .route("/api/download/:pdf_id/:copy_number", get(download))
        .route("/api/preview", post(preview))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("content-disposition"),
    );
}

/// Accepts `multipart/form-data` with a `file` part, or a JSON
/// `{filename, data_base64}` body.
async fn upload(
    State(state): State<Arc<ServerState>>,
    request: Request<Body>,
) -> Result<Json<UploadResponse>, ApiError> {
    let multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    let (filename, bytes) = if multipart {
        let form = Multipart::from_request(request, &())
            .await
            .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.body_text()))?;
        read_file_part(form).await?
    } else {
        let Json(payload) = Json::<UploadRequest>::from_request(request, &())
            .await
            .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.body_text()))?;
        let bytes = BASE64.decode(payload.data_base64.trim()).map_err(|err| {
            api_error(StatusCode::BAD_REQUEST, format!("invalid base64: {}", err))
        })?;
        (payload.filename, bytes)
    };

    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(api_error(StatusCode::BAD_REQUEST, "only PDF files are allowed"));
    }
    if !is_pdf(&bytes) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "uploaded content is not a PDF",
        ));
    }
    let pdf_id = store_upload(&state.upload_dir, &bytes).map_err(internal_error)?;
    tracing::info!(%pdf_id, filename = %filename, bytes = bytes.len(), "pdf uploaded");
    Ok(Json(UploadResponse { pdf_id, filename }))
}

async fn read_file_part(mut form: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    let bad_form = |err: axum::extract::multipart::MultipartError| {
        api_error(StatusCode::BAD_REQUEST, err.body_text())
    };
    while let Some(field) = form.next_field().await.map_err(bad_form)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(bad_form)?;
        return Ok((filename, data.to_vec()));
    }
    Err(api_error(StatusCode::BAD_REQUEST, "missing `file` field"))
}

fn read_upload(state: &ServerState, pdf_id: &str) -> Result<Arc<[u8]>, ApiError> {
    if !is_valid_id(pdf_id) {
        return Err(api_error(StatusCode::BAD_REQUEST, "invalid pdf id"));
    }
    let path = upload_path(&state.upload_dir, pdf_id);
    crate::load_source(&path)
        .map(Arc::from)
        .map_err(engine_error)
}

async fn ocr(
    State(state): State<Arc<ServerState>>,
    Path(pdf_id): Path<String>,
) -> Result<Json<OcrResponse>, ApiError> {
    let source = read_upload(&state, &pdf_id)?;
    let sections = crate::run_ocr(&state.settings, source)
        .await
        .map_err(internal_error)?;
    Ok(Json(OcrResponse { sections }))
}

async fn generate(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Response<Body>, ApiError> {
    let source = read_upload(&state, &payload.pdf_id)?;
    let rules = RuleSet::new(payload.rules).map_err(engine_error)?;
    let request = GenerationRequest {
        rules,
        num_copies: payload.num_copies,
        sections: payload.sections,
        stem: payload.pdf_id.clone(),
    };
    let options = GenerateOptions::from_settings(&state.settings);
    let docs = crate::generate_copies(options, source, request)
        .await
        .map_err(engine_error)?;

    std::fs::create_dir_all(&state.output_dir)
        .with_context(|| format!("failed to create output dir: {}", state.output_dir.display()))
        .map_err(internal_error)?;
    for doc in &docs {
        let path = copy_path(&state.output_dir, &payload.pdf_id, doc.index + 1);
        std::fs::write(&path, &doc.bytes)
            .with_context(|| format!("failed to persist copy: {}", path.display()))
            .map_err(internal_error)?;
    }

    let bytes = archive::package(&payload.pdf_id, &docs).map_err(engine_error)?;
    let disposition = format!(
        "attachment; filename=\"generated_pdfs_{}.zip\"",
        payload.pdf_id
    );
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(|err| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        })?,
    );
    Ok(response)
}

async fn download(
    State(state): State<Arc<ServerState>>,
    Path((pdf_id, copy_number)): Path<(String, usize)>,
) -> Result<Response<Body>, ApiError> {
    if !is_valid_id(&pdf_id) || copy_number == 0 {
        return Err(api_error(StatusCode::BAD_REQUEST, "invalid pdf id or copy number"));
    }
    let path = copy_path(&state.output_dir, &pdf_id, copy_number);
    if !path.is_file() {
        return Err(api_error(StatusCode::NOT_FOUND, "copy not found"));
    }
    let bytes = std::fs::read(&path)
        .with_context(|| format!("failed to read copy: {}", path.display()))
        .map_err(internal_error)?;
    let disposition = format!("attachment; filename=\"{}_copy_{}.pdf\"", pdf_id, copy_number);
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(crate::document::PDF_MIME),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(|err| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        })?,
    );
    Ok(response)
}

async fn preview(Json(payload): Json<PreviewRequest>) -> Result<Json<PreviewResponse>, ApiError> {
    let rules = RuleSet::new(payload.rules).map_err(engine_error)?;
    Ok(Json(PreviewResponse {
        values: crate::preview_values(&rules),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ReplacementRule;
    use crate::settings::Settings;

    fn state(dir: &std::path::Path) -> Arc<ServerState> {
        let mut settings = Settings::default();
        settings.server.upload_dir = dir.join("uploads");
        settings.server.output_dir = dir.join("outputs");
        Arc::new(ServerState::new(settings))
    }

    fn json_upload(filename: &str, bytes: &[u8]) -> Request<Body> {
        let body = serde_json::json!({
            "filename": filename,
            "data_base64": BASE64.encode(bytes),
        });
        Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn multipart_upload(field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "docfill-form-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn upload_stores_pdf_and_generate_persists_copies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(dir.path());
        let pdf = crate::test_util::simple_pdf(&[&[("No. SERIAL001", 72.0, 700.0)]]);

        let uploaded = upload(State(state.clone()), json_upload("form.pdf", &pdf))
            .await
            .map_err(|(status, body)| format!("{}: {}", status, body.0.error))
            .expect("upload");
        let pdf_id = uploaded.0.pdf_id.clone();
        assert!(upload_path(&state.upload_dir, &pdf_id).is_file());

        let response = generate(
            State(state.clone()),
            Json(GenerateRequest {
                pdf_id: pdf_id.clone(),
                rules: vec![ReplacementRule::serial("SERIAL001", 100)],
                num_copies: 2,
                sections: Vec::new(),
            }),
        )
        .await
        .map_err(|(status, body)| format!("{}: {}", status, body.0.error))
        .expect("generate");
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"application/zip"[..])
        );
        assert!(copy_path(&state.output_dir, &pdf_id, 1).is_file());
        assert!(copy_path(&state.output_dir, &pdf_id, 2).is_file());

        let missing = download(State(state.clone()), Path((pdf_id.clone(), 3))).await;
        assert!(matches!(missing, Err((status, _)) if status == StatusCode::NOT_FOUND));
        let found = download(State(state), Path((pdf_id, 2))).await;
        assert!(found.is_ok());
    }

    #[tokio::test]
    async fn non_pdf_uploads_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = upload(State(state(dir.path())), json_upload("notes.txt", b"hello")).await;
        assert!(matches!(result, Err((status, _)) if status == StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn unknown_upload_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = generate(
            State(state(dir.path())),
            Json(GenerateRequest {
                pdf_id: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
                rules: vec![ReplacementRule::serial("A", 1)],
                num_copies: 1,
                sections: Vec::new(),
            }),
        )
        .await;
        assert!(matches!(result, Err((status, _)) if status == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn preview_rejects_duplicate_rules() {
        let rules = vec![
            ReplacementRule::serial("A", 1),
            ReplacementRule::serial("A", 2),
        ];
        let result = preview(Json(PreviewRequest { rules })).await;
        assert!(matches!(result, Err((status, _)) if status == StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn multipart_file_field_is_stored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(dir.path());
        let pdf = crate::test_util::simple_pdf(&[&[("Serial: SERIAL001", 72.0, 700.0)]]);

        let uploaded = upload(State(state.clone()), multipart_upload("file", "form.pdf", &pdf))
            .await
            .map_err(|(status, body)| format!("{}: {}", status, body.0.error))
            .expect("upload");
        assert_eq!(uploaded.0.filename, "form.pdf");
        assert_eq!(uploaded.0.pdf_id, super::super::util::content_id(&pdf));
        assert!(upload_path(&state.upload_dir, &uploaded.0.pdf_id).is_file());
    }

    #[tokio::test]
    async fn multipart_without_file_field_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = crate::test_util::simple_pdf(&[&[("x", 72.0, 700.0)]]);
        let result = upload(
            State(state(dir.path())),
            multipart_upload("attachment", "form.pdf", &pdf),
        )
        .await;
        assert!(matches!(result, Err((status, _)) if status == StatusCode::BAD_REQUEST));
    }
}
