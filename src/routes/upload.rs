use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentAdmin;
use crate::routes::method_not_allowed;
use crate::state::AppState;
use crate::upload::{self, UploadError};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload_image)
                .layer(DefaultBodyLimit::max(
                    max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
                ))
                .fallback(method_not_allowed),
        )
        .route(
            "/uploads/{filename}",
            get(serve).fallback(method_not_allowed),
        )
}

/// POST /upload: multipart field `file`
async fn upload_image(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<impl IntoResponse> {
    let mut multipart = multipart.map_err(|_| UploadError::Missing)?;
    let max_bytes = state.config.storage.max_upload_bytes;

    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(UploadError::TooLarge(max_bytes).into());
            }
            bytes.extend_from_slice(&chunk);
        }
        file = Some((original_name, bytes));
        break;
    }

    let (original_name, bytes) = file.ok_or(UploadError::Missing)?;
    let image = upload::validate(&bytes, original_name.as_deref(), max_bytes)?;
    upload::store(&state.config.uploads_path(), &image, &bytes).await?;

    tracing::info!(
        admin = %admin.username,
        filename = %image.filename,
        size = bytes.len(),
        content_type = image.content_type,
        "Image uploaded"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "url": image.url(),
        "filename": image.filename,
    })))
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge(max_bytes).into()
    } else {
        AppError::Validation(format!("Invalid multipart payload: {}", err.body_text()))
    }
}

/// GET /uploads/{filename}
async fn serve(State(state): State<AppState>, Path(filename): Path<String>) -> AppResult<Response> {
    let not_found = || AppError::NotFound("File not found".into());

    let path = upload::resolve(&state.config.uploads_path(), &filename).ok_or_else(not_found)?;
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        data,
    )
        .into_response())
}
