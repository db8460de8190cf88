//! Bulk user upload

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};
use usertree_common::import::{import_users, parse_import_file, ImportSummary};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Multipart field carrying the upload
const FILE_FIELD: &str = "file";

/// POST /upload-users response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub summary: ImportSummary,
}

/// Uploaded file name and contents
struct Upload {
    file_name: String,
    data: Vec<u8>,
}

fn missing_file() -> ApiError {
    ApiError::field(FILE_FIELD, "The file field is required.")
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::field(FILE_FIELD, err.body_text())
    }
}

/// First `file` field in the form; other fields are ignored
async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(Upload {
            file_name,
            data: data.to_vec(),
        });
    }

    Err(missing_file())
}

/// POST /upload-users
///
/// Format comes from the file extension. The batch is parsed completely
/// before anything is written, then imported in one transaction.
pub async fn upload_users(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let multipart = multipart.map_err(|e| {
        debug!("Upload rejected: {}", e.body_text());
        missing_file()
    })?;

    let upload = read_upload(multipart).await?;
    info!(
        "Received upload {} ({} bytes)",
        upload.file_name,
        upload.data.len()
    );

    let records = parse_import_file(&upload.file_name, &upload.data)?;
    debug!("Parsed {} records from {}", records.len(), upload.file_name);

    let summary = import_users(&state.db, &state.hasher, &records).await?;

    Ok(Json(UploadResponse {
        message: "Users imported successfully.".to_string(),
        summary,
    }))
}

/// Build upload routes
pub fn import_routes() -> Router<AppState> {
    Router::new().route("/upload-users", post(upload_users))
}
