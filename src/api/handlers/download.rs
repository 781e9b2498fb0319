use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::AppState;

/// Serve file content by id + download secret.
/// Route: GET /d/:id/:secret
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((id, secret)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let file = state.files.get_file_for_download(&id, &secret)?;

    // Fetch content from object storage
    let data = state
        .object_store
        .get(&file.object_store_key)
        .await
        .map_err(|e| match e {
            crate::object_store::ObjectStoreError::NotFound(_) => {
                ApiError::not_found("File content not found")
            }
            _ => ApiError::internal(format!("Failed to retrieve file: {e}")),
        })?;

    tracing::debug!(file_id = %file.id, file_name = %file.file_name, "Downloading file");

    // Build response with appropriate headers
    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.content_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(file.size_bytes),
    );

    if let Ok(value) = format!("attachment; filename=\"{}\"", file.file_name).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}
