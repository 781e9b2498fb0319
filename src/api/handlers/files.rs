use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::auth::OwnerId;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated, Pagination};
use crate::service::FileMeta;
use crate::storage::models::{FileRecord, Visibility};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub visibility: Visibility,
    pub tags: Vec<String>,
    pub uploaded_at: String,
    pub download_url: String,
}

/// The JSON `meta` part of an upload request.
#[derive(Debug, Deserialize)]
pub struct UploadMetaRequest {
    #[serde(default)]
    pub file_name: Option<String>,
    pub visibility: Visibility,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    mut multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let mut file_data: Option<BytesMut> = None;
    let mut file_name: Option<String> = None;
    let mut file_content_type: Option<String> = None;
    let mut meta: Option<UploadMetaRequest> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_content_type = field.content_type().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }

                let mut buf = BytesMut::with_capacity(data.len());
                buf.extend_from_slice(&data);
                file_data = Some(buf);
            }
            "meta" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid meta: {e}")))?;
                let parsed: UploadMetaRequest = serde_json::from_str(&text).map_err(|e| {
                    ApiError::bad_request(format!("meta must be a JSON object: {e}"))
                })?;
                meta = Some(parsed);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let meta = meta.ok_or_else(|| ApiError::bad_request("meta field is required"))?;

    if file_data.is_empty() {
        return Err(ApiError::bad_request("file must not be empty"));
    }

    let display_name = meta
        .file_name
        .filter(|name| !name.trim().is_empty())
        .or(file_name.clone())
        .ok_or_else(|| ApiError::bad_request("file name is required"))?;

    // Determine content type: from the multipart part, or guess from the
    // filename, or fall back
    let content_type = file_content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            file_name
                .as_deref()
                .and_then(|n| mime_guess::from_path(n).first())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let file_meta = FileMeta {
        owner_id,
        file_name: display_name,
        content_type,
        visibility: meta.visibility,
        tags: meta.tags,
    };

    let file = state.files.upload(file_meta, file_data.freeze()).await?;

    tracing::debug!(file_id = %file.id, file_name = %file.file_name, "Uploaded file");
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let files = state
        .files
        .list_owner_files(&owner_id, params.tag.as_deref())?;
    Ok(paginate(files, &params))
}

pub async fn list_public_files(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let files = state.files.list_public_files(params.tag.as_deref())?;
    Ok(paginate(files, &params))
}

pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
    AppJson(req): AppJson<RenameRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.files.rename(&id, &owner_id, &req.new_name)?;

    tracing::debug!(file_id = %id, new_name = %file.file_name, "Renamed file");
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.files.delete(&id, &owner_id).await?;

    tracing::debug!(file_id = %id, "Deleted file");
    Ok(JSend::success(()))
}

// ============================================================================
// Helpers
// ============================================================================

fn paginate(
    files: Vec<FileRecord>,
    params: &ListFilesParams,
) -> Json<JSendPaginated<FileResponse>> {
    let total = files.len() as u64;
    let items: Vec<FileResponse> = files
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(file_to_response)
        .collect();

    JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    )
}

fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        id: file.id.clone(),
        file_name: file.file_name.clone(),
        content_type: file.content_type.clone(),
        size_bytes: file.size_bytes,
        visibility: file.visibility,
        tags: file.tags.clone(),
        uploaded_at: file.uploaded_at.to_rfc3339(),
        download_url: format!("/d/{}/{}", file.id, file.download_secret),
    }
}
