use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

/// The complete tag vocabulary, lexicographically ordered.
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<String>>>, ApiError> {
    let tags = state.files.list_tags()?;
    Ok(JSend::success(tags))
}
