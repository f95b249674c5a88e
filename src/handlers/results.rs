use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{error::ApiError, extractors::StudentId, services::AppState};

pub async fn get_result(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(result_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.result_store.fetch(&result_id).await?;
    if result.student_id != student_id {
        return Err(ApiError::Unauthorized(
            "result belongs to another student".to_string(),
        ));
    }
    Ok((StatusCode::OK, Json(result)))
}
