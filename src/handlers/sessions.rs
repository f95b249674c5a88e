use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::{AppJson, StudentId},
    models::{
        ExamView, NavigateRequest, RecordAnswerRequest, StartSessionRequest,
        StartSessionResponse, SubmitResponse, ToggleFlagRequest, ToggleFlagResponse,
    },
    services::AppState,
};

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    AppJson(req): AppJson<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    tracing::info!(
        "Starting session for student {} on exam {}",
        student_id,
        req.exam_id
    );

    let (session_id, exam, remaining_seconds) =
        state.engine.start(&req.exam_id, &student_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session_id,
            exam: ExamView::from(exam.as_ref()),
            remaining_seconds,
        }),
    ))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.engine.view(&session_id, &student_id).await?;
    Ok((StatusCode::OK, Json(view)))
}

pub async fn navigate(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<NavigateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let index = state
        .engine
        .go_to(&session_id, &student_id, req.index)
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "current_question_index": index })),
    ))
}

pub async fn record_answer(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<RecordAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    state
        .engine
        .answer(&session_id, &student_id, &req.question_id, req.value)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_flag(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<ToggleFlagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flagged = state
        .engine
        .toggle_flag(&session_id, &student_id, req.index)
        .await?;
    Ok((
        StatusCode::OK,
        Json(ToggleFlagResponse {
            index: req.index,
            flagged,
        }),
    ))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Submit requested for session {}", session_id);
    let result_id = state.engine.submit(&session_id, &student_id).await?;
    Ok((StatusCode::OK, Json(SubmitResponse { result_id })))
}

pub async fn discard_session(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.discard(&session_id, &student_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
