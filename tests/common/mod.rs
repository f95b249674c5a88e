use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

use examdesk_api::config::{Config, GradingConfig};
use examdesk_api::create_router;
use examdesk_api::models::exam::{AnswerKind, ExamDefinition, Question};
use examdesk_api::services::question_bank::{demo_mathematics_final, InMemoryQuestionBank};
use examdesk_api::services::result_store::InMemoryResultStore;
use examdesk_api::AppState;

pub const STUDENT: &str = "stu-001";

/// Builds the full router with an in-memory bank holding the demo exam plus
/// the small fixtures the tests drive.
pub async fn create_test_app() -> Router {
    let bank = InMemoryQuestionBank::new();
    bank.insert(demo_mathematics_final()).await;
    bank.insert(short_quiz()).await;
    bank.insert(restricted_quiz()).await;
    bank.insert(empty_quiz()).await;

    let config = Config {
        bind_addr: "127.0.0.1:0".to_string(),
        submit_wait_seconds: 5,
        grading: GradingConfig::default(),
    };

    let state = Arc::new(AppState::new(
        config,
        Arc::new(bank),
        Arc::new(InMemoryResultStore::new()),
    ));
    create_router(state)
}

fn question(id: &str, subject: &str, correct: &str) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("prompt {}", id),
        options: vec![correct.to_string(), "wrong".to_string()],
        kind: AnswerKind::SingleChoice,
        correct_answer: correct.to_string(),
        marks: 10,
        subject: subject.to_string(),
        difficulty: "Easy".to_string(),
        explanation: None,
    }
}

/// Three questions, 30 marks: answer key A / B / True.
pub fn short_quiz() -> ExamDefinition {
    ExamDefinition {
        id: "short-quiz".to_string(),
        title: "Short Quiz".to_string(),
        duration_seconds: 600,
        instructions: vec!["Answer everything".to_string()],
        questions: vec![
            question("q1", "Algebra", "A"),
            question("q2", "Algebra", "B"),
            Question {
                id: "q3".to_string(),
                prompt: "prompt q3".to_string(),
                options: vec!["True".to_string(), "False".to_string()],
                kind: AnswerKind::TrueFalse,
                correct_answer: "True".to_string(),
                marks: 10,
                subject: "Logic".to_string(),
                difficulty: "Easy".to_string(),
                explanation: None,
            },
        ],
        restricted_to: None,
    }
}

pub fn restricted_quiz() -> ExamDefinition {
    let mut exam = short_quiz();
    exam.id = "restricted-quiz".to_string();
    exam.restricted_to = Some(vec![STUDENT.to_string()]);
    exam
}

pub fn empty_quiz() -> ExamDefinition {
    ExamDefinition {
        id: "empty-quiz".to_string(),
        title: "Empty Quiz".to_string(),
        duration_seconds: 600,
        instructions: vec![],
        questions: vec![],
        restricted_to: None,
    }
}

pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    student_id: &str,
    body: serde_json::Value,
) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .header("x-student-id", student_id)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn send_get(app: &Router, uri: &str, student_id: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("x-student-id", student_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Starts a session on the given exam and returns its id.
pub async fn start_session(app: &Router, exam_id: &str, student_id: &str) -> String {
    let response = send_json(
        app,
        "POST",
        "/api/v1/sessions",
        student_id,
        serde_json::json!({ "exam_id": exam_id }),
    )
    .await;
    let json = body_json(response).await;
    json["session_id"].as_str().unwrap().to_string()
}
