use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use validator::Validate;

pub mod exam;
pub mod result;
pub mod timer;

pub use exam::{AnswerKind, ExamDefinition, ExamView, Question, QuestionView};
pub use result::{ExamResult, GradeSheet, QuestionDisposition, ResultStatus};

/// One student's single timed attempt at one exam. Mutated only through the
/// session engine, under the per-session lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub started_at: DateTime<Utc>,
    pub current_question_index: usize,
    /// question id -> selected option value. Unset means unanswered; keys
    /// are always a subset of the exam's question ids.
    pub answers: HashMap<String, String>,
    /// Advisory only. Never affects grading or submission.
    pub flagged: BTreeSet<usize>,
    pub remaining_seconds: u32,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Submitting,
    Submitted,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Submitted | SessionStatus::Failed)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, message = "exam_id must not be empty"))]
    pub exam_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub exam: ExamView,
    pub remaining_seconds: u32,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    /// i64 so out-of-range values like -1 are representable and can be
    /// rejected explicitly instead of failing deserialization.
    pub index: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub question_id: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleFlagRequest {
    pub index: i64,
}

#[derive(Debug, Serialize)]
pub struct ToggleFlagResponse {
    pub index: i64,
    pub flagged: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub result_id: String,
}

/// Client-facing snapshot of a running session.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub exam_id: String,
    pub student_id: String,
    pub started_at: DateTime<Utc>,
    pub current_question_index: usize,
    pub answers: HashMap<String, String>,
    pub flagged: Vec<usize>,
    pub answered_count: usize,
    pub remaining_seconds: u32,
    pub status: SessionStatus,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            exam_id: session.exam_id.clone(),
            student_id: session.student_id.clone(),
            started_at: session.started_at,
            current_question_index: session.current_question_index,
            answers: session.answers.clone(),
            flagged: session.flagged.iter().copied().collect(),
            answered_count: session.answers.len(),
            remaining_seconds: session.remaining_seconds,
            status: session.status,
        }
    }
}
