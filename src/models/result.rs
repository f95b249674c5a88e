use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionDisposition {
    Correct,
    Incorrect,
    /// Unanswered at submission time. Scores zero like Incorrect, but is
    /// tallied separately.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: String,
    pub prompt: String,
    pub correct_answer: String,
    pub student_answer: Option<String>,
    pub disposition: QuestionDisposition,
    pub marks: u32,
    pub obtained_marks: u32,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectPerformance {
    pub subject: String,
    pub total_questions: u32,
    pub correct_answers: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Passed,
    Failed,
}

/// The deterministic output of the grading engine: everything about an
/// attempt's outcome except identity and timing. Grading the same
/// (exam, answers) pair twice yields an equal GradeSheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeSheet {
    pub total_questions: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub skipped_questions: u32,
    pub obtained_marks: u32,
    pub total_marks: u32,
    pub percentage: u32,
    pub grade: String,
    pub status: ResultStatus,
    pub question_results: Vec<QuestionOutcome>,
    pub subject_performance: Vec<SubjectPerformance>,
    pub recommendations: Vec<String>,
}

/// Immutable once created; owned by the result store after the session
/// engine hands it off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamResult {
    pub id: String,
    pub exam_id: String,
    pub exam_title: String,
    pub student_id: String,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: u32,
    pub time_taken_seconds: u32,
    #[serde(flatten)]
    pub sheet: GradeSheet,
}
