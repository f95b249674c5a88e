use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerKind {
    SingleChoice,
    TrueFalse,
}

/// One question as stored in the bank. Never mutated after exam definition;
/// shared read-only across sessions. `correct_answer` and `explanation` must
/// not leave the server before the attempt is graded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Option order is significant and preserved in every view.
    pub options: Vec<String>,
    pub kind: AnswerKind,
    pub correct_answer: String,
    pub marks: u32,
    pub subject: String,
    pub difficulty: String,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub id: String,
    pub title: String,
    pub duration_seconds: u32,
    pub instructions: Vec<String>,
    pub questions: Vec<Question>,
    /// When set, only the listed student ids may start this exam.
    pub restricted_to: Option<Vec<String>>,
}

impl ExamDefinition {
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn total_marks(&self) -> u32 {
        self.questions.iter().map(|q| q.marks).sum()
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn allows(&self, student_id: &str) -> bool {
        match &self.restricted_to {
            Some(allowed) => allowed.iter().any(|s| s == student_id),
            None => true,
        }
    }
}

/// Client-facing projection of a question: everything except the answer key.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub kind: AnswerKind,
    pub marks: u32,
    pub subject: String,
    pub difficulty: String,
}

#[derive(Debug, Serialize)]
pub struct ExamView {
    pub id: String,
    pub title: String,
    pub duration_seconds: u32,
    pub total_questions: usize,
    pub total_marks: u32,
    pub instructions: Vec<String>,
    pub questions: Vec<QuestionView>,
}

impl From<&ExamDefinition> for ExamView {
    fn from(exam: &ExamDefinition) -> Self {
        Self {
            id: exam.id.clone(),
            title: exam.title.clone(),
            duration_seconds: exam.duration_seconds,
            total_questions: exam.total_questions(),
            total_marks: exam.total_marks(),
            instructions: exam.instructions.clone(),
            questions: exam
                .questions
                .iter()
                .map(|q| QuestionView {
                    id: q.id.clone(),
                    prompt: q.prompt.clone(),
                    options: q.options.clone(),
                    kind: q.kind,
                    marks: q.marks,
                    subject: q.subject.clone(),
                    difficulty: q.difficulty.clone(),
                })
                .collect(),
        }
    }
}
