use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::models::exam::{AnswerKind, ExamDefinition, Question};

/// Supplies immutable exam definitions by id. The session engine only ever
/// reads through this seam.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn load_exam(&self, exam_id: &str) -> Result<Arc<ExamDefinition>, ApiError>;
}

pub struct InMemoryQuestionBank {
    exams: RwLock<HashMap<String, Arc<ExamDefinition>>>,
}

impl InMemoryQuestionBank {
    pub fn new() -> Self {
        Self {
            exams: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, exam: ExamDefinition) {
        let mut exams = self.exams.write().await;
        exams.insert(exam.id.clone(), Arc::new(exam));
    }

    /// Installs the demo exam so a fresh instance is usable out of the box.
    pub async fn with_demo_exams() -> Self {
        let bank = Self::new();
        bank.insert(demo_mathematics_final()).await;
        tracing::info!("Seeded question bank with demo exam: mathematics-final");
        bank
    }
}

impl Default for InMemoryQuestionBank {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuestionBank for InMemoryQuestionBank {
    async fn load_exam(&self, exam_id: &str) -> Result<Arc<ExamDefinition>, ApiError> {
        let exams = self.exams.read().await;
        exams
            .get(exam_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("exam {}", exam_id)))
    }
}

fn choice(
    id: &str,
    prompt: &str,
    options: &[&str],
    correct: &str,
    subject: &str,
    difficulty: &str,
    explanation: &str,
) -> Question {
    Question {
        id: id.to_string(),
        prompt: prompt.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        kind: AnswerKind::SingleChoice,
        correct_answer: correct.to_string(),
        marks: 10,
        subject: subject.to_string(),
        difficulty: difficulty.to_string(),
        explanation: Some(explanation.to_string()),
    }
}

fn true_false(
    id: &str,
    prompt: &str,
    correct: &str,
    subject: &str,
    difficulty: &str,
    explanation: &str,
) -> Question {
    Question {
        id: id.to_string(),
        prompt: prompt.to_string(),
        options: vec!["True".to_string(), "False".to_string()],
        kind: AnswerKind::TrueFalse,
        correct_answer: correct.to_string(),
        marks: 10,
        subject: subject.to_string(),
        difficulty: difficulty.to_string(),
        explanation: Some(explanation.to_string()),
    }
}

/// The stock 120-minute mathematics final: ten questions, ten marks each.
pub fn demo_mathematics_final() -> ExamDefinition {
    ExamDefinition {
        id: "mathematics-final".to_string(),
        title: "Mathematics Final Exam".to_string(),
        duration_seconds: 120 * 60,
        instructions: vec![
            "Read all questions carefully before answering".to_string(),
            "Each question carries equal marks unless specified".to_string(),
            "Calculators are not allowed".to_string(),
            "All questions are mandatory".to_string(),
        ],
        questions: vec![
            choice(
                "q1",
                "What is the derivative of x² + 3x + 2?",
                &["2x + 3", "x² + 3", "2x + 2", "x + 3"],
                "2x + 3",
                "Calculus",
                "Medium",
                "The derivative of x² is 2x, the derivative of 3x is 3, and the derivative of a constant is 0.",
            ),
            choice(
                "q2",
                "Solve for x: 2x + 5 = 13",
                &["x = 4", "x = 6", "x = 8", "x = 9"],
                "x = 4",
                "Algebra",
                "Easy",
                "Subtract 5 from both sides: 2x = 8. Then divide by 2: x = 4.",
            ),
            choice(
                "q3",
                "What is the area of a circle with radius 5?",
                &["25π", "10π", "15π", "30π"],
                "25π",
                "Geometry",
                "Medium",
                "Area of circle = πr². With radius 5: π × 5² = 25π.",
            ),
            true_false(
                "q4",
                "Is the function f(x) = x³ continuous everywhere?",
                "True",
                "Calculus",
                "Hard",
                "Polynomial functions are continuous everywhere on their domain.",
            ),
            choice(
                "q5",
                "What is the limit of (sin x)/x as x approaches 0?",
                &["0", "1", "∞", "undefined"],
                "1",
                "Calculus",
                "Hard",
                "This is a fundamental limit in calculus: lim(x→0) (sin x)/x = 1.",
            ),
            choice(
                "q6",
                "Simplify: √(16x⁴)",
                &["4x²", "4x", "2x²", "8x²"],
                "4x²",
                "Algebra",
                "Medium",
                "√(16x⁴) = √16 × √(x⁴) = 4 × x² = 4x².",
            ),
            choice(
                "q7",
                "What is the slope of the line y = 3x - 7?",
                &["3", "-7", "3x", "-3"],
                "3",
                "Algebra",
                "Easy",
                "In the form y = mx + b, m is the slope. Here m = 3.",
            ),
            choice(
                "q8",
                "Factor: x² - 9",
                &["(x+3)(x-3)", "(x+9)(x-9)", "(x+3)²", "(x-3)²"],
                "(x+3)(x-3)",
                "Algebra",
                "Medium",
                "This is a difference of squares: a² - b² = (a+b)(a-b).",
            ),
            choice(
                "q9",
                "What is log₂(8)?",
                &["2", "3", "4", "8"],
                "3",
                "Algebra",
                "Medium",
                "log₂(8) asks \"what power of 2 gives 8?\" Since 2³ = 8, the answer is 3.",
            ),
            true_false(
                "q10",
                "Is every rational number also a real number?",
                "True",
                "Algebra",
                "Easy",
                "Rational numbers are a subset of real numbers.",
            ),
        ],
        restricted_to: None,
    }
}
