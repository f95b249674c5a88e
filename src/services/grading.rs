use std::collections::HashMap;

use crate::config::GradingConfig;
use crate::error::ApiError;
use crate::models::result::{
    GradeSheet, QuestionDisposition, QuestionOutcome, ResultStatus, SubjectPerformance,
};
use crate::models::ExamDefinition;

/// Grades a frozen answers snapshot against an exam definition.
///
/// Pure and deterministic: no clock, no ids, no shared state. The session
/// engine wraps the returned sheet with identity and timing. Answers are
/// matched by question id; the order the student answered in is irrelevant.
pub fn grade(
    exam: &ExamDefinition,
    answers: &HashMap<String, String>,
    config: &GradingConfig,
) -> Result<GradeSheet, ApiError> {
    // Defensive: a snapshot referencing a foreign question id means the
    // session engine let a bad answer through. Checked, never trusted.
    for question_id in answers.keys() {
        if exam.question(question_id).is_none() {
            return Err(ApiError::MismatchedQuestionSet(question_id.clone()));
        }
    }

    let mut correct_answers = 0u32;
    let mut incorrect_answers = 0u32;
    let mut skipped_questions = 0u32;
    let mut obtained_marks = 0u32;
    let mut question_results = Vec::with_capacity(exam.questions.len());
    // Subject order follows first appearance in the exam definition.
    let mut subject_order: Vec<String> = Vec::new();
    let mut subject_tallies: HashMap<String, (u32, u32)> = HashMap::new();

    for question in &exam.questions {
        let student_answer = answers.get(&question.id).cloned();
        let disposition = match &student_answer {
            Some(value) if *value == question.correct_answer => QuestionDisposition::Correct,
            Some(_) => QuestionDisposition::Incorrect,
            None => QuestionDisposition::Skipped,
        };

        let question_marks = match disposition {
            QuestionDisposition::Correct => {
                correct_answers += 1;
                question.marks
            }
            QuestionDisposition::Incorrect => {
                incorrect_answers += 1;
                0
            }
            QuestionDisposition::Skipped => {
                skipped_questions += 1;
                0
            }
        };
        obtained_marks += question_marks;

        if !subject_tallies.contains_key(&question.subject) {
            subject_order.push(question.subject.clone());
        }
        let tally = subject_tallies
            .entry(question.subject.clone())
            .or_insert((0, 0));
        tally.0 += 1;
        if disposition == QuestionDisposition::Correct {
            tally.1 += 1;
        }

        question_results.push(QuestionOutcome {
            question_id: question.id.clone(),
            prompt: question.prompt.clone(),
            correct_answer: question.correct_answer.clone(),
            student_answer,
            disposition,
            marks: question.marks,
            obtained_marks: question_marks,
            explanation: question.explanation.clone(),
        });
    }

    let total_marks = exam.total_marks();
    let percentage = percentage_of(obtained_marks, total_marks);

    let subject_performance: Vec<SubjectPerformance> = subject_order
        .iter()
        .map(|subject| {
            let (total, correct) = subject_tallies[subject];
            SubjectPerformance {
                subject: subject.clone(),
                total_questions: total,
                correct_answers: correct,
                percentage: percentage_of(correct, total),
            }
        })
        .collect();

    let recommendations = derive_recommendations(&subject_performance, config);

    let status = if percentage >= config.pass_threshold {
        ResultStatus::Passed
    } else {
        ResultStatus::Failed
    };

    Ok(GradeSheet {
        total_questions: exam.total_questions() as u32,
        correct_answers,
        incorrect_answers,
        skipped_questions,
        obtained_marks,
        total_marks,
        percentage,
        grade: letter_grade(percentage, config),
        status,
        question_results,
        subject_performance,
        recommendations,
    })
}

/// round(part / total * 100), 0 when total is 0. Same rule for overall
/// marks and per-subject question counts.
fn percentage_of(part: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

fn letter_grade(percentage: u32, config: &GradingConfig) -> String {
    config
        .grading_band_for(percentage)
        .unwrap_or_else(|| "F".to_string())
}

impl GradingConfig {
    fn grading_band_for(&self, percentage: u32) -> Option<String> {
        self.grade_bands
            .iter()
            .filter(|band| percentage >= band.min_percentage)
            .max_by_key(|band| band.min_percentage)
            .map(|band| band.letter.clone())
    }
}

/// Rule-derived, not free text: same subject performance always yields the
/// same lines in subject-appearance order.
fn derive_recommendations(
    subjects: &[SubjectPerformance],
    config: &GradingConfig,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    for subject in subjects {
        if subject.percentage < config.review_threshold {
            recommendations.push(format!(
                "Review {}: practice more questions in this area",
                subject.subject
            ));
        } else if subject.percentage == 100 {
            recommendations.push(format!(
                "Strong performance in {} - keep it up!",
                subject.subject
            ));
        }
    }
    recommendations
}
