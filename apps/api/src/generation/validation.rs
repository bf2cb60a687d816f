//! Structural checks on a decoded course payload.

use serde_json::Value;
use thiserror::Error;

use crate::models::course::CourseContent;

/// Every quiz question must offer exactly this many alternatives.
pub const ALTERNATIVES_PER_QUESTION: usize = 4;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("payload does not match the course schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("course title is missing or empty")]
    MissingTitle,

    #[error(
        "quiz question {question} has {found} alternatives, expected {}",
        ALTERNATIVES_PER_QUESTION
    )]
    AlternativeCount { question: usize, found: usize },

    #[error("quiz question {question} has {found} correct alternatives, expected exactly one")]
    CorrectAnswerCount { question: usize, found: usize },
}

/// Converts the decoded payload into a `CourseContent`, enforcing:
/// - a non-blank `title`
/// - 4 alternatives per quiz question, exactly one of them correct
///
/// Question numbers in errors are 1-based.
pub fn validate_course(payload: Value) -> Result<CourseContent, ValidationError> {
    let course: CourseContent = serde_json::from_value(payload)?;

    if course.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle);
    }

    for (index, question) in course.assessment_quiz.iter().enumerate() {
        let question_number = index + 1;

        if question.alternatives.len() != ALTERNATIVES_PER_QUESTION {
            return Err(ValidationError::AlternativeCount {
                question: question_number,
                found: question.alternatives.len(),
            });
        }

        let correct = question.alternatives.iter().filter(|a| a.is_correct).count();
        if correct != 1 {
            return Err(ValidationError::CorrectAnswerCount {
                question: question_number,
                found: correct,
            });
        }
    }

    Ok(course)
}
