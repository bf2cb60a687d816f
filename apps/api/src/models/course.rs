use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Course document (as produced by the model)
// ────────────────────────────────────────────────────────────────────────────

/// Reads an explicit `null` the same way as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A full course document. Only `title` and the quiz shape are validated;
/// every other field defaults to empty when the model omits it or sends `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseContent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtitle: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub introduction: String,
    /// Cover image reference or description; empty when no cover was requested.
    #[serde(default, deserialize_with = "null_as_default")]
    pub wallpaper: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub modules: Vec<CourseModule>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub final_summary: FinalSummary,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assessment_quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseModule {
    #[serde(default, deserialize_with = "null_as_default")]
    pub module_title: String,
    /// One-word tag used for sidebar navigation.
    #[serde(default, deserialize_with = "null_as_default")]
    pub chapter: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lessons: Vec<Lesson>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub practice_activities: Vec<PracticeActivity>,
}

/// `content` is HTML limited to the tags the prompt allows. Passed through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(default, deserialize_with = "null_as_default")]
    pub lesson_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PracticeActivity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alternatives: Vec<QuizAlternative>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizAlternative {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, alias = "correct", deserialize_with = "null_as_default")]
    pub is_correct: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Persisted rows
// ────────────────────────────────────────────────────────────────────────────

/// Generation parameters recorded alongside the course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub language: String,
    pub depth_level: String,
    pub voice_tone: String,
}

/// A validated course ready to be inserted for its owner.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub user_id: Uuid,
    pub content: CourseContent,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub subtitle: String,
    pub introduction: String,
    pub wallpaper: String,
    pub modules: Json<Vec<CourseModule>>,
    pub final_summary: Json<FinalSummary>,
    pub assessment_quiz: Json<Vec<QuizQuestion>>,
    pub language: String,
    pub depth_level: String,
    pub voice_tone: String,
    pub created_at: DateTime<Utc>,
}

/// Listing entry for `GET /api/my-courses`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let course: CourseContent = serde_json::from_str(r#"{"title": "Rust"}"#).unwrap();
        assert_eq!(course.title, "Rust");
        assert!(course.wallpaper.is_empty());
        assert!(course.modules.is_empty());
        assert!(course.assessment_quiz.is_empty());
    }

    #[test]
    fn test_null_fields_default_to_empty() {
        let course: CourseContent = serde_json::from_str(
            r#"{
                "title": "Rust",
                "subtitle": null,
                "wallpaper": null,
                "final_summary": null,
                "modules": [{"module_title": "Ownership", "chapter": null, "lessons": null}]
            }"#,
        )
        .unwrap();
        assert!(course.subtitle.is_empty());
        assert!(course.wallpaper.is_empty());
        assert_eq!(course.final_summary, FinalSummary::default());
        assert_eq!(course.modules[0].module_title, "Ownership");
        assert!(course.modules[0].chapter.is_empty());
        assert!(course.modules[0].lessons.is_empty());
    }

    #[test]
    fn test_alternative_accepts_short_correct_key() {
        let alt: QuizAlternative =
            serde_json::from_str(r#"{"text": "B", "correct": true}"#).unwrap();
        assert!(alt.is_correct);
    }

    #[test]
    fn test_course_row_serializes_blobs_inline() {
        let row = CourseRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Rust".to_string(),
            subtitle: String::new(),
            introduction: String::new(),
            wallpaper: String::new(),
            modules: Json(vec![CourseModule {
                module_title: "Ownership".to_string(),
                chapter: "Ownership".to_string(),
                ..Default::default()
            }]),
            final_summary: Json(FinalSummary::default()),
            assessment_quiz: Json(vec![]),
            language: "English".to_string(),
            depth_level: "Beginner".to_string(),
            voice_tone: "Formal".to_string(),
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["modules"][0]["module_title"], "Ownership");
        assert!(value["assessment_quiz"].as_array().unwrap().is_empty());
    }
}
