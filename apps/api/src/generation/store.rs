//! Course persistence. Courses are written once and never updated.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::course::{CourseRow, CourseSummary, NewCourse};

/// Carried in `AppState` and by the course generator as `Arc<dyn CourseStore>`.
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Inserts the course and returns the stored row. The insert either fully
    /// commits or leaves nothing behind.
    async fn insert_course(&self, course: &NewCourse) -> Result<CourseRow, sqlx::Error>;

    async fn list_courses(&self, user_id: Uuid) -> Result<Vec<CourseSummary>, sqlx::Error>;

    /// Returns `None` both when the course does not exist and when another user owns it.
    async fn find_course(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<CourseRow>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgCourseStore {
    pool: PgPool,
}

impl PgCourseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseStore for PgCourseStore {
    async fn insert_course(&self, course: &NewCourse) -> Result<CourseRow, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            INSERT INTO courses
                (id, user_id, title, subtitle, introduction, wallpaper,
                 modules, final_summary, assessment_quiz,
                 language, depth_level, voice_tone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course.user_id)
        .bind(&course.content.title)
        .bind(&course.content.subtitle)
        .bind(&course.content.introduction)
        .bind(&course.content.wallpaper)
        .bind(Json(&course.content.modules))
        .bind(Json(&course.content.final_summary))
        .bind(Json(&course.content.assessment_quiz))
        .bind(&course.params.language)
        .bind(&course.params.depth_level)
        .bind(&course.params.voice_tone)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn list_courses(&self, user_id: Uuid) -> Result<Vec<CourseSummary>, sqlx::Error> {
        sqlx::query_as::<_, CourseSummary>(
            "SELECT id, title FROM courses WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_course(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<CourseRow>, sqlx::Error> {
        sqlx::query_as::<_, CourseRow>("SELECT * FROM courses WHERE id = $1 AND user_id = $2")
            .bind(course_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }
}
