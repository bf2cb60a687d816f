//! Course generation: orchestrates the credit-safe generation workflow.
//!
//! Flow: reserve credit → model call (bounded) → parse → validate → persist.
//! Any failure after the reservation refunds the credit. A refund that fails
//! after a persistence failure is logged at error level and not retried.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::credits::CreditLedger;
use crate::errors::AppError;
use crate::generation::prompts::COURSE_PROMPT_TEMPLATE;
use crate::generation::response_parser::{parse_model_output, ParseError};
use crate::generation::store::CourseStore;
use crate::generation::validation::{validate_course, ValidationError};
use crate::llm_client::{LlmError, TextGenerator};
use crate::models::course::{CourseRow, GenerationParams, NewCourse};

// ────────────────────────────────────────────────────────────────────────────
// Request / error types
// ────────────────────────────────────────────────────────────────────────────

/// Request body for course generation.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateCourseRequest {
    pub topic: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_depth_level")]
    pub depth_level: String,
    #[serde(default = "default_voice_tone")]
    pub voice_tone: String,
    #[serde(default = "default_true")]
    pub generate_cover_image: bool,
}

fn default_language() -> String {
    "Português".to_string()
}

fn default_depth_level() -> String {
    "Intermediário".to_string()
}

fn default_voice_tone() -> String {
    "Formal".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("model did not answer within {secs}s")]
    Timeout { secs: u64 },

    #[error("model call failed: {0}")]
    Model(#[source] LlmError),

    #[error("malformed model response: {0}")]
    MalformedResponse(#[from] ParseError),

    #[error("invalid course structure: {0}")]
    InvalidStructure(#[from] ValidationError),

    #[error("failed to persist course: {0}")]
    Persistence(#[source] sqlx::Error),

    #[error("credit ledger unavailable: {0}")]
    Ledger(#[source] sqlx::Error),

    #[error("generation task aborted: {0}")]
    Aborted(String),
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InsufficientCredits => AppError::InsufficientCredits,
            GenerationError::Timeout { secs } => AppError::GenerationTimeout(secs),
            GenerationError::Model(e) => AppError::Llm(e.to_string()),
            GenerationError::MalformedResponse(e) => AppError::MalformedResponse(e.to_string()),
            GenerationError::InvalidStructure(e) => AppError::InvalidCourseStructure(e.to_string()),
            GenerationError::Persistence(e) => AppError::PersistenceFailure(e.to_string()),
            GenerationError::Ledger(e) => AppError::Database(e),
            GenerationError::Aborted(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

pub struct CourseGenerator {
    ledger: Arc<dyn CreditLedger>,
    store: Arc<dyn CourseStore>,
    model: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl CourseGenerator {
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        store: Arc<dyn CourseStore>,
        model: Arc<dyn TextGenerator>,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            store,
            model,
            timeout,
        }
    }

    /// Runs `generate` on its own task so a client disconnect cannot drop the
    /// workflow between the reservation and the refund.
    pub async fn generate_detached(
        self: &Arc<Self>,
        user_id: Uuid,
        request: GenerateCourseRequest,
    ) -> Result<CourseRow, GenerationError> {
        let generator = Arc::clone(self);
        tokio::spawn(async move { generator.generate(user_id, &request).await })
            .await
            .map_err(|e| GenerationError::Aborted(e.to_string()))?
    }

    /// Runs the full workflow for one request.
    ///
    /// Steps:
    /// 1. reserve one credit (guarded, committed alone); `InsufficientCredits` on failure
    /// 2. model call under `timeout`
    /// 3. parse the model text into JSON
    /// 4. validate the course structure
    /// 5. persist the course (commit point)
    ///
    /// Failures in steps 2–5 refund the reserved credit before returning.
    pub async fn generate(
        &self,
        user_id: Uuid,
        request: &GenerateCourseRequest,
    ) -> Result<CourseRow, GenerationError> {
        // Step 1: Reserve
        let reserved = self
            .ledger
            .reserve(user_id)
            .await
            .map_err(GenerationError::Ledger)?;
        if !reserved {
            info!("User {user_id} has no credits left; generation refused");
            return Err(GenerationError::InsufficientCredits);
        }
        info!("Reserved one credit for user {user_id}");

        match self.produce(user_id, request).await {
            Ok(course) => {
                let remaining = self.ledger.balance(user_id).await.ok().flatten();
                info!(
                    "Generated course {} for user {user_id} (credits remaining: {remaining:?})",
                    course.id
                );
                Ok(course)
            }
            Err(err) => {
                self.refund(user_id, &err).await;
                Err(err)
            }
        }
    }

    /// Steps 2–5. Everything here runs with the credit already spent.
    async fn produce(
        &self,
        user_id: Uuid,
        request: &GenerateCourseRequest,
    ) -> Result<CourseRow, GenerationError> {
        // Step 2: Model call
        let prompt = build_course_prompt(request);
        info!(
            "Requesting course from model for user {user_id} (topic={:?}, timeout={}s)",
            request.topic,
            self.timeout.as_secs()
        );
        let raw = match tokio::time::timeout(self.timeout, self.model.generate_text(&prompt)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Model call failed for user {user_id}: {e}");
                return Err(GenerationError::Model(e));
            }
            Err(_) => {
                warn!(
                    "Model call for user {user_id} exceeded {}s",
                    self.timeout.as_secs()
                );
                return Err(GenerationError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        // Step 3: Parse
        let payload = parse_model_output(&raw).map_err(|e| {
            warn!("Unparseable model output for user {user_id}: {e}");
            e
        })?;

        // Step 4: Validate
        let mut content = validate_course(payload).map_err(|e| {
            warn!("Model output for user {user_id} failed validation: {e}");
            e
        })?;
        if !request.generate_cover_image {
            content.wallpaper.clear();
        }

        // Step 5: Commit
        let new_course = NewCourse {
            user_id,
            content,
            params: GenerationParams {
                language: request.language.clone(),
                depth_level: request.depth_level.clone(),
                voice_tone: request.voice_tone.clone(),
            },
        };
        self.store.insert_course(&new_course).await.map_err(|e| {
            error!("Failed to persist generated course for user {user_id}: {e}");
            GenerationError::Persistence(e)
        })
    }

    async fn refund(&self, user_id: Uuid, cause: &GenerationError) {
        match self.ledger.refund(user_id).await {
            Ok(()) => info!("Refunded credit to user {user_id} after failed generation: {cause}"),
            Err(refund_err) => error!(
                "Credit refund failed for user {user_id}; the credit is lost. \
                cause={cause}, refund_error={refund_err}"
            ),
        }
    }
}

/// Fills the course prompt template from the request.
pub fn build_course_prompt(request: &GenerateCourseRequest) -> String {
    let cover_image = if request.generate_cover_image {
        "yes"
    } else {
        "no"
    };

    fill_placeholders(
        COURSE_PROMPT_TEMPLATE,
        &[
            ("topic", request.topic.trim()),
            ("language", &request.language),
            ("depth_level", &request.depth_level),
            ("voice_tone", &request.voice_tone),
            ("cover_image", cover_image),
        ],
    )
}

/// Substitutes `{name}` markers in one pass, so inserted values are never
/// rescanned. Braces that do not name a known placeholder are kept as-is.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        filled.push_str(&rest[..start]);
        let marker = &rest[start + 1..];
        let hit = values.iter().find(|(name, _)| {
            marker
                .strip_prefix(name)
                .is_some_and(|after| after.starts_with('}'))
        });
        match hit {
            Some((name, value)) => {
                filled.push_str(value);
                rest = &marker[name.len() + 1..];
            }
            None => {
                filled.push('{');
                rest = marker;
            }
        }
    }

    filled.push_str(rest);
    filled
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::types::Json;

    use crate::models::course::CourseSummary;

    // ── Fakes ───────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct MemoryLedger {
        balances: Mutex<HashMap<Uuid, i32>>,
        fail_refund: bool,
    }

    impl MemoryLedger {
        fn with_balance(user_id: Uuid, credits: i32) -> Self {
            let ledger = Self::default();
            ledger.balances.lock().unwrap().insert(user_id, credits);
            ledger
        }

        fn failing_refunds(user_id: Uuid, credits: i32) -> Self {
            let mut ledger = Self::with_balance(user_id, credits);
            ledger.fail_refund = true;
            ledger
        }

        fn credits(&self, user_id: Uuid) -> i32 {
            self.balances.lock().unwrap()[&user_id]
        }
    }

    #[async_trait]
    impl CreditLedger for MemoryLedger {
        async fn reserve(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
            let mut balances = self.balances.lock().unwrap();
            match balances.get_mut(&user_id) {
                Some(credits) if *credits >= 1 => {
                    *credits -= 1;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn refund(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
            if self.fail_refund {
                return Err(sqlx::Error::PoolClosed);
            }
            let mut balances = self.balances.lock().unwrap();
            let credits = balances.get_mut(&user_id).ok_or(sqlx::Error::RowNotFound)?;
            *credits += 1;
            Ok(())
        }

        async fn balance(&self, user_id: Uuid) -> Result<Option<i32>, sqlx::Error> {
            Ok(self.balances.lock().unwrap().get(&user_id).copied())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<CourseRow>>,
        fail_insert: bool,
    }

    impl MemoryStore {
        fn failing() -> Self {
            Self {
                fail_insert: true,
                ..Default::default()
            }
        }

        fn rows(&self) -> Vec<CourseRow> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CourseStore for MemoryStore {
        async fn insert_course(&self, course: &NewCourse) -> Result<CourseRow, sqlx::Error> {
            if self.fail_insert {
                return Err(sqlx::Error::PoolTimedOut);
            }
            let row = CourseRow {
                id: Uuid::new_v4(),
                user_id: course.user_id,
                title: course.content.title.clone(),
                subtitle: course.content.subtitle.clone(),
                introduction: course.content.introduction.clone(),
                wallpaper: course.content.wallpaper.clone(),
                modules: Json(course.content.modules.clone()),
                final_summary: Json(course.content.final_summary.clone()),
                assessment_quiz: Json(course.content.assessment_quiz.clone()),
                language: course.params.language.clone(),
                depth_level: course.params.depth_level.clone(),
                voice_tone: course.params.voice_tone.clone(),
                created_at: Utc::now(),
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }

        async fn list_courses(&self, user_id: Uuid) -> Result<Vec<CourseSummary>, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| CourseSummary {
                    id: r.id,
                    title: r.title.clone(),
                })
                .collect())
        }

        async fn find_course(
            &self,
            course_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<CourseRow>, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == course_id && r.user_id == user_id)
                .cloned())
        }
    }

    enum Reply {
        Text(String),
        Fail,
        Hang,
    }

    struct ScriptedModel {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedModel {
        async fn generate_text(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail => Err(LlmError::Api {
                    status: 400,
                    message: "API key not valid".to_string(),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn valid_course_text() -> String {
        let course = serde_json::json!({
            "title": "Rust for Beginners",
            "subtitle": "From zero to ownership",
            "introduction": "<p>Welcome</p>",
            "wallpaper": "A crab on a keyboard",
            "modules": [{
                "module_title": "Basics",
                "chapter": "Basics",
                "lessons": [{"lesson_title": "1.1 Hello", "content": "<p>Hi</p>"}],
                "practice_activities": [{"title": "Try it", "content": "<p>Run cargo</p>"}]
            }],
            "final_summary": {"title": "Summary", "content": "<p>Done</p>"},
            "assessment_quiz": [{
                "text": "Who owns a value?",
                "alternatives": [
                    {"text": "Everyone", "is_correct": false},
                    {"text": "Its owner", "is_correct": true},
                    {"text": "Nobody", "is_correct": false},
                    {"text": "The GC", "is_correct": false}
                ]
            }]
        });
        format!("```json\n{course}\n```")
    }

    fn request() -> GenerateCourseRequest {
        serde_json::from_value(serde_json::json!({"topic": "Rust for Beginners"})).unwrap()
    }

    struct Harness {
        user_id: Uuid,
        ledger: Arc<MemoryLedger>,
        store: Arc<MemoryStore>,
        model: Arc<ScriptedModel>,
        generator: Arc<CourseGenerator>,
    }

    fn harness(credits: i32, reply: Reply) -> Harness {
        let user_id = Uuid::new_v4();
        build(
            user_id,
            MemoryLedger::with_balance(user_id, credits),
            MemoryStore::default(),
            reply,
        )
    }

    fn build(user_id: Uuid, ledger: MemoryLedger, store: MemoryStore, reply: Reply) -> Harness {
        let ledger = Arc::new(ledger);
        let store = Arc::new(store);
        let model = Arc::new(ScriptedModel::new(reply));
        let generator = Arc::new(CourseGenerator::new(
            ledger.clone(),
            store.clone(),
            model.clone(),
            Duration::from_secs(300),
        ));
        Harness {
            user_id,
            ledger,
            store,
            model,
            generator,
        }
    }

    // ── Workflow ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_zero_credits_is_refused_without_mutation() {
        let h = harness(0, Reply::Text(valid_course_text()));

        let result = h.generator.generate(h.user_id, &request()).await;

        assert!(matches!(result, Err(GenerationError::InsufficientCredits)));
        assert_eq!(h.ledger.credits(h.user_id), 0);
        assert_eq!(h.model.calls(), 0);
        assert!(h.store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_success_spends_one_credit_and_stores_one_course() {
        let h = harness(3, Reply::Text(valid_course_text()));

        let course = h.generator.generate(h.user_id, &request()).await.unwrap();

        assert_eq!(h.ledger.credits(h.user_id), 2);
        let rows = h.store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, h.user_id);
        assert_eq!(course.title, "Rust for Beginners");
        assert_eq!(course.language, "Português");
        assert_eq!(course.assessment_quiz.0.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_refunds() {
        let h = harness(1, Reply::Text("I cannot help with that.".to_string()));

        let result = h.generator.generate(h.user_id, &request()).await;

        assert!(matches!(result, Err(GenerationError::MalformedResponse(_))));
        assert_eq!(h.ledger.credits(h.user_id), 1);
        assert!(h.store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_structure_refunds() {
        let text = r#"{"title": "Rust", "assessment_quiz": [{"text": "Q", "alternatives": [
            {"text": "a", "is_correct": true}, {"text": "b", "is_correct": true},
            {"text": "c", "is_correct": false}, {"text": "d", "is_correct": false}]}]}"#;
        let h = harness(1, Reply::Text(text.to_string()));

        let result = h.generator.generate(h.user_id, &request()).await;

        assert!(matches!(result, Err(GenerationError::InvalidStructure(_))));
        assert_eq!(h.ledger.credits(h.user_id), 1);
        assert!(h.store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_missing_title_refunds() {
        let h = harness(2, Reply::Text(r#"{"subtitle": "untitled"}"#.to_string()));

        let result = h.generator.generate(h.user_id, &request()).await;

        assert!(matches!(
            result,
            Err(GenerationError::InvalidStructure(ValidationError::MissingTitle))
        ));
        assert_eq!(h.ledger.credits(h.user_id), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_refunds() {
        let h = harness(1, Reply::Hang);

        let result = h.generator.generate(h.user_id, &request()).await;

        assert!(matches!(result, Err(GenerationError::Timeout { secs: 300 })));
        assert_eq!(h.ledger.credits(h.user_id), 1);
        assert!(h.store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_model_error_refunds() {
        let h = harness(1, Reply::Fail);

        let result = h.generator.generate(h.user_id, &request()).await;

        assert!(matches!(result, Err(GenerationError::Model(_))));
        assert_eq!(h.ledger.credits(h.user_id), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_refunds_best_effort() {
        let user_id = Uuid::new_v4();
        let h = build(
            user_id,
            MemoryLedger::with_balance(user_id, 1),
            MemoryStore::failing(),
            Reply::Text(valid_course_text()),
        );

        let result = h.generator.generate(user_id, &request()).await;

        assert!(matches!(result, Err(GenerationError::Persistence(_))));
        assert_eq!(h.ledger.credits(user_id), 1);
    }

    #[tokio::test]
    async fn test_failed_refund_still_reports_persistence_failure() {
        let user_id = Uuid::new_v4();
        let h = build(
            user_id,
            MemoryLedger::failing_refunds(user_id, 1),
            MemoryStore::failing(),
            Reply::Text(valid_course_text()),
        );

        let result = h.generator.generate(user_id, &request()).await;

        assert!(matches!(result, Err(GenerationError::Persistence(_))));
        // The accepted loss window: reservation stands, no course exists.
        assert_eq!(h.ledger.credits(user_id), 0);
        assert!(h.store.rows().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_generations_with_one_credit() {
        let h = harness(1, Reply::Text(valid_course_text()));

        let (a, b) = tokio::join!(
            h.generator.generate_detached(h.user_id, request()),
            h.generator.generate_detached(h.user_id, request()),
        );

        let outcomes = [a, b];
        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        let refused = outcomes
            .iter()
            .filter(|r| matches!(r, Err(GenerationError::InsufficientCredits)))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(refused, 1);
        assert_eq!(h.ledger.credits(h.user_id), 0);
        assert_eq!(h.store.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_cover_image_disabled_clears_wallpaper() {
        let h = harness(1, Reply::Text(valid_course_text()));
        let mut req = request();
        req.generate_cover_image = false;

        let course = h.generator.generate(h.user_id, &req).await.unwrap();
        assert!(course.wallpaper.is_empty());
    }

    #[tokio::test]
    async fn test_null_wallpaper_without_cover_is_stored() {
        let text = r#"{"title": "Rust", "wallpaper": null, "subtitle": null}"#;
        let h = harness(1, Reply::Text(text.to_string()));
        let mut req = request();
        req.generate_cover_image = false;

        let course = h.generator.generate(h.user_id, &req).await.unwrap();
        assert!(course.wallpaper.is_empty());
        assert_eq!(h.ledger.credits(h.user_id), 0);
        assert_eq!(h.store.rows().len(), 1);
    }

    // ── Prompt / request ────────────────────────────────────────────────────

    #[test]
    fn test_request_defaults() {
        let req = request();
        assert_eq!(req.language, "Português");
        assert_eq!(req.depth_level, "Intermediário");
        assert_eq!(req.voice_tone, "Formal");
        assert!(req.generate_cover_image);
    }

    #[test]
    fn test_prompt_fills_every_placeholder() {
        let mut req = request();
        req.language = "English".to_string();
        req.generate_cover_image = false;

        let prompt = build_course_prompt(&req);
        assert!(prompt.contains("Topic: Rust for Beginners"));
        assert!(prompt.contains("in English"));
        assert!(prompt.contains("Generate cover image: no"));
        for placeholder in [
            "{topic}",
            "{language}",
            "{depth_level}",
            "{voice_tone}",
            "{cover_image}",
        ] {
            assert!(!prompt.contains(placeholder), "{placeholder} left unfilled");
        }
    }

    #[test]
    fn test_placeholder_text_in_topic_is_kept_literally() {
        let mut req = request();
        req.topic = "Templates with {language} and {voice_tone}".to_string();
        req.language = "English".to_string();

        let prompt = build_course_prompt(&req);
        assert!(prompt.contains("Topic: Templates with {language} and {voice_tone}"));
        assert!(prompt.contains("in English"));
    }

    #[test]
    fn test_unknown_braces_are_left_alone() {
        let filled = fill_placeholders(r#"{"a": "{x}", "b": {y}}"#, &[("x", "1")]);
        assert_eq!(filled, r#"{"a": "1", "b": {y}}"#);
    }
}
