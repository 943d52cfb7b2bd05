use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use askama::Template;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{CheckTestRequest, TopicRequest};
use crate::prompts::truncate_chars;
use crate::ranking::{self, SynonymMap};
use crate::trainer::{score_test, Trainer};

/// Quick-pick topics rendered on the index page.
const POPULAR_TOPICS: &[&str] = &[
    "компьютер",
    "интернет",
    "безопасность",
    "клавиатура",
    "мышь",
    "программы",
    "файлы",
    "папки",
    "электронная почта",
    "социальные сети",
    "поиск информации",
    "онлайн-покупки",
    "банковские карты",
    "пароли",
    "антивирус",
    "Wi-Fi",
    "браузер",
    "текстовый редактор",
    "таблицы",
];

#[derive(Clone)]
struct AppState {
    config: AppConfig,
    db: Database,
    /// `None` when GigaChat credentials are missing; the generation
    /// endpoints then answer 503 while the rest of the service works.
    trainer: Option<Trainer>,
    synonyms: Arc<SynonymMap>,
}

impl AppState {
    fn require_trainer(&self) -> Result<&Trainer, ApiError> {
        self.trainer
            .as_ref()
            .ok_or_else(|| ApiError::unavailable("GigaChat недоступен"))
    }
}

pub async fn run_server(
    config: AppConfig,
    db: Database,
    trainer: Option<Trainer>,
    synonyms: SynonymMap,
) -> Result<()> {
    let bind_addr = config.bind_addr.clone();

    let state = AppState {
        config,
        db,
        trainer,
        synonyms: Arc::new(synonyms),
    };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/api/learn-topic", post(learn_topic))
        .route("/api/generate-lesson", post(generate_lesson))
        .route("/api/generate-full-test", post(generate_full_test))
        .route("/api/check-full-test", post(check_full_test))
        .route("/api/status", get(service_status))
        .route("/api/debug-sections", get(debug_sections))
        .route("/api/debug-topic-search", get(debug_topic_search))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let template = IndexTemplate {
        available: state.trainer.is_some(),
        topics: POPULAR_TOPICS,
    };
    let body = template.render()?;
    Ok(Html(body))
}

async fn learn_topic(
    State(state): State<AppState>,
    Json(request): Json<TopicRequest>,
) -> Result<Json<Value>, ApiError> {
    let trainer = state.require_trainer()?;
    let topic = normalize_topic(&request.topic)?;

    match trainer.learn_topic(&topic).await? {
        Some(explanation) => Ok(Json(json!({
            "status": "success",
            "explanation": explanation,
        }))),
        None => Ok(not_covered(&topic)),
    }
}

async fn generate_lesson(
    State(state): State<AppState>,
    Json(request): Json<TopicRequest>,
) -> Result<Json<Value>, ApiError> {
    let trainer = state.require_trainer()?;
    let topic = normalize_topic(&request.topic)?;

    match trainer.generate_lesson(&topic).await? {
        Some(lesson) => Ok(Json(json!({
            "status": "success",
            "explanation": lesson.explanation,
            "quiz": lesson.quiz,
        }))),
        None => Ok(not_covered(&topic)),
    }
}

async fn generate_full_test(
    State(state): State<AppState>,
    Json(request): Json<TopicRequest>,
) -> Result<Json<Value>, ApiError> {
    let trainer = state.require_trainer()?;
    let topic = normalize_topic(&request.topic)?;

    match trainer.generate_full_test(&topic).await? {
        Some(payload) => Ok(Json(json!({
            "status": "success",
            "test_data": payload,
        }))),
        None => Ok(not_covered(&topic)),
    }
}

async fn check_full_test(
    Json(request): Json<CheckTestRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.user_answers.is_empty() || request.test_data.questions.is_empty() {
        return Err(ApiError::bad_request("Нет ответов для проверки"));
    }

    let report = score_test(&request);
    Ok(Json(json!({
        "status": "success",
        "results": report.results,
        "score": report.score,
        "correct_count": report.correct_count,
        "total_questions": report.total_questions,
    })))
}

async fn service_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sections_loaded = state.db.count_sections().await?;
    Ok(Json(json!({
        "status": "running",
        "gigachat_available": state.trainer.is_some(),
        "sections_loaded": sections_loaded,
    })))
}

async fn debug_sections(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sections = state.db.get_sections(10).await?;

    let previews: Vec<Value> = sections
        .iter()
        .map(|section| {
            json!({
                "id": section.id,
                "title": section.title,
                "content_preview": preview(&section.content, 200),
                "page": section.page_number,
                "category": section.category,
                "content_length": section.content.chars().count(),
            })
        })
        .collect();

    Ok(Json(json!({
        "status": "success",
        "sections_count": sections.len(),
        "sections": previews,
    })))
}

#[derive(Debug, Deserialize)]
struct DebugSearchQuery {
    topic: Option<String>,
}

async fn debug_topic_search(
    State(state): State<AppState>,
    Query(query): Query<DebugSearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let topic = query.topic.unwrap_or_else(|| "компьютер".to_string());

    let sections = state
        .db
        .get_sections(state.config.section_scan_limit)
        .await?;
    let ranked = ranking::rank(&topic, &sections, &state.synonyms, 5);

    let details: Vec<Value> = ranked
        .iter()
        .map(|section| {
            json!({
                "title": section.title,
                "score": section.score,
                "content_preview": preview(&section.content, 300),
                "content_length": section.content.chars().count(),
            })
        })
        .collect();

    Ok(Json(json!({
        "topic": topic,
        "total_sections": sections.len(),
        "relevant_sections": ranked.len(),
        "relevant_details": details,
    })))
}

fn normalize_topic(topic: &str) -> Result<String, ApiError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(ApiError::bad_request("Тема не может быть пустой"));
    }
    Ok(topic.to_string())
}

/// Non-error reply for a topic the guides do not cover.
fn not_covered(topic: &str) -> Json<Value> {
    Json(json!({
        "status": "error",
        "error": format!(
            "В руководстве нет информации по теме \"{topic}\". Попробуйте другую тему."
        ),
    }))
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        format!("{}...", truncate_chars(content, max_chars))
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    available: bool,
    topics: &'static [&'static str],
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    fn unavailable(message: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        // Full detail goes to the log; the caller gets a short message.
        tracing::error!(error = ?value, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Внутренняя ошибка сервиса".to_string(),
        }
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        tracing::error!(error = %value, "template rendering failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Внутренняя ошибка сервиса".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "status": "error", "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GigaChatConfig;
    use crate::gigachat::GigaChatClient;
    use crate::models::{NewSection, QuizItem, TestPayload};

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: std::env::temp_dir(),
            guide_dir: std::env::temp_dir(),
            guide_files: vec![],
            rebuild_on_start: false,
            question_count: 5,
            section_scan_limit: 50,
            synonyms_path: None,
            gigachat: GigaChatConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                auth_url: "http://127.0.0.1:9/oauth".to_string(),
                credentials: Some("dGVzdDp0ZXN0".to_string()),
                scope: "GIGACHAT_API_PERS".to_string(),
                model: "GigaChat".to_string(),
                verify_tls: false,
                timeout_secs: 1,
            },
        }
    }

    async fn state_with_trainer() -> AppState {
        let config = test_config();
        let db = Database::new_in_memory().await.expect("memory db");
        let llm = GigaChatClient::new(&config.gigachat).expect("client");
        let synonyms = SynonymMap::builtin();
        let trainer = Trainer::new(config.clone(), db.clone(), llm, synonyms.clone());

        AppState {
            config,
            db,
            trainer: Some(trainer),
            synonyms: Arc::new(synonyms),
        }
    }

    fn topic(text: &str) -> Json<TopicRequest> {
        Json(TopicRequest {
            topic: text.to_string(),
        })
    }

    #[tokio::test]
    async fn unknown_topic_is_reported_as_not_covered() {
        let state = state_with_trainer().await;

        let reply = learn_topic(State(state), topic("квантовая физика"))
            .await
            .expect("reply");
        assert_eq!(reply.0["status"], "error");
        assert!(reply.0["error"]
            .as_str()
            .expect("error text")
            .contains("нет информации"));
    }

    #[tokio::test]
    async fn full_test_without_sections_has_no_test_data() {
        let state = state_with_trainer().await;

        let reply = generate_full_test(State(state), topic("голография"))
            .await
            .expect("reply");
        assert_eq!(reply.0["status"], "error");
        assert!(reply.0.get("test_data").is_none());
    }

    #[tokio::test]
    async fn empty_topic_is_rejected() {
        let state = state_with_trainer().await;

        let err = learn_topic(State(state), topic("   ")).await.err().expect("err");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_trainer_returns_service_unavailable() {
        let mut state = state_with_trainer().await;
        state.trainer = None;

        let err = generate_full_test(State(state), topic("мышь"))
            .await
            .err()
            .expect("err");
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn check_full_test_reports_score() {
        let questions: Vec<QuizItem> = (0..5)
            .map(|id| QuizItem {
                id,
                question: format!("Вопрос номер {id} по теме безопасности?"),
                options: vec![
                    "Первый".to_string(),
                    "Второй".to_string(),
                    "Третий".to_string(),
                    "Четвертый".to_string(),
                ],
                correct_answer: 0,
                explanation: "Пояснение.".to_string(),
            })
            .collect();

        let request = CheckTestRequest {
            user_answers: vec![0, 0, 0, 1, 1],
            test_data: TestPayload {
                topic: "безопасность".to_string(),
                theory: "Теория.".to_string(),
                questions,
            },
        };

        let reply = check_full_test(Json(request)).await.expect("reply");
        assert_eq!(reply.0["status"], "success");
        assert_eq!(reply.0["score"], 60);
        assert_eq!(reply.0["correct_count"], 3);
        assert_eq!(reply.0["total_questions"], 5);
    }

    #[tokio::test]
    async fn status_reports_section_count() {
        let state = state_with_trainer().await;
        state
            .db
            .insert_sections(&[NewSection {
                title: "Страница 1".to_string(),
                content: "Компьютер обрабатывает информацию.".to_string(),
                page_number: Some(1),
                category: None,
                source_guide: "guide.pdf".to_string(),
            }])
            .await
            .expect("insert");

        let reply = service_status(State(state)).await.expect("reply");
        assert_eq!(reply.0["status"], "running");
        assert_eq!(reply.0["gigachat_available"], true);
        assert_eq!(reply.0["sections_loaded"], 1);
    }

    #[tokio::test]
    async fn debug_search_ranks_inserted_section() {
        let state = state_with_trainer().await;
        state
            .db
            .insert_sections(&[NewSection {
                title: "Страница 3".to_string(),
                content: "Компьютер - это универсальное устройство для работы.".to_string(),
                page_number: Some(3),
                category: None,
                source_guide: "guide.pdf".to_string(),
            }])
            .await
            .expect("insert");

        let reply = debug_topic_search(
            State(state),
            Query(DebugSearchQuery {
                topic: Some("компьютер".to_string()),
            }),
        )
        .await
        .expect("reply");

        assert_eq!(reply.0["relevant_sections"], 1);
        assert_eq!(reply.0["total_sections"], 1);
        assert!(reply.0["relevant_details"][0]["score"].as_i64().expect("score") > 0);
    }
}
