use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingested unit of guide text — in practice, one PDF page.
/// Immutable after creation; re-ingestion clears and rewrites the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideSection {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub page_number: Option<i64>,
    pub category: Option<String>,
    pub source_guide: String,
}

/// Insert shape for a section before the database assigns an id.
#[derive(Debug, Clone)]
pub struct NewSection {
    pub title: String,
    pub content: String,
    pub page_number: Option<i64>,
    pub category: Option<String>,
    pub source_guide: String,
}

/// A section scored against a topic. Produced fresh per query, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSection {
    pub score: i64,
    pub title: String,
    pub content: String,
    pub page: Option<i64>,
}

/// One multiple-choice question. Invariant: `options` has exactly four
/// entries and `correct_answer` indexes one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub id: usize,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub explanation: String,
}

/// A full generated test. The repair pipeline guarantees `questions`
/// holds exactly the configured count regardless of what the model sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPayload {
    pub topic: String,
    pub theory: String,
    pub questions: Vec<QuizItem>,
}

/// Combined explanation + optional single quiz question.
#[derive(Debug, Clone, Serialize)]
pub struct Lesson {
    pub explanation: String,
    pub quiz: Option<QuizItem>,
}

#[derive(Debug, Clone)]
pub struct IngestManifest {
    pub guide_hash: String,
    pub created_at: DateTime<Utc>,
    pub section_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicRequest {
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckTestRequest {
    pub user_answers: Vec<usize>,
    pub test_data: TestPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub question_index: usize,
    pub question: String,
    pub options: Vec<String>,
    pub user_answer: usize,
    pub correct_answer: usize,
    pub is_correct: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub results: Vec<AnswerResult>,
    pub score: i64,
    pub correct_count: usize,
    pub total_questions: usize,
}
