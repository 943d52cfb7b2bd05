use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::db::Database;
use crate::gigachat::GigaChatClient;
use crate::models::{
    AnswerResult, CheckTestRequest, Lesson, RankedSection, TestPayload, TestReport,
};
use crate::prompts::{self, QuestionKind};
use crate::quality;
use crate::ranking::{self, SynonymMap};
use crate::repair;
use crate::synthesis;

const LESSON_TOP_K: usize = 3;
const TEST_TOP_K: usize = 5;
const BATCH_MAX_ATTEMPTS: usize = 2;

/// Orchestrates one request end to end: rank sections, build a prompt,
/// call the model, repair the reply. Every public method upholds the
/// contract that malformed model output never escapes: the worst case is
/// synthesized generic content, not an error.
#[derive(Clone)]
pub struct Trainer {
    config: AppConfig,
    db: Database,
    llm: GigaChatClient,
    synonyms: Arc<SynonymMap>,
}

impl Trainer {
    pub fn new(
        config: AppConfig,
        db: Database,
        llm: GigaChatClient,
        synonyms: SynonymMap,
    ) -> Self {
        Self {
            config,
            db,
            llm,
            synonyms: Arc::new(synonyms),
        }
    }

    pub async fn relevant_sections(
        &self,
        topic: &str,
        top_k: usize,
    ) -> Result<Vec<RankedSection>> {
        let sections = self.db.get_sections(self.config.section_scan_limit).await?;
        tracing::info!(topic, scanned = sections.len(), "searching guide sections");
        Ok(ranking::rank(topic, &sections, &self.synonyms, top_k))
    }

    /// Theory-only explanation. `None` means the guides do not cover the
    /// topic at all, which the HTTP layer reports as a normal response.
    pub async fn learn_topic(&self, topic: &str) -> Result<Option<String>> {
        let ranked = self.relevant_sections(topic, TEST_TOP_K).await?;
        if ranked.is_empty() {
            return Ok(None);
        }

        let prompt = prompts::explanation_prompt(topic, &ranked);
        let explanation = match self.llm.chat(&prompt).await {
            Ok(raw) => {
                let text = crate::extract::strip_code_fence(&raw);
                if quality::is_low_quality_theory(&text) || !quality::is_grounded(&text, &ranked)
                {
                    tracing::warn!(topic, "explanation failed quality gate, synthesizing");
                    synthesis::fallback_theory(topic, &ranked)
                } else {
                    text
                }
            }
            Err(err) => {
                tracing::error!(topic, error = %err, "explanation generation failed");
                synthesis::fallback_theory(topic, &ranked)
            }
        };

        tracing::info!(topic, chars = explanation.chars().count(), "explanation ready");
        Ok(Some(explanation))
    }

    /// Combined explanation + one quiz question.
    pub async fn generate_lesson(&self, topic: &str) -> Result<Option<Lesson>> {
        let ranked = self.relevant_sections(topic, LESSON_TOP_K).await?;
        if ranked.is_empty() {
            return Ok(None);
        }

        let prompt = prompts::lesson_prompt(topic, &ranked);
        let (explanation, quiz) = match self.llm.chat(&prompt).await {
            Ok(raw) => repair::repair_lesson(&raw, topic, &ranked),
            Err(err) => {
                tracing::error!(topic, error = %err, "lesson generation failed");
                (
                    synthesis::fallback_theory(topic, &ranked),
                    Some(synthesis::fallback_quiz(topic, &ranked)),
                )
            }
        };

        Ok(Some(Lesson { explanation, quiz }))
    }

    /// Full test with exactly `question_count` questions. `None` means
    /// no relevant guide content.
    pub async fn generate_full_test(&self, topic: &str) -> Result<Option<TestPayload>> {
        let ranked = self.relevant_sections(topic, TEST_TOP_K).await?;
        if ranked.is_empty() {
            return Ok(None);
        }

        let count = self.config.question_count;
        let prompt = prompts::full_test_prompt(topic, &ranked, count);

        let parsed = match self.llm.chat(&prompt).await {
            Ok(raw) => repair::repair_full_test(&raw, topic, &ranked),
            Err(err) => {
                tracing::error!(topic, error = %err, "full test generation failed");
                None
            }
        };

        let payload = match parsed {
            // Extraction failed (or the call itself did): synthesize the
            // whole payload without burning further model calls.
            None => synthesis::synthesize_full_test(topic, &ranked, count),
            Some((theory, mut questions)) => {
                if questions.len() < count {
                    tracing::warn!(
                        topic,
                        valid = questions.len(),
                        "too few valid questions, requesting top-up batches"
                    );
                    for kind in [QuestionKind::Understanding, QuestionKind::Application] {
                        let missing = count.saturating_sub(questions.len());
                        if missing == 0 {
                            break;
                        }
                        let batch = self
                            .question_batch(topic, &theory, &ranked, kind, missing)
                            .await;
                        questions.extend(batch);
                    }
                }
                repair::finalize_test(topic, theory, questions, &ranked, count)
            }
        };

        tracing::info!(topic, questions = payload.questions.len(), "full test ready");
        Ok(Some(payload))
    }

    /// Batch question generation, the one place that retries the model:
    /// at most `BATCH_MAX_ATTEMPTS` calls, then whatever survived.
    async fn question_batch(
        &self,
        topic: &str,
        theory: &str,
        ranked: &[RankedSection],
        kind: QuestionKind,
        count: usize,
    ) -> Vec<crate::models::QuizItem> {
        let prompt = prompts::question_batch_prompt(topic, theory, kind, count);

        for attempt in 1..=BATCH_MAX_ATTEMPTS {
            match self.llm.chat(&prompt).await {
                Ok(raw) => {
                    let mut batch = repair::parse_question_batch(&raw, ranked);
                    if !batch.is_empty() {
                        batch.truncate(count);
                        return batch;
                    }
                    tracing::warn!(topic, kind = kind.label(), attempt, "empty question batch");
                }
                Err(err) => {
                    tracing::warn!(
                        topic,
                        kind = kind.label(),
                        attempt,
                        error = %err,
                        "question batch call failed"
                    );
                }
            }
        }

        vec![]
    }
}

/// Score submitted answers against a generated test. Pure function; the
/// HTTP layer rejects empty inputs before this runs.
pub fn score_test(request: &CheckTestRequest) -> TestReport {
    let questions = &request.test_data.questions;
    let mut results = Vec::with_capacity(questions.len());
    let mut correct_count = 0;

    for (index, (user_answer, question)) in request
        .user_answers
        .iter()
        .zip(questions.iter())
        .enumerate()
    {
        let is_correct = *user_answer == question.correct_answer;
        if is_correct {
            correct_count += 1;
        }

        results.push(AnswerResult {
            question_index: index,
            question: question.question.clone(),
            options: question.options.clone(),
            user_answer: *user_answer,
            correct_answer: question.correct_answer,
            is_correct,
            explanation: question.explanation.clone(),
        });
    }

    let total_questions = questions.len();
    let score = if total_questions == 0 {
        0
    } else {
        (correct_count as i64 * 100) / total_questions as i64
    };

    TestReport {
        results,
        score,
        correct_count,
        total_questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuizItem;

    fn quiz_item(id: usize, correct: usize) -> QuizItem {
        QuizItem {
            id,
            question: format!("Вопрос номер {id} по теме теста?"),
            options: vec![
                "Первый".to_string(),
                "Второй".to_string(),
                "Третий".to_string(),
                "Четвертый".to_string(),
            ],
            correct_answer: correct,
            explanation: "Пояснение.".to_string(),
        }
    }

    fn request(user_answers: Vec<usize>, correct: Vec<usize>) -> CheckTestRequest {
        CheckTestRequest {
            user_answers,
            test_data: TestPayload {
                topic: "мышь".to_string(),
                theory: "Теория.".to_string(),
                questions: correct
                    .into_iter()
                    .enumerate()
                    .map(|(id, answer)| quiz_item(id, answer))
                    .collect(),
            },
        }
    }

    #[test]
    fn three_of_five_scores_sixty() {
        let report = score_test(&request(
            vec![0, 1, 2, 0, 0],
            vec![0, 1, 2, 3, 3],
        ));

        assert_eq!(report.correct_count, 3);
        assert_eq!(report.total_questions, 5);
        assert_eq!(report.score, 60);
        assert_eq!(report.results.len(), 5);
        assert!(report.results[0].is_correct);
        assert!(!report.results[4].is_correct);
    }

    #[test]
    fn perfect_test_scores_hundred() {
        let report = score_test(&request(vec![1, 1], vec![1, 1]));
        assert_eq!(report.score, 100);
    }

    #[test]
    fn extra_answers_are_ignored() {
        let report = score_test(&request(vec![0, 0, 0], vec![0]));
        assert_eq!(report.total_questions, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.score, 100);
    }
}
