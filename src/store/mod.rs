#[cfg(test)]
mod memory;
mod sqlite;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A question as the orchestrator sees it: a read-only snapshot owned by the
/// store, loaded once per quiz start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub position: i64,
}

/// Input for creating a question; position is assigned by the store.
#[derive(Debug, Clone)]
pub struct QuestionInput {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

/// One raw answer event, appended to the response log.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub room_code: String,
    pub question_id: i64,
    pub participant_name: String,
    pub answer_index: i64,
    pub is_correct: bool,
    pub time_ms: u64,
}

/// Persistent storage consumed by the orchestrator and the HTTP endpoints.
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn room_exists(&self, code: &str) -> Result<bool>;

    async fn create_room(&self, code: &str) -> Result<()>;

    /// Questions for a room, stable-sorted by position.
    async fn list_questions(&self, code: &str) -> Result<Vec<Question>>;

    /// Appends a question at the next position. Returns the question id.
    async fn add_question(&self, code: &str, question: QuestionInput) -> Result<i64>;

    async fn record_response(&self, response: ResponseRecord) -> Result<()>;
}
