use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Question, QuestionInput, QuizStore, ResponseRecord};
use crate::error::Result;

/// In-memory store for unit tests: same contract as the SQLite store, plus
/// direct access to the recorded responses.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rooms: HashSet<String>,
    questions: HashMap<String, Vec<Question>>,
    responses: Vec<ResponseRecord>,
    next_question_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub async fn responses(&self) -> Vec<ResponseRecord> {
        self.inner.read().await.responses.clone()
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn room_exists(&self, code: &str) -> Result<bool> {
        Ok(self.inner.read().await.rooms.contains(code))
    }

    async fn create_room(&self, code: &str) -> Result<()> {
        self.inner.write().await.rooms.insert(code.to_string());
        Ok(())
    }

    async fn list_questions(&self, code: &str) -> Result<Vec<Question>> {
        let inner = self.inner.read().await;
        let mut questions = inner.questions.get(code).cloned().unwrap_or_default();
        questions.sort_by_key(|question| question.position);
        Ok(questions)
    }

    async fn add_question(&self, code: &str, question: QuestionInput) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.next_question_id += 1;
        let id = inner.next_question_id;
        let room_questions = inner.questions.entry(code.to_string()).or_default();
        let position = room_questions.len() as i64 + 1;
        room_questions.push(Question {
            id,
            text: question.text,
            options: question.options,
            correct_index: question.correct_index,
            position,
        });
        Ok(id)
    }

    async fn record_response(&self, response: ResponseRecord) -> Result<()> {
        self.inner.write().await.responses.push(response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::new();
        assert!(!store.room_exists("AB12").await.unwrap());
        store.create_room("AB12").await.unwrap();
        assert!(store.room_exists("AB12").await.unwrap());

        let id = store
            .add_question(
                "AB12",
                QuestionInput {
                    text: "2 + 2?".to_string(),
                    options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
                    correct_index: 1,
                },
            )
            .await
            .unwrap();

        let questions = store.list_questions("AB12").await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, id);
        assert_eq!(questions[0].position, 1);
    }
}
