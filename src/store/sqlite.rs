use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{Question, QuestionInput, QuizStore, ResponseRecord};
use crate::error::Result;

/// SQLite-backed store for rooms, questions, and the response log.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database file and applies the schema.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;

        tracing::info!(path = %path.display(), "SQLite store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rooms (\
             code TEXT PRIMARY KEY, \
             created_at INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS questions (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             room_code TEXT NOT NULL, \
             text TEXT NOT NULL, \
             options_json TEXT NOT NULL, \
             correct_index INTEGER NOT NULL, \
             position INTEGER NOT NULL, \
             FOREIGN KEY(room_code) REFERENCES rooms(code))",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS responses (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             room_code TEXT NOT NULL, \
             question_id INTEGER NOT NULL, \
             participant_name TEXT NOT NULL, \
             answer_index INTEGER NOT NULL, \
             is_correct INTEGER NOT NULL, \
             time_ms INTEGER NOT NULL, \
             created_at INTEGER NOT NULL, \
             FOREIGN KEY(room_code) REFERENCES rooms(code), \
             FOREIGN KEY(question_id) REFERENCES questions(id))",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl QuizStore for SqliteStore {
    async fn room_exists(&self, code: &str) -> Result<bool> {
        let row = sqlx::query("SELECT code FROM rooms WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create_room(&self, code: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO rooms (code, created_at) VALUES (?, ?)")
            .bind(code)
            .bind(now_unix_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_questions(&self, code: &str) -> Result<Vec<Question>> {
        let rows = sqlx::query(
            "SELECT id, text, options_json, correct_index, position \
             FROM questions WHERE room_code = ? ORDER BY position ASC",
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            let options_json: String = row.try_get("options_json")?;
            let options: Vec<String> = serde_json::from_str(&options_json)?;
            questions.push(Question {
                id: row.try_get("id")?,
                text: row.try_get("text")?,
                options,
                correct_index: row.try_get::<i64, _>("correct_index")? as usize,
                position: row.try_get("position")?,
            });
        }
        Ok(questions)
    }

    async fn add_question(&self, code: &str, question: QuestionInput) -> Result<i64> {
        let max_position: i64 =
            sqlx::query("SELECT COALESCE(MAX(position), 0) AS max_pos FROM questions WHERE room_code = ?")
                .bind(code)
                .fetch_one(&self.pool)
                .await?
                .try_get("max_pos")?;

        let options_json = serde_json::to_string(&question.options)?;
        let result = sqlx::query(
            "INSERT INTO questions (room_code, text, options_json, correct_index, position) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(code)
        .bind(&question.text)
        .bind(options_json)
        .bind(question.correct_index as i64)
        .bind(max_position + 1)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn record_response(&self, response: ResponseRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO responses \
             (room_code, question_id, participant_name, answer_index, is_correct, time_ms, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&response.room_code)
        .bind(response.question_id)
        .bind(&response.participant_name)
        .bind(response.answer_index)
        .bind(response.is_correct)
        .bind(response.time_ms as i64)
        .bind(now_unix_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(dir.path().join("quiz.db"))
            .await
            .unwrap();
        (store, dir)
    }

    fn sample_question(correct_index: usize) -> QuestionInput {
        QuestionInput {
            text: "What is the capital of France?".to_string(),
            options: vec![
                "Lyon".to_string(),
                "Paris".to_string(),
                "Nice".to_string(),
                "Lille".to_string(),
            ],
            correct_index,
        }
    }

    #[tokio::test]
    async fn test_room_lifecycle() {
        let (store, _dir) = temp_store().await;

        assert!(!store.room_exists("AB12").await.unwrap());
        store.create_room("AB12").await.unwrap();
        assert!(store.room_exists("AB12").await.unwrap());

        // Creating the same code twice is a no-op
        store.create_room("AB12").await.unwrap();
        assert!(store.room_exists("AB12").await.unwrap());
    }

    #[tokio::test]
    async fn test_questions_ordered_by_position() {
        let (store, _dir) = temp_store().await;
        store.create_room("AB12").await.unwrap();

        let first = store.add_question("AB12", sample_question(1)).await.unwrap();
        let second = store.add_question("AB12", sample_question(2)).await.unwrap();
        assert_ne!(first, second);

        let questions = store.list_questions("AB12").await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, first);
        assert_eq!(questions[0].position, 1);
        assert_eq!(questions[1].position, 2);
        assert_eq!(questions[0].options.len(), 4);
        assert_eq!(questions[0].correct_index, 1);
    }

    #[tokio::test]
    async fn test_questions_scoped_to_room() {
        let (store, _dir) = temp_store().await;
        store.create_room("AB12").await.unwrap();
        store.create_room("CD34").await.unwrap();
        store.add_question("AB12", sample_question(0)).await.unwrap();

        assert!(store.list_questions("CD34").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_response() {
        let (store, _dir) = temp_store().await;
        store.create_room("AB12").await.unwrap();
        let question_id = store.add_question("AB12", sample_question(1)).await.unwrap();

        store
            .record_response(ResponseRecord {
                room_code: "AB12".to_string(),
                question_id,
                participant_name: "Ana".to_string(),
                answer_index: 1,
                is_correct: true,
                time_ms: 5000,
            })
            .await
            .unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM responses")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .try_get("n")
            .unwrap();
        assert_eq!(count, 1);
    }
}
