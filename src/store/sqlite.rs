//! SQLite session store.
//!
//! Four tables (sessions, messages, analyses, responses). Analyses and
//! responses reference their message by foreign key and are unique per
//! message. The analysis itself is stored as a JSON blob that was
//! validated before it was written.

use super::{new_session_id, SessionStore};
use crate::error::{Result, TutorError};
use crate::models::{Analysis, AnalysisResult, Message, Session, TeacherResponse};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    student_id INTEGER,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    code TEXT NOT NULL,
    question TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);

CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id INTEGER NOT NULL UNIQUE REFERENCES messages(id),
    analysis TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id INTEGER NOT NULL UNIQUE REFERENCES messages(id),
    response TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Session store backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening SQLite store at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Private in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| TutorError::Store("connection mutex poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| TutorError::Store(format!("store task failed: {}", e)))?
    }
}

fn message_exists(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |_| {
            Ok(())
        })
        .optional()?
        .is_some())
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        student_id: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        code: row.get(2)?,
        question: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<Analysis> {
    let json: String = row.get(2)?;
    let analysis: AnalysisResult = serde_json::from_str(&json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Analysis {
        id: row.get(0)?,
        message_id: row.get(1)?,
        analysis,
        created_at: row.get(3)?,
    })
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<TeacherResponse> {
    Ok(TeacherResponse {
        id: row.get(0)?,
        message_id: row.get(1)?,
        response: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, student_id: Option<i64>) -> Result<Session> {
        let session = Session {
            id: new_session_id(),
            student_id,
            created_at: Utc::now(),
        };

        let record = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, student_id, created_at) VALUES (?1, ?2, ?3)",
                params![record.id, record.student_id, record.created_at],
            )?;
            Ok(())
        })
        .await?;

        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, student_id, created_at FROM sessions WHERE id = ?1",
                params![id],
                session_from_row,
            )
            .optional()?
            .ok_or_else(|| TutorError::session_not_found(id))
        })
        .await
    }

    async fn create_message(
        &self,
        session_id: &str,
        code: &str,
        question: &str,
    ) -> Result<Message> {
        let mut message = Message {
            id: 0,
            session_id: session_id.to_string(),
            code: code.to_string(),
            question: question.to_string(),
            created_at: Utc::now(),
        };

        self.with_conn(move |conn| {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sessions WHERE id = ?1",
                    params![message.session_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(TutorError::session_not_found(message.session_id));
            }

            conn.execute(
                "INSERT INTO messages (session_id, code, question, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    message.session_id,
                    message.code,
                    message.question,
                    message.created_at
                ],
            )?;
            message.id = conn.last_insert_rowid();
            Ok(message)
        })
        .await
    }

    async fn create_analysis(
        &self,
        message_id: i64,
        analysis: &AnalysisResult,
    ) -> Result<Analysis> {
        let json = serde_json::to_string(analysis)
            .map_err(|e| TutorError::Store(format!("failed to encode analysis: {}", e)))?;
        let mut record = Analysis {
            id: 0,
            message_id,
            analysis: analysis.clone(),
            created_at: Utc::now(),
        };

        self.with_conn(move |conn| {
            if !message_exists(conn, message_id)? {
                return Err(TutorError::message_not_found(message_id));
            }
            conn.execute(
                "INSERT INTO analyses (message_id, analysis, created_at) VALUES (?1, ?2, ?3)",
                params![message_id, json, record.created_at],
            )?;
            record.id = conn.last_insert_rowid();
            Ok(record)
        })
        .await
    }

    async fn create_response(&self, message_id: i64, response: &str) -> Result<TeacherResponse> {
        let mut record = TeacherResponse {
            id: 0,
            message_id,
            response: response.to_string(),
            created_at: Utc::now(),
        };

        self.with_conn(move |conn| {
            if !message_exists(conn, message_id)? {
                return Err(TutorError::message_not_found(message_id));
            }
            conn.execute(
                "INSERT INTO responses (message_id, response, created_at) VALUES (?1, ?2, ?3)",
                params![message_id, record.response, record.created_at],
            )?;
            record.id = conn.last_insert_rowid();
            Ok(record)
        })
        .await
    }

    async fn get_message(&self, id: i64) -> Result<Message> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, session_id, code, question, created_at FROM messages WHERE id = ?1",
                params![id],
                message_from_row,
            )
            .optional()?
            .ok_or_else(|| TutorError::message_not_found(id))
        })
        .await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, code, question, created_at
                 FROM messages WHERE session_id = ?1 ORDER BY id",
            )?;
            let messages = stmt
                .query_map(params![session_id], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn get_analysis(&self, message_id: i64) -> Result<Option<Analysis>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, message_id, analysis, created_at
                     FROM analyses WHERE message_id = ?1",
                    params![message_id],
                    analysis_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn get_response(&self, message_id: i64) -> Result<Option<TeacherResponse>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, message_id, response, created_at
                     FROM responses WHERE message_id = ?1",
                    params![message_id],
                    response_from_row,
                )
                .optional()?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_analysis;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_session(Some(42)).await.unwrap();
        let again = store.create_session(None).await.unwrap();
        assert_ne!(created.id, again.id);

        let fetched = store.get_session(&created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.student_id, Some(42));

        assert!(matches!(
            store.get_session("does-not-exist").await,
            Err(TutorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_message_chain() {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.create_session(None).await.unwrap();
        let message = store
            .create_message(&session.id, "def f(x): return x+1", "why?")
            .await
            .unwrap();
        assert!(message.id > 0);

        let analysis = store
            .create_analysis(message.id, &sample_analysis())
            .await
            .unwrap();
        assert_eq!(analysis.message_id, message.id);

        store
            .create_response(message.id, "What do you expect?")
            .await
            .unwrap();

        let stored = store.get_analysis(message.id).await.unwrap().unwrap();
        assert_eq!(stored.analysis, sample_analysis());
        let response = store.get_response(message.id).await.unwrap().unwrap();
        assert_eq!(response.response, "What do you expect?");

        let fetched = store.get_message(message.id).await.unwrap();
        assert_eq!(fetched.code, "def f(x): return x+1");
        assert_eq!(fetched.session_id, session.id);
    }

    #[tokio::test]
    async fn test_missing_parents() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.create_message("nope", "c", "q").await,
            Err(TutorError::NotFound { .. })
        ));
        assert!(matches!(
            store.create_analysis(99, &sample_analysis()).await,
            Err(TutorError::NotFound { .. })
        ));
        assert!(matches!(
            store.create_response(99, "text").await,
            Err(TutorError::NotFound { .. })
        ));
        assert!(store.get_analysis(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_analysis_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.create_session(None).await.unwrap();
        let message = store.create_message(&session.id, "c", "q").await.unwrap();

        store
            .create_analysis(message.id, &sample_analysis())
            .await
            .unwrap();
        assert!(matches!(
            store.create_analysis(message.id, &sample_analysis()).await,
            Err(TutorError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tutor.db");

        let session_id = {
            let store = SqliteStore::open(&path).unwrap();
            let session = store.create_session(None).await.unwrap();
            store.create_message(&session.id, "x = 1", "q1").await.unwrap();
            store.create_message(&session.id, "x = 2", "q2").await.unwrap();
            session.id
        };

        let store = SqliteStore::open(&path).unwrap();
        let history = store.history(&session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message.question, "q1");
        assert_eq!(history[1].message.code, "x = 2");
    }
}
