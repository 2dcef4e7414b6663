//! Session store.
//!
//! Persists sessions, messages, analyses and teacher responses. Every
//! operation is its own atomic unit; the pipeline never needs a
//! multi-statement transaction.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::models::{Analysis, AnalysisResult, Exchange, Message, Session, TeacherResponse};
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage backend used by the orchestrator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session with a freshly generated id.
    async fn create_session(&self, student_id: Option<i64>) -> Result<Session>;

    /// Fails with `NotFound` for an unknown id.
    async fn get_session(&self, id: &str) -> Result<Session>;

    /// Fails with `NotFound` if the session does not exist.
    async fn create_message(&self, session_id: &str, code: &str, question: &str)
        -> Result<Message>;

    /// Fails with `NotFound` if the message does not exist.
    async fn create_analysis(&self, message_id: i64, analysis: &AnalysisResult)
        -> Result<Analysis>;

    /// Fails with `NotFound` if the message does not exist.
    async fn create_response(&self, message_id: i64, response: &str) -> Result<TeacherResponse>;

    async fn get_message(&self, id: i64) -> Result<Message>;

    /// Messages of a session, oldest first.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    async fn get_analysis(&self, message_id: i64) -> Result<Option<Analysis>>;

    async fn get_response(&self, message_id: i64) -> Result<Option<TeacherResponse>>;

    /// One message with whatever analysis and response it has.
    async fn exchange(&self, message_id: i64) -> Result<Exchange> {
        let message = self.get_message(message_id).await?;
        self.complete_exchange(message).await
    }

    /// Every exchange of a session, oldest first.
    async fn history(&self, session_id: &str) -> Result<Vec<Exchange>> {
        self.get_session(session_id).await?;

        let mut exchanges = Vec::new();
        for message in self.list_messages(session_id).await? {
            exchanges.push(self.complete_exchange(message).await?);
        }
        Ok(exchanges)
    }

    async fn complete_exchange(&self, message: Message) -> Result<Exchange> {
        let analysis = self.get_analysis(message.id).await?;
        let response = self.get_response(message.id).await?;
        Ok(Exchange {
            message,
            analysis,
            response,
        })
    }
}

/// Generate an opaque session id.
pub(crate) fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
