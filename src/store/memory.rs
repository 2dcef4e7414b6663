//! In-process session store.
//!
//! Keeps everything in memory behind one async mutex. Used for local
//! development and in tests; data is lost on restart.

use super::{new_session_id, SessionStore};
use crate::error::{Result, TutorError};
use crate::models::{Analysis, AnalysisResult, Message, Session, TeacherResponse};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<String, Session>,
    /// Indexed by `id - 1`.
    messages: Vec<Message>,
    analyses: HashMap<i64, Analysis>,
    responses: HashMap<i64, TeacherResponse>,
    next_analysis_id: i64,
    next_response_id: i64,
}

impl State {
    fn message(&self, id: i64) -> Option<&Message> {
        usize::try_from(id - 1)
            .ok()
            .and_then(|idx| self.messages.get(idx))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, student_id: Option<i64>) -> Result<Session> {
        let session = Session {
            id: new_session_id(),
            student_id,
            created_at: Utc::now(),
        };

        let mut state = self.state.lock().await;
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| TutorError::session_not_found(id))
    }

    async fn create_message(
        &self,
        session_id: &str,
        code: &str,
        question: &str,
    ) -> Result<Message> {
        let mut state = self.state.lock().await;
        if !state.sessions.contains_key(session_id) {
            return Err(TutorError::session_not_found(session_id));
        }

        let message = Message {
            id: state.messages.len() as i64 + 1,
            session_id: session_id.to_string(),
            code: code.to_string(),
            question: question.to_string(),
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn create_analysis(
        &self,
        message_id: i64,
        analysis: &AnalysisResult,
    ) -> Result<Analysis> {
        let mut state = self.state.lock().await;
        if state.message(message_id).is_none() {
            return Err(TutorError::message_not_found(message_id));
        }
        if state.analyses.contains_key(&message_id) {
            return Err(TutorError::Store(format!(
                "message {} already has an analysis",
                message_id
            )));
        }

        state.next_analysis_id += 1;
        let record = Analysis {
            id: state.next_analysis_id,
            message_id,
            analysis: analysis.clone(),
            created_at: Utc::now(),
        };
        state.analyses.insert(message_id, record.clone());
        Ok(record)
    }

    async fn create_response(&self, message_id: i64, response: &str) -> Result<TeacherResponse> {
        let mut state = self.state.lock().await;
        if state.message(message_id).is_none() {
            return Err(TutorError::message_not_found(message_id));
        }
        if state.responses.contains_key(&message_id) {
            return Err(TutorError::Store(format!(
                "message {} already has a response",
                message_id
            )));
        }

        state.next_response_id += 1;
        let record = TeacherResponse {
            id: state.next_response_id,
            message_id,
            response: response.to_string(),
            created_at: Utc::now(),
        };
        state.responses.insert(message_id, record.clone());
        Ok(record)
    }

    async fn get_message(&self, id: i64) -> Result<Message> {
        let state = self.state.lock().await;
        state
            .message(id)
            .cloned()
            .ok_or_else(|| TutorError::message_not_found(id))
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn get_analysis(&self, message_id: i64) -> Result<Option<Analysis>> {
        let state = self.state.lock().await;
        Ok(state.analyses.get(&message_id).cloned())
    }

    async fn get_response(&self, message_id: i64) -> Result<Option<TeacherResponse>> {
        let state = self.state.lock().await;
        Ok(state.responses.get(&message_id).cloned())
    }
}
