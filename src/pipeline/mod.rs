//! Request orchestration.
//!
//! One request runs strictly in this order: resolve the session, store the
//! message, analyse, store the analysis, start the teacher, then stream the
//! teacher output while buffering it, and store the buffered text once the
//! stream has ended cleanly.

pub mod relay;

use crate::agent::{CodeAnalyser, Teacher};
use crate::error::{Result, TutorError};
use crate::models::TeacherResponse;
use crate::store::SessionStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

/// An inbound tutoring request.
#[derive(Debug, Clone)]
pub struct TutorRequest {
    /// Existing session to continue; a new one is created when absent.
    pub session_id: Option<String>,
    /// Owner recorded on a newly created session.
    pub student_id: Option<i64>,
    pub code: String,
    pub question: String,
}

/// A started tutoring reply.
pub struct TutorReply {
    /// The resolved session id, for the caller to reuse.
    pub session_id: String,
    pub message_id: i64,
    /// Teacher text in delivery order. Ends early with an error item if
    /// the teacher stream breaks.
    pub body: ReceiverStream<Result<String>>,
    /// Completes once the response has been persisted or abandoned.
    /// Errors are already logged and pushed into `body`.
    pub delivery: JoinHandle<Result<TeacherResponse>>,
}

/// Sequences the analyser and teacher stages for each request.
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    analyser: CodeAnalyser,
    teacher: Teacher,
    channel_capacity: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        analyser: CodeAnalyser,
        teacher: Teacher,
        channel_capacity: usize,
    ) -> Self {
        Self {
            store,
            analyser,
            teacher,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run the pipeline for one request.
    ///
    /// Returns once the teacher stream has started. Any failure before
    /// that point is returned here; earlier writes stay committed.
    pub async fn handle_request(&self, request: TutorRequest) -> Result<TutorReply> {
        let session_id = self
            .resolve_session(request.session_id.as_deref(), request.student_id)
            .await?;

        let message = self
            .store
            .create_message(&session_id, &request.code, &request.question)
            .await?;
        info!("Session {}: stored message {}", session_id, message.id);

        let analysis = self
            .analyser
            .analyze(&session_id, &request.code, &request.question)
            .await
            .map_err(|e| {
                warn!("Session {}: analysis of message {} failed: {}", session_id, message.id, e);
                e
            })?;

        let record = self.store.create_analysis(message.id, &analysis).await?;
        info!(
            "Session {}: stored analysis {} for message {}",
            session_id, record.id, message.id
        );

        let chunks = self
            .teacher
            .teach(&session_id, &request.code, &request.question, &analysis)
            .await
            .map_err(|e| {
                warn!("Session {}: teacher stage failed to start: {}", session_id, e);
                e
            })?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let store = Arc::clone(&self.store);
        let message_id = message.id;
        let delivery_session = session_id.clone();

        let delivery = tokio::spawn(async move {
            let result = deliver(chunks, tx, store, message_id).await;
            match &result {
                Ok(response) => info!(
                    "Session {}: stored response {} for message {} ({} bytes)",
                    delivery_session,
                    response.id,
                    message_id,
                    response.response.len()
                ),
                Err(TutorError::StreamInterrupted(reason)) => warn!(
                    "Session {}: response for message {} not stored: {}",
                    delivery_session, message_id, reason
                ),
                Err(e) => error!(
                    "Session {}: failed to store response for message {}: {}",
                    delivery_session, message_id, e
                ),
            }
            result
        });

        Ok(TutorReply {
            session_id,
            message_id,
            body: ReceiverStream::new(rx),
            delivery,
        })
    }

    async fn resolve_session(
        &self,
        session_id: Option<&str>,
        student_id: Option<i64>,
    ) -> Result<String> {
        match session_id {
            Some(id) => Ok(self.store.get_session(id).await?.id),
            None => {
                let session = self.store.create_session(student_id).await?;
                info!("Created session {}", session.id);
                Ok(session.id)
            }
        }
    }
}

/// Stream the teacher output, then persist exactly what was delivered.
///
/// The sender is held until the write has finished, so a client that has
/// read the whole body sees the end only after the response is stored. A
/// failed write ends the body with an error item.
async fn deliver(
    chunks: crate::llm::TextStream,
    tx: mpsc::Sender<Result<String>>,
    store: Arc<dyn SessionStore>,
    message_id: i64,
) -> Result<TeacherResponse> {
    let text = relay::forward(chunks, &tx).await?;
    let response = store.create_response(message_id, &text).await;
    if let Err(ref e) = response {
        // Abort the body so the client does not see a clean end.
        let _ = tx
            .send(Err(TutorError::Store(format!("response not stored: {}", e))))
            .await;
    }
    drop(tx);
    response
}
