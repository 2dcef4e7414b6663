//! Teacher stage.
//!
//! Streams Socratic guidance built on top of an accepted analysis. The
//! rule against revealing corrected code lives only in the prompt; this
//! stage does not inspect the generated text.

use crate::agent::prompt::render_teacher_prompt;
use crate::error::{Result, Stage, TutorError};
use crate::llm::{LlmProvider, LlmRequest, TextStream};
use crate::models::AnalysisResult;
use std::sync::Arc;
use tracing::debug;

pub struct Teacher {
    provider: Arc<dyn LlmProvider>,
}

impl Teacher {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Start the teacher call and return its output stream.
    pub async fn teach(
        &self,
        session_id: &str,
        code: &str,
        question: &str,
        analysis: &AnalysisResult,
    ) -> Result<TextStream> {
        let prompt = render_teacher_prompt(code, question, analysis);

        debug!(
            "Calling teacher model {} for session {}",
            self.provider.name(),
            session_id
        );

        self.provider
            .complete_stream(LlmRequest::new(session_id, prompt))
            .await
            .map_err(|e| TutorError::upstream(Stage::Teacher, format!("{:#}", e)))
    }
}
