//! LLM provider interface.
//!
//! Both pipeline stages talk to a model through [`LlmProvider`]; the
//! concrete backend is chosen at startup and passed in explicitly.

pub mod memory;
pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

pub use memory::ConversationMemory;
pub use ollama::{OllamaConfig, OllamaProvider};

/// Incremental model output. Ends when the model finishes or fails.
pub type TextStream = BoxStream<'static, Result<String>>;

/// One call to the model.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Key for the provider's conversational memory.
    pub session_id: String,
    /// Fully rendered prompt.
    pub prompt: String,
    /// JSON schema the output must follow, when structured output is wanted.
    pub output_schema: Option<Value>,
}

impl LlmRequest {
    pub fn new(session_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            prompt: prompt.into(),
            output_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// A hosted or local model the pipeline can call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run the prompt and return the whole answer.
    ///
    /// The turn is not remembered; call [`commit`](Self::commit) once the
    /// caller has accepted the answer.
    async fn complete(&self, request: LlmRequest) -> Result<String>;

    /// Add an accepted prompt/answer turn to the session's memory.
    fn commit(&self, _request: &LlmRequest, _answer: &str) {}

    /// Run the prompt and yield the answer as it is generated.
    ///
    /// The turn is remembered by the provider once the stream completes.
    /// Errors returned directly mean the call never started; errors inside
    /// the stream mean it broke part way.
    async fn complete_stream(&self, request: LlmRequest) -> Result<TextStream>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider for pipeline tests.

    use super::*;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What the next call should produce.
    pub(crate) enum Script {
        Text(String),
        Chunks(Vec<String>),
        /// Yield these chunks, then fail.
        BrokenChunks(Vec<String>, String),
        Fail(String),
    }

    #[derive(Default)]
    pub(crate) struct ScriptedProvider {
        scripts: Mutex<VecDeque<Script>>,
        calls: Mutex<Vec<LlmRequest>>,
        commits: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                calls: Mutex::new(Vec::new()),
                commits: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<LlmRequest> {
            self.calls.lock().unwrap().clone()
        }

        /// `(session_id, answer)` for every committed turn.
        pub(crate) fn commits(&self) -> Vec<(String, String)> {
            self.commits.lock().unwrap().clone()
        }

        fn next(&self, request: LlmRequest) -> Script {
            self.calls.lock().unwrap().push(request);
            self.scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Script::Fail("no script left".to_string()))
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: LlmRequest) -> Result<String> {
            match self.next(request) {
                Script::Text(text) => Ok(text),
                Script::Chunks(chunks) => Ok(chunks.concat()),
                Script::BrokenChunks(_, message) | Script::Fail(message) => {
                    Err(anyhow::anyhow!(message))
                }
            }
        }

        fn commit(&self, request: &LlmRequest, answer: &str) {
            self.commits
                .lock()
                .unwrap()
                .push((request.session_id.clone(), answer.to_string()));
        }

        async fn complete_stream(&self, request: LlmRequest) -> Result<TextStream> {
            match self.next(request) {
                Script::Text(text) => Ok(Box::pin(stream::iter(vec![Ok(text)]))),
                Script::Chunks(chunks) => {
                    Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
                }
                Script::BrokenChunks(chunks, message) => {
                    let items: Vec<Result<String>> = chunks
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(anyhow::anyhow!(message))))
                        .collect();
                    Ok(Box::pin(stream::iter(items)))
                }
                Script::Fail(message) => Err(anyhow::anyhow!(message)),
            }
        }
    }
}
