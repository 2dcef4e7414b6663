//! Ollama chat API backend.
//!
//! Talks to `POST {ollama_url}/api/chat`, either as a single JSON
//! response or as newline-delimited JSON chunks when streaming.

use super::{ConversationMemory, LlmProvider, LlmRequest, TextStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Connection and sampling settings for one Ollama model.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Chat messages remembered per session (0 disables memory).
    pub max_context_messages: usize,
    /// Sessions remembered at once; the least recently used is evicted.
    pub max_sessions: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 300,
            max_context_messages: 10,
            max_sessions: 1000,
        }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response, or one line of a streamed response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Chat model served by Ollama.
pub struct OllamaProvider {
    config: OllamaConfig,
    http_client: reqwest::Client,
    memory: Arc<ConversationMemory>,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        info!(
            "Initializing Ollama provider with model {} at {}",
            config.model_name, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let memory = Arc::new(ConversationMemory::new(
            config.max_context_messages,
            config.max_sessions,
        ));

        Ok(Self {
            config,
            http_client,
            memory,
        })
    }

    fn build_request(&self, request: &LlmRequest, stream: bool) -> OllamaChatRequest {
        let mut messages = self.memory.history(&request.session_id);
        messages.push(ChatMessage::user(request.prompt.clone()));

        OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages,
            stream,
            format: request.output_schema.clone(),
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        }
    }

    async fn send(&self, body: &OllamaChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.config.ollama_url);
        debug!(
            "Sending chat request with {} messages to {}",
            body.messages.len(),
            url
        );

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to Ollama at {}", self.config.ollama_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.config.model_name
    }

    async fn complete(&self, request: LlmRequest) -> Result<String> {
        let body = self.build_request(&request, false);
        let response = self.send(&body).await?;

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        if let Some(error) = chat_response.error {
            return Err(anyhow::anyhow!("Ollama returned an error: {}", error));
        }

        let content = chat_response
            .message
            .map(|m| m.content)
            .unwrap_or_default();

        Ok(content)
    }

    fn commit(&self, request: &LlmRequest, answer: &str) {
        self.memory
            .record(&request.session_id, &request.prompt, answer);
    }

    async fn complete_stream(&self, request: LlmRequest) -> Result<TextStream> {
        let body = self.build_request(&request, true);
        let response = self.send(&body).await?;

        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        let memory = Arc::clone(&self.memory);

        tokio::spawn(async move {
            if let Some(answer) = pump_ndjson(Box::pin(response.bytes_stream()), &tx).await {
                memory.record(&request.session_id, &request.prompt, &answer);
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// What to do after one NDJSON line.
enum Step {
    Continue,
    Done,
    Abort,
}

/// Decode a newline-delimited chat stream into `tx`.
///
/// Returns the full answer once the `done` line has been seen. Any
/// failure is pushed into `tx` and yields `None`.
async fn pump_ndjson<S, B, E>(mut stream: S, tx: &mpsc::Sender<Result<String>>) -> Option<String>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut answer = String::new();

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Err(anyhow::anyhow!("Ollama stream failed: {}", e)))
                    .await;
                return None;
            }
        };
        buffer.extend_from_slice(bytes.as_ref());

        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            match handle_line(&line, &mut answer, tx).await {
                Step::Continue => {}
                Step::Done => return Some(answer),
                Step::Abort => return None,
            }
        }
    }

    // The last line may arrive without a trailing newline
    if !buffer.is_empty() {
        match handle_line(&buffer, &mut answer, tx).await {
            Step::Continue => {}
            Step::Done => return Some(answer),
            Step::Abort => return None,
        }
    }

    warn!("Ollama stream closed before the final chunk");
    let _ = tx
        .send(Err(anyhow::anyhow!("Ollama stream ended before completion")))
        .await;
    None
}

async fn handle_line(line: &[u8], answer: &mut String, tx: &mpsc::Sender<Result<String>>) -> Step {
    match parse_stream_line(line) {
        Ok(None) => Step::Continue,
        Ok(Some(event)) => {
            if !event.content.is_empty() {
                answer.push_str(&event.content);
                if tx.send(Ok(event.content)).await.is_err() {
                    debug!("Stream receiver dropped, abandoning Ollama response");
                    return Step::Abort;
                }
            }
            if event.done {
                Step::Done
            } else {
                Step::Continue
            }
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            Step::Abort
        }
    }
}

/// One decoded line of a streamed chat response.
#[derive(Debug, PartialEq)]
struct StreamEvent {
    content: String,
    done: bool,
}

/// Decode a single NDJSON line. Blank lines yield `None`.
fn parse_stream_line(line: &[u8]) -> Result<Option<StreamEvent>> {
    let text = std::str::from_utf8(line).context("Ollama stream is not valid UTF-8")?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let chunk: OllamaChatResponse =
        serde_json::from_str(text).context("Failed to parse Ollama stream chunk")?;

    if let Some(error) = chunk.error {
        return Err(anyhow::anyhow!("Ollama returned an error: {}", error));
    }

    Ok(Some(StreamEvent {
        content: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}
