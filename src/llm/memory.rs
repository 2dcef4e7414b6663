//! Per-session conversational memory.
//!
//! Keeps the recent user/assistant turns for each session id so that a
//! follow-up request in the same session is answered in context. Only the
//! `max_sessions` most recently active sessions are kept.

use super::ollama::ChatMessage;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct SessionTurns {
    messages: Vec<ChatMessage>,
    /// Tick of the last write, for eviction.
    last_used: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<String, SessionTurns>,
    tick: u64,
}

/// Sliding-window chat history keyed by session id.
#[derive(Debug)]
pub struct ConversationMemory {
    /// Max messages kept per session.
    max_messages: usize,
    max_sessions: usize,
    sessions: Mutex<Sessions>,
}

impl ConversationMemory {
    pub fn new(max_messages: usize, max_sessions: usize) -> Self {
        Self {
            max_messages,
            max_sessions: max_sessions.max(1),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Prior messages for a session, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .by_id
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Append one completed turn and prune the oldest messages.
    pub fn record(&self, session_id: &str, prompt: &str, answer: &str) {
        if self.max_messages == 0 {
            return;
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if !sessions.by_id.contains_key(session_id) && sessions.by_id.len() >= self.max_sessions {
            evict_least_recent(&mut sessions.by_id);
        }

        sessions.tick += 1;
        let tick = sessions.tick;
        let turns = sessions.by_id.entry(session_id.to_string()).or_default();
        turns.last_used = tick;
        turns.messages.push(ChatMessage::user(prompt));
        turns.messages.push(ChatMessage::assistant(answer));

        if turns.messages.len() > self.max_messages {
            let remove_count = turns.messages.len() - self.max_messages;
            turns.messages.drain(..remove_count);
            debug!(
                "Pruned {} old messages for session {}",
                remove_count, session_id
            );
        }
    }

    /// Number of sessions currently remembered.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .len()
    }
}

fn evict_least_recent(by_id: &mut HashMap<String, SessionTurns>) {
    let oldest = by_id
        .iter()
        .min_by_key(|(_, turns)| turns.last_used)
        .map(|(id, _)| id.clone());

    if let Some(id) = oldest {
        by_id.remove(&id);
        debug!("Evicted conversation memory for session {}", id);
    }
}
