use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::gemini::{LanguageModel, ModelError, Turn};
use super::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    DbQuery,
    FileAnalysis,
}

/// One conversation with the model.
pub struct ChatSession {
    system_instruction: String,
    history: Vec<Turn>,
}

impl ChatSession {
    /// Start a conversation and send the primer; a failed primer only costs context.
    async fn start(model: &dyn LanguageModel, system_instruction: String, primer: &str) -> Self {
        let mut session = Self {
            system_instruction,
            history: Vec::new(),
        };

        if let Err(e) = session.send_message(model, primer).await {
            warn!(error = %e, "Error priming chat session");
        }

        session
    }

    /// Send a user turn. The turn is dropped from history when the model fails.
    pub async fn send_message(
        &mut self,
        model: &dyn LanguageModel,
        text: &str,
    ) -> Result<String, ModelError> {
        self.history.push(Turn::user(text));

        match model.generate(&self.system_instruction, &self.history).await {
            Ok(reply) => {
                self.history.push(Turn::model(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    #[cfg(test)]
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }
}

pub struct SessionSlot {
    pub kind: SessionKind,
    pub chat: Mutex<ChatSession>,
}

pub type SessionHandle = Arc<SessionSlot>;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SessionCounts {
    pub total_sessions: u64,
    pub db_query_sessions: u64,
    pub file_analysis_sessions: u64,
}

/// In-memory chat sessions, evicted after a period of inactivity.
pub struct SessionStore {
    sessions: Cache<String, SessionHandle>,
    model: Arc<dyn LanguageModel>,
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

impl SessionStore {
    pub fn new(model: Arc<dyn LanguageModel>, idle: Duration, max_sessions: u64) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle)
            .build();

        Self { sessions, model }
    }

    pub fn model(&self) -> &dyn LanguageModel {
        self.model.as_ref()
    }

    async fn build_chat(&self, kind: SessionKind, db_instruction: Option<&str>) -> ChatSession {
        match (kind, db_instruction) {
            (SessionKind::DbQuery, Some(instruction)) => {
                ChatSession::start(self.model(), instruction.to_string(), prompts::DB_PRIMER).await
            }
            _ => {
                ChatSession::start(
                    self.model(),
                    prompts::file_system_instruction(),
                    prompts::FILE_PRIMER,
                )
                .await
            }
        }
    }

    async fn get_or_create(
        &self,
        session_id: Option<&str>,
        kind: SessionKind,
        db_instruction: Option<&str>,
    ) -> (String, SessionHandle) {
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            if let Some(slot) = self.sessions.get(id).await {
                if slot.kind == kind {
                    return (id.to_string(), slot);
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        let slot = Arc::new(SessionSlot {
            kind,
            chat: Mutex::new(self.build_chat(kind, db_instruction).await),
        });
        self.sessions.insert(id.clone(), slot.clone()).await;

        info!(session = %short(&id), ?kind, "Created new chat session");
        (id, slot)
    }

    pub async fn get_or_create_db(
        &self,
        session_id: Option<&str>,
        system_instruction: &str,
    ) -> (String, SessionHandle) {
        self.get_or_create(session_id, SessionKind::DbQuery, Some(system_instruction))
            .await
    }

    pub async fn get_or_create_file(&self, session_id: Option<&str>) -> (String, SessionHandle) {
        self.get_or_create(session_id, SessionKind::FileAnalysis, None)
            .await
    }

    /// Reset a session's history in place. Database sessions pick up the
    /// instruction of the current tenant.
    pub async fn clear(&self, session_id: &str, db_instruction: &str) -> bool {
        let Some(slot) = self.sessions.get(session_id).await else {
            warn!(session = %short(session_id), "Session not found for clearing");
            return false;
        };

        let fresh = self.build_chat(slot.kind, Some(db_instruction)).await;
        *slot.chat.lock().await = fresh;
        info!(session = %short(session_id), "Cleared chat session");
        true
    }

    pub async fn clear_all(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        let count = self.sessions.entry_count();
        self.sessions.invalidate_all();
        self.sessions.run_pending_tasks().await;
        count
    }

    pub async fn counts(&self) -> SessionCounts {
        self.sessions.run_pending_tasks().await;

        let mut counts = SessionCounts::default();
        for (_, slot) in self.sessions.iter() {
            counts.total_sessions += 1;
            match slot.kind {
                SessionKind::DbQuery => counts.db_query_sessions += 1,
                SessionKind::FileAnalysis => counts.file_analysis_sessions += 1,
            }
        }
        counts
    }
}
