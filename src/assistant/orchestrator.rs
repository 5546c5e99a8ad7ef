use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

use super::gemini::{LanguageModel, ModelError};
use super::prompts;
use super::session::{ChatSession, SessionCounts, SessionStore};
use crate::config::Config;
use crate::db::TenantHandle;
use crate::models::ChatResponse;

static SQL_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```sql\s*(.*?)\s*```").unwrap());

/// First fenced ```sql block of a model reply.
pub fn extract_sql(reply: &str) -> Option<String> {
    SQL_BLOCK_RE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|sql| !sql.is_empty())
}

fn is_direct_select(message: &str) -> bool {
    message.trim().to_lowercase().starts_with("select ")
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(50) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Runs chat turns against the language model and the tenant database.
pub struct Assistant {
    sessions: SessionStore,
    config: Config,
}

impl Assistant {
    pub fn new(model: Arc<dyn LanguageModel>, config: Config) -> Self {
        let sessions = SessionStore::new(
            model,
            Duration::from_secs(config.session_idle_secs),
            config.max_sessions,
        );
        Self { sessions, config }
    }

    pub fn db_instruction(&self, tenant: &TenantHandle) -> String {
        prompts::db_system_instruction(&tenant.schema.text, &tenant.rules(&self.config))
    }

    fn model(&self) -> &dyn LanguageModel {
        self.sessions.model()
    }

    pub async fn process_db_message(
        &self,
        message: &str,
        session_id: Option<&str>,
        tenant: &TenantHandle,
    ) -> ChatResponse {
        let instruction = self.db_instruction(tenant);
        let (session_id, slot) = self.sessions.get_or_create_db(session_id, &instruction).await;
        let mut chat = slot.chat.lock().await;

        if is_direct_select(message) {
            info!(session = %short(&session_id), sql = %preview(message), "Direct SQL query detected");
            return self.direct_select(&mut chat, message, session_id, tenant).await;
        }

        match self.converse(&mut chat, message, &session_id, tenant).await {
            Ok(response) => response,
            Err(e) => {
                error!(session = %short(&session_id), error = %e, "Error processing chat message");
                ChatResponse::text(prompts::PROCESSING_ERROR, session_id)
            }
        }
    }

    async fn direct_select(
        &self,
        chat: &mut ChatSession,
        sql: &str,
        session_id: String,
        tenant: &TenantHandle,
    ) -> ChatResponse {
        let outcome = match tenant.executor.execute(sql).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                let message = failure.user_message();
                warn!(session = %short(&session_id), error = %message, "SQL error");
                return ChatResponse {
                    response: format!("<p><b>SQL Error:</b> {message}</p>"),
                    session_id,
                    has_sql: true,
                    sql_query: Some(sql.to_string()),
                    sql_error: Some(message),
                    ..Default::default()
                };
            }
        };

        let result = outcome.render();
        let interpretation = match chat
            .send_message(self.model(), &prompts::interpret_direct(sql, &result))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Error getting interpretation");
                format!("<p><b>Error:</b> Unable to interpret results: {e}</p>")
            }
        };

        ChatResponse {
            response: interpretation.clone(),
            session_id,
            has_sql: true,
            sql_query: Some(sql.to_string()),
            sql_result: Some(result),
            sql_error: None,
            interpretation: Some(interpretation),
        }
    }

    async fn converse(
        &self,
        chat: &mut ChatSession,
        message: &str,
        session_id: &str,
        tenant: &TenantHandle,
    ) -> Result<ChatResponse, ModelError> {
        let reply = chat.send_message(self.model(), message).await?;

        if let Some(sql) = extract_sql(&reply) {
            info!(session = %short(session_id), sql = %preview(&sql), "Model generated SQL query");
            return self.run_generated(chat, sql, session_id, tenant, true).await;
        }

        if !prompts::is_data_question(message) {
            info!(session = %short(session_id), "Regular response (no SQL needed)");
            return Ok(ChatResponse::text(reply, session_id));
        }

        info!(session = %short(session_id), message = %preview(message), "Data question without SQL, asking again");
        let retry = chat
            .send_message(self.model(), &prompts::request_sql(message))
            .await?;

        match extract_sql(&retry) {
            Some(sql) => {
                info!(session = %short(session_id), sql = %preview(&sql), "Generated SQL query on second attempt");
                match self.run_generated(chat, sql, session_id, tenant, false).await? {
                    // Without an alternative suggestion the re-prompt itself is the answer.
                    response if response.sql_error.is_some() => Ok(ChatResponse {
                        response: retry,
                        ..response
                    }),
                    response => Ok(response),
                }
            }
            None => {
                info!(session = %short(session_id), "No SQL query could be generated");
                Ok(ChatResponse::text(retry, session_id))
            }
        }
    }

    /// Execute model-generated SQL and feed the outcome back to the model.
    async fn run_generated(
        &self,
        chat: &mut ChatSession,
        sql: String,
        session_id: &str,
        tenant: &TenantHandle,
        suggest_alternative: bool,
    ) -> Result<ChatResponse, ModelError> {
        match tenant.executor.execute(&sql).await {
            Ok(outcome) => {
                info!(session = %short(session_id), database = %tenant.name, "SQL query executed successfully");
                let result = outcome.render();
                let interpretation = chat
                    .send_message(self.model(), &prompts::interpret(&result))
                    .await?;

                Ok(ChatResponse {
                    response: interpretation.clone(),
                    session_id: session_id.to_string(),
                    has_sql: true,
                    sql_query: Some(sql),
                    sql_result: Some(result),
                    sql_error: None,
                    interpretation: Some(interpretation),
                })
            }
            Err(failure) => {
                let message = failure.user_message();
                warn!(session = %short(session_id), error = %message, "SQL error");

                let response = if suggest_alternative {
                    chat.send_message(self.model(), &prompts::suggest_alternative(&message))
                        .await?
                } else {
                    String::new()
                };

                Ok(ChatResponse {
                    response,
                    session_id: session_id.to_string(),
                    has_sql: true,
                    sql_query: Some(sql),
                    sql_error: Some(message),
                    ..Default::default()
                })
            }
        }
    }

    /// Run a user-supplied statement and ask the model to explain the result.
    pub async fn process_direct_sql(
        &self,
        query: &str,
        session_id: Option<&str>,
        tenant: &TenantHandle,
    ) -> ChatResponse {
        let instruction = self.db_instruction(tenant);
        let (session_id, slot) = self.sessions.get_or_create_db(session_id, &instruction).await;

        info!(session = %short(&session_id), sql = %preview(query), "Executing direct SQL query");
        let outcome = match tenant.executor.execute(query).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                let message = failure.user_message();
                warn!(session = %short(&session_id), error = %message, "SQL error");
                return ChatResponse {
                    response: format!("SQL Error: {message}"),
                    session_id,
                    has_sql: true,
                    sql_query: Some(query.to_string()),
                    sql_error: Some(message),
                    ..Default::default()
                };
            }
        };

        let result = outcome.render();
        let interpretation = match slot
            .chat
            .lock()
            .await
            .send_message(self.model(), &prompts::interpret_direct(query, &result))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Error getting interpretation");
                format!("Error getting interpretation: {e}")
            }
        };

        ChatResponse {
            response: "Query executed successfully.".to_string(),
            session_id,
            has_sql: true,
            sql_query: Some(query.to_string()),
            sql_result: Some(result),
            sql_error: None,
            interpretation: Some(interpretation),
        }
    }

    pub async fn process_file_message(&self, message: &str, session_id: Option<&str>) -> ChatResponse {
        let (session_id, slot) = self.sessions.get_or_create_file(session_id).await;
        let reply = slot.chat.lock().await.send_message(self.model(), message).await;

        match reply {
            Ok(text) => ChatResponse::text(text, session_id),
            Err(e) => {
                error!(session = %short(&session_id), error = %e, "Error processing file analysis message");
                ChatResponse::text(prompts::PROCESSING_ERROR, session_id)
            }
        }
    }

    pub async fn process_file_upload(&self, file_info: &str, session_id: Option<&str>) -> ChatResponse {
        let (session_id, slot) = self.sessions.get_or_create_file(session_id).await;
        let reply = slot
            .chat
            .lock()
            .await
            .send_message(self.model(), &prompts::analyze_upload(file_info))
            .await;

        match reply {
            Ok(text) => ChatResponse::text(text, session_id),
            Err(e) => {
                error!(session = %short(&session_id), error = %e, "Error processing file upload");
                ChatResponse::text(prompts::FILE_ANALYSIS_ERROR, session_id)
            }
        }
    }

    pub async fn clear_session(&self, session_id: &str, tenant: &TenantHandle) -> bool {
        self.sessions
            .clear(session_id, &self.db_instruction(tenant))
            .await
    }

    pub async fn clear_all(&self) -> u64 {
        self.sessions.clear_all().await
    }

    pub async fn session_counts(&self) -> SessionCounts {
        self.sessions.counts().await
    }
}
