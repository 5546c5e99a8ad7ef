use actix_web::{HttpResponse, web};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assistant::Assistant;
use crate::db::TenantRegistry;
use crate::error::{AppError, Result};
use crate::models::{ChatMessage, ChatResponse, ClearRequest, DirectSqlRequest};

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn request_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Ask the database assistant a question
#[utoipa::path(
    post,
    path = "/db/chat",
    request_body = ChatMessage,
    responses(
        (status = 200, description = "Assistant reply, with the SQL it ran", body = ChatResponse)
    ),
    tag = "Database Query"
)]
pub async fn db_chat(
    registry: web::Data<TenantRegistry>,
    assistant: web::Data<Assistant>,
    payload: web::Json<ChatMessage>,
) -> Result<HttpResponse> {
    let tenant = registry.current().await;
    let preview: String = payload.message.chars().take(30).collect();
    info!(request = %request_id(), database = %tenant.name, message = %preview, "DB chat");

    let response = assistant
        .process_db_message(&payload.message, payload.session_id.as_deref(), &tenant)
        .await;

    Ok(HttpResponse::Ok().json(response))
}

/// Run a SQL statement directly and have the assistant explain the result
#[utoipa::path(
    post,
    path = "/db/sql",
    request_body = DirectSqlRequest,
    responses(
        (status = 200, description = "Query result or SQL error", body = ChatResponse)
    ),
    tag = "Database Query"
)]
pub async fn direct_sql(
    registry: web::Data<TenantRegistry>,
    assistant: web::Data<Assistant>,
    payload: web::Json<DirectSqlRequest>,
) -> Result<HttpResponse> {
    if payload.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query is required".into()));
    }

    let tenant = registry.current().await;
    let response: ChatResponse = assistant
        .process_direct_sql(&payload.query, payload.session_id.as_deref(), &tenant)
        .await;

    Ok(HttpResponse::Ok().json(response))
}

/// Reset a database chat session
#[utoipa::path(
    post,
    path = "/db/clear",
    request_body = ClearRequest,
    responses(
        (status = 200, description = "Session cleared", body = Object, example = json!({
            "status": "Chat session cleared",
            "session_id": "0b7c2f4e-8a1d-4c55-9d3e-6f1a2b3c4d5e",
            "database": "pa"
        })),
        (status = 400, description = "Session ID missing"),
        (status = 404, description = "Unknown session")
    ),
    tag = "Database Query"
)]
pub async fn clear_db_chat(
    registry: web::Data<TenantRegistry>,
    assistant: web::Data<Assistant>,
    payload: web::Json<ClearRequest>,
) -> Result<HttpResponse> {
    let session_id = payload
        .session_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Session ID is required".into()))?;

    let tenant = registry.current().await;
    if !assistant.clear_session(session_id, &tenant).await {
        warn!(session = %short(session_id), "Session ID not found");
        return Err(AppError::NotFound(format!("Session ID {session_id} not found")));
    }

    Ok(HttpResponse::Ok().json(json!({
        "status": "Chat session cleared",
        "session_id": session_id,
        "database": tenant.name,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sql_executor::SqlFailure;
    use crate::test_support::{ScriptedExecutor, ScriptedModel, TestState};
    use actix_web::{App, test};
    use std::sync::Arc;

    #[actix_web::test]
    async fn chat_returns_the_pipeline_response() {
        let model = Arc::new(ScriptedModel::new([
            "ok",
            "```sql\nSELECT COUNT(*) AS Total FROM Employees\n```",
            "<p>Seven.</p>",
        ]));
        let executor = Arc::new(ScriptedExecutor::new().rows(&["Total"], &[&["7"]]));
        let state = TestState::new(model, executor);
        let app = test::init_service(
            App::new()
                .configure(state.install())
                .route("/chat", web::post().to(db_chat)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({"message": "How many employees?"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["response"], "<p>Seven.</p>");
        assert_eq!(body["has_sql"], true);
        assert_eq!(body["sql_error"], serde_json::Value::Null);
        assert!(body["sql_result"].as_str().unwrap().ends_with("(1 rows returned)"));
        assert_eq!(body["session_id"].as_str().unwrap().len(), 36);
    }

    #[actix_web::test]
    async fn direct_sql_reports_errors_in_the_body() {
        let model = Arc::new(ScriptedModel::new(["ok"]));
        let executor = Arc::new(ScriptedExecutor::new().fails(SqlFailure::ReadOnly));
        let state = TestState::new(model, executor);
        let app = test::init_service(
            App::new()
                .configure(state.install())
                .route("/sql", web::post().to(direct_sql)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/sql")
            .set_json(json!({"query": "DROP TABLE Sites"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["response"].as_str().unwrap().starts_with("SQL Error:"));
        assert_eq!(body["sql_query"], "DROP TABLE Sites");

        let req = test::TestRequest::post()
            .uri("/sql")
            .set_json(json!({"query": "  "}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn clear_needs_a_known_session() {
        let model = Arc::new(ScriptedModel::new(Vec::<&str>::new()).repeating("ok"));
        let state = TestState::new(model, Arc::new(ScriptedExecutor::new()));
        let app = test::init_service(
            App::new()
                .configure(state.install())
                .route("/chat", web::post().to(db_chat))
                .route("/clear", web::post().to(clear_db_chat)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/clear")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Session ID is required");

        let req = test::TestRequest::post()
            .uri("/clear")
            .set_json(json!({"session_id": "missing"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::post()
            .uri("/chat")
            .set_json(json!({"message": "hello"}))
            .to_request();
        let chat: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/clear")
            .set_json(json!({"session_id": chat["session_id"]}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "Chat session cleared");
        assert_eq!(body["database"], "pa");
    }
}
