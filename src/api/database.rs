use std::path::Path;

use actix_web::{HttpResponse, web};
use serde_json::json;
use tracing::{error, info};

use crate::assistant::Assistant;
use crate::config::{Config, is_valid_database_name};
use crate::db::TenantRegistry;
use crate::error::{AppError, Result};
use crate::models::{DatabaseSwitchRequest, DatabaseSwitchResponse};
use crate::services::context_files::{FILE_TYPES, folder_structure, load_context_files};

const PREVIEW_CHARS: usize = 500;

fn schema_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn filter_rules(config: &Config, database: &str) -> String {
    if config.has_project_filter(database) {
        format!(
            "ProjectId={} filter applied to EmployeeAttendance",
            config.attendance_project_filter
        )
    } else {
        "No ProjectId filter applied".to_string()
    }
}

/// Check the connection to the current database
#[utoipa::path(
    get,
    path = "/db/status",
    responses(
        (status = 200, description = "Connection state", body = Object, example = json!({"status": "connected"}))
    ),
    tag = "Database Query"
)]
pub async fn db_status(registry: web::Data<TenantRegistry>) -> HttpResponse {
    let tenant = registry.current().await;

    let status = match sqlx::query("SELECT 1 AS ConnectionTest")
        .fetch_one(&tenant.pool)
        .await
    {
        Ok(_) => "connected",
        Err(e) => {
            error!(database = %tenant.name, error = %e, "Database status check failed");
            "disconnected"
        }
    };

    HttpResponse::Ok().json(json!({ "status": status }))
}

/// Switch the assistant to another tenant database
#[utoipa::path(
    post,
    path = "/db/switch-database",
    request_body = DatabaseSwitchRequest,
    responses(
        (status = 200, description = "Switch result; status is `error` when the database cannot be reached", body = DatabaseSwitchResponse),
        (status = 400, description = "Invalid database name")
    ),
    tag = "Database Query"
)]
pub async fn switch_database(
    config: web::Data<Config>,
    registry: web::Data<TenantRegistry>,
    assistant: web::Data<Assistant>,
    payload: web::Json<DatabaseSwitchRequest>,
) -> Result<HttpResponse> {
    let database = payload.database.trim().to_lowercase();
    info!(database = %database, "Database switch requested");

    if !is_valid_database_name(&database) {
        return Err(AppError::BadRequest(format!(
            "Invalid database name '{database}'"
        )));
    }

    let tenant = match registry.open(&database).await {
        Ok(tenant) => tenant,
        Err(e) => {
            error!(database = %database, error = %e, "Schema discovery failed");
            return Ok(HttpResponse::Ok().json(DatabaseSwitchResponse {
                status: "error".into(),
                message: format!("Failed to connect to database '{database}': {e}"),
                database,
                schema_preview: None,
            }));
        }
    };

    let preview = schema_preview(&tenant.schema.text);
    registry.set_current(tenant).await;

    // Sessions carry the old schema in their instruction.
    let cleared = assistant.clear_all().await;
    info!(
        database = %database,
        cleared,
        rules = %filter_rules(&config, &database),
        "Switched database"
    );

    Ok(HttpResponse::Ok().json(DatabaseSwitchResponse {
        status: "success".into(),
        message: format!(
            "Successfully switched to database '{database}'. All sessions cleared and database-specific rules applied."
        ),
        database,
        schema_preview: Some(preview),
    }))
}

/// Currently selected database and the rules applied to it
#[utoipa::path(
    get,
    path = "/db/current-database",
    responses(
        (status = 200, description = "Current database", body = Object, example = json!({
            "current_database": "pa",
            "filter_rules": "ProjectId=64 filter applied to EmployeeAttendance",
            "like_matching": "Enabled for all text searches"
        }))
    ),
    tag = "Database Query"
)]
pub async fn current_database(
    config: web::Data<Config>,
    registry: web::Data<TenantRegistry>,
) -> HttpResponse {
    let tenant = registry.current().await;

    HttpResponse::Ok().json(json!({
        "current_database": tenant.name,
        "filter_rules": filter_rules(&config, &tenant.name),
        "like_matching": "Enabled for all text searches",
    }))
}

/// Tables known to the assistant and the supported context file types
#[utoipa::path(
    get,
    path = "/schema",
    responses((status = 200, description = "Schema summary", body = Object)),
    tag = "Schema"
)]
pub async fn get_schema(
    config: web::Data<Config>,
    registry: web::Data<TenantRegistry>,
) -> Result<HttpResponse> {
    let tenant = registry.current().await;
    let bundle = load_context_files(Path::new(&config.context_folder)).await?;

    Ok(HttpResponse::Ok().json(json!({
        "loaded_files": bundle.file_names.len(),
        "tables": tenant.schema.tables,
        "file_types": FILE_TYPES,
        "source": tenant.schema.source,
    })))
}

/// Context files loaded from disk
#[utoipa::path(
    get,
    path = "/context",
    responses((status = 200, description = "Context folder listing", body = Object)),
    tag = "Schema"
)]
pub async fn get_context(config: web::Data<Config>) -> Result<HttpResponse> {
    let folder = Path::new(&config.context_folder);
    let bundle = load_context_files(folder).await?;

    Ok(HttpResponse::Ok().json(json!({
        "loaded_files": bundle.file_names.len(),
        "folder": config.context_folder,
        "file_names": bundle.file_names,
        "structure": folder_structure(folder).await,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExecutor, ScriptedModel, TestState};
    use actix_web::{App, test as actix_test};
    use std::sync::Arc;

    fn state() -> TestState {
        let mut config = Config::for_tests();
        config.context_folder = std::env::temp_dir()
            .join(format!("wa-api-context-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();

        TestState::with_config(
            config,
            Arc::new(ScriptedModel::new(Vec::<&str>::new()).repeating("ok")),
            Arc::new(ScriptedExecutor::new()),
        )
    }

    #[test]
    fn previews_are_cut_at_five_hundred_chars() {
        assert_eq!(schema_preview("short"), "short");

        let long = "x".repeat(600);
        let preview = schema_preview(&long);
        assert_eq!(preview.len(), 503);
        assert!(preview.ends_with("..."));
    }

    #[actix_web::test]
    async fn unreachable_database_reports_disconnected() {
        let state = state();
        let app = actix_test::init_service(
            App::new()
                .configure(state.install())
                .route("/db/status", web::get().to(db_status)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/db/status").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "disconnected");
    }

    #[actix_web::test]
    async fn switch_rejects_invalid_names_without_changing_state() {
        let state = state();
        let app = actix_test::init_service(
            App::new()
                .configure(state.install())
                .route("/db/switch-database", web::post().to(switch_database))
                .route("/db/current-database", web::get().to(current_database)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/db/switch-database")
            .set_json(json!({"database": "pa; drop database pa"}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = actix_test::TestRequest::get().uri("/db/current-database").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["current_database"], "pa");
        assert_eq!(
            body["filter_rules"],
            "ProjectId=64 filter applied to EmployeeAttendance"
        );
        assert_eq!(body["like_matching"], "Enabled for all text searches");
    }

    #[actix_web::test]
    async fn schema_and_context_describe_the_loaded_files() {
        let state = state();
        let folder = state.config.context_folder.clone();
        tokio::fs::create_dir_all(&folder).await.unwrap();
        tokio::fs::write(Path::new(&folder).join("Site.cs"), "public class Site {}")
            .await
            .unwrap();

        let app = actix_test::init_service(
            App::new()
                .configure(state.install())
                .route("/schema", web::get().to(get_schema))
                .route("/context", web::get().to(get_context)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/schema").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["loaded_files"], 1);
        assert_eq!(body["tables"], json!(["Employees"]));
        assert_eq!(body["source"], "catalog");
        assert_eq!(body["file_types"].as_array().unwrap().len(), 5);

        let req = actix_test::TestRequest::get().uri("/context").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["file_names"], json!(["Site.cs"]));
        assert_eq!(body["structure"], json!(["Site.cs"]));

        tokio::fs::remove_dir_all(&folder).await.unwrap();
    }
}
