use actix_web::{HttpResponse, web};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::assistant::Assistant;
use crate::config::{API_VERSION, Config};
use crate::db::TenantRegistry;

/// Service status and the main endpoints
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service is running", body = Object)),
    tag = "System"
)]
pub async fn index(registry: web::Data<TenantRegistry>) -> HttpResponse {
    let tenant = registry.current().await;

    HttpResponse::Ok().json(json!({
        "status": "Workforce Assistant API is running",
        "version": API_VERSION,
        "current_database": tenant.name,
        "endpoints": {
            "database": "/db/chat",
            "database_switch": "/db/switch-database",
            "current_database": "/db/current-database",
            "file_analysis": "/files/upload",
        },
    }))
}

/// Settings the web client needs
#[utoipa::path(
    get,
    path = "/config",
    responses((status = 200, description = "Client configuration", body = Object, example = json!({
        "api_url": "http://localhost:8000",
        "version": "1.0.0"
    }))),
    tag = "System"
)]
pub async fn client_config(config: web::Data<Config>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "api_url": config.base_url,
        "version": API_VERSION,
    }))
}

// Debug routes are only mounted when ENABLE_DEBUG_ROUTES is set.

pub async fn debug_config(
    config: web::Data<Config>,
    registry: web::Data<TenantRegistry>,
) -> HttpResponse {
    let mut masked = config.database_url.clone();
    if masked.password().is_some() {
        let _ = masked.set_password(Some("***"));
    }

    HttpResponse::Ok().json(json!({
        "database_url": masked.as_str(),
        "gemini_key_exists": !config.gemini_api_key.expose_secret().is_empty(),
        "gemini_model": config.gemini_model,
        "context_folder": config.context_folder,
        "upload_folder": config.upload_folder,
        "allow_write_queries": config.allow_write_queries,
        "current_database": registry.current().await.name,
    }))
}

pub async fn debug_schema(registry: web::Data<TenantRegistry>) -> HttpResponse {
    let tenant = registry.current().await;

    HttpResponse::Ok().json(json!({
        "current_database": tenant.name,
        "source": tenant.schema.source,
        "schema_context": tenant.schema.text,
    }))
}

pub async fn debug_sessions(assistant: web::Data<Assistant>) -> HttpResponse {
    HttpResponse::Ok().json(assistant.session_counts().await)
}
