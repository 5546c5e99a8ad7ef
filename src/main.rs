use std::sync::Arc;

use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};

mod api;
mod assistant;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod services;
mod utils;

#[cfg(test)]
mod test_support;

use crate::assistant::Assistant;
use crate::assistant::gemini::GeminiClient;
use crate::docs::ApiDoc;
use crate::error::AppError;
use config::Config;
use db::{TenantRegistry, init_db};
use secrecy::ExposeSecret;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use utoipa::OpenApi; // needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

/// Malformed JSON bodies answer with the same `{"detail": ..}` shape as every other error.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

/// Access log line: `METHOD path - Status: code - secs`.
fn request_logger() -> Logger {
    Logger::new("%{method}xi %U - Status: %s - %Ts")
        .custom_request_replace("method", |req| req.method().to_string())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log, mirrored to stdout
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking.and(std::io::stdout))
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Server starting...");

    let pool = init_db(&config)?;
    let registry = Data::new(TenantRegistry::bootstrap(config.clone(), pool).await);

    let model = GeminiClient::new(&config)?;
    if config.gemini_api_key.expose_secret().is_empty() {
        warn!("GEMINI_API_KEY is not set; assistant requests will fail");
    }
    let assistant = Data::new(Assistant::new(Arc::new(model), config.clone()));

    let current = registry.current().await;
    info!(
        database = %current.name,
        source = ?current.schema.source,
        tables = current.schema.tables.len(),
        "Assistant ready"
    );

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(request_logger())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(json_config())
            .app_data(config_data.clone())
            .app_data(registry.clone())
            .app_data(assistant.clone())
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{HttpResponse, test};

    #[actix_web::test]
    async fn request_logger_serves_requests_with_query_strings() {
        let app = test::init_service(
            App::new()
                .wrap(request_logger())
                .route("/db/status", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = test::TestRequest::get().uri("/db/status?verbose=1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
}
