use crate::{
    api::{chat, database, entity, files, system},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let chat_limiter = Arc::new(build_limiter(config.rate_chat_per_min));
    let upload_limiter = Arc::new(build_limiter(config.rate_upload_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.route("/", web::get().to(system::index))
        .route("/config", web::get().to(system::client_config))
        .route("/schema", web::get().to(database::get_schema))
        .route("/context", web::get().to(database::get_context));

    // Unprefixed aliases kept for older web clients
    cfg.service(
        web::resource("/chat")
            .wrap(chat_limiter.clone())
            .route(web::post().to(chat::db_chat)),
    )
    .service(
        web::resource("/sql")
            .wrap(chat_limiter.clone())
            .route(web::post().to(chat::direct_sql)),
    )
    .service(web::resource("/clear").route(web::post().to(chat::clear_db_chat)))
    .service(
        web::resource("/upload")
            .wrap(upload_limiter.clone())
            .route(web::post().to(files::upload_file)),
    );

    cfg.service(
        web::scope("/db")
            .route("/status", web::get().to(database::db_status))
            .service(
                web::resource("/chat")
                    .wrap(chat_limiter.clone())
                    .route(web::post().to(chat::db_chat)),
            )
            .service(
                web::resource("/sql")
                    .wrap(chat_limiter.clone())
                    .route(web::post().to(chat::direct_sql)),
            )
            .route("/clear", web::post().to(chat::clear_db_chat))
            .route("/switch-database", web::post().to(database::switch_database))
            .route("/current-database", web::get().to(database::current_database)),
    );

    cfg.service(
        web::scope("/files")
            .service(
                web::resource("/upload")
                    .wrap(upload_limiter)
                    .route(web::post().to(files::upload_file)),
            )
            .service(
                web::resource("/chat")
                    .wrap(chat_limiter)
                    .route(web::post().to(files::file_chat)),
            )
            .route("/clear", web::post().to(files::clear_file_chat)),
    );

    if config.enable_debug_routes {
        cfg.service(
            web::scope("/debug")
                .route("/config", web::get().to(system::debug_config))
                .route("/schema", web::get().to(system::debug_schema))
                .route("/sessions", web::get().to(system::debug_sessions)),
        );
    }

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(web::resource("/entities").route(web::get().to(entity::list_entities)))
            .service(
                web::resource("/entities/{table}")
                    .route(web::get().to(entity::list_rows))
                    .route(web::post().to(entity::create_row)),
            )
            .service(
                web::resource("/entities/{table}/{id}")
                    .route(web::get().to(entity::get_row))
                    .route(web::put().to(entity::update_row))
                    .route(web::delete().to(entity::delete_row)),
            ),
    );
}
