use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use tokio::signal;

mod api_error;
mod auth;
mod config;
mod db;
mod http;
mod middleware;
mod models;
mod service;
mod store;
mod telemetry;

use crate::auth::token::TokenCodec;
use crate::config::Config;
use crate::db::create_pool;
use crate::middleware::cors_middleware;
use crate::service::session_service::SessionService;
use crate::store::postgres::PgAuthStore;
use crate::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_telemetry();

    let db_pool = create_pool(&config).await?;
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let codec = TokenCodec::new(&config.auth.jwt_secret, config.auth.jwt_algorithm)?;
    let token_ttl = chrono::Duration::minutes(config.auth.access_token_expire_minutes);
    let session_service =
        SessionService::new(codec, Arc::new(PgAuthStore::new(db_pool.clone())), token_ttl);

    tracing::info!(
        "starting authgate server on {}:{}",
        config.server.host,
        config.server.port
    );

    let server = HttpServer::new(move || {
        let session_service = session_service.clone();
        App::new()
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(session_service.clone()))
            .wrap(cors_middleware())
            .wrap(Logger::default())
            // The auth scope must precede the bare /api scope: actix scopes
            // do not backtrack once a prefix matches.
            .configure(|cfg| {
                crate::http::auth_handler::configure_routes(cfg, session_service.clone())
            })
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(crate::http::health::health_check)),
            )
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run();

    // Graceful shutdown
    let server_handle = server.handle();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("failed to listen for shutdown signal");
        tracing::info!("shutdown signal received, stopping server");
        server_handle.stop(true).await;
    });

    server.await?;
    Ok(())
}
