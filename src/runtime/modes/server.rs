//! Server mode
//!
//! Builds the actix app (middleware, app data, routes) and runs it until
//! the server stops or a shutdown signal arrives.

use actix_cors::Cors;
use actix_web::{
    App, HttpServer,
    http::{Method, header},
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use crate::api::middleware::RequestIdMiddleware;
use crate::api::services::v1::{json_error_handler, path_error_handler, query_error_handler};
use crate::api::services::{AppStartTime, health_routes, v1_routes};
use crate::config::ApiConfig;
use crate::runtime::lifetime;
use crate::services::AppServices;
use crate::storage::SeaOrmStorage;

/// Validate CORS configuration at startup (runs once)
fn validate_cors_config(api: &ApiConfig) {
    if api.cors_enabled && api.cors_allowed_origins.is_empty() {
        warn!(
            "CORS enabled but cors_allowed_origins is empty. \
            No cross-origin requests will be allowed. \
            Set the origins explicitly or use '[\"*\"]' for any origin."
        );
    }
}

/// Build CORS middleware from configuration
fn build_cors_middleware(api: &ApiConfig) -> Cors {
    // 未启用时使用浏览器默认同源策略
    if !api.cors_enabled {
        return Cors::default();
    }

    let mut cors = Cors::default();
    if api.cors_allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_any_origin();
    } else {
        for origin in &api.cors_allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }

    cors.allowed_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::HEAD,
        Method::OPTIONS,
    ])
    .allowed_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
    .allowed_header("x-request-id")
    .expose_headers(["x-request-id"])
    .max_age(api.cors_max_age as usize)
}

/// Register app data and routes shared by the server and integration tests
pub fn configure_app(
    cfg: &mut web::ServiceConfig,
    storage: Arc<SeaOrmStorage>,
    services: &AppServices,
    app_start_time: AppStartTime,
    max_body_bytes: usize,
) {
    services.configure(cfg);
    cfg.app_data(web::Data::new(storage))
        .app_data(web::Data::new(app_start_time))
        .app_data(web::PayloadConfig::new(max_body_bytes))
        .app_data(
            web::JsonConfig::default()
                .limit(max_body_bytes)
                .error_handler(json_error_handler),
        )
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        .service(health_routes())
        .configure(v1_routes);
}

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let app_start_time = AppStartTime {
        start_datetime: chrono::Utc::now(),
    };

    let startup = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let storage = startup.storage.clone();
    let services = startup.services.clone();

    let config = crate::config::get_config();
    let api_config = config.api.clone();
    validate_cors_config(&api_config);

    let cpu_count = config.server.cpu_count.clamp(1, 32);
    warn!("Using {} CPU cores for the server", cpu_count);

    let storage_for_app = storage.clone();
    let server = HttpServer::new(move || {
        let cors = build_cors_middleware(&api_config);
        let storage = storage_for_app.clone();
        let services = services.clone();
        let app_start_time = app_start_time.clone();
        let max_body_bytes = api_config.max_body_bytes;

        App::new()
            .wrap(RequestIdMiddleware)
            .wrap(cors)
            .wrap(Compress::default())
            .wrap(DefaultHeaders::new().add(("Cache-Control", "no-store")))
            .configure(|cfg| {
                configure_app(cfg, storage, &services, app_start_time, max_body_bytes)
            })
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .client_request_timeout(std::time::Duration::from_millis(5000))
    .client_disconnect_timeout(std::time::Duration::from_millis(1000))
    .workers(cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);
    let server = server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run();

    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown(&storage) => {
            warn!("Graceful shutdown complete");
        }
    }

    Ok(())
}
