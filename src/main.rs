use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use vendora_api::{
    app_router,
    auth::{AuthConfig, AuthService},
    config::{init_tracing, load_config},
    db, events, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);
    info!(
        environment = %config.environment,
        "Starting vendora-api v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to the database")?,
    );

    if config.auto_migrate {
        db::sync_schema(&db)
            .await
            .context("schema sync failed")?;
        db::seed_reference_data(&db)
            .await
            .context("reference data seeding failed")?;
    }

    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    let event_sender = Arc::new(events::EventSender::new(tx));
    tokio::spawn(events::process_events(rx, Vec::new()));

    let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
    let config = Arc::new(config);
    let state = AppState::new(db, config.clone(), auth, event_sender);

    let cors = build_cors(&config)?;
    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down cleanly");
    Ok(())
}

fn build_cors(config: &vendora_api::config::AppConfig) -> anyhow::Result<CorsLayer> {
    if config.has_cors_allowed_origins() {
        let origins = config
            .cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("invalid CORS origin '{origin}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
    } else {
        warn!("No CORS origins configured; falling back to permissive CORS");
        Ok(CorsLayer::permissive())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
