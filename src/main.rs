use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{routing::get, Router};
use tokio::signal;
use tower_http::services::ServeDir;
use tracing::{error, info};

use autoshop_api as api;

/// Media folders that are served directly; rendered invoices are only reachable
/// through the token-checked document routes.
const PUBLIC_MEDIA_FOLDERS: &[&str] = &["visits", "warranty-cards"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = api::events::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(event_sender);
    tokio::spawn(api::events::process_events(event_rx));

    let base_logger = api::logging::setup_logger(api::logging::LoggerConfig::default());
    let services =
        api::handlers::AppServices::new(db_arc.clone(), &cfg, event_sender.clone(), &base_logger);

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
    };

    let mut app = Router::new()
        .route("/", get(|| async { "autoshop-api up" }))
        .merge(api::openapi::swagger_ui())
        .merge(api::app_router(app_state));

    if cfg.media_base_url.starts_with('/') {
        let base = cfg.media_base_url.trim_end_matches('/');
        for folder in PUBLIC_MEDIA_FOLDERS {
            app = app.nest_service(
                &format!("{}/{}", base, folder),
                ServeDir::new(Path::new(&cfg.storage_dir).join(folder)),
            );
        }
    } else {
        info!(
            media_base_url = %cfg.media_base_url,
            "Media is served externally; local file serving disabled"
        );
    }

    let host: std::net::IpAddr = cfg.host.parse()?;
    let addr = SocketAddr::new(host, cfg.port);
    info!("autoshop-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
